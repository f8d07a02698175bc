use async_trait::async_trait;
use awsign_core::{Context, Result};

use super::{ProvideRegion, Region};

/// StaticRegionProvider always returns the region it was built with.
#[derive(Debug, Clone)]
pub struct StaticRegionProvider {
    region: Region,
}

impl StaticRegionProvider {
    /// Create a new StaticRegionProvider.
    pub fn new(region: impl Into<Region>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

#[async_trait]
impl ProvideRegion for StaticRegionProvider {
    async fn provide_region(&self, _: &Context) -> Result<Option<Region>> {
        Ok(Some(self.region.clone()))
    }
}
