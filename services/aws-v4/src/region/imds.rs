use std::sync::Arc;

use async_trait::async_trait;
use awsign_core::{Context, Result};
use log::debug;
use once_cell::sync::OnceCell;

use super::{ProvideRegion, Region};
use crate::imds::ImdsClient;
use crate::Config;

const REGION_PATH: &str = "/latest/meta-data/placement/region";

/// ImdsRegionProvider loads region of the current EC2 instance from IMDSv2.
///
/// The region of an instance never changes, so the first successful answer
/// is kept for the lifetime of the provider and shared by its clones.
#[derive(Debug, Clone, Default)]
pub struct ImdsRegionProvider {
    client: ImdsClient,
    region: Arc<OnceCell<Region>>,
}

impl ImdsRegionProvider {
    /// Create a new ImdsRegionProvider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint for the metadata service.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client = self.client.with_endpoint(endpoint);
        self
    }
}

#[async_trait]
impl ProvideRegion for ImdsRegionProvider {
    async fn provide_region(&self, ctx: &Context) -> Result<Option<Region>> {
        if let Some(region) = self.region.get() {
            return Ok(Some(region.clone()));
        }

        let config = Config::default().from_env(ctx);
        if config.ec2_metadata_disabled {
            debug!("IMDS is disabled, skip loading region");
            return Ok(None);
        }

        let content = self.client.get(ctx, &config, REGION_PATH).await?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        Ok(Some(self.region.get_or_init(|| Region::new(content)).clone()))
    }
}
