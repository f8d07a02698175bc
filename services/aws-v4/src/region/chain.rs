use std::fmt::{self, Debug};

use async_trait::async_trait;
use awsign_core::{ChainState, Context, Result};

use super::{ProvideRegion, Region};

/// A chain of region providers that will be tried in order.
///
/// Shares its semantics with [`awsign_core::ProvideCredentialChain`]: the
/// first provider returning a region wins, failures of the others are
/// aggregated, and the last successful provider is called directly on later
/// calls without consulting the providers before it.
pub struct ProvideRegionChain {
    providers: Vec<Box<dyn ProvideRegion>>,
    state: ChainState,
}

impl ProvideRegionChain {
    /// Create a new empty region provider chain.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            state: ChainState::default(),
        }
    }

    /// Add a region provider to the chain.
    pub fn push(mut self, provider: impl ProvideRegion) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Enable or disable reusing the last successful provider.
    pub fn with_reuse_last_provider(mut self, reuse: bool) -> Self {
        self.state = ChainState::new(reuse);
        self
    }

    /// Number of providers in this chain.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether this chain has no provider.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Forget the last successful provider.
    pub fn reset(&self) {
        self.state.reset()
    }
}

impl Default for ProvideRegionChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ProvideRegionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvideRegionChain")
            .field("providers", &self.providers)
            .field("reuse_last_provider", &self.state.reuse_last_provider())
            .finish()
    }
}

#[async_trait]
impl ProvideRegion for ProvideRegionChain {
    async fn provide_region(&self, ctx: &Context) -> Result<Option<Region>> {
        self.state
            .resolve("region", self, &self.providers, |p| p.provide_region(ctx))
            .await
    }
}
