use async_trait::async_trait;
use awsign_core::{Context, Result};

use super::{ProvideRegion, Region};
use crate::config::load_config_file_profile;
use crate::Config;

/// ProfileRegionProvider loads region from the `region` key of the profile in
/// the config file (`~/.aws/config` or `AWS_CONFIG_FILE`).
#[derive(Debug, Default, Clone)]
pub struct ProfileRegionProvider {
    profile: Option<String>,
    config_file: Option<String>,
}

impl ProfileRegionProvider {
    /// Create a new ProfileRegionProvider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the profile name to use instead of `AWS_PROFILE`.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Set the path to the config file.
    pub fn with_config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }
}

#[async_trait]
impl ProvideRegion for ProfileRegionProvider {
    async fn provide_region(&self, ctx: &Context) -> Result<Option<Region>> {
        let config = Config::default().from_env(ctx);
        let profile = self.profile.as_deref().unwrap_or(&config.profile);
        let path = self.config_file.as_deref().unwrap_or(&config.config_file);

        let Some(props) = load_config_file_profile(ctx, path, profile).await? else {
            return Ok(None);
        };
        Ok(props
            .get("region")
            .filter(|v| !v.is_empty())
            .map(|v| Region::new(v.as_str())))
    }
}
