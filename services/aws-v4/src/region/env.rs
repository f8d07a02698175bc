use async_trait::async_trait;
use awsign_core::{Context, Result};

use super::{ProvideRegion, Region};
use crate::constants::{AWS_DEFAULT_REGION, AWS_REGION};

/// EnvRegionProvider loads region from `AWS_REGION`, then `AWS_DEFAULT_REGION`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvRegionProvider;

impl EnvRegionProvider {
    /// Create a new EnvRegionProvider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideRegion for EnvRegionProvider {
    async fn provide_region(&self, ctx: &Context) -> Result<Option<Region>> {
        Ok(ctx
            .env_var(AWS_REGION)
            .or_else(|| ctx.env_var(AWS_DEFAULT_REGION))
            .map(Region::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awsign_core::StaticEnv;
    use std::collections::HashMap;
    use test_case::test_case;

    #[test_case(&[], None; "unset")]
    #[test_case(&[(AWS_REGION, "us-west-2")], Some("us-west-2"); "aws region")]
    #[test_case(&[(AWS_DEFAULT_REGION, "eu-west-1")], Some("eu-west-1"); "default region")]
    #[test_case(&[(AWS_REGION, "us-west-2"), (AWS_DEFAULT_REGION, "eu-west-1")], Some("us-west-2"); "aws region first")]
    #[test_case(&[(AWS_REGION, ""), (AWS_DEFAULT_REGION, "eu-west-1")], Some("eu-west-1"); "empty aws region")]
    #[tokio::test]
    async fn test_env_region_provider(envs: &[(&str, &str)], expected: Option<&str>) {
        let ctx = Context::new().with_env(StaticEnv {
            home_dir: None,
            envs: envs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        });

        let region = EnvRegionProvider::new()
            .provide_region(&ctx)
            .await
            .expect("env provider never fails");
        assert_eq!(region, expected.map(Region::from));
    }
}
