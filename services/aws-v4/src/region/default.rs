// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use async_trait::async_trait;
use awsign_core::{Context, Result};
use once_cell::sync::Lazy;

use super::{
    EnvRegionProvider, ImdsRegionProvider, ProfileRegionProvider, ProvideRegion,
    ProvideRegionChain, Region,
};

static DEFAULT_REGION_PROVIDER: Lazy<DefaultRegionProvider> = Lazy::new(DefaultRegionProvider::new);

/// Process-wide default region provider.
///
/// Created on first use and never torn down, so the region fetched from
/// instance metadata is fetched once per process.
pub fn default_region_provider() -> &'static DefaultRegionProvider {
    &DEFAULT_REGION_PROVIDER
}

/// DefaultRegionProvider tries environment variables, the profile in the
/// config file and the instance metadata service in that order.
#[derive(Debug)]
pub struct DefaultRegionProvider {
    chain: ProvideRegionChain,
}

impl Default for DefaultRegionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultRegionProvider {
    /// Create a new `DefaultRegionProvider`.
    pub fn new() -> Self {
        Self {
            chain: ProvideRegionChain::new()
                .push(EnvRegionProvider::new())
                .push(ProfileRegionProvider::new())
                .push(ImdsRegionProvider::new()),
        }
    }

    /// Create with a custom region chain.
    pub fn with_chain(chain: ProvideRegionChain) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl ProvideRegion for DefaultRegionProvider {
    async fn provide_region(&self, ctx: &Context) -> Result<Option<Region>> {
        self.chain.provide_region(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use awsign_core::{ErrorKind, StaticEnv};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_default_region_provider_from_env() -> anyhow::Result<()> {
        let ctx = Context::new().with_env(StaticEnv {
            home_dir: None,
            envs: HashMap::from([(AWS_REGION.to_string(), "sa-east-1".to_string())]),
        });

        let region = DefaultRegionProvider::new().provide_region(&ctx).await?;
        assert_eq!(region, Some(Region::new("sa-east-1")));
        Ok(())
    }

    #[tokio::test]
    async fn test_default_region_provider_nothing_found() {
        let ctx = Context::new().with_env(StaticEnv {
            home_dir: None,
            envs: HashMap::from([(AWS_EC2_METADATA_DISABLED.to_string(), "true".to_string())]),
        });

        let err = DefaultRegionProvider::new()
            .provide_region(&ctx)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::ResolutionFailed);
    }

    #[test]
    fn test_default_region_provider_is_shared() {
        assert!(std::ptr::eq(default_region_provider(), default_region_provider()));
    }
}
