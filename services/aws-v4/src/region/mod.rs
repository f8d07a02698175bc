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

//! Region resolution.

use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use awsign_core::{Context, Result};

mod chain;
pub use chain::ProvideRegionChain;

mod default;
pub use default::{default_region_provider, DefaultRegionProvider};

mod env;
pub use env::EnvRegionProvider;

mod imds;
pub use imds::ImdsRegionProvider;

mod profile;
pub use profile::ProfileRegionProvider;

mod r#static;
pub use r#static::StaticRegionProvider;

/// Region is the AWS region a request is sent to, like `us-east-1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Region(String);

impl Region {
    /// Create a new region.
    pub fn new(region: impl Into<String>) -> Self {
        Self(region.into())
    }

    /// Region as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Region {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Region {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Region {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// ProvideRegion resolves the region from the environment.
///
/// Returning `Ok(None)` means this provider has nothing to offer, which lets a
/// chain move on to the next provider.
#[async_trait]
pub trait ProvideRegion: Debug + Send + Sync + 'static {
    /// Load region from current env.
    async fn provide_region(&self, ctx: &Context) -> Result<Option<Region>>;
}

#[async_trait]
impl<T: ProvideRegion + ?Sized> ProvideRegion for Arc<T> {
    async fn provide_region(&self, ctx: &Context) -> Result<Option<Region>> {
        self.as_ref().provide_region(ctx).await
    }
}

#[async_trait]
impl<T: ProvideRegion + ?Sized> ProvideRegion for &'static T {
    async fn provide_region(&self, ctx: &Context) -> Result<Option<Region>> {
        (**self).provide_region(ctx).await
    }
}
