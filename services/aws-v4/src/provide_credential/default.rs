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

use crate::provide_credential::{
    EnvCredentialProvider, IMDSv2CredentialProvider, ProfileCredentialProvider,
};
use crate::Credential;
use async_trait::async_trait;
use awsign_core::{Context, ProvideCredential, ProvideCredentialChain, Result};
use once_cell::sync::Lazy;

static DEFAULT_CREDENTIAL_PROVIDER: Lazy<DefaultCredentialProvider> =
    Lazy::new(DefaultCredentialProvider::new);

/// Process-wide default credential provider.
///
/// Created on first use and kept until the process exits, so every caller
/// shares the same "last successful provider" state.
pub fn default_credential_provider() -> &'static DefaultCredentialProvider {
    &DEFAULT_CREDENTIAL_PROVIDER
}

/// DefaultCredentialProvider is a loader that will try to load credential via default chains.
///
/// Resolution order:
///
/// 1. Environment variables
/// 2. Shared credentials file and config file
/// 3. EC2 instance metadata (IMDSv2)
///
/// The provider that succeeded first is reused for later calls.
#[derive(Debug)]
pub struct DefaultCredentialProvider {
    chain: ProvideCredentialChain<Credential>,
}

impl Default for DefaultCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCredentialProvider {
    /// Create a new `DefaultCredentialProvider` instance.
    pub fn new() -> Self {
        let chain = ProvideCredentialChain::new()
            .push(EnvCredentialProvider::new())
            .push(ProfileCredentialProvider::new())
            .push(IMDSv2CredentialProvider::new());

        Self { chain }
    }

    /// Create with a custom credential chain.
    pub fn with_chain(chain: ProvideCredentialChain<Credential>) -> Self {
        Self { chain }
    }

    /// Forget the provider that succeeded last.
    pub fn reset(&self) {
        self.chain.reset()
    }
}

#[async_trait]
impl ProvideCredential for DefaultCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.chain.provide_credential(ctx).await
    }
}
