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

use crate::{Context, Error, ProvideCredential, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

const NO_PROVIDER: usize = usize::MAX;

/// Bookkeeping shared by every provider chain.
///
/// Remembers which provider succeeded last so later calls can skip the walk.
/// The slot is a plain atomic: two concurrent callers may briefly record
/// different providers, which is harmless because resolution has no side
/// effects on failure.
#[derive(Debug)]
pub struct ChainState {
    reuse_last_provider: bool,
    last_provider: AtomicUsize,
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ChainState {
    /// Create a new chain state.
    pub fn new(reuse_last_provider: bool) -> Self {
        Self {
            reuse_last_provider,
            last_provider: AtomicUsize::new(NO_PROVIDER),
        }
    }

    /// Whether the last successful provider is reused.
    pub fn reuse_last_provider(&self) -> bool {
        self.reuse_last_provider
    }

    /// Index of the provider that should be called directly, if any.
    pub fn last_provider(&self) -> Option<usize> {
        if !self.reuse_last_provider {
            return None;
        }
        match self.last_provider.load(Ordering::Acquire) {
            NO_PROVIDER => None,
            idx => Some(idx),
        }
    }

    /// Record a successful provider.
    pub fn record(&self, idx: usize) {
        if self.reuse_last_provider {
            self.last_provider.store(idx, Ordering::Release);
        }
    }

    /// Forget the recorded provider.
    pub fn reset(&self) {
        self.last_provider.store(NO_PROVIDER, Ordering::Release);
    }

    /// Build the error returned when no provider could resolve a value.
    fn resolution_failed(
        &self,
        what: &str,
        chain: &dyn Debug,
        failures: &[String],
    ) -> Error {
        Error::resolution_failed(format!(
            "unable to load {what} from any of the providers in the chain {chain:?}: [{}]",
            failures.join(", ")
        ))
    }

    /// Build the error returned when a chain without providers is resolved.
    fn empty_chain(&self, what: &str) -> Error {
        Error::config_invalid(format!("{what} provider chain must contain at least one provider"))
    }

    /// Walk `providers` in order and return the first value found.
    ///
    /// The recorded provider, if any, is called alone and its result is
    /// returned as is. Otherwise every provider is tried, the winner is
    /// recorded and the failures of the others are aggregated in order.
    /// `what` names the resolved value in logs and errors.
    pub async fn resolve<'a, P, T, F, Fut>(
        &self,
        what: &str,
        chain: &(dyn Debug + Sync),
        providers: &'a [Box<P>],
        call: F,
    ) -> Result<Option<T>>
    where
        P: Debug + ?Sized,
        F: Fn(&'a P) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        if providers.is_empty() {
            return Err(self.empty_chain(what));
        }

        if let Some(provider) = self.last_provider().and_then(|idx| providers.get(idx)) {
            debug!("reusing last successful {what} provider: {provider:?}");
            return match call(provider.as_ref()).await? {
                Some(v) => Ok(Some(v)),
                None => Err(self.resolution_failed(
                    what,
                    chain,
                    &[format!("{provider:?}: no {what} found")],
                )),
            };
        }

        let mut failures = Vec::with_capacity(providers.len());
        for (idx, provider) in providers.iter().enumerate() {
            debug!("trying {what} provider: {provider:?}");

            match call(provider.as_ref()).await {
                Ok(Some(v)) => {
                    debug!("loaded {what} from provider: {provider:?}");
                    self.record(idx);
                    return Ok(Some(v));
                }
                Ok(None) => {
                    debug!("no {what} found in provider: {provider:?}");
                    failures.push(format!("{provider:?}: no {what} found"));
                }
                Err(e) => {
                    warn!("error loading {what} from provider {provider:?}: {e}");
                    failures.push(format!("{provider:?}: {e}"));
                }
            }
        }

        Err(self.resolution_failed(what, chain, &failures))
    }
}

/// A chain of credential providers that will be tried in order.
///
/// The first provider that returns a credential wins. Errors and empty results
/// from other providers are collected, and if every provider fails the chain
/// fails with a [`crate::ErrorKind::ResolutionFailed`] error listing them all.
///
/// With `reuse_last_provider` (the default), the provider that succeeded last
/// time is called directly on later calls and its result is returned as is.
/// Providers earlier in the chain are not consulted again, so a provider that
/// becomes available later is not picked up until the chain is reset. This
/// trade-off is intentional: it avoids a full chain walk for every request.
pub struct ProvideCredentialChain<C> {
    providers: Vec<Box<dyn ProvideCredential<Credential = C>>>,
    state: ChainState,
}

impl<C> ProvideCredentialChain<C>
where
    C: Send + Sync + Unpin + 'static,
{
    /// Create a new empty credential provider chain.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            state: ChainState::default(),
        }
    }

    /// Add a credential provider to the chain.
    pub fn push(mut self, provider: impl ProvideCredential<Credential = C>) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Create a credential provider chain from a vector of providers.
    pub fn from_vec(providers: Vec<Box<dyn ProvideCredential<Credential = C>>>) -> Self {
        Self {
            providers,
            state: ChainState::default(),
        }
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

    /// Forget the last successful provider so the next call walks the whole chain.
    pub fn reset(&self) {
        self.state.reset()
    }
}

impl<C> Default for ProvideCredentialChain<C>
where
    C: Send + Sync + Unpin + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Debug for ProvideCredentialChain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvideCredentialChain")
            .field("providers", &self.providers)
            .field("reuse_last_provider", &self.state.reuse_last_provider())
            .finish()
    }
}

#[async_trait]
impl<C> ProvideCredential for ProvideCredentialChain<C>
where
    C: Send + Sync + Unpin + 'static,
{
    type Credential = C;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.state
            .resolve("credential", self, &self.providers, |p| {
                p.provide_credential(ctx)
            })
            .await
    }
}
