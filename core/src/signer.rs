use crate::{Context, ProvideCredential, Result, SignRequest, SigningCredential};
use log::debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Signer is the main struct used to sign the request.
///
/// It caches the last resolved credential and asks the provider again once
/// the cached one is no longer valid.
#[derive(Clone, Debug)]
pub struct Signer<K: SigningCredential> {
    ctx: Context,
    provider: Arc<dyn ProvideCredential<Credential = K>>,
    builder: Arc<dyn SignRequest<Credential = K>>,
    credential: Arc<Mutex<Option<K>>>,
}

impl<K: SigningCredential> Signer<K> {
    /// Create a new signer.
    pub fn new(
        ctx: Context,
        provider: impl ProvideCredential<Credential = K>,
        builder: impl SignRequest<Credential = K>,
    ) -> Self {
        Self {
            ctx,

            provider: Arc::new(provider),
            builder: Arc::new(builder),
            credential: Arc::new(Mutex::new(None)),
        }
    }

    /// Resolve the credential, reusing the cached one while it stays valid.
    pub async fn credential(&self) -> Result<Option<K>> {
        let cached = self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if cached.is_valid() {
            return Ok(cached);
        }

        debug!("cached credential is missing or invalid, resolving a new one");
        let resolved = self.provider.provide_credential(&self.ctx).await?;
        *self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = resolved.clone();
        Ok(resolved)
    }

    /// Signing request.
    pub async fn sign(
        &self,
        req: &mut http::request::Parts,
        expires_in: Option<Duration>,
    ) -> Result<()> {
        let credential = self.credential().await?;

        self.builder
            .sign_request(&self.ctx, req, credential.as_ref(), expires_in)
            .await
    }
}
