use crate::Credential;
use async_trait::async_trait;
use awsign_core::{Context, ProvideCredential, Result};

/// AnonymousCredentialProvider returns an anonymous credential.
///
/// Requests signed with it are passed through without any signature, which
/// is what public buckets and other unauthenticated endpoints expect.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousCredentialProvider;

impl AnonymousCredentialProvider {
    /// Create a new AnonymousCredentialProvider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideCredential for AnonymousCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
        Ok(Some(Credential::anonymous()))
    }
}
