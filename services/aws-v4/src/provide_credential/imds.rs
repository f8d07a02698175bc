use crate::imds::ImdsClient;
use crate::{Config, Credential};
use async_trait::async_trait;
use awsign_core::time::parse_rfc3339;
use awsign_core::{Context, Error, ProvideCredential, Result};
use log::debug;
use serde::Deserialize;

const SECURITY_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";

/// IMDSv2CredentialProvider loads the credential of the IAM role attached to
/// the current EC2 instance.
///
/// The provider is skipped when `AWS_EC2_METADATA_DISABLED` is `true`.
#[derive(Debug, Clone, Default)]
pub struct IMDSv2CredentialProvider {
    client: ImdsClient,
}

impl IMDSv2CredentialProvider {
    /// Create a new `IMDSv2CredentialProvider` instance.
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
impl ProvideCredential for IMDSv2CredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let config = Config::default().from_env(ctx);
        if config.ec2_metadata_disabled {
            debug!("IMDS is disabled, skip loading credential");
            return Ok(None);
        }

        // List all credentials that node has.
        let profile_name = self
            .client
            .get(ctx, &config, SECURITY_CREDENTIALS_PATH)
            .await?;
        let Some(profile_name) = profile_name.lines().next().filter(|v| !v.is_empty()) else {
            return Err(
                Error::config_invalid("no IAM role attached to EC2 instance")
                    .with_context("hint: attach an IAM role to your EC2 instance"),
            );
        };

        let content = self
            .client
            .get(
                ctx,
                &config,
                &format!("{SECURITY_CREDENTIALS_PATH}{profile_name}"),
            )
            .await
            .map_err(|e| e.with_context(format!("profile: {profile_name}")))?;

        let resp: Ec2MetadataIamSecurityCredentials =
            serde_json::from_str(&content).map_err(|e| {
                Error::unexpected("failed to parse IMDS credentials response")
                    .with_source(e)
                    .with_context(format!("profile: {profile_name}"))
            })?;

        match resp.code.as_str() {
            "Success" => {}
            "AssumeRoleUnauthorizedAccess" => {
                return Err(Error::credential_denied(format!(
                    "EC2 instance not authorized to assume role: {}",
                    resp.message
                ))
                .with_context(format!("profile: {profile_name}")));
            }
            code if code.contains("Expired") => {
                return Err(Error::credential_expired(format!(
                    "IMDS credentials expired: {}",
                    resp.message
                ))
                .with_context(format!("profile: {profile_name}")));
            }
            _ => {
                return Err(Error::unexpected(format!(
                    "IMDS returned error: [{}] {}",
                    resp.code, resp.message
                ))
                .with_context(format!("profile: {profile_name}")));
            }
        }

        Ok(Some(Credential {
            access_key_id: resp.access_key_id,
            secret_access_key: resp.secret_access_key,
            session_token: Some(resp.token),
            expires_in: Some(parse_rfc3339(&resp.expiration).map_err(|e| {
                e.with_context(format!("expiration_value: {}", resp.expiration))
            })?),
        }))
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Ec2MetadataIamSecurityCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: String,

    code: String,
    message: String,
}
