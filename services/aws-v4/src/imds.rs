use std::sync::{Arc, Mutex, PoisonError};

use awsign_core::time::{now, DateTime};
use awsign_core::{Context, Error, Result};
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{Method, StatusCode};
use log::debug;

use crate::Config;

const TOKEN_PATH: &str = "/latest/api/token";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
// 21600s (6h) is recommended by AWS.
const TOKEN_TTL_SECONDS: i64 = 21600;
// Refresh the token 10 minutes before it expires.
const TOKEN_REFRESH_BUFFER_SECONDS: i64 = 600;

/// Client for the EC2 instance metadata service (IMDSv2).
///
/// The session token is shared by every clone of the client.
#[derive(Debug, Clone)]
pub(crate) struct ImdsClient {
    endpoint: Option<String>,
    token: Arc<Mutex<(String, DateTime)>>,
}

impl Default for ImdsClient {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: Arc::new(Mutex::new((String::new(), DateTime::default()))),
        }
    }
}

impl ImdsClient {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn endpoint(&self, config: &Config) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| config.ec2_metadata_endpoint.clone())
    }

    async fn token(&self, ctx: &Context, config: &Config) -> Result<String> {
        {
            let (token, expires_in) = self
                .token
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if expires_in > now() {
                return Ok(token);
            }
        }

        let url = format!("{}{TOKEN_PATH}", self.endpoint(config));
        debug!("fetching IMDS token from {url}");
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::PUT)
            .header(CONTENT_LENGTH, "0")
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS.to_string())
            .body(Bytes::new())
            .map_err(|e| {
                Error::request_invalid("failed to build IMDS token request")
                    .with_source(e)
                    .with_context(format!("url: {url}"))
            })?;

        let resp = ctx.http_send_as_string(req).await.map_err(|e| {
            Error::unexpected("failed to connect to IMDS")
                .with_source(e)
                .with_context(format!("url: {url}"))
                .with_context("hint: check if running on EC2 instance")
                .set_retryable(true)
        })?;
        if resp.status() != StatusCode::OK {
            return Err(imds_error("fetch_imds_token", resp.status(), resp.body()));
        }

        let token = resp.into_body();
        let expires_in = now() + chrono::TimeDelta::seconds(TOKEN_TTL_SECONDS)
            - chrono::TimeDelta::seconds(TOKEN_REFRESH_BUFFER_SECONDS);
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = (token.clone(), expires_in);

        Ok(token)
    }

    /// GET a metadata path and return its body.
    pub async fn get(&self, ctx: &Context, config: &Config, path: &str) -> Result<String> {
        let token = self.token(ctx, config).await?;

        let url = format!("{}{path}", self.endpoint(config));
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::GET)
            .header(TOKEN_HEADER, &token)
            .body(Bytes::new())
            .map_err(|e| {
                Error::request_invalid("failed to build IMDS request")
                    .with_source(e)
                    .with_context(format!("url: {url}"))
            })?;

        let resp = ctx.http_send_as_string(req).await.map_err(|e| {
            Error::unexpected("failed to send IMDS request")
                .with_source(e)
                .with_context(format!("path: {path}"))
                .set_retryable(true)
        })?;
        if resp.status() != StatusCode::OK {
            return Err(imds_error("get_metadata", resp.status(), resp.body())
                .with_context(format!("path: {path}")));
        }

        Ok(resp.into_body())
    }
}

fn imds_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let err = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::credential_denied(format!("IMDS rejected {operation}"))
        }
        StatusCode::NOT_FOUND => Error::config_invalid(format!("IMDS has no data for {operation}")),
        _ => Error::unexpected(format!("IMDS request {operation} failed"))
            .set_retryable(status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS),
    };

    err.with_context(format!("status: {status}"))
        .with_context(format!("body: {body}"))
}


#[cfg(test)]
mod tests {
    use super::mock::MockImds;
    use super::*;
    use awsign_core::ErrorKind;

    #[tokio::test]
    async fn test_imds_token_is_reused() -> anyhow::Result<()> {
        let mock = MockImds::default().route("/latest/meta-data/ami-id", StatusCode::OK, "ami-1");
        let ctx = Context::new().with_http_send(mock.clone());
        let client = ImdsClient::default();
        let config = Config::default();

        assert_eq!(client.get(&ctx, &config, "/latest/meta-data/ami-id").await?, "ami-1");
        assert_eq!(client.get(&ctx, &config, "/latest/meta-data/ami-id").await?, "ami-1");
        assert_eq!(mock.token_calls(), 1);
        assert_eq!(mock.get_calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_imds_server_error_is_retryable() {
        let mock = MockImds::default().route(
            "/latest/meta-data/ami-id",
            StatusCode::SERVICE_UNAVAILABLE,
            "busy",
        );
        let ctx = Context::new().with_http_send(mock);

        let err = ImdsClient::default()
            .get(&ctx, &Config::default(), "/latest/meta-data/ami-id")
            .await
            .expect_err("must fail");
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Unexpected);
    }

    #[tokio::test]
    async fn test_imds_unreachable_is_retryable() {
        // NoopHttpSend fails every request, which looks like a connection error.
        let err = ImdsClient::default()
            .with_endpoint("http://127.0.0.1:1")
            .get(&Context::new(), &Config::default(), "/latest/meta-data/ami-id")
            .await
            .expect_err("must fail");
        assert!(err.is_retryable());
    }
}
