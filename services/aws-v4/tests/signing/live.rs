use anyhow::Result;
use awsign_aws_v4::{Config, DefaultCredentialProvider, PayloadHash, RequestSigner};
use awsign_core::{Context, OsEnv, Signer};
use awsign_file_read_tokio::TokioFileRead;
use awsign_http_send_reqwest::ReqwestHttpSend;
use bytes::Bytes;
use http::{Request, StatusCode};
use log::{debug, warn};
use std::env;
use std::time::Duration;

/// Signs against a real S3 bucket when `AWSIGN_AWS_V4_TEST=on`.
///
/// Requires `AWSIGN_AWS_V4_URL` (bucket url) and credentials resolvable by
/// the default chain.
async fn init_live_test() -> Option<(Context, Signer<awsign_aws_v4::Credential>, String)> {
    let _ = env_logger::builder().is_test(true).try_init();

    if env::var("AWSIGN_AWS_V4_TEST").ok().as_deref() != Some("on") {
        return None;
    }

    let ctx = Context::new()
        .with_file_read(TokioFileRead)
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv);
    let config = Config::default().from_env(&ctx).load_profile(&ctx).await;
    let region = config.region.clone().unwrap_or_else(|| "us-east-1".to_string());
    let url = env::var("AWSIGN_AWS_V4_URL").expect("env AWSIGN_AWS_V4_URL must set");

    let signer = Signer::new(
        ctx.clone(),
        DefaultCredentialProvider::new(),
        RequestSigner::new("s3", &region),
    );
    Some((ctx, signer, url))
}

#[tokio::test]
async fn test_live_head_object() -> Result<()> {
    let Some((ctx, signer, url)) = init_live_test().await else {
        warn!("AWSIGN_AWS_V4_TEST is not set, skipped");
        return Ok(());
    };

    let mut parts = Request::head(format!("{url}/not_exist_file"))
        .body(())?
        .into_parts()
        .0;
    parts.extensions.insert(PayloadHash::empty());
    signer.sign(&mut parts, None).await?;
    debug!("signed request: {parts:?}");

    let resp = ctx
        .http_send(Request::from_parts(parts, Bytes::new()))
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_live_presigned_get_object() -> Result<()> {
    let Some((ctx, signer, url)) = init_live_test().await else {
        warn!("AWSIGN_AWS_V4_TEST is not set, skipped");
        return Ok(());
    };

    let mut parts = Request::get(format!("{url}/not_exist_file"))
        .body(())?
        .into_parts()
        .0;
    signer
        .sign(&mut parts, Some(Duration::from_secs(3600)))
        .await?;

    let resp = ctx
        .http_send(Request::from_parts(parts, Bytes::new()))
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}
