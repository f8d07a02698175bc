//! AWS SigV4 and SigV4a request signing.
//!
//! This crate signs [`http::request::Parts`] for AWS services and resolves
//! the credentials and region used to do so.
//!
//! ## Signing
//!
//! - [`RequestSigner`] signs with SigV4 (HMAC-SHA256), in headers or as a
//!   presigned URL.
//! - [`RequestSignerV4a`] signs with SigV4a (ECDSA P-256) for a set of regions.
//! - [`AwsChunked`] frames a body as `aws-chunked` with per-chunk signatures
//!   and optional checksum trailers.
//! - [`event_stream`] signs event stream messages.
//!
//! ## Resolving
//!
//! - [`DefaultCredentialProvider`] tries the environment, the shared profile
//!   files and EC2 instance metadata in order.
//! - [`DefaultRegionProvider`] does the same for the region.
//!
//! ## Example
//!
//! ```no_run
//! use awsign_aws_v4::{DefaultCredentialProvider, RequestSigner};
//! use awsign_core::{Context, OsEnv, Result, Signer};
//! use awsign_file_read_tokio::TokioFileRead;
//! use awsign_http_send_reqwest::ReqwestHttpSend;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = Context::new()
//!         .with_file_read(TokioFileRead)
//!         .with_http_send(ReqwestHttpSend::default())
//!         .with_env(OsEnv);
//!     let signer = Signer::new(
//!         ctx,
//!         DefaultCredentialProvider::new(),
//!         RequestSigner::new("s3", "us-east-1"),
//!     );
//!
//!     let mut parts = http::Request::get("https://examplebucket.s3.amazonaws.com/test.txt")
//!         .body(())?
//!         .into_parts()
//!         .0;
//!     signer.sign(&mut parts, None).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod constants;

mod credential;
pub use credential::Credential;

mod config;
pub use config::Config;

mod imds;

mod provide_credential;
pub use provide_credential::*;

mod region;
pub use region::*;

mod payload;
pub use payload::{ContentStreamProvider, FnContentStreamProvider, PayloadHash};

mod checksum;
pub use checksum::{
    Checksum, ChecksumAlgorithm, ChecksumFuture, ChecksumReader, ChecksumStream, Checksums,
    ComputedChecksums,
};

mod canonical;

mod sign_request;
pub use sign_request::{RequestSigner, SigningAlgorithm, SigningOutput};

mod sigv4a;
pub use sigv4a::RequestSignerV4a;

mod chunked;
pub use chunked::{
    encoded_content_length, AwsChunked, AwsChunkedReader, AwsChunkedStream, ChunkEncoder,
    ChunkedMode, PreparedChunked, RollingSigner, Trailer, DEFAULT_CHUNK_SIZE,
};

pub mod event_stream;
