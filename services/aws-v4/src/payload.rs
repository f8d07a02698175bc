use std::fmt::Debug;
use std::io::{Cursor, Read};

use awsign_core::hash::{hex_sha256, EMPTY_STRING_SHA256};
use awsign_core::Result;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::constants::{STREAMING_AWS4_HMAC_SHA256_EVENTS, UNSIGNED_PAYLOAD};

/// PayloadHash is the hash of the request body that goes into the canonical
/// request.
///
/// Attach it to the request as an extension to override the hash the signer
/// would use otherwise:
///
/// 1. the `PayloadHash` extension
/// 2. the `x-amz-content-sha256` header
/// 3. `UNSIGNED-PAYLOAD`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHash(String);

impl PayloadHash {
    /// The body is not part of the signature.
    pub fn unsigned() -> Self {
        Self(UNSIGNED_PAYLOAD.to_string())
    }

    /// Hash of an empty body.
    pub fn empty() -> Self {
        Self(EMPTY_STRING_SHA256.to_string())
    }

    /// The body is a signed event stream.
    pub fn event_stream() -> Self {
        Self(STREAMING_AWS4_HMAC_SHA256_EVENTS.to_string())
    }

    /// Hash the given body.
    pub fn from_bytes(content: &[u8]) -> Self {
        Self(hex_sha256(content))
    }

    /// Use a hex encoded SHA-256 or a streaming sentinel computed elsewhere.
    pub fn precomputed(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Hash everything the reader yields.
    pub fn from_reader(mut r: impl Read) -> Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0; 8192];
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Hash a replayable body.
    pub fn from_provider(provider: &dyn ContentStreamProvider) -> Result<Self> {
        Self::from_reader(provider.new_stream()?)
    }

    /// Payload hash as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A body that can be read more than once.
///
/// Every call of [`ContentStreamProvider::new_stream`] must return a fresh
/// reader starting at the first byte, so a retried request sends the same
/// content again.
pub trait ContentStreamProvider: Debug + Send + Sync {
    /// Open a new reader over the whole body.
    fn new_stream(&self) -> Result<Box<dyn Read + Send>>;

    /// Length of the body if it is known upfront.
    fn content_length(&self) -> Option<u64> {
        None
    }
}

impl ContentStreamProvider for Bytes {
    fn new_stream(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.clone())))
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

/// Adapts a closure into a [`ContentStreamProvider`].
pub struct FnContentStreamProvider<F> {
    f: F,
    content_length: Option<u64>,
}

impl<F> FnContentStreamProvider<F>
where
    F: Fn() -> Result<Box<dyn Read + Send>> + Send + Sync,
{
    /// Create a provider that calls `f` to open the body.
    pub fn new(f: F, content_length: Option<u64>) -> Self {
        Self { f, content_length }
    }
}

impl<F> Debug for FnContentStreamProvider<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnContentStreamProvider")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl<F> ContentStreamProvider for FnContentStreamProvider<F>
where
    F: Fn() -> Result<Box<dyn Read + Send>> + Send + Sync,
{
    fn new_stream(&self) -> Result<Box<dyn Read + Send>> {
        (self.f)()
    }

    fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_hash() -> Result<()> {
        assert_eq!(PayloadHash::empty(), PayloadHash::from_bytes(b""));
        assert_eq!(PayloadHash::unsigned().as_str(), "UNSIGNED-PAYLOAD");

        let body = Bytes::from_static(br#"{"TableName": "foo"}"#);
        let expected = "a15c8292b1d12abbbbe4148605f7872fbdf645618fee5ab0e8072a7b34f155e2";
        assert_eq!(PayloadHash::from_bytes(&body).as_str(), expected);
        assert_eq!(PayloadHash::from_provider(&body)?.as_str(), expected);
        Ok(())
    }

    #[test]
    fn test_provider_replays_body() -> Result<()> {
        let provider = FnContentStreamProvider::new(
            || Ok(Box::new(Cursor::new(b"replayable".to_vec())) as Box<dyn Read + Send>),
            Some(10),
        );

        for _ in 0..2 {
            let mut s = String::new();
            provider.new_stream()?.read_to_string(&mut s)?;
            assert_eq!(s, "replayable");
        }
        assert_eq!(provider.content_length(), Some(10));
        Ok(())
    }
}
