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

//! aws-chunked payloads.
//!
//! A body sent as `aws-chunked` is split into length prefixed chunks. In the
//! signed modes every chunk carries a signature that chains to the previous
//! one, seeded by the signature of the request. Trailer modes append headers
//! (usually a checksum of the body) after the final chunk.
//!
//! The request has to be prepared before it is signed, because preparing sets
//! the encoded `content-length` and the payload sentinel that the request
//! signature covers:
//!
//! ```no_run
//! # fn example(mut parts: http::request::Parts, body: bytes::Bytes, cred: awsign_aws_v4::Credential) -> awsign_core::Result<()> {
//! use awsign_aws_v4::{AwsChunked, ChecksumAlgorithm, ChunkedMode, RequestSigner};
//! use std::io::Read;
//!
//! let prepared = AwsChunked::new(ChunkedMode::SignedV4WithTrailer)
//!     .with_checksum(ChecksumAlgorithm::Crc32)
//!     .prepare(&mut parts)?;
//! let output = RequestSigner::new("s3", "us-east-1")
//!     .sign_with_output(&mut parts, Some(&cred), None)?;
//!
//! let mut encoded = Vec::new();
//! prepared
//!     .reader(body.as_ref(), output.map(|v| v.rolling_signer()))?
//!     .read_to_end(&mut encoded)?;
//! # Ok(())
//! # }
//! ```

mod signer;
pub use signer::RollingSigner;
mod encoder;
pub use encoder::ChunkEncoder;
mod stream;
pub use stream::AwsChunkedStream;
mod reader;
pub use reader::AwsChunkedReader;

use std::io::Read;

use awsign_core::{Error, Result};
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::request::Parts;
use http::HeaderValue;
use log::debug;

use crate::constants::{
    AWS_CHUNKED, STREAMING_AWS4_ECDSA_P256_SHA256_PAYLOAD,
    STREAMING_AWS4_ECDSA_P256_SHA256_PAYLOAD_TRAILER, STREAMING_AWS4_HMAC_SHA256_PAYLOAD,
    STREAMING_AWS4_HMAC_SHA256_PAYLOAD_TRAILER, STREAMING_UNSIGNED_PAYLOAD_TRAILER,
    X_AMZ_CONTENT_SHA_256, X_AMZ_DECODED_CONTENT_LENGTH, X_AMZ_TRAILER,
};
use crate::{ChecksumAlgorithm, ContentStreamProvider, PayloadHash, SigningAlgorithm};

/// Default size of a chunk, 128 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Length of `;chunk-signature=`.
const CHUNK_SIGNATURE_EXT_LEN: usize = 17;
/// Length of `x-amz-trailer-signature:`.
const TRAILER_SIGNATURE_NAME_LEN: usize = 24;

/// How an aws-chunked body is framed and signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkedMode {
    /// `STREAMING-AWS4-HMAC-SHA256-PAYLOAD`
    SignedV4,
    /// `STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER`
    SignedV4WithTrailer,
    /// `STREAMING-UNSIGNED-PAYLOAD-TRAILER`
    UnsignedWithTrailer,
    /// `STREAMING-AWS4-ECDSA-P256-SHA256-PAYLOAD`
    SignedV4a,
    /// `STREAMING-AWS4-ECDSA-P256-SHA256-PAYLOAD-TRAILER`
    SignedV4aWithTrailer,
}

impl ChunkedMode {
    /// Value of `x-amz-content-sha256` for this mode.
    pub fn payload_sentinel(&self) -> &'static str {
        match self {
            Self::SignedV4 => STREAMING_AWS4_HMAC_SHA256_PAYLOAD,
            Self::SignedV4WithTrailer => STREAMING_AWS4_HMAC_SHA256_PAYLOAD_TRAILER,
            Self::UnsignedWithTrailer => STREAMING_UNSIGNED_PAYLOAD_TRAILER,
            Self::SignedV4a => STREAMING_AWS4_ECDSA_P256_SHA256_PAYLOAD,
            Self::SignedV4aWithTrailer => STREAMING_AWS4_ECDSA_P256_SHA256_PAYLOAD_TRAILER,
        }
    }

    /// Algorithm of the chunk signatures, `None` when chunks are unsigned.
    pub fn algorithm(&self) -> Option<SigningAlgorithm> {
        match self {
            Self::SignedV4 | Self::SignedV4WithTrailer => Some(SigningAlgorithm::V4),
            Self::SignedV4a | Self::SignedV4aWithTrailer => Some(SigningAlgorithm::V4a),
            Self::UnsignedWithTrailer => None,
        }
    }

    /// Whether chunks carry signatures.
    pub fn is_signed(&self) -> bool {
        self.algorithm().is_some()
    }

    /// Whether headers are sent after the final chunk.
    pub fn has_trailer(&self) -> bool {
        matches!(
            self,
            Self::SignedV4WithTrailer | Self::UnsignedWithTrailer | Self::SignedV4aWithTrailer
        )
    }

    /// `content-encoding` announced for this mode.
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Self::SignedV4a | Self::SignedV4aWithTrailer => None,
            _ => Some(AWS_CHUNKED),
        }
    }

    /// Length of a signature on the wire. SigV4a signatures are padded.
    pub(crate) fn signature_len(&self) -> usize {
        match self.algorithm() {
            Some(SigningAlgorithm::V4) => 64,
            Some(SigningAlgorithm::V4a) => 144,
            None => 0,
        }
    }

    fn extension_len(&self) -> usize {
        match self.signature_len() {
            0 => 0,
            n => CHUNK_SIGNATURE_EXT_LEN + n,
        }
    }

    fn trailer_signature_len(&self) -> usize {
        if self.is_signed() && self.has_trailer() {
            TRAILER_SIGNATURE_NAME_LEN + self.signature_len() + 2
        } else {
            0
        }
    }
}

/// A header sent after the final chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    name: String,
    values: Vec<String>,
}

impl Trailer {
    /// Create a trailer. The name is lower cased.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            values: vec![value.into()],
        }
    }

    /// Add another value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Name of the trailer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All values.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Values joined by `,`.
    pub fn value(&self) -> String {
        self.values.join(",")
    }

    fn encoded_len(&self) -> usize {
        let values: usize = self.values.iter().map(|v| v.len()).sum();
        self.name.len() + 1 + values + self.values.len().saturating_sub(1) + 2
    }
}

fn hex_len(n: u64) -> u64 {
    if n == 0 {
        1
    } else {
        u64::from(64 - n.leading_zeros()).div_ceil(4)
    }
}

/// Length of the encoded body.
///
/// Mirrors the framing of [`ChunkEncoder`] exactly, so the result can be
/// sent as `content-length` before the body is produced.
pub fn encoded_content_length(
    mode: ChunkedMode,
    decoded_length: u64,
    chunk_size: usize,
    trailers: &[Trailer],
    checksum: Option<ChecksumAlgorithm>,
) -> u64 {
    let ext = mode.extension_len() as u64;
    let chunk_size = chunk_size.max(1) as u64;
    let chunk_len = |n: u64| hex_len(n) + ext + 2 + n + 2;

    let full = decoded_length / chunk_size;
    let rest = decoded_length % chunk_size;
    let mut length = full * chunk_len(chunk_size);
    if rest > 0 {
        length += chunk_len(rest);
    }
    // Final chunk.
    length += 1 + ext + 2;

    if mode.has_trailer() {
        length += trailers.iter().map(|t| t.encoded_len() as u64).sum::<u64>();
        if let Some(algorithm) = checksum {
            length += (algorithm.header_name().len() + 1 + algorithm.encoded_len() + 2) as u64;
        }
        length += mode.trailer_signature_len() as u64;
    }

    length + 2
}

/// Builder of aws-chunked uploads.
#[derive(Debug, Clone)]
pub struct AwsChunked {
    mode: ChunkedMode,
    chunk_size: usize,
    checksum: Option<ChecksumAlgorithm>,
}

impl AwsChunked {
    /// Create a builder for `mode` with the default chunk size.
    pub fn new(mode: ChunkedMode) -> Self {
        Self {
            mode,
            chunk_size: DEFAULT_CHUNK_SIZE,
            checksum: None,
        }
    }

    /// Set the size of every chunk but the last.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Compute a checksum of the body and send it as a trailer.
    ///
    /// Only valid for trailer modes.
    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(algorithm);
        self
    }

    /// Rewrite the request headers for an aws-chunked body.
    ///
    /// - `content-length` moves to `x-amz-decoded-content-length` and is
    ///   replaced by the encoded length.
    /// - `x-amz-content-sha256` is set to the sentinel of the mode.
    /// - headers listed in `x-amz-trailer` are moved into the trailers, and
    ///   the checksum header is appended to that list.
    pub fn prepare(&self, parts: &mut Parts) -> Result<PreparedChunked> {
        if self.chunk_size == 0 {
            return Err(Error::request_invalid("chunk size must be greater than 0"));
        }

        let declared = match parts.headers.get(X_AMZ_TRAILER) {
            Some(v) => v
                .to_str()?
                .split(',')
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .collect(),
            None => Vec::new(),
        };
        if !self.mode.has_trailer() && (self.checksum.is_some() || !declared.is_empty()) {
            return Err(Error::request_invalid("trailers require a trailer chunked mode")
                .with_context(format!("mode: {:?}", self.mode)));
        }

        let decoded_length: u64 = parts
            .headers
            .get(CONTENT_LENGTH)
            .ok_or_else(|| Error::request_invalid("aws-chunked body requires content-length"))?
            .to_str()?
            .parse()
            .map_err(|e| Error::request_invalid("content-length is not a number").with_source(e))?;

        let checksum_name = self.checksum.map(|v| v.header_name());
        let mut trailers = Vec::with_capacity(declared.len());
        for name in &declared {
            if Some(name.as_str()) == checksum_name {
                continue;
            }
            let mut values = parts.headers.get_all(name.as_str()).iter();
            let mut trailer = match values.next() {
                Some(v) => Trailer::new(name.as_str(), v.to_str()?),
                None => {
                    return Err(Error::request_invalid(
                        "header announced in x-amz-trailer is missing",
                    )
                    .with_context(format!("header: {name}")))
                }
            };
            for v in values {
                trailer = trailer.with_value(v.to_str()?);
            }
            parts.headers.remove(name.as_str());
            trailers.push(trailer);
        }

        let mut announced = declared;
        if let Some(name) = checksum_name {
            if !announced.iter().any(|v| v == name) {
                announced.push(name.to_string());
            }
        }
        if !announced.is_empty() {
            parts
                .headers
                .insert(X_AMZ_TRAILER, HeaderValue::try_from(announced.join(","))?);
        }

        let encoded_length = encoded_content_length(
            self.mode,
            decoded_length,
            self.chunk_size,
            &trailers,
            self.checksum,
        );
        debug!(
            "aws-chunked body: mode {:?}, decoded length {decoded_length}, encoded length {encoded_length}",
            self.mode
        );

        parts.headers.insert(CONTENT_LENGTH, encoded_length.into());
        parts
            .headers
            .insert(X_AMZ_DECODED_CONTENT_LENGTH, decoded_length.into());
        if let Some(encoding) = self.mode.content_encoding() {
            let value = match parts.headers.get(CONTENT_ENCODING) {
                Some(v) if !v.to_str()?.contains(AWS_CHUNKED) => {
                    format!("{AWS_CHUNKED},{}", v.to_str()?)
                }
                Some(v) => v.to_str()?.to_string(),
                None => encoding.to_string(),
            };
            parts
                .headers
                .insert(CONTENT_ENCODING, HeaderValue::try_from(value)?);
        }
        parts.headers.insert(
            X_AMZ_CONTENT_SHA_256,
            HeaderValue::from_static(self.mode.payload_sentinel()),
        );
        parts
            .extensions
            .insert(PayloadHash::precomputed(self.mode.payload_sentinel()));

        Ok(PreparedChunked {
            mode: self.mode,
            chunk_size: self.chunk_size,
            decoded_length,
            encoded_length,
            trailers,
            checksum: self.checksum,
        })
    }
}

/// A request prepared for an aws-chunked body.
///
/// Produces encoders once the request is signed.
#[derive(Debug, Clone)]
pub struct PreparedChunked {
    mode: ChunkedMode,
    chunk_size: usize,
    decoded_length: u64,
    encoded_length: u64,
    trailers: Vec<Trailer>,
    checksum: Option<ChecksumAlgorithm>,
}

impl PreparedChunked {
    /// Mode of the body.
    pub fn mode(&self) -> ChunkedMode {
        self.mode
    }

    /// Length of the body before encoding.
    pub fn decoded_length(&self) -> u64 {
        self.decoded_length
    }

    /// Length of the body after encoding.
    pub fn encoded_length(&self) -> u64 {
        self.encoded_length
    }

    /// Trailers moved out of the request headers.
    pub fn trailers(&self) -> &[Trailer] {
        &self.trailers
    }

    /// Create a sans-IO encoder.
    ///
    /// Signed modes need the rolling signer of the signed request.
    pub fn encoder(&self, signer: Option<RollingSigner>) -> Result<ChunkEncoder> {
        let signer = match (self.mode.algorithm(), signer) {
            (None, _) => None,
            (Some(expected), Some(signer)) if signer.algorithm() == expected => Some(signer),
            (Some(expected), Some(signer)) => {
                return Err(Error::request_invalid(
                    "rolling signer doesn't match the chunked mode",
                )
                .with_context(format!("expected: {expected:?}"))
                .with_context(format!("actual: {:?}", signer.algorithm())))
            }
            (Some(_), None) => {
                return Err(Error::request_invalid(
                    "signed chunked mode requires a signed request",
                ))
            }
        };

        Ok(ChunkEncoder::new(
            self.mode,
            signer,
            self.checksum.map(|v| v.checksum()),
            self.trailers.clone(),
            self.decoded_length,
        ))
    }

    /// Encode an async body.
    pub fn stream<S>(&self, body: S, signer: Option<RollingSigner>) -> Result<AwsChunkedStream<S>> {
        Ok(AwsChunkedStream::new(
            body,
            self.encoder(signer)?,
            self.chunk_size,
        ))
    }

    /// Encode a blocking body.
    pub fn reader<R: Read>(
        &self,
        body: R,
        signer: Option<RollingSigner>,
    ) -> Result<AwsChunkedReader<R>> {
        Ok(AwsChunkedReader::new(
            body,
            self.encoder(signer)?,
            self.chunk_size,
        ))
    }

    /// Encode a fresh stream of a replayable body.
    ///
    /// Retries call this again with a new rolling signer.
    pub fn reader_from_provider(
        &self,
        provider: &dyn ContentStreamProvider,
        signer: Option<RollingSigner>,
    ) -> Result<AwsChunkedReader<Box<dyn Read + Send>>> {
        self.reader(provider.new_stream()?, signer)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use proptest::prelude::*;
    use test_case::test_case;

    fn parts(content_length: Option<u64>) -> Parts {
        let mut builder = Request::put("https://bucket.s3.amazonaws.com/key");
        if let Some(v) = content_length {
            builder = builder.header(CONTENT_LENGTH, v);
        }
        builder.body(()).expect("request must be valid").into_parts().0
    }

    #[test_case(ChunkedMode::SignedV4, 20, 4, None => 536; "signed")]
    #[test_case(ChunkedMode::SignedV4WithTrailer, 20, 4, Some(ChecksumAlgorithm::Crc32) => 657; "signed with checksum")]
    #[test_case(ChunkedMode::SignedV4, 20, 7, None => 364; "signed with partial chunk")]
    #[test_case(ChunkedMode::SignedV4WithTrailer, 20, 7, Some(ChecksumAlgorithm::Crc32) => 485; "partial chunk with checksum")]
    #[test_case(ChunkedMode::SignedV4, 0, 4, None => 86; "empty body")]
    #[test_case(ChunkedMode::SignedV4WithTrailer, 300000, DEFAULT_CHUNK_SIZE, Some(ChecksumAlgorithm::Crc32) => 300476; "default chunk size")]
    #[test_case(ChunkedMode::UnsignedWithTrailer, 20, 4, Some(ChecksumAlgorithm::Crc32) => 5 * 9 + 3 + 31 + 2; "unsigned")]
    fn test_encoded_content_length(
        mode: ChunkedMode,
        decoded: u64,
        chunk_size: usize,
        checksum: Option<ChecksumAlgorithm>,
    ) -> u64 {
        encoded_content_length(mode, decoded, chunk_size, &[], checksum)
    }

    #[test]
    fn test_prepare_rewrites_headers() -> Result<()> {
        let mut req = parts(Some(20));
        let prepared = AwsChunked::new(ChunkedMode::SignedV4WithTrailer)
            .with_chunk_size(4)
            .with_checksum(ChecksumAlgorithm::Crc32)
            .prepare(&mut req)?;

        assert_eq!(prepared.encoded_length(), 657);
        assert_eq!(req.headers[CONTENT_LENGTH], "657");
        assert_eq!(req.headers[X_AMZ_DECODED_CONTENT_LENGTH], "20");
        assert_eq!(req.headers[CONTENT_ENCODING], "aws-chunked");
        assert_eq!(req.headers[X_AMZ_TRAILER], "x-amz-checksum-crc32");
        assert_eq!(
            req.headers[X_AMZ_CONTENT_SHA_256],
            "STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER"
        );
        assert_eq!(
            req.extensions.get::<PayloadHash>().map(|v| v.as_str()),
            Some("STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER")
        );
        Ok(())
    }

    #[test]
    fn test_prepare_moves_announced_trailers() -> Result<()> {
        let mut req = parts(Some(20));
        req.headers
            .insert(X_AMZ_TRAILER, HeaderValue::from_static("x-amz-meta-tag"));
        req.headers
            .insert("x-amz-meta-tag", HeaderValue::from_static("blue"));
        req.headers
            .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        let prepared = AwsChunked::new(ChunkedMode::UnsignedWithTrailer)
            .with_checksum(ChecksumAlgorithm::Sha256)
            .prepare(&mut req)?;

        assert_eq!(prepared.trailers(), [Trailer::new("x-amz-meta-tag", "blue")]);
        assert!(req.headers.get("x-amz-meta-tag").is_none());
        assert_eq!(
            req.headers[X_AMZ_TRAILER],
            "x-amz-meta-tag,x-amz-checksum-sha256"
        );
        assert_eq!(req.headers[CONTENT_ENCODING], "aws-chunked,gzip");
        Ok(())
    }

    #[test]
    fn test_prepare_sigv4a_keeps_content_encoding() -> Result<()> {
        let mut req = parts(Some(20));
        AwsChunked::new(ChunkedMode::SignedV4a).prepare(&mut req)?;
        assert!(req.headers.get(CONTENT_ENCODING).is_none());
        assert_eq!(
            req.headers[X_AMZ_CONTENT_SHA_256],
            "STREAMING-AWS4-ECDSA-P256-SHA256-PAYLOAD"
        );
        Ok(())
    }

    #[test]
    fn test_prepare_invalid_requests() {
        let cases: Vec<(&str, AwsChunked, Parts)> = vec![
            (
                "missing content-length",
                AwsChunked::new(ChunkedMode::SignedV4),
                parts(None),
            ),
            (
                "zero chunk size",
                AwsChunked::new(ChunkedMode::SignedV4).with_chunk_size(0),
                parts(Some(1)),
            ),
            (
                "checksum without trailer",
                AwsChunked::new(ChunkedMode::SignedV4).with_checksum(ChecksumAlgorithm::Crc32),
                parts(Some(1)),
            ),
            ("missing announced header", AwsChunked::new(ChunkedMode::UnsignedWithTrailer), {
                let mut req = parts(Some(1));
                req.headers
                    .insert(X_AMZ_TRAILER, HeaderValue::from_static("x-amz-meta-missing"));
                req
            }),
        ];

        for (name, chunked, mut req) in cases {
            let err = chunked.prepare(&mut req).expect_err(name);
            assert_eq!(err.kind(), awsign_core::ErrorKind::RequestInvalid, "{name}");
        }
    }

    #[test]
    fn test_signed_mode_requires_signer() -> Result<()> {
        let prepared = AwsChunked::new(ChunkedMode::SignedV4).prepare(&mut parts(Some(1)))?;
        let err = prepared.encoder(None).expect_err("must fail");
        assert_eq!(err.kind(), awsign_core::ErrorKind::RequestInvalid);
        Ok(())
    }

    proptest! {
        #[test]
        fn test_encoded_length_matches_encoder(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            chunk_size in 1usize..600,
            with_trailer in any::<bool>(),
        ) {
            let (mode, checksum) = if with_trailer {
                (ChunkedMode::UnsignedWithTrailer, Some(ChecksumAlgorithm::Crc64Nvme))
            } else {
                (ChunkedMode::SignedV4, None)
            };
            let time = awsign_core::time::from_millis(0).expect("epoch must be valid");
            let signer = RollingSigner::new_v4(b"key".to_vec(), time, "scope", "seed");

            let mut encoder = ChunkEncoder::new(
                mode,
                mode.is_signed().then_some(signer),
                checksum.map(|v| v.checksum()),
                Vec::new(),
                data.len() as u64,
            );
            let mut out = bytes::BytesMut::new();
            for chunk in data.chunks(chunk_size) {
                encoder.encode_chunk(chunk, &mut out).expect("chunk must encode");
            }
            encoder.finish(&mut out).expect("body must finish");

            prop_assert_eq!(
                out.len() as u64,
                encoded_content_length(mode, data.len() as u64, chunk_size, &[], checksum)
            );
            let (payload, _, _) = test_util::decode_body(&out);
            prop_assert_eq!(payload, data);
        }
    }
}
