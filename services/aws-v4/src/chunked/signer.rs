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

use std::fmt::{Debug, Formatter};

use awsign_core::hash::{hex_sha256, EMPTY_STRING_SHA256};
use awsign_core::time::{format_iso8601, DateTime};
use log::debug;

use super::Trailer;
use crate::constants::{
    AWS4_ECDSA_P256_SHA256_PAYLOAD, AWS4_ECDSA_P256_SHA256_TRAILER, AWS4_HMAC_SHA256_PAYLOAD,
    AWS4_HMAC_SHA256_TRAILER,
};
use crate::sign_request::{SigningKey, SigningOutput};
use crate::SigningAlgorithm;

/// Rolling signature over the chunks of a streamed payload.
///
/// Every signature covers the previous one, starting from the signature of
/// the request itself. Chunks must be signed in the order they are sent.
#[derive(Clone)]
pub struct RollingSigner {
    algorithm: SigningAlgorithm,
    key: SigningKey,
    time: DateTime,
    scope: String,
    prior: String,
}

impl Debug for RollingSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingSigner")
            .field("algorithm", &self.algorithm)
            .field("time", &self.time)
            .field("scope", &self.scope)
            .field("prior", &self.prior)
            .finish_non_exhaustive()
    }
}

impl RollingSigner {
    /// Create a SigV4 rolling signer from a derived signing key.
    pub fn new_v4(
        signing_key: Vec<u8>,
        time: DateTime,
        scope: impl Into<String>,
        seed_signature: impl Into<String>,
    ) -> Self {
        Self {
            algorithm: SigningAlgorithm::V4,
            key: SigningKey::Hmac(signing_key),
            time,
            scope: scope.into(),
            prior: seed_signature.into(),
        }
    }

    /// Create a SigV4a rolling signer from a derived ECDSA key.
    pub fn new_v4a(
        signing_key: p256::ecdsa::SigningKey,
        time: DateTime,
        scope: impl Into<String>,
        seed_signature: impl Into<String>,
    ) -> Self {
        Self {
            algorithm: SigningAlgorithm::V4a,
            key: SigningKey::Ecdsa(signing_key),
            time,
            scope: scope.into(),
            prior: seed_signature.into(),
        }
    }

    pub(crate) fn from_output(output: &SigningOutput) -> Self {
        Self {
            algorithm: output.algorithm,
            key: output.key.clone(),
            time: output.time,
            scope: output.scope.clone(),
            prior: output.signature.clone(),
        }
    }

    /// Algorithm of the signatures.
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Signature of the last signed chunk, or the seed.
    pub fn prior_signature(&self) -> &str {
        &self.prior
    }

    /// Sign the next chunk. An empty chunk is the final one.
    pub fn sign_chunk(&mut self, chunk: &[u8]) -> String {
        let prefix = match self.algorithm {
            SigningAlgorithm::V4 => AWS4_HMAC_SHA256_PAYLOAD,
            SigningAlgorithm::V4a => AWS4_ECDSA_P256_SHA256_PAYLOAD,
        };
        let string_to_sign = format!(
            "{prefix}\n{}\n{}\n{}\n{EMPTY_STRING_SHA256}\n{}",
            format_iso8601(self.time),
            self.scope,
            self.prior,
            hex_sha256(chunk)
        );
        self.advance(&string_to_sign)
    }

    /// Sign the trailing headers sent after the final chunk.
    pub fn sign_trailer(&mut self, trailers: &[Trailer]) -> String {
        let prefix = match self.algorithm {
            SigningAlgorithm::V4 => AWS4_HMAC_SHA256_TRAILER,
            SigningAlgorithm::V4a => AWS4_ECDSA_P256_SHA256_TRAILER,
        };
        let mut canonical = String::new();
        for trailer in trailers {
            canonical.push_str(trailer.name());
            canonical.push(':');
            canonical.push_str(&trailer.value());
            canonical.push('\n');
        }
        let string_to_sign = format!(
            "{prefix}\n{}\n{}\n{}\n{}",
            format_iso8601(self.time),
            self.scope,
            self.prior,
            hex_sha256(canonical.as_bytes())
        );
        self.advance(&string_to_sign)
    }

    fn advance(&mut self, string_to_sign: &str) -> String {
        debug!("calculated chunk string to sign: {string_to_sign}");
        let signature = self.key.sign(string_to_sign);
        self.prior.clone_from(&signature);
        signature
    }
}
