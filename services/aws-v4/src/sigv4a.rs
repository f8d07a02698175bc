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

//! SigV4a: ECDSA P-256 signatures that are valid for a set of regions.

use std::fmt::{Debug, Formatter};
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use awsign_core::hash::hmac_sha256;
use awsign_core::time::DateTime;
use awsign_core::{Context, Error, Result, SignRequest};
use http::request::Parts;
use log::debug;
use lru::LruCache;
use p256::ecdsa::SigningKey as EcdsaKey;

use crate::constants::AWS4_ECDSA_P256_SHA256;
use crate::sign_request::{sign_parts, SigningOutput, SigningScheme, SigningSettings};
use crate::Credential;

/// Order of the P-256 curve minus two, big endian.
const N_MINUS_TWO: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xbc, 0xe6, 0xfa, 0xad, 0xa7, 0x17, 0x9e, 0x84, 0xf3, 0xb9, 0xca, 0xc2, 0xfc, 0x63, 0x25, 0x4f,
];

const KEY_CACHE_SIZE: usize = 16;

/// Derive the ECDSA key of a credential.
///
/// The secret seeds an HMAC based KDF in counter mode. Candidates larger than
/// `n - 2` are rejected and the counter moves on. An accepted candidate `c`
/// yields the private key `c + 1`.
pub(crate) fn derive_signing_key(access_key_id: &str, secret_access_key: &str) -> Result<EcdsaKey> {
    let input_key = format!("AWS4A{secret_access_key}");

    for counter in 1u8..=254 {
        let mut fixed_input = Vec::with_capacity(32 + access_key_id.len());
        fixed_input.extend_from_slice(&1u32.to_be_bytes());
        fixed_input.extend_from_slice(AWS4_ECDSA_P256_SHA256.as_bytes());
        fixed_input.push(0x00);
        fixed_input.extend_from_slice(access_key_id.as_bytes());
        fixed_input.push(counter);
        fixed_input.extend_from_slice(&256u32.to_be_bytes());

        let mut candidate = hmac_sha256(input_key.as_bytes(), &fixed_input);
        // Equal length slices compare as big endian integers.
        if candidate.as_slice() > N_MINUS_TWO.as_slice() {
            debug!("sigv4a key candidate {counter} rejected, trying next counter");
            continue;
        }

        for byte in candidate.iter_mut().rev() {
            let (v, overflow) = byte.overflowing_add(1);
            *byte = v;
            if !overflow {
                break;
            }
        }

        let bytes: [u8; 32] = candidate
            .as_slice()
            .try_into()
            .map_err(|_| Error::unexpected("sigv4a key candidate must be 32 bytes"))?;
        return EcdsaKey::from_bytes(&p256::FieldBytes::from(bytes)).map_err(|e| {
            Error::unexpected("derived sigv4a key is not a valid p256 scalar").with_source(e)
        });
    }

    Err(Error::credential_invalid(
        "unable to derive sigv4a signing key from credential",
    ))
}

/// RequestSigner that implement AWS SigV4a.
///
/// The signature is not bound to a single region: the scope leaves the
/// region out and the accepted regions are sent in `x-amz-region-set`
/// (for example `*` or `us-east-1,us-west-2`).
pub struct RequestSignerV4a {
    settings: SigningSettings,
    region_set: String,
    /// Derived keys by access key id, along with the secret they came from.
    keys: Mutex<LruCache<String, (String, EcdsaKey)>>,
}

impl Debug for RequestSignerV4a {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSignerV4a")
            .field("settings", &self.settings)
            .field("region_set", &self.region_set)
            .finish_non_exhaustive()
    }
}

impl RequestSignerV4a {
    /// Create a new SigV4a signer for `service` and a comma separated region set.
    pub fn new(service: &str, region_set: &str) -> Self {
        Self {
            settings: SigningSettings::new(service),
            region_set: region_set.to_string(),
            keys: Mutex::new(LruCache::new(
                NonZeroUsize::new(KEY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.settings.time = Some(time);
        self
    }

    /// Encode the path twice in the canonical request.
    pub fn with_double_uri_encode(mut self, enabled: bool) -> Self {
        self.settings.double_uri_encode = enabled;
        self
    }

    /// Remove `.`/`..` segments and repeated slashes from the canonical path.
    pub fn with_normalize_path(mut self, enabled: bool) -> Self {
        self.settings.normalize_path = enabled;
        self
    }

    /// Send the payload hash as `x-amz-content-sha256` when signing with headers.
    pub fn with_payload_checksum_header(mut self, enabled: bool) -> Self {
        self.settings.payload_checksum_header = enabled;
        self
    }

    fn signing_key(&self, cred: &Credential) -> Result<EcdsaKey> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((secret, key)) = keys.get(&cred.access_key_id) {
            if secret == &cred.secret_access_key {
                return Ok(key.clone());
            }
        }

        let key = derive_signing_key(&cred.access_key_id, &cred.secret_access_key)?;
        keys.put(
            cred.access_key_id.clone(),
            (cred.secret_access_key.clone(), key.clone()),
        );
        Ok(key)
    }

    /// Sign the request and return what was computed.
    ///
    /// Returns `None` without touching the request if there is no credential
    /// or the credential is anonymous.
    pub fn sign_with_output(
        &self,
        req: &mut Parts,
        credential: Option<&Credential>,
        expires_in: Option<Duration>,
    ) -> Result<Option<SigningOutput>> {
        let Some(cred) = credential.filter(|c| !c.is_anonymous()) else {
            return Ok(None);
        };

        let key = self.signing_key(cred)?;
        sign_parts(
            &self.settings,
            SigningScheme::V4a {
                region_set: &self.region_set,
                key: &key,
            },
            req,
            cred,
            expires_in,
        )
        .map(Some)
    }
}

#[async_trait]
impl SignRequest for RequestSignerV4a {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        credential: Option<&Self::Credential>,
        expires_in: Option<Duration>,
    ) -> Result<()> {
        self.sign_with_output(req, credential, expires_in)?;
        Ok(())
    }
}
