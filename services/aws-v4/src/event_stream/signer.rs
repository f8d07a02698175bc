use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};

use awsign_core::hash::{hex_sha256, hmac_sha256};
use awsign_core::time::{format_date, format_iso8601, from_millis, now, DateTime};
use awsign_core::{Error, Result};
use bytes::{Bytes, BytesMut};
use log::debug;

use super::{Header, HeaderValue, Message};
use crate::canonical::{generate_signing_key, v4_scope};
use crate::constants::AWS4_HMAC_SHA256_PAYLOAD;
use crate::{Credential, SigningAlgorithm, SigningOutput};

const DATE_HEADER: &str = ":date";
const CHUNK_SIGNATURE_HEADER: &str = ":chunk-signature";

/// `:chunk-signature` goes last, everything else by name.
fn header_order(a: &Header, b: &Header) -> Ordering {
    match (a.name() == CHUNK_SIGNATURE_HEADER, b.name() == CHUNK_SIGNATURE_HEADER) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.name().cmp(b.name()),
    }
}

/// Signs event stream messages with a rolling signature.
///
/// Each message is wrapped into a new message whose payload is the encoded
/// original, carrying `:date` and `:chunk-signature` headers. The signature
/// chain starts at the signature of the request that opened the stream.
/// Every message is signed at the current time, so a long lived stream
/// derives a new key once the date changes.
pub struct EventStreamSigner {
    credential: Credential,
    region: String,
    service: String,
    prior: String,
    time: Option<DateTime>,
    key: Option<(String, Vec<u8>)>,
}

impl Debug for EventStreamSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamSigner")
            .field("credential", &self.credential)
            .field("region", &self.region)
            .field("service", &self.service)
            .field("prior", &self.prior)
            .finish_non_exhaustive()
    }
}

impl EventStreamSigner {
    /// Create a signer seeded by `seed_signature`.
    pub fn new(
        credential: Credential,
        region: &str,
        service: &str,
        seed_signature: impl Into<String>,
    ) -> Self {
        Self {
            credential,
            region: region.to_string(),
            service: service.to_string(),
            prior: seed_signature.into(),
            time: None,
            key: None,
        }
    }

    /// Create a signer seeded by a SigV4 request signature.
    pub fn from_output(output: &SigningOutput, credential: &Credential) -> Result<Self> {
        if output.algorithm() != SigningAlgorithm::V4 {
            return Err(Error::request_invalid(
                "event streams can only be signed with SigV4",
            ));
        }
        Ok(Self::new(
            credential.clone(),
            output.region(),
            output.service(),
            output.signature(),
        ))
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign messages.
    /// Only use this function for testing.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Signature of the last signed message, or the seed.
    pub fn prior_signature(&self) -> &str {
        &self.prior
    }

    /// Sign `message`.
    pub fn sign(&mut self, message: &Message) -> Result<Message> {
        self.sign_payload(message.to_bytes()?)
    }

    /// Sign the empty message that ends a stream.
    pub fn sign_empty(&mut self) -> Result<Message> {
        self.sign_payload(Bytes::new())
    }

    fn sign_payload(&mut self, payload: Bytes) -> Result<Message> {
        // `:date` has millisecond precision but the string to sign has seconds.
        let time = self.time.unwrap_or_else(now);
        let time = from_millis(time.timestamp() * 1000)?;

        let date_header = Header::new(DATE_HEADER, HeaderValue::Timestamp(time));
        let mut encoded_date = BytesMut::new();
        date_header.encode(&mut encoded_date)?;

        let scope = v4_scope(time, &self.region, &self.service);
        let string_to_sign = format!(
            "{AWS4_HMAC_SHA256_PAYLOAD}\n{}\n{scope}\n{}\n{}\n{}",
            format_iso8601(time),
            self.prior,
            hex_sha256(&encoded_date),
            hex_sha256(&payload)
        );
        debug!("calculated event string to sign: {string_to_sign}");

        let signature = hmac_sha256(self.signing_key(time), string_to_sign.as_bytes());
        self.prior = hex::encode(&signature);

        let mut headers = vec![
            Header::new(
                CHUNK_SIGNATURE_HEADER,
                HeaderValue::ByteArray(Bytes::from(signature)),
            ),
            date_header,
        ];
        headers.sort_by(header_order);

        Ok(headers
            .into_iter()
            .fold(Message::new(payload), |message, header| {
                message.with_header(header)
            }))
    }

    fn signing_key(&mut self, time: DateTime) -> &[u8] {
        let date = format_date(time);
        if self.key.as_ref().map(|(d, _)| d.as_str()) != Some(date.as_str()) {
            debug!("deriving event stream signing key for {date}");
            let key = generate_signing_key(
                &self.credential.secret_access_key,
                time,
                &self.region,
                &self.service,
            );
            self.key = Some((date, key));
        }
        self.key.as_ref().map(|(_, k)| k.as_slice()).unwrap_or_default()
    }
}
