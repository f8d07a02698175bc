use std::fmt::Write;

use awsign_core::{Error, Result};
use bytes::BytesMut;

use super::{ChunkedMode, RollingSigner, Trailer};
use crate::constants::X_AMZ_TRAILER_SIGNATURE;
use crate::Checksum;

/// Sans-IO aws-chunked encoder.
///
/// Callers feed chunks in body order and call [`ChunkEncoder::finish`] once
/// the body is exhausted. The body must be exactly as long as declared in
/// the prepared request.
#[derive(Debug)]
pub struct ChunkEncoder {
    mode: ChunkedMode,
    signer: Option<RollingSigner>,
    checksum: Option<Checksum>,
    trailers: Vec<Trailer>,
    decoded_length: u64,
    consumed: u64,
    finished: bool,
}

impl ChunkEncoder {
    pub(crate) fn new(
        mode: ChunkedMode,
        signer: Option<RollingSigner>,
        checksum: Option<Checksum>,
        trailers: Vec<Trailer>,
        decoded_length: u64,
    ) -> Self {
        Self {
            mode,
            signer,
            checksum,
            trailers,
            decoded_length,
            consumed: 0,
            finished: false,
        }
    }

    /// Whether the final chunk has been written.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes of the body consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Frame `chunk` into `out`. Empty chunks are skipped.
    pub fn encode_chunk(&mut self, chunk: &[u8], out: &mut BytesMut) -> Result<()> {
        if self.finished {
            return Err(Error::request_invalid("aws-chunked body is already finished"));
        }
        if chunk.is_empty() {
            return Ok(());
        }

        self.consumed += chunk.len() as u64;
        if self.consumed > self.decoded_length {
            self.finished = true;
            return Err(
                Error::request_invalid("body is longer than its declared content-length")
                    .with_context(format!("declared: {}", self.decoded_length)),
            );
        }
        if let Some(checksum) = self.checksum.as_mut() {
            checksum.update(chunk);
        }

        out.reserve(chunk.len() + self.mode.signature_len() + 32);
        write!(out, "{:x}", chunk.len())?;
        self.write_chunk_signature(chunk, out)?;
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Write the final chunk and the trailers.
    pub fn finish(&mut self, out: &mut BytesMut) -> Result<()> {
        if self.finished {
            return Err(Error::request_invalid("aws-chunked body is already finished"));
        }
        self.finished = true;
        if self.consumed != self.decoded_length {
            return Err(
                Error::request_invalid("body is shorter than its declared content-length")
                    .with_context(format!("declared: {}", self.decoded_length))
                    .with_context(format!("actual: {}", self.consumed)),
            );
        }

        out.extend_from_slice(b"0");
        self.write_chunk_signature(&[], out)?;
        out.extend_from_slice(b"\r\n");

        if self.mode.has_trailer() {
            let mut trailers = std::mem::take(&mut self.trailers);
            if let Some(checksum) = self.checksum.take() {
                let name = checksum.algorithm().header_name();
                trailers.push(Trailer::new(name, checksum.finalize_base64()));
            }
            for trailer in &trailers {
                write!(out, "{}:{}\r\n", trailer.name(), trailer.value())?;
            }
            if let Some(signer) = self.signer.as_mut() {
                let signature = signer.sign_trailer(&trailers);
                write!(out, "{X_AMZ_TRAILER_SIGNATURE}:")?;
                self.write_padded(&signature, out);
                out.extend_from_slice(b"\r\n");
            }
        }

        out.extend_from_slice(b"\r\n");
        Ok(())
    }

    fn write_chunk_signature(&mut self, chunk: &[u8], out: &mut BytesMut) -> Result<()> {
        let Some(signer) = self.signer.as_mut() else {
            return Ok(());
        };
        let signature = signer.sign_chunk(chunk);
        out.extend_from_slice(b";chunk-signature=");
        self.write_padded(&signature, out);
        Ok(())
    }

    /// DER signatures vary in length, so they are padded with `*`.
    fn write_padded(&self, signature: &str, out: &mut BytesMut) {
        out.extend_from_slice(signature.as_bytes());
        for _ in signature.len()..self.mode.signature_len() {
            out.extend_from_slice(b"*");
        }
    }
}
