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

//! Running checksums over request bodies.
//!
//! [`ChecksumReader`] updates checksums as a consumer reads from it, and
//! [`ChecksumStream`] does the same for a stream of buffers. Neither alters
//! the bytes they pass on.

use std::fmt::{self, Debug, Display, Formatter};
use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{ready, Context, Poll};

use awsign_core::hash::base64_encode;
use awsign_core::{Error, Result};
use bytes::Bytes;
use futures::channel::oneshot;
use futures::Stream;
use pin_project_lite::pin_project;
use sha2::Digest;

/// Checksum algorithms supported by AWS for request payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    /// CRC-32 (IEEE 802.3).
    Crc32,
    /// CRC-32C (Castagnoli).
    Crc32c,
    /// CRC-64/NVME.
    Crc64Nvme,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
}

impl ChecksumAlgorithm {
    /// Name used in the `x-amz-sdk-checksum-algorithm` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crc32 => "CRC32",
            Self::Crc32c => "CRC32C",
            Self::Crc64Nvme => "CRC64NVME",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Header carrying the checksum, like `x-amz-checksum-crc32`.
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::Crc32 => "x-amz-checksum-crc32",
            Self::Crc32c => "x-amz-checksum-crc32c",
            Self::Crc64Nvme => "x-amz-checksum-crc64nvme",
            Self::Sha1 => "x-amz-checksum-sha1",
            Self::Sha256 => "x-amz-checksum-sha256",
        }
    }

    /// Length of the raw digest in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Crc32 | Self::Crc32c => 4,
            Self::Crc64Nvme => 8,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Length of the base64 encoded digest.
    pub fn encoded_len(&self) -> usize {
        self.digest_len().div_ceil(3) * 4
    }

    /// Start a new running checksum.
    pub fn checksum(&self) -> Checksum {
        Checksum::new(*self)
    }
}

impl Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CRC32" => Ok(Self::Crc32),
            "CRC32C" => Ok(Self::Crc32c),
            "CRC64NVME" => Ok(Self::Crc64Nvme),
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            _ => Err(Error::request_invalid(format!("unknown checksum algorithm: {s}"))),
        }
    }
}

enum State {
    Crc32(crc32fast::Hasher),
    Crc32c(u32),
    Crc64Nvme(crc64fast_nvme::Digest),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

/// A running checksum.
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    state: State,
}

impl Debug for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checksum")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Checksum {
    /// Start a new running checksum of `algorithm`.
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        let state = match algorithm {
            ChecksumAlgorithm::Crc32 => State::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Crc32c => State::Crc32c(0),
            ChecksumAlgorithm::Crc64Nvme => State::Crc64Nvme(crc64fast_nvme::Digest::new()),
            ChecksumAlgorithm::Sha1 => State::Sha1(sha1::Sha1::new()),
            ChecksumAlgorithm::Sha256 => State::Sha256(sha2::Sha256::new()),
        };
        Self { algorithm, state }
    }

    /// Algorithm of this checksum.
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Feed more data.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Crc32(h) => h.update(data),
            State::Crc32c(v) => *v = crc32c::crc32c_append(*v, data),
            State::Crc64Nvme(h) => h.write(data),
            State::Sha1(h) => h.update(data),
            State::Sha256(h) => h.update(data),
        }
    }

    /// Finalize into the raw big-endian digest.
    pub fn finalize(self) -> Vec<u8> {
        match self.state {
            State::Crc32(h) => h.finalize().to_be_bytes().to_vec(),
            State::Crc32c(v) => v.to_be_bytes().to_vec(),
            State::Crc64Nvme(h) => h.sum64().to_be_bytes().to_vec(),
            State::Sha1(h) => h.finalize().to_vec(),
            State::Sha256(h) => h.finalize().to_vec(),
        }
    }

    /// Finalize into the base64 encoded digest used in headers.
    pub fn finalize_base64(self) -> String {
        base64_encode(&self.finalize())
    }
}

/// A set of running checksums fed with the same bytes.
#[derive(Debug, Default)]
pub struct Checksums {
    checksums: Vec<Checksum>,
}

impl Checksums {
    /// Start running checksums for every algorithm.
    pub fn new(algorithms: &[ChecksumAlgorithm]) -> Self {
        Self {
            checksums: algorithms.iter().map(|a| a.checksum()).collect(),
        }
    }

    /// Feed more data to every checksum.
    pub fn update(&mut self, data: &[u8]) {
        for c in self.checksums.iter_mut() {
            c.update(data);
        }
    }

    /// Finalize every checksum.
    pub fn finalize(self) -> ComputedChecksums {
        ComputedChecksums(
            self.checksums
                .into_iter()
                .map(|c| (c.algorithm(), c.finalize_base64()))
                .collect(),
        )
    }
}

/// Finalized checksums, base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputedChecksums(Vec<(ChecksumAlgorithm, String)>);

impl ComputedChecksums {
    /// Value computed for `algorithm`.
    pub fn get(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        self.0
            .iter()
            .find(|(a, _)| *a == algorithm)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over `(algorithm, value)` pairs in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ChecksumAlgorithm, &str)> {
        self.0.iter().map(|(a, v)| (*a, v.as_str()))
    }
}

/// Updates checksums with every byte read through it.
#[derive(Debug)]
pub struct ChecksumReader<R> {
    inner: R,
    checksums: Checksums,
}

impl<R: Read> ChecksumReader<R> {
    /// Wrap `inner`.
    pub fn new(inner: R, algorithms: &[ChecksumAlgorithm]) -> Self {
        Self {
            inner,
            checksums: Checksums::new(algorithms),
        }
    }

    /// Finalize the checksums over everything read so far.
    pub fn finalize(self) -> ComputedChecksums {
        self.checksums.finalize()
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.checksums.update(&buf[..n]);
        Ok(n)
    }
}

pin_project! {
    /// Updates checksums with every buffer passing through it.
    ///
    /// The paired [`ChecksumFuture`] resolves once the stream ends, or fails
    /// if the stream yields an error or is dropped before it ends.
    pub struct ChecksumStream<S> {
        #[pin]
        inner: S,
        checksums: Option<Checksums>,
        tx: Option<oneshot::Sender<Result<ComputedChecksums>>>,
    }
}

impl<S> ChecksumStream<S> {
    /// Wrap `inner` and return the future of its checksums.
    pub fn new(inner: S, algorithms: &[ChecksumAlgorithm]) -> (Self, ChecksumFuture) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inner,
                checksums: Some(Checksums::new(algorithms)),
                tx: Some(tx),
            },
            ChecksumFuture { rx },
        )
    }
}

impl<S, E> Stream for ChecksumStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Display,
{
    type Item = std::result::Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let item = ready!(this.inner.poll_next(cx));
        match &item {
            Some(Ok(bs)) => {
                if let Some(c) = this.checksums.as_mut() {
                    c.update(bs);
                }
            }
            Some(Err(e)) => {
                this.checksums.take();
                if let Some(tx) = this.tx.take() {
                    let _ = tx.send(Err(Error::unexpected(format!(
                        "body stream failed before completion: {e}"
                    ))));
                }
            }
            None => {
                if let (Some(c), Some(tx)) = (this.checksums.take(), this.tx.take()) {
                    let _ = tx.send(Ok(c.finalize()));
                }
            }
        }
        Poll::Ready(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Resolves with the checksums of a [`ChecksumStream`].
#[derive(Debug)]
pub struct ChecksumFuture {
    rx: oneshot::Receiver<Result<ComputedChecksums>>,
}

impl Future for ChecksumFuture {
    type Output = Result<ComputedChecksums>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.rx).poll(cx)) {
            Ok(v) => Poll::Ready(v),
            Err(oneshot::Canceled) => Poll::Ready(Err(Error::unexpected(
                "body stream dropped before completion",
            ))),
        }
    }
}
