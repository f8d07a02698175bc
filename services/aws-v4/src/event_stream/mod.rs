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

//! Event stream framing and per-message signing.
//!
//! Requests with a `STREAMING-AWS4-HMAC-SHA256-EVENTS` payload send a
//! sequence of binary messages. Each message is wrapped into a signed
//! envelope whose signature chains to the previous one, starting from the
//! signature of the request:
//!
//! ```no_run
//! # async fn example(mut parts: http::request::Parts, cred: awsign_aws_v4::Credential) -> awsign_core::Result<()> {
//! use awsign_aws_v4::event_stream::{EventStreamSigner, Header, Message, SignedEventStream};
//! use awsign_aws_v4::{PayloadHash, RequestSigner};
//! use futures::{stream, StreamExt};
//!
//! parts.extensions.insert(PayloadHash::event_stream());
//! let output = RequestSigner::new("transcribe", "us-west-2")
//!     .sign_with_output(&mut parts, Some(&cred), None)?
//!     .expect("credential is not anonymous");
//!
//! let events = stream::iter([Ok::<_, awsign_core::Error>(
//!     Message::new(&b"audio"[..]).with_header(Header::new(":event-type", "AudioEvent")),
//! )]);
//! let mut body = SignedEventStream::new(events, EventStreamSigner::from_output(&output, &cred)?);
//! while let Some(frame) = body.next().await {
//!     let _frame = frame?;
//! }
//! # Ok(())
//! # }
//! ```

mod message;
pub use message::{Header, HeaderValue, Message, MessageDecoder};
mod signer;
pub use signer::EventStreamSigner;
mod stream;
pub use stream::SignedEventStream;
mod decode;
pub use decode::{check_message, DecodedEventStream, EventStreamError};
