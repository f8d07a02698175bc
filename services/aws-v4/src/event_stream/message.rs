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

use awsign_core::time::{from_millis, DateTime};
use awsign_core::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Length of the prelude: total length, headers length and prelude crc.
const PRELUDE_LEN: usize = 12;
/// Prelude plus the trailing message crc.
const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + 4;
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

const TYPE_TRUE: u8 = 0;
const TYPE_FALSE: u8 = 1;
const TYPE_BYTE: u8 = 2;
const TYPE_INT16: u8 = 3;
const TYPE_INT32: u8 = 4;
const TYPE_INT64: u8 = 5;
const TYPE_BYTE_ARRAY: u8 = 6;
const TYPE_STRING: u8 = 7;
const TYPE_TIMESTAMP: u8 = 8;
const TYPE_UUID: u8 = 9;

/// Typed value of an event stream header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// Boolean, stored in the type byte.
    Bool(bool),
    /// Signed 8-bit integer.
    Byte(i8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Opaque bytes, up to 65535.
    ByteArray(Bytes),
    /// UTF-8 string, up to 65535 bytes.
    String(String),
    /// Milliseconds since epoch.
    Timestamp(DateTime),
    /// 16 bytes UUID.
    Uuid(u128),
}

impl HeaderValue {
    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::String(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::String(v)
    }
}

/// A header of an event stream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: HeaderValue,
}

impl Header {
    /// Create a new header.
    pub fn new(name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Name of the header.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the header.
    pub fn value(&self) -> &HeaderValue {
        &self.value
    }

    /// Append the wire form of this header to `out`.
    pub(crate) fn encode(&self, out: &mut BytesMut) -> Result<()> {
        let name = u8::try_from(self.name.len()).map_err(|_| {
            Error::request_invalid("event stream header name is longer than 255 bytes")
                .with_context(format!("header: {}", self.name))
        })?;
        out.put_u8(name);
        out.put_slice(self.name.as_bytes());

        match &self.value {
            HeaderValue::Bool(true) => out.put_u8(TYPE_TRUE),
            HeaderValue::Bool(false) => out.put_u8(TYPE_FALSE),
            HeaderValue::Byte(v) => {
                out.put_u8(TYPE_BYTE);
                out.put_i8(*v);
            }
            HeaderValue::Int16(v) => {
                out.put_u8(TYPE_INT16);
                out.put_i16(*v);
            }
            HeaderValue::Int32(v) => {
                out.put_u8(TYPE_INT32);
                out.put_i32(*v);
            }
            HeaderValue::Int64(v) => {
                out.put_u8(TYPE_INT64);
                out.put_i64(*v);
            }
            HeaderValue::ByteArray(v) => {
                out.put_u8(TYPE_BYTE_ARRAY);
                put_u16_prefixed(out, &self.name, v)?;
            }
            HeaderValue::String(v) => {
                out.put_u8(TYPE_STRING);
                put_u16_prefixed(out, &self.name, v.as_bytes())?;
            }
            HeaderValue::Timestamp(v) => {
                out.put_u8(TYPE_TIMESTAMP);
                out.put_i64(v.timestamp_millis());
            }
            HeaderValue::Uuid(v) => {
                out.put_u8(TYPE_UUID);
                out.put_u128(*v);
            }
        }
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        let name_len = read_u8(buf)? as usize;
        let name = read_bytes(buf, name_len)?;
        let name = String::from_utf8(name.to_vec())?;

        let value = match read_u8(buf)? {
            TYPE_TRUE => HeaderValue::Bool(true),
            TYPE_FALSE => HeaderValue::Bool(false),
            TYPE_BYTE => HeaderValue::Byte(read_bytes(buf, 1)?.get_i8()),
            TYPE_INT16 => HeaderValue::Int16(read_bytes(buf, 2)?.get_i16()),
            TYPE_INT32 => HeaderValue::Int32(read_bytes(buf, 4)?.get_i32()),
            TYPE_INT64 => HeaderValue::Int64(read_bytes(buf, 8)?.get_i64()),
            TYPE_BYTE_ARRAY => {
                let len = read_bytes(buf, 2)?.get_u16() as usize;
                HeaderValue::ByteArray(read_bytes(buf, len)?)
            }
            TYPE_STRING => {
                let len = read_bytes(buf, 2)?.get_u16() as usize;
                HeaderValue::String(String::from_utf8(read_bytes(buf, len)?.to_vec())?)
            }
            TYPE_TIMESTAMP => HeaderValue::Timestamp(from_millis(read_bytes(buf, 8)?.get_i64())?),
            TYPE_UUID => HeaderValue::Uuid(read_bytes(buf, 16)?.get_u128()),
            v => {
                return Err(invalid_message("unknown header value type")
                    .with_context(format!("header: {name}"))
                    .with_context(format!("type: {v}")))
            }
        };
        Ok(Header { name, value })
    }
}

fn put_u16_prefixed(out: &mut BytesMut, name: &str, v: &[u8]) -> Result<()> {
    let len = u16::try_from(v.len()).map_err(|_| {
        Error::request_invalid("event stream header value is longer than 65535 bytes")
            .with_context(format!("header: {name}"))
    })?;
    out.put_u16(len);
    out.put_slice(v);
    Ok(())
}

fn invalid_message(message: &str) -> Error {
    Error::unexpected(format!("invalid event stream message: {message}"))
}

fn read_u8(buf: &mut Bytes) -> Result<u8> {
    Ok(read_bytes(buf, 1)?.get_u8())
}

fn read_bytes(buf: &mut Bytes, n: usize) -> Result<Bytes> {
    if buf.remaining() < n {
        return Err(invalid_message("header is truncated"));
    }
    Ok(buf.split_to(n))
}

/// An event stream message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    headers: Vec<Header>,
    payload: Bytes,
}

impl Message {
    /// Create a message without headers.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            headers: Vec::new(),
            payload: payload.into(),
        }
    }

    /// Add a header. Headers are written in insertion order.
    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// All headers.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// First header named `name`.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| &h.value)
    }

    /// Payload of the message.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Append the wire form of this message to `out`.
    pub fn encode(&self, out: &mut BytesMut) -> Result<()> {
        let mut headers = BytesMut::new();
        for header in &self.headers {
            header.encode(&mut headers)?;
        }

        let total = MIN_MESSAGE_LEN + headers.len() + self.payload.len();
        if total > MAX_MESSAGE_LEN {
            return Err(Error::request_invalid("event stream message is too large")
                .with_context(format!("length: {total}")));
        }

        let start = out.len();
        out.reserve(total);
        out.put_u32(total as u32);
        out.put_u32(headers.len() as u32);
        let prelude_crc = crc32fast::hash(&out[start..]);
        out.put_u32(prelude_crc);
        out.put_slice(&headers);
        out.put_slice(&self.payload);
        let message_crc = crc32fast::hash(&out[start..]);
        out.put_u32(message_crc);
        Ok(())
    }

    /// Encode this message into a new buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        self.encode(&mut out)?;
        Ok(out.freeze())
    }

    /// Decode exactly one complete message.
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.len() < MIN_MESSAGE_LEN {
            return Err(invalid_message("message is shorter than its prelude"));
        }
        let total = (&buf[0..4]).get_u32() as usize;
        let headers_len = (&buf[4..8]).get_u32() as usize;
        let prelude_crc = (&buf[8..12]).get_u32();
        if crc32fast::hash(&buf[..8]) != prelude_crc {
            return Err(invalid_message("prelude crc mismatch"));
        }
        if total != buf.len() || headers_len > total - MIN_MESSAGE_LEN {
            return Err(invalid_message("message length mismatch")
                .with_context(format!("declared: {total}"))
                .with_context(format!("actual: {}", buf.len())));
        }
        let message_crc = (&buf[total - 4..]).get_u32();
        if crc32fast::hash(&buf[..total - 4]) != message_crc {
            return Err(invalid_message("message crc mismatch"));
        }

        buf.advance(PRELUDE_LEN);
        let mut headers_buf = buf.split_to(headers_len);
        let mut headers = Vec::new();
        while headers_buf.has_remaining() {
            headers.push(Header::decode(&mut headers_buf)?);
        }
        buf.truncate(buf.len() - 4);

        Ok(Message {
            headers,
            payload: buf,
        })
    }
}

/// Incremental decoder of a byte stream into messages.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buf: BytesMut,
}

impl MessageDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer more bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not decoded yet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next message, `None` if more bytes are needed.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        if self.buf.len() < PRELUDE_LEN {
            return Ok(None);
        }
        let total = (&self.buf[0..4]).get_u32() as usize;
        if !(MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN).contains(&total) {
            return Err(invalid_message("invalid message length")
                .with_context(format!("length: {total}")));
        }
        if self.buf.len() < total {
            return Ok(None);
        }
        Message::decode(self.buf.split_to(total).freeze()).map(Some)
    }
}
