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

//! Canonical request, credential scope and string to sign shared by SigV4
//! and SigV4a.

use std::fmt::Write;

use awsign_core::hash::{hex_sha256, hmac_sha256};
use awsign_core::time::{format_date, format_iso8601, DateTime};
use awsign_core::{Error, Result, SigningRequest};
use http::HeaderMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode};

use crate::constants::{AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET, UNSIGNED_HEADERS};

/// How the path is turned into its canonical form.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathOptions {
    pub double_uri_encode: bool,
    pub normalize_path: bool,
}

/// Remove `.` and `..` segments and merge repeated slashes.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            v => segments.push(v),
        }
    }

    let mut normalized = String::with_capacity(path.len());
    normalized.push('/');
    normalized.push_str(&segments.join("/"));
    if path.ends_with('/') && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Build the canonical URI of `path`, the path as sent on the wire.
pub(crate) fn canonical_path(path: &str, opts: PathOptions) -> Result<String> {
    let path = if path.is_empty() { "/" } else { path };
    let path = if opts.normalize_path {
        normalize_path(path)
    } else {
        path.to_string()
    };

    // Segments are decoded one by one so an encoded `/` stays inside its segment.
    let mut encoded = String::with_capacity(path.len());
    for (i, seg) in path.split('/').enumerate() {
        if i > 0 {
            encoded.push('/');
        }
        let decoded = percent_decode_str(seg).decode_utf8().map_err(|e| {
            Error::request_invalid("request path is not valid utf-8").with_source(e)
        })?;
        encoded.extend(utf8_percent_encode(&decoded, &AWS_QUERY_ENCODE_SET));
    }

    if opts.double_uri_encode {
        Ok(utf8_percent_encode(&encoded, &AWS_URI_ENCODE_SET).to_string())
    } else {
        Ok(encoded)
    }
}

/// Percent encode every decoded query pair, then sort by name and value.
pub(crate) fn canonicalize_query(query: &mut Vec<(String, String)>) {
    *query = query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect();
    query.sort();
}

/// Names of the headers covered by the signature, sorted.
pub(crate) fn signed_header_names(headers: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = headers
        .keys()
        .map(|k| k.as_str())
        .filter(|k| !UNSIGNED_HEADERS.contains(k))
        .map(|k| k.to_string())
        .collect();
    names.sort_unstable();
    names
}

/// Build the canonical request.
///
/// The query must have been canonicalized already.
pub(crate) fn canonical_request(
    req: &SigningRequest,
    opts: PathOptions,
    signed_headers: &[String],
    payload_hash: &str,
) -> Result<String> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    writeln!(f, "{}", req.method)?;
    writeln!(f, "{}", canonical_path(&req.path, opts)?)?;
    writeln!(
        f,
        "{}",
        req.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    )?;

    for name in signed_headers {
        f.push_str(name);
        f.push(':');
        for (i, value) in req.headers.get_all(name.as_str()).iter().enumerate() {
            if i > 0 {
                f.push(',');
            }
            let value = SigningRequest::header_value_normalize(value)?;
            let value = std::str::from_utf8(value.as_bytes()).map_err(|e| {
                Error::request_invalid("header value is not valid utf-8")
                    .with_source(e)
                    .with_context(format!("header: {name}"))
            })?;
            f.push_str(value);
        }
        f.push('\n');
    }
    writeln!(f)?;
    writeln!(f, "{}", signed_headers.join(";"))?;
    write!(f, "{payload_hash}")?;

    Ok(f)
}

/// Scope of a SigV4 signature: `20220313/<region>/<service>/aws4_request`.
pub(crate) fn v4_scope(time: DateTime, region: &str, service: &str) -> String {
    format!("{}/{region}/{service}/aws4_request", format_date(time))
}

/// Scope of a SigV4a signature, which doesn't bind a region:
/// `20220313/<service>/aws4_request`.
pub(crate) fn v4a_scope(time: DateTime, service: &str) -> String {
    format!("{}/{service}/aws4_request", format_date(time))
}

/// StringToSign:
///
/// ```text
/// AWS4-HMAC-SHA256
/// 20220313T072004Z
/// 20220313/<region>/<service>/aws4_request
/// <hashed_canonical_request>
/// ```
pub(crate) fn string_to_sign(
    algorithm: &str,
    time: DateTime,
    scope: &str,
    canonical_request: &str,
) -> String {
    format!(
        "{algorithm}\n{}\n{scope}\n{}",
        format_iso8601(time),
        hex_sha256(canonical_request.as_bytes())
    )
}

/// Derive the SigV4 signing key for the scope.
pub(crate) fn generate_signing_key(
    secret: &str,
    time: DateTime,
    region: &str,
    service: &str,
) -> Vec<u8> {
    // Sign secret
    let secret = format!("AWS4{secret}");
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes());
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    // Sign request
    hmac_sha256(sign_service.as_slice(), "aws4_request".as_bytes())
}
