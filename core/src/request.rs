use std::borrow::Cow;
use std::mem;
use std::str::FromStr;
use std::time::Duration;

use http::uri::Authority;
use http::uri::PathAndQuery;
use http::uri::Scheme;
use http::HeaderMap;
use http::HeaderValue;
use http::Method;
use http::Uri;

use crate::{Error, Result};

/// Signing context for request.
///
/// The uri and headers are moved out of the request while signing and moved
/// back by [`SigningRequest::apply`].
#[derive(Debug)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// HTTP scheme.
    pub scheme: Scheme,
    /// HTTP authority.
    pub authority: Authority,
    /// HTTP path, as sent on the wire (percent encoded).
    pub path: String,
    /// HTTP query parameters, decoded.
    pub query: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: HeaderMap,
}

impl SigningRequest {
    /// Build a signing context from http::request::Parts.
    pub fn build(parts: &mut http::request::Parts) -> Result<Self> {
        let uri = mem::take(&mut parts.uri).into_parts();
        let paq = uri
            .path_and_query
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(SigningRequest {
            method: parts.method.clone(),
            scheme: uri.scheme.unwrap_or(Scheme::HTTP),
            authority: uri.authority.ok_or_else(|| {
                Error::request_invalid("request without authority is invalid for signing")
            })?,
            path: paq.path().to_string(),
            query: paq
                .query()
                .map(|v| {
                    form_urlencoded::parse(v.as_bytes())
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect()
                })
                .unwrap_or_default(),

            // Take the headers out of the request to avoid copy.
            // We will return it back when apply the context.
            headers: mem::take(&mut parts.headers),
        })
    }

    /// Apply the signing context back to http::request::Parts.
    ///
    /// Query pairs are written as they are, callers must encode them first.
    pub fn apply(mut self, parts: &mut http::request::Parts) -> Result<()> {
        let query_size = self.query_size();

        mem::swap(&mut parts.headers, &mut self.headers);
        parts.method = self.method;
        parts.uri = {
            let mut uri_parts = mem::take(&mut parts.uri).into_parts();
            uri_parts.scheme = Some(self.scheme);
            uri_parts.authority = Some(self.authority);
            uri_parts.path_and_query = {
                let paq = if query_size == 0 {
                    self.path
                } else {
                    let mut s = self.path;
                    s.reserve(query_size + 1);

                    s.push('?');
                    for (i, (k, v)) in self.query.iter().enumerate() {
                        if i > 0 {
                            s.push('&');
                        }

                        s.push_str(k);
                        if !v.is_empty() {
                            s.push('=');
                            s.push_str(v);
                        }
                    }

                    s
                };

                Some(PathAndQuery::from_str(&paq)?)
            };
            Uri::from_parts(uri_parts)?
        };

        Ok(())
    }

    /// Get the path percent decoded.
    pub fn path_percent_decoded(&self) -> Cow<'_, str> {
        percent_encoding::percent_decode_str(&self.path).decode_utf8_lossy()
    }

    /// Get query size.
    #[inline]
    pub fn query_size(&self) -> usize {
        self.query
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum::<usize>()
    }

    /// Push a new query pair into query list.
    #[inline]
    pub fn query_push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Get header value by name as str.
    ///
    /// Returns `None` if header not found.
    pub fn header_get(&self, key: &str) -> Result<Option<&str>> {
        match self.headers.get(key) {
            Some(v) => Ok(Some(v.to_str()?)),
            None => Ok(None),
        }
    }

    /// Normalize header value: trim surrounding spaces and squash inner runs of spaces.
    pub fn header_value_normalize(v: &HeaderValue) -> Result<HeaderValue> {
        let bs = v.as_bytes();
        let mut out = Vec::with_capacity(bs.len());
        let mut last_space = false;
        for &b in bs.iter() {
            if b == b' ' || b == b'\t' {
                if !last_space && !out.is_empty() {
                    out.push(b' ');
                }
                last_space = true;
            } else {
                out.push(b);
                last_space = false;
            }
        }
        if out.last() == Some(&b' ') {
            out.pop();
        }

        let mut normalized = HeaderValue::from_bytes(&out)?;
        normalized.set_sensitive(v.is_sensitive());
        Ok(normalized)
    }

    /// Get header names as sorted vector.
    pub fn header_name_to_vec_sorted(&self) -> Vec<&str> {
        let mut h = self
            .headers
            .keys()
            .map(|k| k.as_str())
            .collect::<Vec<&str>>();
        h.sort_unstable();

        h
    }
}

/// SigningMethod is the method that used in signing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SigningMethod {
    /// Signing with header.
    Header,
    /// Signing with query.
    Query(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_apply() -> Result<()> {
        let (mut parts, _) = http::Request::builder()
            .method(Method::PUT)
            .uri("https://bucket.s3.amazonaws.com/a%20b?list-type=2&prefix=x%2Fy")
            .header("x-amz-meta-a", "1")
            .body(())?
            .into_parts();

        let mut req = SigningRequest::build(&mut parts)?;
        assert_eq!(req.path, "/a%20b");
        assert_eq!(req.path_percent_decoded(), "/a b");
        assert_eq!(
            req.query,
            vec![
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), "x/y".to_string())
            ]
        );
        assert!(parts.headers.is_empty());

        req.query = vec![("k".to_string(), "v".to_string())];
        req.apply(&mut parts)?;
        assert_eq!(
            parts.uri.to_string(),
            "https://bucket.s3.amazonaws.com/a%20b?k=v"
        );
        assert_eq!(parts.headers["x-amz-meta-a"], "1");
        Ok(())
    }

    #[test]
    fn test_build_without_authority() {
        let (mut parts, _) = http::Request::builder()
            .uri("/relative")
            .body(())
            .expect("request must be valid")
            .into_parts();

        let err = SigningRequest::build(&mut parts).expect_err("must fail");
        assert_eq!(err.kind(), crate::ErrorKind::RequestInvalid);
    }

    #[test]
    fn test_header_value_normalize() -> Result<()> {
        let cases = [
            ("  value  ", "value"),
            ("a   b  c", "a b c"),
            ("plain", "plain"),
            ("", ""),
        ];
        for (input, expected) in cases {
            let v = SigningRequest::header_value_normalize(&HeaderValue::from_static(input))?;
            assert_eq!(v, expected, "input: {input:?}");
        }
        Ok(())
    }
}
