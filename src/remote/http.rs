//
// Copyright 2026 the meshrpc Authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Helpers for HTTP-style framing and URL targets.
//!
//! The HTTP trans handlers live outside this crate; what lives here is the
//! head-line parsing they share and the [`HttpResolver`] used by the `url`
//! call option.

use crate::error::RpcError;
use crate::remote::buffer::ReaderBuffer;
use std::io;

fn malformed(detail: String) -> RpcError {
    RpcError::decode(io::Error::new(io::ErrorKind::InvalidData, detail))
}

/// Reads one CRLF-terminated line, consuming the terminator.
pub fn read_line(buf: &mut ReaderBuffer) -> Result<Vec<u8>, RpcError> {
    let readable = buf.readable_len();
    let data = buf.peek(readable)?;
    let idx = data
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or_else(|| malformed("missing CRLF line terminator".to_string()))?;
    let line = data[..idx].to_vec();
    buf.skip(idx + 2)?;
    Ok(line)
}

/// Skips header lines until the empty line, leaving the reader positioned
/// at the body.
pub fn skip_to_body(buf: &mut ReaderBuffer) -> Result<(), RpcError> {
    loop {
        let line = read_line(buf)?;
        if line.is_empty() {
            return Ok(());
        }
    }
}

/// Parses a response head line like `HTTP/1.1 200 OK` into
/// (major, minor, status code).
pub fn parse_http_response_head(head: &str) -> Result<(u8, u8, u16), RpcError> {
    let mut parts = head.split_whitespace();
    let version = parts
        .next()
        .ok_or_else(|| malformed(format!("empty response head '{}'", head)))?;
    let status = parts
        .next()
        .ok_or_else(|| malformed(format!("no status code in '{}'", head)))?;

    let rest = version
        .strip_prefix("HTTP/")
        .ok_or_else(|| malformed(format!("not an http head '{}'", head)))?;
    let (major, minor) = rest
        .split_once('.')
        .ok_or_else(|| malformed(format!("bad http version '{}'", version)))?;

    let major: u8 = major
        .parse()
        .map_err(|_| malformed(format!("bad major version in '{}'", version)))?;
    let minor: u8 = minor
        .parse()
        .map_err(|_| malformed(format!("bad minor version in '{}'", version)))?;
    let code: u16 = status
        .parse()
        .map_err(|_| malformed(format!("bad status code '{}'", status)))?;
    Ok((major, minor, code))
}

/// Resolves a URL into the host:port the `url` call option dials.
pub trait HttpResolver: Send + Sync {
    /// Resolves `url` to "host:port".
    fn resolve(&self, url: &str) -> Result<String, RpcError>;
}

/// Scheme-aware resolver: `http` defaults to port 80, `https` to 443.
#[derive(Debug, Default)]
pub struct DefaultHttpResolver;

impl HttpResolver for DefaultHttpResolver {
    fn resolve(&self, url: &str) -> Result<String, RpcError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| RpcError::bad_option(format!("no scheme in url '{}'", url)))?;
        let default_port = match scheme {
            "http" => 80u16,
            "https" => 443u16,
            other => {
                return Err(RpcError::bad_option(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        };
        let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
        if authority.is_empty() {
            return Err(RpcError::bad_option(format!("no host in url '{}'", url)));
        }
        match authority.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(format!("{}:{}", host, port))
            }
            Some(_) => Err(RpcError::bad_option(format!(
                "bad authority '{}' in url",
                authority
            ))),
            None => Ok(format!("{}:{}", authority, default_port)),
        }
    }
}
