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

//! Error taxonomy for the RPC core.
//!
//! Every layer wraps the error of the layer below it rather than replacing
//! it: the outermost error carries a kind for programmatic handling and a
//! `source()` chain for diagnostics. Transport-level timeouts are
//! canonicalized to [`RpcError::RpcTimeout`] at the transport boundary so
//! that inner error kinds never leak to callers.
//!
//! # Retry policy
//!
//! Only some kinds are candidates for middleware-level retry:
//!
//! - [`RpcError::NoDestAddress`]: another instance may be pickable
//! - [`RpcError::GetConnection`]: dial or pool failure, often transient
//! - [`RpcError::RpcTimeout`]: the budget may be met on retry
//! - [`RpcError::Codec`] on the decode side: a torn read, not a bad request
//!
//! ACL rejections, bad call options, caller cancellation, and application
//! errors returned by the peer are terminal.

use std::fmt;
use std::io;
use thiserror::Error;

/// Boxed error used for cause chains.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which half of the codec produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecSide {
    /// Error raised while encoding an outgoing message.
    Encode,
    /// Error raised while decoding an incoming message.
    Decode,
}

impl fmt::Display for CodecSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecSide::Encode => write!(f, "encode"),
            CodecSide::Decode => write!(f, "decode"),
        }
    }
}

/// Errors produced by the RPC core.
///
/// Kinds compose with an optional underlying cause. Construction helpers
/// (`get_connection`, `bad_option`, …) are provided for the wrapping kinds.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The picker returned no instance, or the remote side has no address.
    #[error("no destination address available")]
    NoDestAddress,

    /// Service discovery failed to produce a usable result.
    #[error("service discovery failed: {source}")]
    ServiceDiscovery {
        /// The resolver's error.
        #[source]
        source: BoxError,
    },

    /// Dial or pool failure while acquiring a connection.
    #[error("get connection failed: {source}")]
    GetConnection {
        /// The dial or pool error.
        #[source]
        source: BoxError,
    },

    /// The encode-flush-read sequence exceeded its budget.
    #[error("rpc call timed out")]
    RpcTimeout {
        /// The transport error that was canonicalized, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Admission control rejected the call before any I/O happened.
    #[error("request forbidden by acl: {reason}")]
    Acl {
        /// Human-readable rejection reason from the reject hook.
        reason: String,
    },

    /// The caller's context was cancelled. Distinct from a timeout.
    #[error("call cancelled by caller")]
    Cancelled,

    /// A call option was malformed (bad host:port, unresolvable URL, ...).
    #[error("bad call option: {message}")]
    BadOption {
        /// What was wrong with the option.
        message: String,
        /// The underlying parse or resolve error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Connection-level failure after acquisition (reset, broken pipe).
    ///
    /// Like a failed acquisition this funnels back through the connection
    /// wrapper, which discards the connection.
    #[error("transport error: {source}")]
    Transport {
        /// The underlying I/O error.
        #[source]
        source: BoxError,
    },

    /// Encode or decode failure.
    #[error("codec {side} error: {source}")]
    Codec {
        /// Whether the error came from the encode or decode side.
        side: CodecSide,
        /// The codec's error.
        #[source]
        source: BoxError,
    },

    /// Application-level error returned by the peer.
    #[error("remote error: {message}")]
    Remote {
        /// The error message carried in the exception reply.
        message: String,
    },
}

impl RpcError {
    /// Wraps a dial or pool error.
    pub fn get_connection(source: impl Into<BoxError>) -> Self {
        RpcError::GetConnection {
            source: source.into(),
        }
    }

    /// Wraps a resolver error.
    pub fn service_discovery(source: impl Into<BoxError>) -> Self {
        RpcError::ServiceDiscovery {
            source: source.into(),
        }
    }

    /// A timeout with no interesting cause.
    pub fn timeout() -> Self {
        RpcError::RpcTimeout { source: None }
    }

    /// Canonicalizes a transport error into a timeout, keeping the cause.
    pub fn timeout_with(source: impl Into<BoxError>) -> Self {
        RpcError::RpcTimeout {
            source: Some(source.into()),
        }
    }

    /// A bad call option with a plain message.
    pub fn bad_option(message: impl Into<String>) -> Self {
        RpcError::BadOption {
            message: message.into(),
            source: None,
        }
    }

    /// A bad call option wrapping a lower-level error.
    pub fn bad_option_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        RpcError::BadOption {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Wraps a connection-level I/O error hit mid-call.
    pub fn transport(source: impl Into<BoxError>) -> Self {
        RpcError::Transport {
            source: source.into(),
        }
    }

    /// Wraps an encode-side codec error.
    pub fn encode(source: impl Into<BoxError>) -> Self {
        RpcError::Codec {
            side: CodecSide::Encode,
            source: source.into(),
        }
    }

    /// Wraps a decode-side codec error.
    pub fn decode(source: impl Into<BoxError>) -> Self {
        RpcError::Codec {
            side: CodecSide::Decode,
            source: source.into(),
        }
    }

    /// Returns `true` if a retry middleware may reasonably retry this error.
    ///
    /// See the module docs for the policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::NoDestAddress
            | RpcError::GetConnection { .. }
            | RpcError::Transport { .. }
            | RpcError::RpcTimeout { .. } => true,
            RpcError::Codec {
                side: CodecSide::Decode,
                ..
            } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is the canonical timeout kind.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::RpcTimeout { .. })
    }
}

/// Walks an error's source chain looking for an I/O timeout.
///
/// Used at the transport boundary to decide whether a codec-reported error
/// is really a deadline miss that must surface as [`RpcError::RpcTimeout`].
pub fn is_io_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cur {
        if let Some(ioe) = e.downcast_ref::<io::Error>() {
            if matches!(
                ioe.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        if e.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return true;
        }
        cur = e.source();
    }
    false
}
