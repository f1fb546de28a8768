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

//! Per-call context: deadline, cancellation, and call-scoped metadata.
//!
//! A [`Context`] is threaded explicitly through every layer of a call. It
//! carries the caller's deadline, a clonable [`CancelToken`], the
//! [`MetaInfo`] hop metadata, and a small string-keyed value map used for
//! well-known keys such as [`CTX_KEY_METHOD`].
//!
//! Every suspension point in the core selects against the cancel token;
//! cancellation surfaces as [`RpcError::Cancelled`](crate::RpcError), which
//! is distinct from a timeout.

use crate::metainfo::MetaInfo;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

/// Context key under which the server-side pipeline publishes the peer's
/// method name after a successful read.
pub const CTX_KEY_METHOD: &str = "rpc.peer.method";

/// A clonable cancellation token.
///
/// Cancellation is level-triggered: once cancelled, every clone observes it
/// forever. Waiters parked in [`CancelToken::cancelled`] are woken.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token, waking all waiters.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            // Register before re-checking so a concurrent cancel is not lost.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Per-call context threaded through every layer.
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: CancelToken,
    meta: MetaInfo,
    values: HashMap<&'static str, String>,
}

impl Context {
    /// Creates an empty context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The caller's absolute deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cancellation token. Clone it to cancel the call from elsewhere.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The hop metadata map.
    pub fn metainfo(&self) -> &MetaInfo {
        &self.meta
    }

    /// Mutable access to the hop metadata map.
    pub fn metainfo_mut(&mut self) -> &mut MetaInfo {
        &mut self.meta
    }

    /// Publishes a well-known value on the context.
    pub fn set_value(&mut self, key: &'static str, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    /// Reads a well-known value.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_is_sticky() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        let clone = token.clone();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("no wait");
    }

    #[test]
    fn test_context_values() {
        let mut cx = Context::new();
        cx.set_value(CTX_KEY_METHOD, "Echo");
        assert_eq!(cx.value(CTX_KEY_METHOD), Some("Echo"));
        assert_eq!(cx.value("missing"), None);
    }
}
