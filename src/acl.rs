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

//! Admission control middleware.
//!
//! Each reject hook inspects the outgoing request; the first hook that
//! returns a reason short-circuits the call with [`RpcError::Acl`] before
//! the inner endpoint runs. With no hooks the middleware is a no-op.

use crate::client::middleware::{BoxEndpoint, Endpoint, Middleware};
use crate::context::Context;
use crate::error::RpcError;
use crate::remote::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// A hook deciding whether a request may proceed. `Some(reason)` rejects.
pub type RejectFunc = Arc<dyn Fn(&Context, &Message) -> Option<String> + Send + Sync>;

/// Builds the admission middleware over a list of reject hooks.
pub struct AclMiddleware {
    rejects: Vec<RejectFunc>,
}

impl AclMiddleware {
    /// Wraps the given reject hooks.
    pub fn new(rejects: Vec<RejectFunc>) -> Self {
        Self { rejects }
    }
}

impl Middleware for AclMiddleware {
    fn wrap(&self, next: BoxEndpoint) -> BoxEndpoint {
        Arc::new(AclEndpoint {
            rejects: self.rejects.clone(),
            next,
        })
    }
}

struct AclEndpoint {
    rejects: Vec<RejectFunc>,
    next: BoxEndpoint,
}

#[async_trait]
impl Endpoint for AclEndpoint {
    async fn call(
        &self,
        cx: &mut Context,
        req: &mut Message,
        resp: &mut Message,
    ) -> Result<(), RpcError> {
        for reject in &self.rejects {
            if let Some(reason) = reject(cx, req) {
                return Err(RpcError::Acl { reason });
            }
        }
        self.next.call(cx, req, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingInner {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Endpoint for FailingInner {
        async fn call(
            &self,
            _cx: &mut Context,
            _req: &mut Message,
            _resp: &mut Message,
        ) -> Result<(), RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::Remote {
                message: "fake error".to_string(),
            })
        }
    }

    fn run(
        rejects: Vec<RejectFunc>,
    ) -> (BoxEndpoint, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(FailingInner {
            calls: calls.clone(),
        });
        (AclMiddleware::new(rejects).wrap(inner), calls)
    }

    #[tokio::test]
    async fn test_empty_list_is_noop() {
        let (endpoint, calls) = run(vec![]);
        let mut cx = Context::new();
        let mut req = Message::new_call("m");
        let mut resp = Message::new_reply();

        let err = endpoint.call(&mut cx, &mut req, &mut resp).await.unwrap_err();
        // Inner errors pass through untouched.
        assert!(matches!(err, RpcError::Remote { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_passing_hook_forwards() {
        let pass: RejectFunc = Arc::new(|_cx, _req| None);
        let (endpoint, calls) = run(vec![pass]);
        let mut cx = Context::new();
        let mut req = Message::new_call("m");
        let mut resp = Message::new_reply();

        let err = endpoint.call(&mut cx, &mut req, &mut resp).await.unwrap_err();
        assert!(matches!(err, RpcError::Remote { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejecting_hook_short_circuits() {
        let reject: RejectFunc = Arc::new(|_cx, _req| Some("you shall not pass".to_string()));
        let (endpoint, calls) = run(vec![reject]);
        let mut cx = Context::new();
        let mut req = Message::new_call("m");
        let mut resp = Message::new_reply();

        let err = endpoint.call(&mut cx, &mut req, &mut resp).await.unwrap_err();
        match err {
            RpcError::Acl { reason } => assert_eq!(reason, "you shall not pass"),
            other => panic!("expected Acl, got {:?}", other),
        }
        // The inner endpoint must not have been invoked.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
