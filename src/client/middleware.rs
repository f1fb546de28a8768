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

//! The endpoint function and its middleware decorators.

use crate::context::Context;
use crate::error::RpcError;
use crate::remote::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// A call as a function: `call(cx, req, resp) → result`.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Performs (or forwards) one call.
    async fn call(
        &self,
        cx: &mut Context,
        req: &mut Message,
        resp: &mut Message,
    ) -> Result<(), RpcError>;
}

/// Shared endpoint handle.
pub type BoxEndpoint = Arc<dyn Endpoint>;

/// A decorator over an endpoint.
pub trait Middleware: Send + Sync {
    /// Wraps `next`, returning the decorated endpoint.
    fn wrap(&self, next: BoxEndpoint) -> BoxEndpoint;
}

/// Builds a middleware per call, with access to the call context. This
/// allows context-scoped decorators (retry budgets, tracing spans).
pub type MiddlewareBuilder = Box<dyn Fn(&Context) -> Box<dyn Middleware> + Send + Sync>;

/// Folds the builders over `base`. The first builder becomes the
/// outermost decorator, so middlewares observe the call in list order.
pub fn chain(builders: &[MiddlewareBuilder], cx: &Context, base: BoxEndpoint) -> BoxEndpoint {
    let mut endpoint = base;
    for builder in builders.iter().rev() {
        endpoint = builder(cx).wrap(endpoint);
    }
    endpoint
}

/// Adapts a plain function into a [`Middleware`].
pub struct MiddlewareFn<F>(pub F);

impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(BoxEndpoint) -> BoxEndpoint + Send + Sync,
{
    fn wrap(&self, next: BoxEndpoint) -> BoxEndpoint {
        (self.0)(next)
    }
}
