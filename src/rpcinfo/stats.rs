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

//! Stats hooks recorded around the client pipeline.

use crate::context::Context;
use parking_lot::Mutex;
use std::sync::Arc;

/// Lifecycle events recorded around a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsEvent {
    /// The call entered the client.
    RpcStart,
    /// The call left the client.
    RpcFinish,
    /// Connection acquisition started.
    ClientConnStart,
    /// Connection acquisition finished (see status).
    ClientConnFinish,
    /// Encode+flush started.
    WriteStart,
    /// Encode+flush finished.
    WriteFinish,
    /// Read+decode started.
    ReadStart,
    /// Read+decode finished.
    ReadFinish,
}

/// Status attached to a recorded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsStatus {
    /// Normal progress.
    Info,
    /// Something noteworthy but not fatal.
    Warn,
    /// The step failed.
    Error,
}

/// Sink for per-call stats events.
///
/// Implementations must be cheap: recording happens on the hot path of
/// every call.
pub trait StatsRecorder: Send + Sync {
    /// Records one event with a status and optional detail.
    fn record(&self, cx: &Context, event: StatsEvent, status: StatsStatus, detail: &str);
}

/// A recorder that drops everything.
#[derive(Debug, Default)]
pub struct NoopRecorder;

impl StatsRecorder for NoopRecorder {
    fn record(&self, _cx: &Context, _event: StatsEvent, _status: StatsStatus, _detail: &str) {}
}

/// A recorder that buffers events in memory. Intended for tests and
/// debugging sinks.
#[derive(Debug, Default)]
pub struct BufferingRecorder {
    events: Mutex<Vec<(StatsEvent, StatsStatus, String)>>,
}

impl BufferingRecorder {
    /// Creates an empty buffering recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events in order.
    pub fn events(&self) -> Vec<(StatsEvent, StatsStatus, String)> {
        self.events.lock().clone()
    }

    /// Number of times the given event was recorded.
    pub fn count(&self, event: StatsEvent) -> usize {
        self.events.lock().iter().filter(|(e, _, _)| *e == event).count()
    }
}

impl StatsRecorder for BufferingRecorder {
    fn record(&self, _cx: &Context, event: StatsEvent, status: StatsStatus, detail: &str) {
        self.events.lock().push((event, status, detail.to_string()));
    }
}

/// The stats handle carried by per-call state.
#[derive(Clone)]
pub struct RpcStats {
    recorder: Arc<dyn StatsRecorder>,
}

impl RpcStats {
    /// Wraps a recorder.
    pub fn new(recorder: Arc<dyn StatsRecorder>) -> Self {
        Self { recorder }
    }

    /// A stats handle that records nothing.
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopRecorder))
    }

    /// Records one event.
    pub fn record(&self, cx: &Context, event: StatsEvent, status: StatsStatus, detail: &str) {
        self.recorder.record(cx, event, status, detail);
    }
}

impl std::fmt::Debug for RpcStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcStats").finish_non_exhaustive()
    }
}
