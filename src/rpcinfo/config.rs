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

//! Per-call RPC configuration and the lock set protecting it.
//!
//! Call options pin individual fields at call level; [`ConfigLocks`]
//! records which ones. A locked field refuses later writes, so applying
//! client-level defaults after option application cannot clobber a value
//! the user pinned for this call.

use std::collections::HashSet;
use std::time::Duration;

/// How the two call halves interact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionMode {
    /// One request, one reply.
    PingPong,
    /// Fire-and-forget: no reply is read.
    Oneway,
    /// Bidirectional streaming (negotiated by the transport).
    Streaming,
}

/// Lock bits for the individual [`RpcConfig`] fields.
pub mod lock_bits {
    /// Locks the RPC timeout.
    pub const RPC_TIMEOUT: u32 = 1;
    /// Locks the connect timeout.
    pub const CONNECT_TIMEOUT: u32 = 1 << 1;
    /// Locks the read/write timeout.
    pub const READ_WRITE_TIMEOUT: u32 = 1 << 2;
    /// Locks the interaction mode.
    pub const INTERACTION_MODE: u32 = 1 << 3;
}

/// Per-call configuration.
///
/// `connect_timeout` bounds connection acquisition only; `rpc_timeout`
/// bounds the encode-flush-read sequence. `connect_timeout` may legitimately
/// be larger than `rpc_timeout`, so no ordering between the two is enforced.
/// A zero duration means "no limit".
#[derive(Clone, Debug)]
pub struct RpcConfig {
    rpc_timeout: Duration,
    connect_timeout: Duration,
    read_write_timeout: Duration,
    interaction_mode: InteractionMode,
    locked: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::ZERO,
            connect_timeout: Duration::from_millis(50),
            read_write_timeout: Duration::from_secs(5),
            interaction_mode: InteractionMode::PingPong,
            locked: 0,
        }
    }
}

impl RpcConfig {
    /// Creates a config with default values and nothing locked.
    pub fn new() -> Self {
        Self::default()
    }

    /// The budget for the encode-flush-read sequence. Zero means unlimited.
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// The budget for connection acquisition only.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// The per-operation socket read/write budget.
    pub fn read_write_timeout(&self) -> Duration {
        self.read_write_timeout
    }

    /// The interaction mode of this call.
    pub fn interaction_mode(&self) -> InteractionMode {
        self.interaction_mode
    }

    /// Sets the RPC timeout. Returns `false` without writing if the field
    /// is locked.
    pub fn set_rpc_timeout(&mut self, d: Duration) -> bool {
        if self.is_locked(lock_bits::RPC_TIMEOUT) {
            return false;
        }
        self.rpc_timeout = d;
        true
    }

    /// Sets the connect timeout. Returns `false` without writing if locked.
    pub fn set_connect_timeout(&mut self, d: Duration) -> bool {
        if self.is_locked(lock_bits::CONNECT_TIMEOUT) {
            return false;
        }
        self.connect_timeout = d;
        true
    }

    /// Sets the read/write timeout. Returns `false` without writing if
    /// locked.
    pub fn set_read_write_timeout(&mut self, d: Duration) -> bool {
        if self.is_locked(lock_bits::READ_WRITE_TIMEOUT) {
            return false;
        }
        self.read_write_timeout = d;
        true
    }

    /// Sets the interaction mode. Returns `false` without writing if locked.
    pub fn set_interaction_mode(&mut self, mode: InteractionMode) -> bool {
        if self.is_locked(lock_bits::INTERACTION_MODE) {
            return false;
        }
        self.interaction_mode = mode;
        true
    }

    /// Marks the given fields read-only.
    pub fn lock(&mut self, bits: u32) {
        self.locked |= bits;
    }

    /// Returns `true` if any of the given bits is locked.
    pub fn is_locked(&self, bits: u32) -> bool {
        self.locked & bits != 0
    }

    /// Clears values and locks back to defaults; used when the enclosing
    /// call state is recycled.
    pub fn zero(&mut self) {
        *self = Self::default();
    }
}

/// Records which config fields and remote tags were pinned at call level.
///
/// A set bit or tag means: the user pinned this at call level; do not
/// overwrite it from client defaults. [`ConfigLocks::merge`] is set-union.
#[derive(Clone, Debug, Default)]
pub struct ConfigLocks {
    /// Bitmask over [`lock_bits`].
    pub bits: u32,
    /// Remote tag keys pinned at call level.
    pub tags: HashSet<String>,
}

impl ConfigLocks {
    /// Creates an empty lock set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set-union with another lock set.
    pub fn merge(&mut self, other: &ConfigLocks) {
        self.bits |= other.bits;
        for tag in &other.tags {
            self.tags.insert(tag.clone());
        }
    }

    /// Clears the set, keeping allocation for reuse.
    pub fn zero(&mut self) {
        self.bits = 0;
        self.tags.clear();
    }

    /// Writes the locks back into authoritative storage: the config refuses
    /// further writes to locked fields, and the remote info refuses writes
    /// to locked tags.
    pub fn apply_locks(&self, cfg: &mut RpcConfig, svr: &mut super::remote::RemoteInfo) {
        cfg.lock(self.bits);
        for tag in &self.tags {
            svr.lock_tag(tag);
        }
    }
}
