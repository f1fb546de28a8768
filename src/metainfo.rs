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

//! Context-carried key/value metadata with single-hop propagation.
//!
//! Three classes of values travel with a call:
//!
//! - **transient**: set locally, forwarded across exactly one network hop
//! - **transient-upstream**: a transient value that has already crossed a
//!   hop; never forwarded again
//! - **persistent**: forwarded across every hop until removed
//!
//! The single-hop contract is enforced by [`MetaInfo::transfer_forward`]:
//! at the server→client boundary every transient value becomes
//! transient-upstream, and the previous transient-upstream values are
//! dropped. A key is therefore never transient and transient-upstream at
//! the same time.

use std::collections::HashMap;

/// The per-call metadata map carried on the [`Context`](crate::Context).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaInfo {
    transient: HashMap<String, String>,
    transient_upstream: HashMap<String, String>,
    persistent: HashMap<String, String>,
}

impl MetaInfo {
    /// Creates an empty metadata map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a transient value. It will cross the next network hop and no
    /// further.
    pub fn set_transient(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.transient.insert(key.into(), value.into());
    }

    /// Records a value received from upstream. It will not be forwarded.
    pub fn set_transient_upstream(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.transient_upstream.insert(key.into(), value.into());
    }

    /// Sets a persistent value, forwarded across every hop.
    pub fn set_persistent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.persistent.insert(key.into(), value.into());
    }

    /// Looks a key up, checking transient values first, then values that
    /// arrived from upstream.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.transient
            .get(key)
            .or_else(|| self.transient_upstream.get(key))
            .map(String::as_str)
    }

    /// Looks up a persistent value.
    pub fn get_persistent(&self, key: &str) -> Option<&str> {
        self.persistent.get(key).map(String::as_str)
    }

    /// Values that must be written to the wire on the next outbound hop:
    /// transient and persistent, never transient-upstream.
    pub fn transient_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.transient.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Persistent values to write on the next outbound hop.
    pub fn persistent_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.persistent
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Applies the server→client boundary transformation: transient values
    /// become transient-upstream and previous transient-upstream values are
    /// dropped. Must run after inbound metadata has been read.
    pub fn transfer_forward(&mut self) {
        self.transient_upstream = std::mem::take(&mut self.transient);
    }

    /// Clears every class of value.
    pub fn clear(&mut self) {
        self.transient.clear();
        self.transient_upstream.clear();
        self.persistent.clear();
    }

    #[cfg(test)]
    pub(crate) fn transient_len(&self) -> usize {
        self.transient.len()
    }

    #[cfg(test)]
    pub(crate) fn upstream_len(&self) -> usize {
        self.transient_upstream.len()
    }
}
