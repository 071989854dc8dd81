// Copyright 2026 strata Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Debug;

use bytes::Bytes;
use futures::future::BoxFuture;
use strata_common::error::Result;

/// Serialized form of an entry returned by the secondary tier.
#[derive(Debug, Clone)]
pub struct SecondaryValue {
    /// Bytes to hand to the create callback of the entry helper.
    pub data: Bytes,
    /// Whether the secondary tier keeps its copy after the lookup.
    ///
    /// A kept entry is promoted with the secondary incompatible variant of its helper, so that it is not written back
    /// when the primary tier evicts it.
    pub kept: bool,
}

/// Result of a lookup in the secondary tier.
pub enum SecondaryLookup {
    /// The secondary tier does not hold the key.
    Miss,
    /// The bytes are available right away.
    Ready(SecondaryValue),
    /// The bytes are being fetched. The future resolves to `None` if the fetch finds nothing.
    ///
    /// Dropping the future abandons the fetch.
    Pending(BoxFuture<'static, Option<SecondaryValue>>),
}

impl Debug for SecondaryLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Miss => f.write_str("Miss"),
            Self::Ready(v) => f.debug_tuple("Ready").field(&v.data.len()).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// A pluggable store for serialized entries, queried on primary misses and fed with primary evictions.
///
/// Every operation is best-effort. Failed inserts are absorbed by the primary tier.
pub trait SecondaryCache: Send + Sync + Debug + 'static {
    /// Name of the implementation.
    fn name(&self) -> &str;

    /// Store the serialized form of an entry.
    fn insert(&self, key: &[u8], data: Bytes) -> Result<()>;

    /// Look up the serialized form of an entry.
    fn lookup(&self, key: &[u8]) -> SecondaryLookup;

    /// Forget an entry.
    fn erase(&self, key: &[u8]);

    /// Human readable options of the implementation.
    fn printable_options(&self) -> String {
        String::new()
    }
}
