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

//! The primary tier of strata.
//!
//! [`LruCache`] is a sharded, capacity bounded map from byte string keys to type erased objects. Entries are handed out
//! as reference counted [`Handle`]s, evicted by priority, and optionally offered to a [`SecondaryCache`] from which
//! they can be promoted back on a miss.

mod cache;
mod compressed;
mod error;
mod eviction;
mod handle;
mod helper;
mod options;
mod pipe;
mod promotion;
mod raw;
mod record;
mod secondary;
mod shard;
mod slab;
mod wrapper;

/// Utilities for tests.
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

/// A collection of the public types.
pub mod prelude;

pub use prelude::*;
