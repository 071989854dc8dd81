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

use std::sync::Arc;

use strata_common::error::{Error, Result};
use strata_memory::{Cache, LruCache, LruCacheOptions};

const LRU_CACHE: &str = "lru_cache";

/// Build a cache from an option string.
///
/// The string is either bare options of an LRU cache, or options prefixed by a cache name, as in
/// `"lru_cache://capacity=64M;num_shard_bits=4"`. See [`LruCacheOptions`] for the option grammar.
///
/// An unknown cache name fails with [`ErrorKind::NotFound`](strata_common::error::ErrorKind::NotFound), malformed
/// options with [`ErrorKind::InvalidArgument`](strata_common::error::ErrorKind::InvalidArgument).
///
/// ```rust
/// use strata::{create_from_str, Cache};
///
/// let cache = create_from_str("lru_cache://capacity=1M;strict_capacity_limit=1").unwrap();
/// assert_eq!(cache.capacity(), 1 << 20);
/// assert!(cache.has_strict_capacity_limit());
///
/// let cache = create_from_str("4M").unwrap();
/// assert_eq!(cache.name(), "LRUCache");
/// ```
pub fn create_from_str(s: &str) -> Result<Arc<dyn Cache>> {
    let s = s.trim();
    let (name, options) = match s.split_once("://") {
        Some((name, options)) => (name.trim(), options),
        None => (LRU_CACHE, s),
    };
    match name {
        LRU_CACHE => {
            let options: LruCacheOptions = options.parse()?;
            let cache = LruCache::new(options)?;
            tracing::debug!(options = %s, "[strata]: cache created from string");
            Ok(Arc::new(cache))
        }
        _ => Err(Error::not_found("unknown cache").with_context("name", name)),
    }
}
