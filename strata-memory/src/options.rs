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

use std::{str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use strata_common::{
    allocator::MemoryAllocator,
    error::{Error, ErrorKind, Result},
    spawn::Spawner,
};

use crate::{raw::LruCache, secondary::SecondaryCache};

/// Shards are kept at least this large when the shard count is chosen automatically.
const MIN_AUTO_SHARD_CAPACITY: usize = 512 * 1024;
/// Upper bound of automatically chosen shard bits.
const MAX_AUTO_SHARD_BITS: u8 = 6;
/// Shard bits must stay below this bound.
pub const MAX_SHARD_BITS: u8 = 20;

/// When entries are offered to the secondary tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OfferPolicy {
    /// Offer entries evicted for capacity reasons, and objects rejected by the strict capacity limit.
    #[default]
    OnEviction,
    /// Offer every inserted object at insertion, whatever the outcome of the insertion. Evictions are not offered.
    OnInsert,
}

/// Options of an [`LruCache`].
///
/// Only the plain fields are serialized. The allocator, the secondary tier and the spawner must be set in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LruCacheOptions {
    /// Total capacity, in charge units.
    pub capacity: usize,
    /// The cache is split into `2^num_shard_bits` shards. Chosen from the capacity if `None`.
    pub num_shard_bits: Option<u8>,
    /// Reject inserts that cannot fit once every unreferenced entry is evicted.
    pub strict_capacity_limit: bool,
    /// Share of the capacity reserved for high priority entries.
    pub high_pri_pool_ratio: f64,
    /// Share of the capacity reserved for low priority entries. `0.0` means no limit.
    pub low_pri_pool_ratio: f64,
    /// Capacity of the queue of entries offered to the secondary tier. Offers beyond it are dropped.
    pub offer_queue_capacity: usize,
    /// When entries are offered to the secondary tier.
    pub offer_policy: OfferPolicy,
    /// Allocator handed to the entry callbacks.
    #[serde(skip)]
    pub memory_allocator: Option<Arc<dyn MemoryAllocator>>,
    /// The secondary tier.
    #[serde(skip)]
    pub secondary_cache: Option<Arc<dyn SecondaryCache>>,
    /// Runtime of the worker feeding the secondary tier.
    ///
    /// The current runtime is used if unset, or a dedicated one outside any runtime.
    #[serde(skip)]
    pub spawner: Option<Spawner>,
}

impl Default for LruCacheOptions {
    fn default() -> Self {
        Self {
            capacity: 8 * 1024 * 1024,
            num_shard_bits: None,
            strict_capacity_limit: false,
            high_pri_pool_ratio: 0.5,
            low_pri_pool_ratio: 0.0,
            offer_queue_capacity: 1024,
            offer_policy: OfferPolicy::default(),
            memory_allocator: None,
            secondary_cache: None,
            spawner: None,
        }
    }
}

impl LruCacheOptions {
    /// Default options with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Check the options.
    pub fn validate(&self) -> Result<()> {
        if let Some(bits) = self.num_shard_bits {
            if bits >= MAX_SHARD_BITS {
                return Err(Error::invalid_argument("too many shard bits")
                    .with_context("num_shard_bits", bits)
                    .with_context("max", MAX_SHARD_BITS - 1));
            }
        }
        for (name, ratio) in [
            ("high_pri_pool_ratio", self.high_pri_pool_ratio),
            ("low_pri_pool_ratio", self.low_pri_pool_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::invalid_argument("pool ratio out of [0, 1]").with_context(name, ratio));
            }
        }
        if self.high_pri_pool_ratio + self.low_pri_pool_ratio > 1.0 {
            return Err(Error::invalid_argument("pool ratios add up to more than 1")
                .with_context("high_pri_pool_ratio", self.high_pri_pool_ratio)
                .with_context("low_pri_pool_ratio", self.low_pri_pool_ratio));
        }
        Ok(())
    }

    /// Shard bits in effect, choosing them from the capacity if unset.
    pub fn shard_bits(&self) -> u8 {
        self.num_shard_bits
            .unwrap_or_else(|| Self::default_shard_bits(self.capacity))
    }

    fn default_shard_bits(capacity: usize) -> u8 {
        let mut shards = capacity / MIN_AUTO_SHARD_CAPACITY;
        let mut bits = 0;
        while shards > 1 && bits < MAX_AUTO_SHARD_BITS {
            shards >>= 1;
            bits += 1;
        }
        bits
    }
}

/// Parses an option string.
///
/// Either a plain capacity such as `"64M"`, or `;` separated `key=value` pairs with the keys `capacity`,
/// `num_shard_bits`, `strict_capacity_limit`, `high_pri_pool_ratio` and `low_pri_pool_ratio`.
///
/// ```rust
/// # use strata_memory::LruCacheOptions;
/// let options: LruCacheOptions = "capacity=1M;num_shard_bits=2;strict_capacity_limit=true".parse().unwrap();
/// assert_eq!(options.capacity, 1 << 20);
/// assert_eq!(options.num_shard_bits, Some(2));
/// assert!(options.strict_capacity_limit);
///
/// let options: LruCacheOptions = "16K".parse().unwrap();
/// assert_eq!(options.capacity, 16 << 10);
/// ```
impl FromStr for LruCacheOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::invalid_argument("empty cache options"));
        }

        let mut options = Self::default();
        if !s.contains('=') {
            options.capacity = parse_size(s)?;
            options.validate()?;
            return Ok(options);
        }

        for pair in s.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| {
                    Error::invalid_argument("malformed option, expect `key=value`").with_context("option", pair)
                })?;
            match key {
                "capacity" => options.capacity = parse_size(value)?,
                "num_shard_bits" => options.num_shard_bits = Some(parse_value(key, value)?),
                "strict_capacity_limit" => options.strict_capacity_limit = parse_bool(key, value)?,
                "high_pri_pool_ratio" => options.high_pri_pool_ratio = parse_value(key, value)?,
                "low_pri_pool_ratio" => options.low_pri_pool_ratio = parse_value(key, value)?,
                _ => return Err(Error::invalid_argument("unknown cache option").with_context("option", key)),
            }
        }
        options.validate()?;
        Ok(options)
    }
}

/// Parse a size with an optional binary suffix, one of `k`, `m`, `g` and `t`, in either case.
pub fn parse_size(s: &str) -> Result<usize> {
    let s = s.trim();
    let (digits, shift) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 10),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 20),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 30),
        Some(b't' | b'T') => (&s[..s.len() - 1], 40),
        _ => (s, 0),
    };
    let base: usize = digits.parse().map_err(|e| {
        Error::new(ErrorKind::InvalidArgument, "invalid size")
            .with_context("size", s)
            .with_source(e)
    })?;
    1usize
        .checked_shl(shift)
        .and_then(|unit| base.checked_mul(unit))
        .ok_or_else(|| Error::invalid_argument("size overflows").with_context("size", s))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|e| {
        Error::new(ErrorKind::InvalidArgument, "invalid option value")
            .with_context("option", key)
            .with_context("value", value)
            .with_source(e)
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => parse_value(key, value),
    }
}

/// Builder of an [`LruCache`].
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    options: LruCacheOptions,
}

impl From<LruCacheOptions> for CacheBuilder {
    fn from(options: LruCacheOptions) -> Self {
        Self { options }
    }
}

impl CacheBuilder {
    /// A builder with default options and the given capacity.
    pub fn new(capacity: usize) -> Self {
        LruCacheOptions::new(capacity).into()
    }

    /// Set the cache to `2^num_shard_bits` shards. Entries are distributed over shards by hash, operations on
    /// different shards run in parallel.
    ///
    /// By default, shards are kept at least 512 KiB large and at most 64 are used.
    pub fn with_num_shard_bits(mut self, num_shard_bits: u8) -> Self {
        self.options.num_shard_bits = Some(num_shard_bits);
        self
    }

    /// Reject inserts that cannot fit instead of exceeding the capacity.
    pub fn with_strict_capacity_limit(mut self, strict_capacity_limit: bool) -> Self {
        self.options.strict_capacity_limit = strict_capacity_limit;
        self
    }

    /// The default value is 0.5.
    pub fn with_high_pri_pool_ratio(mut self, ratio: f64) -> Self {
        self.options.high_pri_pool_ratio = ratio;
        self
    }

    /// The default value is 0.0, for no limit.
    pub fn with_low_pri_pool_ratio(mut self, ratio: f64) -> Self {
        self.options.low_pri_pool_ratio = ratio;
        self
    }

    /// The default value is 1024.
    pub fn with_offer_queue_capacity(mut self, capacity: usize) -> Self {
        self.options.offer_queue_capacity = capacity;
        self
    }

    /// Set when entries are offered to the secondary tier.
    pub fn with_offer_policy(mut self, offer_policy: OfferPolicy) -> Self {
        self.options.offer_policy = offer_policy;
        self
    }

    /// Set the allocator handed to the entry callbacks.
    pub fn with_memory_allocator(mut self, allocator: Arc<dyn MemoryAllocator>) -> Self {
        self.options.memory_allocator = Some(allocator);
        self
    }

    /// Set the secondary tier.
    pub fn with_secondary_cache(mut self, secondary: Arc<dyn SecondaryCache>) -> Self {
        self.options.secondary_cache = Some(secondary);
        self
    }

    /// Set the runtime of the worker feeding the secondary tier.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.options.spawner = Some(spawner);
        self
    }

    /// Build the cache.
    pub fn build(self) -> Result<LruCache> {
        LruCache::new(self.options)
    }
}
