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

use metrics::{counter, Counter};

/// Named counters reported by lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ticker {
    /// The key is resident in the primary tier.
    CacheHit,
    /// The key is not resident in the primary tier.
    CacheMiss,
    /// The secondary tier returned bytes for the key.
    SecondaryCacheHit,
    /// The secondary tier does not hold the key.
    SecondaryCacheMiss,
    /// Bytes from the secondary tier could not be turned into an object.
    SecondaryCacheCreateFailure,
    /// An entry has been reconstructed and inserted into the primary tier.
    Promotion,
}

impl Ticker {
    /// Number of tickers.
    pub const COUNT: usize = 6;

    /// All tickers.
    pub const ALL: [Ticker; Ticker::COUNT] = [
        Ticker::CacheHit,
        Ticker::CacheMiss,
        Ticker::SecondaryCacheHit,
        Ticker::SecondaryCacheMiss,
        Ticker::SecondaryCacheCreateFailure,
        Ticker::Promotion,
    ];

    /// Name of the ticker.
    pub const fn name(self) -> &'static str {
        match self {
            Ticker::CacheHit => "cache.hit",
            Ticker::CacheMiss => "cache.miss",
            Ticker::SecondaryCacheHit => "secondary.hit",
            Ticker::SecondaryCacheMiss => "secondary.miss",
            Ticker::SecondaryCacheCreateFailure => "secondary.create.failure",
            Ticker::Promotion => "promotion",
        }
    }
}

/// A sink of named counters.
///
/// The cache works the same with or without a sink.
pub trait Statistics: Send + Sync + Debug + 'static {
    /// Add `count` to the counter of `ticker`.
    fn record_tick(&self, ticker: Ticker, count: u64);
}

/// A [`Statistics`] sink that forwards every ticker to a [`metrics`] counter.
///
/// Counters are registered against the recorder installed when the sink is built, under `strata_lookup_total`
/// labeled with the cache name and the ticker name.
#[derive(Clone)]
pub struct MetricsStatistics {
    name: String,
    counters: [Counter; Ticker::COUNT],
}

impl Debug for MetricsStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsStatistics").field("name", &self.name).finish()
    }
}

impl MetricsStatistics {
    /// Register the counters of the cache called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let counters = Ticker::ALL
            .map(|ticker| counter!("strata_lookup_total", "name" => name.clone(), "ticker" => ticker.name()));
        Self { name, counters }
    }

    /// Name of the cache the counters are labeled with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Statistics for MetricsStatistics {
    fn record_tick(&self, ticker: Ticker, count: u64) {
        self.counters[ticker as usize].increment(count);
    }
}
