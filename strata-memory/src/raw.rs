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

use std::{
    fmt::{Debug, Write as _},
    hash::BuildHasher,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use itertools::Itertools;
use parking_lot::Mutex;
use strata_common::{
    allocator::MemoryAllocator,
    error::Result,
    properties::Priority,
    scope::Scope,
    spawn::Spawner,
    statistics::{Statistics, Ticker},
};

use crate::{
    cache::{ApplyToAllEntriesOptions, Cache, LookupOptions},
    error::InsertError,
    handle::Handle,
    helper::{EntryHelper, Object},
    options::{LruCacheOptions, OfferPolicy},
    pipe::{NoopPipe, Offer, OfferPipe, Pipe},
    promotion,
    record::{Flags, Record},
    secondary::SecondaryCache,
    shard::{Garbage, Shard, Visitor},
};

pub(crate) struct LruCacheInner {
    shards: Vec<Mutex<Shard>>,
    shard_bits: u8,
    hash_builder: ahash::RandomState,

    /// Serializes capacity changes. Each shard also keeps its own share.
    capacity: Mutex<usize>,
    strict_capacity_limit: AtomicBool,
    high_pri_pool_ratio: f64,
    low_pri_pool_ratio: f64,
    next_id: AtomicU64,

    offer_policy: OfferPolicy,
    pipe: Box<dyn Pipe>,
    secondary: Option<Arc<dyn SecondaryCache>>,
    allocator: Option<Arc<dyn MemoryAllocator>>,
}

impl Debug for LruCacheInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCacheInner")
            .field("shards", &self.shards.len())
            .field("capacity", &*self.capacity.lock())
            .field("strict_capacity_limit", &self.strict_capacity_limit.load(Ordering::Relaxed))
            .field("offer_policy", &self.offer_policy)
            .field("secondary", &self.secondary.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

impl LruCacheInner {
    fn shard(&self, hash: u64) -> &Mutex<Shard> {
        &self.shards[(hash >> 32) as usize % self.shards.len()]
    }

    fn shard_capacity_for(total: usize, shards: usize, index: usize) -> usize {
        let base = total / shards;
        let remainder = total % shards;
        base + usize::from(index < remainder)
    }

    fn hash(&self, key: &[u8]) -> u64 {
        self.hash_builder.hash_one(key)
    }

    pub(crate) fn allocator(&self) -> Option<&dyn MemoryAllocator> {
        self.allocator.as_deref()
    }

    fn offers_on(&self, policy: OfferPolicy, helper: &EntryHelper) -> bool {
        self.offer_policy == policy && helper.is_secondary_compatible() && self.pipe.is_enabled()
    }

    /// Handle records that left their shard, out of the lock.
    fn reclaim(&self, garbages: Vec<Garbage>) {
        for Garbage { record, evicted } in garbages {
            if evicted
                && !record.flags().contains(Flags::DISOWNED)
                && self.offers_on(OfferPolicy::OnEviction, record.helper())
            {
                self.pipe.send(Offer::record(record));
            }
        }
    }

    /// Build a record and bind it. With `pin`, the returned record carries one reference for the caller.
    #[expect(clippy::too_many_arguments)]
    pub(crate) fn insert_record(
        &self,
        key: &[u8],
        hash: u64,
        object: Object,
        helper: &'static EntryHelper,
        charge: usize,
        priority: Priority,
        pin: bool,
    ) -> std::result::Result<Arc<Record>, InsertError> {
        let record = Arc::new(Record::new(
            key,
            hash,
            object,
            helper,
            charge,
            priority,
            self.allocator.clone(),
        ));
        let strict = self.strict_capacity_limit.load(Ordering::Relaxed);

        let mut garbages = vec![];
        let res = self
            .shard(hash)
            .lock()
            .with(|mut shard| shard.insert(&record, pin, strict, &mut garbages));
        self.reclaim(garbages);

        match res {
            Ok(_) => {
                tracing::trace!(hash, charge, pin, "[lru]: insert");
                if self.offers_on(OfferPolicy::OnInsert, helper) {
                    self.pipe.send(Offer::record(record.clone()));
                }
                Ok(record)
            }
            Err(e) => {
                // The record was never bound, so this is the only reference.
                let object = Arc::into_inner(record).and_then(|mut record| record.take_object());
                if let Some(object) = object.as_ref() {
                    if self.pipe.is_enabled() && helper.is_secondary_compatible() {
                        if let Ok(data) = helper.serialize(object.as_ref()) {
                            self.pipe.send(Offer::serialized(key, data));
                        }
                    }
                }
                Err(InsertError::new(e, object))
            }
        }
    }

    pub(crate) fn acquire(&self, record: &Arc<Record>) {
        self.shard(record.hash()).lock().acquire(record);
    }

    pub(crate) fn release(&self, record: &Arc<Record>, useful: bool, erase_if_last_ref: bool) -> bool {
        let mut garbages = vec![];
        let erased = self
            .shard(record.hash())
            .lock()
            .with(|mut shard| shard.release(record, useful, erase_if_last_ref, &mut garbages));
        tracing::trace!(hash = record.hash(), useful, erased, "[lru]: release");
        self.reclaim(garbages);
        erased
    }

    fn set_capacity(&self, capacity: usize) {
        let mut total = self.capacity.lock();
        let shards = self.shards.len();
        for (index, shard) in self.shards.iter().enumerate() {
            let mut garbages = vec![];
            shard
                .lock()
                .set_capacity(Self::shard_capacity_for(capacity, shards, index), &mut garbages);
            self.reclaim(garbages);
        }
        *total = capacity;
    }

    fn sum(&self, f: impl Fn(&Shard) -> usize) -> usize {
        self.shards.iter().map(|shard| f(&shard.lock())).sum()
    }
}

/// A sharded LRU cache of type erased objects with three priority pools and optional secondary tier integration.
#[derive(Debug, Clone)]
pub struct LruCache {
    inner: Arc<LruCacheInner>,
}

impl LruCache {
    /// Build a cache with the given options.
    pub fn new(options: LruCacheOptions) -> Result<Self> {
        options.validate()?;

        let shard_bits = options.shard_bits();
        let shards = 1usize << shard_bits;
        let shards = (0..shards)
            .map(|index| {
                Shard::new(
                    LruCacheInner::shard_capacity_for(options.capacity, shards, index),
                    options.high_pri_pool_ratio,
                    options.low_pri_pool_ratio,
                )
            })
            .map(Mutex::new)
            .collect_vec();

        let pipe: Box<dyn Pipe> = match options.secondary_cache.as_ref() {
            Some(secondary) => {
                let spawner = match options.spawner {
                    Some(spawner) => spawner,
                    None => match Spawner::try_current() {
                        Some(spawner) => spawner,
                        None => Spawner::dedicated("strata-offer", 1)?,
                    },
                };
                Box::new(OfferPipe::new(secondary.clone(), options.offer_queue_capacity, spawner))
            }
            None => Box::new(NoopPipe),
        };

        let inner = LruCacheInner {
            shards,
            shard_bits,
            hash_builder: ahash::RandomState::new(),
            capacity: Mutex::new(options.capacity),
            strict_capacity_limit: AtomicBool::new(options.strict_capacity_limit),
            high_pri_pool_ratio: options.high_pri_pool_ratio,
            low_pri_pool_ratio: options.low_pri_pool_ratio,
            next_id: AtomicU64::new(1),
            offer_policy: options.offer_policy,
            pipe,
            secondary: options.secondary_cache,
            allocator: options.memory_allocator,
        };

        tracing::debug!(capacity = options.capacity, shard_bits, "[lru]: cache created");
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Number of shards.
    pub fn shards(&self) -> usize {
        self.inner.shards.len()
    }

    /// The secondary tier, if any.
    pub fn secondary_cache(&self) -> Option<&Arc<dyn SecondaryCache>> {
        self.inner.secondary.as_ref()
    }

    /// Block until every entry offered so far has been handed to the secondary tier.
    pub fn flush_offers(&self) {
        self.inner.pipe.flush();
    }

    fn insert_inner(
        &self,
        key: &[u8],
        object: Object,
        helper: &'static EntryHelper,
        charge: usize,
        priority: Priority,
        pin: bool,
    ) -> std::result::Result<Arc<Record>, InsertError> {
        let hash = self.inner.hash(key);
        self.inner
            .insert_record(key, hash, object, helper, charge, priority, pin)
    }
}

fn tick(statistics: Option<&Arc<dyn Statistics>>, ticker: Ticker) {
    if let Some(statistics) = statistics {
        statistics.record_tick(ticker, 1);
    }
}

impl Cache for LruCache {
    fn name(&self) -> &'static str {
        "LRUCache"
    }

    fn insert(
        &self,
        key: &[u8],
        object: Object,
        helper: &'static EntryHelper,
        charge: usize,
        priority: Priority,
    ) -> std::result::Result<(), InsertError> {
        self.insert_inner(key, object, helper, charge, priority, false)
            .map(|_| ())
    }

    fn insert_with_handle(
        &self,
        key: &[u8],
        object: Object,
        helper: &'static EntryHelper,
        charge: usize,
        priority: Priority,
    ) -> std::result::Result<Handle, InsertError> {
        let record = self.insert_inner(key, object, helper, charge, priority, true)?;
        Ok(Handle::present(self.inner.clone(), record))
    }

    fn lookup_with(&self, key: &[u8], options: LookupOptions) -> Option<Handle> {
        let hash = self.inner.hash(key);
        if let Some(record) = self.inner.shard(hash).lock().lookup(hash, key) {
            tracing::trace!(hash, refs = record.refs(), "[lru]: hit");
            tick(options.statistics.as_ref(), Ticker::CacheHit);
            return Some(Handle::present(self.inner.clone(), record));
        }
        tick(options.statistics.as_ref(), Ticker::CacheMiss);

        let helper = options.helper.filter(|helper| helper.is_secondary_compatible())?;
        let secondary = self.inner.secondary.as_ref()?;
        promotion::lookup(&self.inner, secondary.as_ref(), key, hash, helper, options)
    }

    fn erase(&self, key: &[u8]) {
        let hash = self.inner.hash(key);
        let mut garbages = vec![];
        self.inner
            .shard(hash)
            .lock()
            .with(|mut shard| shard.erase(hash, key, &mut garbages));
        self.inner.reclaim(garbages);
    }

    fn new_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn set_capacity(&self, capacity: usize) {
        self.inner.set_capacity(capacity);
    }

    fn capacity(&self) -> usize {
        *self.inner.capacity.lock()
    }

    fn set_strict_capacity_limit(&self, strict: bool) {
        self.inner.strict_capacity_limit.store(strict, Ordering::Relaxed);
    }

    fn has_strict_capacity_limit(&self) -> bool {
        self.inner.strict_capacity_limit.load(Ordering::Relaxed)
    }

    fn usage(&self) -> usize {
        self.inner.sum(Shard::usage)
    }

    fn pinned_usage(&self) -> usize {
        self.inner.sum(Shard::pinned_usage)
    }

    fn occupancy_count(&self) -> Option<usize> {
        Some(self.inner.sum(Shard::occupancy))
    }

    fn table_address_count(&self) -> Option<usize> {
        Some(self.inner.sum(Shard::table_address_count))
    }

    fn apply_to_all_entries(&self, visitor: &mut Visitor<'_>, options: ApplyToAllEntriesOptions) {
        let limit = options.average_entries_per_lock.max(1);
        for shard in self.inner.shards.iter() {
            let mut continuation = None;
            loop {
                continuation = shard.lock().apply(continuation, limit, visitor);
                if continuation.is_none() {
                    break;
                }
            }
        }
    }

    fn erase_unref_entries(&self) {
        for shard in self.inner.shards.iter() {
            let mut garbages = vec![];
            shard.lock().erase_unref_entries(&mut garbages);
            self.inner.reclaim(garbages);
        }
    }

    fn disown_data(&self) {
        for shard in self.inner.shards.iter() {
            let mut garbages = vec![];
            shard.lock().disown(&mut garbages);
            drop(garbages);
        }
        tracing::debug!("[lru]: data disowned");
    }

    fn printable_options(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "    capacity : {}", self.capacity());
        let _ = writeln!(s, "    num_shard_bits : {}", self.inner.shard_bits);
        let _ = writeln!(
            s,
            "    strict_capacity_limit : {}",
            u8::from(self.has_strict_capacity_limit())
        );
        let _ = writeln!(s, "    high_pri_pool_ratio: {:.3}", self.inner.high_pri_pool_ratio);
        let _ = writeln!(s, "    low_pri_pool_ratio: {:.3}", self.inner.low_pri_pool_ratio);
        let _ = writeln!(s, "    offer_policy: {:?}", self.inner.offer_policy);
        if let Some(secondary) = self.inner.secondary.as_ref() {
            let _ = writeln!(s, "    secondary_cache: {}", secondary.name());
            s.push_str(&secondary.printable_options());
        }
        s
    }

    fn report_problems(&self) {
        for (index, shard) in self.inner.shards.iter().enumerate() {
            let (pinned, capacity) = shard.lock().with(|shard| (shard.pinned_usage(), shard.capacity()));
            if pinned > capacity {
                tracing::warn!(
                    shard = index,
                    pinned,
                    capacity,
                    "[lru]: pinned usage exceeds shard capacity, referenced entries cannot be evicted"
                );
            }
        }
        let dropped = self.inner.pipe.take_dropped();
        if dropped > 0 {
            tracing::warn!(dropped, "[lru]: offers to the secondary tier were dropped since the last report");
        }
    }

    fn memory_allocator(&self) -> Option<Arc<dyn MemoryAllocator>> {
        self.inner.allocator.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use rand::{rngs::SmallRng, Rng, SeedableRng};
    use strata_common::error::ErrorKind;

    use super::*;
    use crate::{
        handle::HandleState,
        helper::{CreateContext, NOOP_HELPER},
        options::CacheBuilder,
        test_utils::{
            data_of, CountingStatistics, DestroyCounter, MockSecondary, CORRUPTED, TEST_HELPER, TEST_HELPER_PLAIN,
        },
    };

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<LruCache>();
        is_send_sync_static::<Handle>();
    }

    fn cache(capacity: usize, strict: bool) -> LruCache {
        CacheBuilder::new(capacity)
            .with_num_shard_bits(0)
            .with_strict_capacity_limit(strict)
            .build()
            .unwrap()
    }

    fn cache_with_secondary(capacity: usize, secondary: Arc<MockSecondary>) -> LruCache {
        CacheBuilder::new(capacity)
            .with_num_shard_bits(0)
            .with_secondary_cache(secondary)
            .with_spawner(Spawner::dedicated("strata-test-offer", 1).unwrap())
            .build()
            .unwrap()
    }

    #[test_log::test]
    fn test_strict_capacity_scenario() {
        let cache = cache(100, true);
        let counter = DestroyCounter::default();

        cache
            .insert(b"a", counter.object(b"a"), &TEST_HELPER, 60, Priority::Low)
            .unwrap();
        assert_eq!(cache.usage(), 60);

        let b = cache
            .insert_with_handle(b"b", counter.object(b"b"), &TEST_HELPER, 50, Priority::Low)
            .unwrap();
        assert!(cache.lookup(b"a").is_none());
        assert_eq!(counter.count(), 1);
        assert_eq!(cache.usage(), 50);
        assert_eq!(cache.pinned_usage(), 50);

        let again = cache.ref_handle(&b).unwrap();
        assert!(!cache.release(b, true, false));
        assert_eq!(cache.usage(), 50);
        assert_eq!(cache.pinned_usage(), 50);

        cache.erase(b"b");
        assert_eq!(cache.usage(), 50);
        assert_eq!(counter.count(), 1);
        assert!(cache.release(again, true, false));
        assert_eq!(cache.usage(), 0);
        assert_eq!(cache.pinned_usage(), 0);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_strict_rejection_returns_object() {
        let cache = cache(100, true);
        let counter = DestroyCounter::default();

        let pinned = cache
            .insert_with_handle(b"a", counter.object(b"a"), &TEST_HELPER, 100, Priority::High)
            .unwrap();

        let e = cache
            .insert(b"b", counter.object(b"b"), &TEST_HELPER, 1, Priority::Low)
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(cache.usage(), 100);
        assert_eq!(cache.occupancy_count(), Some(1));
        assert_eq!(counter.count(), 0);

        let object = e.into_object().unwrap();
        assert_eq!(data_of(object.as_ref()), Some(&b"b"[..]));
        drop(object);
        // Dropping the object without the helper bypasses the deleter.
        assert_eq!(counter.count(), 0);

        cache.set_strict_capacity_limit(false);
        assert!(!cache.has_strict_capacity_limit());
        cache
            .insert(b"c", counter.object(b"c"), &TEST_HELPER, 1, Priority::Low)
            .unwrap();
        // Admitted without a handle, then released right away as it does not fit.
        assert!(cache.lookup(b"c").is_none());
        assert_eq!(counter.count(), 1);
        drop(pinned);
    }

    #[test]
    fn test_lookup_after_insert() {
        let cache = cache(1024, false);
        cache
            .insert(b"k", Box::new(42u64), &NOOP_HELPER, 8, Priority::Low)
            .unwrap();
        let handle = cache.lookup(b"k").unwrap();
        assert_eq!(handle.state(), HandleState::Present);
        assert_eq!(handle.value_as::<u64>(), Some(&42));
        assert_eq!(handle.key(), Some(&b"k"[..]));
        assert_eq!(handle.charge(), 8);
        assert!(std::ptr::eq(handle.helper().unwrap(), &NOOP_HELPER));
        assert_eq!(cache.pinned_usage(), 8);
        drop(handle);
        assert_eq!(cache.pinned_usage(), 0);
        assert!(cache.lookup(b"missing").is_none());
    }

    #[test]
    fn test_replace_keeps_old_handle_valid() {
        let cache = cache(1024, false);
        let counter = DestroyCounter::default();

        let old = cache
            .insert_with_handle(b"k", counter.object(b"old"), &TEST_HELPER, 10, Priority::Low)
            .unwrap();
        cache
            .insert(b"k", counter.object(b"new"), &TEST_HELPER, 20, Priority::Low)
            .unwrap();

        assert_eq!(cache.usage(), 30);
        assert_eq!(cache.occupancy_count(), Some(1));
        assert_eq!(data_of(old.value().unwrap()), Some(&b"old"[..]));
        let new = cache.lookup(b"k").unwrap();
        assert_eq!(data_of(new.value().unwrap()), Some(&b"new"[..]));

        assert!(cache.release(old, true, false));
        assert_eq!(counter.count(), 1);
        assert_eq!(cache.usage(), 20);
        drop(new);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_release_erase_if_last_ref() {
        let cache = cache(1024, false);
        let counter = DestroyCounter::default();
        let h1 = cache
            .insert_with_handle(b"k", counter.object(b"k"), &TEST_HELPER, 10, Priority::Low)
            .unwrap();
        let h2 = cache.lookup(b"k").unwrap();

        assert!(!cache.release(h1, true, true));
        assert_eq!(counter.count(), 0);
        assert!(cache.release(h2, true, true));
        assert_eq!(counter.count(), 1);
        assert_eq!(cache.usage(), 0);
        assert!(cache.lookup(b"k").is_none());
    }

    #[test]
    fn test_set_capacity() {
        let cache = cache(100, false);
        let counter = DestroyCounter::default();

        let handles = (0..3)
            .map(|i| {
                cache
                    .insert_with_handle(
                        format!("p{i}").as_bytes(),
                        counter.object(b"p"),
                        &TEST_HELPER,
                        10,
                        Priority::Low,
                    )
                    .unwrap()
            })
            .collect_vec();
        for i in 0..7 {
            cache
                .insert(format!("u{i}").as_bytes(), counter.object(b"u"), &TEST_HELPER, 10, Priority::Low)
                .unwrap();
        }
        assert_eq!(cache.usage(), 100);

        cache.set_capacity(20);
        assert_eq!(cache.capacity(), 20);
        assert_eq!(cache.usage(), 30);
        assert_eq!(counter.count(), 7);
        assert!(handles.iter().all(|h| h.value().is_some()));

        drop(handles);
        assert!(cache.usage() <= 20);
        assert_eq!(counter.count(), 8);
    }

    #[test]
    fn test_priority_eviction() {
        let cache = cache(30, false);
        cache.insert(b"h", Box::new(()), &NOOP_HELPER, 10, Priority::High).unwrap();
        cache.insert(b"l", Box::new(()), &NOOP_HELPER, 10, Priority::Low).unwrap();
        cache.insert(b"b", Box::new(()), &NOOP_HELPER, 10, Priority::Bottom).unwrap();

        cache.insert(b"x", Box::new(()), &NOOP_HELPER, 10, Priority::Low).unwrap();
        assert!(cache.lookup(b"b").is_none());
        cache.insert(b"y", Box::new(()), &NOOP_HELPER, 10, Priority::Low).unwrap();
        assert!(cache.lookup(b"l").is_none());
        assert!(cache.lookup(b"h").is_some());
    }

    #[test]
    fn test_not_useful_release_is_evicted_first() {
        let cache = cache(30, false);
        cache.insert(b"a", Box::new(()), &NOOP_HELPER, 10, Priority::Low).unwrap();
        cache.insert(b"b", Box::new(()), &NOOP_HELPER, 10, Priority::Low).unwrap();
        let c = cache.insert_with_handle(b"c", Box::new(()), &NOOP_HELPER, 10, Priority::Low).unwrap();
        cache.release(c, false, false);

        cache.insert(b"d", Box::new(()), &NOOP_HELPER, 10, Priority::Low).unwrap();
        assert!(cache.lookup(b"c").is_none());
        assert!(cache.lookup(b"a").is_some());
    }

    #[test]
    fn test_erase_unref_entries_and_disown() {
        let cache = CacheBuilder::new(1 << 20).with_num_shard_bits(2).build().unwrap();
        let counter = DestroyCounter::default();
        let pinned = cache
            .insert_with_handle(b"pinned", counter.object(b"pinned"), &TEST_HELPER, 1, Priority::Low)
            .unwrap();
        for i in 0..10u8 {
            cache
                .insert(&[i], counter.object(&[i]), &TEST_HELPER, 1, Priority::Low)
                .unwrap();
        }
        assert_eq!(cache.occupancy_count(), Some(11));
        assert!(cache.table_address_count().unwrap() >= 11);

        cache.erase_unref_entries();
        assert_eq!(counter.count(), 10);
        assert_eq!(cache.occupancy_count(), Some(1));
        assert_eq!(cache.usage(), 1);

        for i in 0..5u8 {
            cache
                .insert(&[i], counter.object(&[i]), &TEST_HELPER, 1, Priority::Low)
                .unwrap();
        }
        cache.disown_data();
        assert_eq!(cache.occupancy_count(), Some(0));
        assert!(pinned.value().is_some());
        drop(pinned);
        drop(cache);
        assert_eq!(counter.count(), 10);
    }

    #[test]
    fn test_apply_to_all_entries() {
        let cache = CacheBuilder::new(1 << 20).with_num_shard_bits(2).build().unwrap();
        for i in 0..100u32 {
            cache
                .insert(&i.to_be_bytes(), Box::new(i), &NOOP_HELPER, 3, Priority::Low)
                .unwrap();
        }
        let _held = cache.lookup(&7u32.to_be_bytes()).unwrap();

        let mut seen = vec![];
        let mut total = 0;
        cache.apply_to_all_entries(
            &mut |key, object, charge, helper| {
                let value = *object.downcast_ref::<u32>().unwrap();
                assert_eq!(key, value.to_be_bytes());
                assert!(std::ptr::eq(helper, &NOOP_HELPER));
                seen.push(value);
                total += charge;
            },
            ApplyToAllEntriesOptions {
                average_entries_per_lock: 7,
            },
        );
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect_vec());
        assert_eq!(total, 300);
    }

    #[test]
    fn test_new_id_and_printable_options() {
        let cache = cache(1024, true);
        let a = cache.new_id();
        let b = cache.new_id();
        assert!(b > a);
        assert_eq!(cache.name(), "LRUCache");

        let options = cache.printable_options();
        assert!(options.contains("capacity : 1024"));
        assert!(options.contains("num_shard_bits : 0"));
        assert!(options.contains("strict_capacity_limit : 1"));
        assert!(cache.memory_allocator().is_none());
        cache.report_problems();
    }

    #[test]
    fn test_concurrent_ref_release_destroys_once() {
        const THREADS: usize = 8;
        const KEYS: u64 = 64;

        let cache = CacheBuilder::new(256).with_num_shard_bits(2).build().unwrap();
        let counter = DestroyCounter::default();
        let inserted = Arc::new(AtomicUsize::new(0));

        let workers = (0..THREADS)
            .map(|t| {
                let cache = cache.clone();
                let counter = counter.clone();
                let inserted = inserted.clone();
                thread::spawn(move || {
                    let mut rng = SmallRng::seed_from_u64(t as u64);
                    let mut held = vec![];
                    for _ in 0..10_000 {
                        let key = rng.random_range(0..KEYS).to_be_bytes();
                        match rng.random_range(0..10) {
                            0..=2 => {
                                let charge = rng.random_range(1..16);
                                if let Ok(handle) = cache.insert_with_handle(
                                    &key,
                                    counter.object(&key),
                                    &TEST_HELPER,
                                    charge,
                                    Priority::Low,
                                ) {
                                    held.push(handle);
                                }
                                inserted.fetch_add(1, Ordering::Relaxed);
                            }
                            3..=5 => {
                                if let Some(handle) = cache.lookup(&key) {
                                    if let Some(again) = cache.ref_handle(&handle) {
                                        held.push(again);
                                    }
                                    held.push(handle);
                                }
                            }
                            6 => cache.erase(&key),
                            _ => {
                                if !held.is_empty() {
                                    let handle = held.swap_remove(rng.random_range(0..held.len()));
                                    cache.release(handle, rng.random_bool(0.5), rng.random_bool(0.1));
                                }
                            }
                        }
                        if held.len() > 8 {
                            held.clear();
                        }
                    }
                })
            })
            .collect_vec();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(cache.pinned_usage(), 0);
        for shard in cache.inner.shards.iter() {
            shard.lock().validate();
        }
        let resident = cache.occupancy_count().unwrap();
        drop(cache);
        assert_eq!(counter.count(), inserted.load(Ordering::Relaxed));
        assert!(resident <= KEYS as usize);
    }

    #[test_log::test]
    fn test_no_secondary_helper_never_queries_secondary() {
        let secondary = Arc::new(MockSecondary::default());
        secondary.put(b"k", b"k");
        let cache = cache_with_secondary(1024, secondary.clone());

        let options = LookupOptions::new().with_helper(&TEST_HELPER_PLAIN);
        assert!(cache.lookup_with(b"k", options).is_none());
        assert!(cache.lookup(b"k").is_none());
        assert_eq!(secondary.lookups(), 0);
    }

    #[test_log::test]
    fn test_promotion_from_secondary() {
        let secondary = Arc::new(MockSecondary::new(false, false));
        secondary.put(b"k", b"payload");
        let cache = cache_with_secondary(1024, secondary.clone());
        let counter = DestroyCounter::default();
        let statistics = Arc::new(CountingStatistics::default());

        let options = LookupOptions::new()
            .with_helper(&TEST_HELPER)
            .with_create_context(Arc::new(counter.clone()) as Arc<CreateContext>)
            .with_statistics(statistics.clone());
        let handle = cache.lookup_with(b"k", options.clone()).unwrap();
        assert_eq!(handle.state(), HandleState::Present);
        assert_eq!(data_of(handle.value().unwrap()), Some(&b"payload"[..]));
        assert_eq!(handle.charge(), 7);
        // Not kept by the secondary tier, so it stays offerable.
        assert!(handle.helper().unwrap().is_secondary_compatible());
        assert_eq!(cache.usage(), 7);

        assert_eq!(statistics.get(Ticker::CacheMiss), 1);
        assert_eq!(statistics.get(Ticker::SecondaryCacheHit), 1);
        assert_eq!(statistics.get(Ticker::Promotion), 1);
        drop(handle);

        let handle = cache.lookup_with(b"k", options).unwrap();
        assert_eq!(handle.state(), HandleState::Present);
        assert_eq!(statistics.get(Ticker::CacheHit), 1);
        drop(handle);

        assert!(cache.lookup_with(b"other", LookupOptions::new().with_helper(&TEST_HELPER)).is_none());
        drop(cache);
        assert_eq!(counter.count(), 1);
    }

    #[test_log::test]
    fn test_kept_entry_is_not_offered_again() {
        let secondary = Arc::new(MockSecondary::new(true, false));
        secondary.put(b"kept", b"kept");
        let cache = cache_with_secondary(10, secondary.clone());

        let handle = cache
            .lookup_with(b"kept", LookupOptions::new().with_helper(&TEST_HELPER))
            .unwrap();
        assert!(std::ptr::eq(handle.helper().unwrap(), &TEST_HELPER_PLAIN));
        drop(handle);

        let counter = DestroyCounter::default();
        cache
            .insert(b"fresh", counter.object(b"fresh"), &TEST_HELPER, 10, Priority::Low)
            .unwrap();
        // The kept entry was evicted without an offer.
        assert!(cache.lookup(b"kept").is_none());
        cache
            .insert(b"newer", counter.object(b"newer"), &TEST_HELPER, 10, Priority::Low)
            .unwrap();
        cache.flush_offers();
        assert_eq!(secondary.inserts(), 1);
        assert_eq!(secondary.get(b"fresh").as_deref(), Some(&b"fresh"[..]));
    }

    #[test_log::test]
    fn test_create_failure_fails_lookup() {
        let secondary = Arc::new(MockSecondary::default());
        secondary.put(b"bad", CORRUPTED);
        let cache = cache_with_secondary(1024, secondary.clone());
        let statistics = Arc::new(CountingStatistics::default());

        let options = LookupOptions::new()
            .with_helper(&TEST_HELPER)
            .with_statistics(statistics.clone());
        assert!(cache.lookup_with(b"bad", options).is_none());
        assert_eq!(statistics.get(Ticker::SecondaryCacheCreateFailure), 1);
        assert_eq!(cache.usage(), 0);
    }

    #[test_log::test]
    fn test_promotion_rejected_by_strict_limit() {
        let secondary = Arc::new(MockSecondary::default());
        secondary.put(b"big", &[0u8; 64]);
        let cache = CacheBuilder::new(16)
            .with_num_shard_bits(0)
            .with_strict_capacity_limit(true)
            .with_secondary_cache(secondary.clone())
            .with_spawner(Spawner::dedicated("strata-test-offer", 1).unwrap())
            .build()
            .unwrap();
        let counter = DestroyCounter::default();

        let options = LookupOptions::new()
            .with_helper(&TEST_HELPER)
            .with_create_context(Arc::new(counter.clone()) as Arc<CreateContext>);
        assert!(cache.lookup_with(b"big", options).is_none());
        // The rebuilt object was destroyed through its helper.
        assert_eq!(counter.count(), 1);
        assert_eq!(cache.usage(), 0);
    }

    #[test_log::test]
    fn test_eviction_offers_to_secondary() {
        let secondary = Arc::new(MockSecondary::default());
        let cache = cache_with_secondary(20, secondary.clone());
        let counter = DestroyCounter::default();

        for key in [&b"a"[..], b"b", b"c"] {
            cache
                .insert(key, counter.object(key), &TEST_HELPER, 10, Priority::Low)
                .unwrap();
        }
        cache.insert(b"plain", counter.object(b"plain"), &TEST_HELPER_PLAIN, 10, Priority::Low).unwrap();
        cache.erase(b"c");
        cache.flush_offers();

        // `a` and `b` were evicted, `c` was erased and `plain` cannot be serialized.
        assert_eq!(secondary.get(b"a").as_deref(), Some(&b"a"[..]));
        assert_eq!(secondary.get(b"b").as_deref(), Some(&b"b"[..]));
        assert_eq!(secondary.inserts(), 2);
        assert_eq!(counter.count(), 3);
        drop(cache);
        assert_eq!(counter.count(), 4);
    }

    #[test_log::test]
    fn test_offer_on_insert() {
        let secondary = Arc::new(MockSecondary::default());
        let cache = CacheBuilder::new(10)
            .with_num_shard_bits(0)
            .with_offer_policy(OfferPolicy::OnInsert)
            .with_secondary_cache(secondary.clone())
            .with_spawner(Spawner::dedicated("strata-test-offer", 1).unwrap())
            .build()
            .unwrap();

        cache.insert(b"a", Box::new(()), &NOOP_HELPER, 10, Priority::Low).unwrap();
        let counter = DestroyCounter::default();
        cache
            .insert(b"b", counter.object(b"b"), &TEST_HELPER, 10, Priority::Low)
            .unwrap();
        cache
            .insert(b"c", counter.object(b"c"), &TEST_HELPER, 10, Priority::Low)
            .unwrap();
        cache.flush_offers();

        // `b` was evicted by `c` without a second offer.
        assert_eq!(secondary.inserts(), 2);
        assert!(secondary.get(b"b").is_some());
        assert!(secondary.get(b"c").is_some());
    }

    #[test_log::test]
    fn test_pending_handle_resolves_on_wait() {
        let secondary = Arc::new(MockSecondary::new(true, true));
        secondary.put(b"k", b"value");
        let cache = cache_with_secondary(1024, secondary.clone());
        let statistics = Arc::new(CountingStatistics::default());
        let options = LookupOptions::new()
            .with_helper(&TEST_HELPER)
            .with_wait(false)
            .with_statistics(statistics.clone());

        let mut hit = cache.lookup_with(b"k", options.clone()).unwrap();
        let mut miss = cache.lookup_with(b"missing", options).unwrap();
        assert_eq!(hit.state(), HandleState::PendingNotReady);
        assert!(!hit.is_ready());
        assert!(hit.value().is_none());
        assert_eq!(hit.key(), Some(&b"k"[..]));
        assert_eq!(cache.usage(), 0);

        secondary.open();
        assert!(hit.is_ready());
        assert_eq!(hit.state(), HandleState::PendingReady);
        assert!(hit.value().is_none());
        hit.wait();
        assert_eq!(hit.state(), HandleState::Present);
        assert_eq!(data_of(hit.value().unwrap()), Some(&b"value"[..]));
        assert_eq!(cache.usage(), 5);

        miss.wait();
        assert_eq!(miss.state(), HandleState::Failed);
        assert!(miss.value().is_none());
        assert!(!cache.release(miss, true, false));

        assert_eq!(statistics.get(Ticker::SecondaryCacheHit), 1);
        assert_eq!(statistics.get(Ticker::SecondaryCacheMiss), 1);
        assert_eq!(statistics.get(Ticker::Promotion), 1);
    }

    #[test_log::test]
    fn test_wait_all() {
        let secondary = Arc::new(MockSecondary::new(true, true));
        for i in 0..4u8 {
            secondary.put(&[i], &[i; 4]);
        }
        let cache = cache_with_secondary(1024, secondary.clone());
        let options = LookupOptions::new().with_helper(&TEST_HELPER).with_wait(false);

        let mut handles = (0..5u8)
            .map(|i| cache.lookup_with(&[i], options.clone()).unwrap())
            .collect_vec();
        assert!(handles.iter().all(|h| h.state() == HandleState::PendingNotReady));

        let gate = secondary.clone();
        let opener = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            gate.open();
        });
        Handle::wait_all(&mut handles);
        opener.join().unwrap();

        for (i, handle) in handles.iter().enumerate().take(4) {
            assert_eq!(handle.state(), HandleState::Present);
            assert_eq!(data_of(handle.value().unwrap()), Some(&[i as u8; 4][..]));
        }
        assert_eq!(handles[4].state(), HandleState::Failed);
        assert_eq!(cache.pinned_usage(), 16);
        drop(handles);
        assert_eq!(cache.pinned_usage(), 0);
        assert_eq!(cache.usage(), 16);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn test_wait_async_inside_runtime() {
        let secondary = Arc::new(MockSecondary::new(true, true));
        secondary.put(b"k", b"async");
        let cache = CacheBuilder::new(1024)
            .with_num_shard_bits(0)
            .with_secondary_cache(secondary.clone())
            .build()
            .unwrap();

        let mut handle = cache
            .lookup_with(b"k", LookupOptions::new().with_helper(&TEST_HELPER).with_wait(false))
            .unwrap();
        let gate = secondary.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            gate.open();
        });
        handle.wait_async().await;
        assert_eq!(handle.value_as::<crate::test_utils::TestObject>().unwrap().data, b"async");
    }

    #[test]
    fn test_dropping_pending_handle() {
        let secondary = Arc::new(MockSecondary::new(true, true));
        secondary.put(b"k", b"v");
        let cache = cache_with_secondary(1024, secondary.clone());
        let handle = cache
            .lookup_with(b"k", LookupOptions::new().with_helper(&TEST_HELPER).with_wait(false))
            .unwrap();
        assert!(cache.ref_handle(&handle).is_none());
        drop(handle);
        assert_eq!(cache.usage(), 0);
        assert_eq!(cache.pinned_usage(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_release_pending_handle_panics() {
        let secondary = Arc::new(MockSecondary::new(true, true));
        secondary.put(b"k", b"v");
        let cache = cache_with_secondary(1024, secondary);
        let handle = cache
            .lookup_with(b"k", LookupOptions::new().with_helper(&TEST_HELPER).with_wait(false))
            .unwrap();
        assert_eq!(handle.state(), HandleState::PendingNotReady);
        cache.release(handle, true, false);
    }

    #[test]
    fn test_release_pending_handle_keeps_accounting() {
        let secondary = Arc::new(MockSecondary::new(true, true));
        secondary.put(b"k", b"v");
        let cache = cache_with_secondary(1024, secondary.clone());
        let counter = DestroyCounter::default();

        cache
            .insert(b"resident", counter.object(b"resident"), &TEST_HELPER, 10, Priority::Low)
            .unwrap();
        let pinned = cache
            .insert_with_handle(b"pinned", counter.object(b"pinned"), &TEST_HELPER, 20, Priority::Low)
            .unwrap();
        assert_eq!(cache.usage(), 30);
        assert_eq!(cache.pinned_usage(), 20);

        let handle = cache
            .lookup_with(b"k", LookupOptions::new().with_helper(&TEST_HELPER).with_wait(false))
            .unwrap();
        assert_eq!(handle.state(), HandleState::PendingNotReady);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cache.release(handle, true, false)));
        if let Ok(erased) = res {
            assert!(!erased);
        }

        assert_eq!(cache.usage(), 30);
        assert_eq!(cache.pinned_usage(), 20);
        assert_eq!(cache.occupancy_count(), Some(2));
        assert!(cache.lookup(b"k").is_none());
        assert_eq!(counter.count(), 0);

        drop(pinned);
        assert_eq!(cache.pinned_usage(), 0);
        assert_eq!(cache.usage(), 30);
    }

    #[test_log::test]
    fn test_drop_runtime_while_cache_alive() {
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .build()
                .unwrap();
            // Without an explicit spawner, the offer worker runs on the current runtime.
            let cache = rt.block_on(async {
                CacheBuilder::new(16)
                    .with_num_shard_bits(0)
                    .with_secondary_cache(Arc::new(MockSecondary::default()))
                    .build()
                    .unwrap()
            });
            drop(rt);

            // Offers to a stopped worker are dropped. Neither insertion nor flushing blocks.
            let counter = DestroyCounter::default();
            for key in [b"a", b"b", b"c"] {
                cache
                    .insert(key, counter.object(key), &TEST_HELPER, 8, Priority::Low)
                    .unwrap();
            }
            cache.flush_offers();
            let _ = tx.send(counter.count());
        });

        let destroyed = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(destroyed, 1);
    }
}
