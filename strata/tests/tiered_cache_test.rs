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

//! End to end tests of the primary tier with a compressed secondary tier.

use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use rand::{rngs::SmallRng, Rng, SeedableRng};
use strata::{
    Cache, CacheBuilder, CompressedSecondaryCache, CompressedSecondaryCacheOptions, CreateContext,
    EntryHelper, EntryRole, Error, Handle, HandleState, LookupOptions, MemoryAllocator, Object, ObjectRef, Priority,
    Result, SecondaryCache, SecondaryLookup, Spawner, Statistics, Ticker,
};

const KB: usize = 1024;

static DESTROYED: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Default)]
struct LookupCounters([AtomicU64; Ticker::COUNT]);

impl LookupCounters {
    fn get(&self, ticker: Ticker) -> u64 {
        self.0[ticker as usize].load(Ordering::Relaxed)
    }
}

impl Statistics for LookupCounters {
    fn record_tick(&self, ticker: Ticker, count: u64) {
        self.0[ticker as usize].fetch_add(count, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct Block {
    id: u64,
    payload: Vec<u8>,
}

impl Block {
    fn new(id: u64, len: usize) -> Self {
        let payload = (0..len).map(|i| (id as usize + i / 16) as u8).collect();
        Self { id, payload }
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = self.id.to_le_bytes().to_vec();
        buf.extend_from_slice(&self.payload);
        buf
    }
}

fn destroy(object: Object, _: Option<&dyn MemoryAllocator>) {
    if object.downcast_ref::<Block>().is_some() {
        DESTROYED.fetch_add(1, Ordering::Relaxed);
    }
}

fn size(object: ObjectRef<'_>) -> usize {
    object.downcast_ref::<Block>().map_or(0, |block| 8 + block.payload.len())
}

fn save_to(object: ObjectRef<'_>, offset: usize, out: &mut [u8]) -> Result<()> {
    let block = object
        .downcast_ref::<Block>()
        .ok_or_else(|| Error::invalid_argument("not a block"))?;
    out.copy_from_slice(&block.encode()[offset..offset + out.len()]);
    Ok(())
}

fn create(data: &[u8], _: Option<&CreateContext>, _: Option<&dyn MemoryAllocator>) -> Result<(Object, usize)> {
    if data.len() < 8 {
        return Err(Error::reconstruction("block too short"));
    }
    let mut id = [0; 8];
    id.copy_from_slice(&data[..8]);
    let block = Block {
        id: u64::from_le_bytes(id),
        payload: data[8..].to_vec(),
    };
    let charge = block.payload.len();
    Ok((Box::new(block), charge))
}

static BLOCK_PLAIN: EntryHelper = EntryHelper::with_deleter(EntryRole::DataBlock, destroy);
static BLOCK: EntryHelper =
    EntryHelper::with_secondary(EntryRole::DataBlock, Some(destroy), size, save_to, create, &BLOCK_PLAIN);

fn key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn tiered(capacity: usize, secondary: Arc<CompressedSecondaryCache>) -> Arc<dyn Cache> {
    Arc::new(
        CacheBuilder::new(capacity)
            .with_num_shard_bits(2)
            .with_secondary_cache(secondary)
            .with_spawner(Spawner::dedicated("strata-it-offer", 1).unwrap())
            .build()
            .unwrap(),
    )
}

fn block_of(handle: &Handle) -> &Block {
    handle.value_as::<Block>().unwrap()
}

#[test_log::test]
fn test_evicted_blocks_come_back_from_secondary() {
    let secondary = Arc::new(CompressedSecondaryCache::new(CompressedSecondaryCacheOptions::new(16 * 1024 * KB)));
    let lru = CacheBuilder::new(64 * KB)
        .with_num_shard_bits(0)
        .with_secondary_cache(secondary.clone())
        .with_spawner(Spawner::dedicated("strata-it-offer", 1).unwrap())
        .build()
        .unwrap();
    let statistics = Arc::new(LookupCounters::default());

    for id in 0..64 {
        let block = Block::new(id, 4 * KB);
        let charge = block.payload.len();
        lru.insert(&key(id), Box::new(block), &BLOCK, charge, Priority::Low)
            .unwrap();
    }
    lru.flush_offers();
    assert!(lru.usage() <= 64 * KB);
    assert_eq!(secondary.len(), 64 - 16);
    assert!(secondary.usage() < 48 * 4 * KB);

    let options = LookupOptions::new()
        .with_helper(&BLOCK)
        .with_statistics(statistics.clone());
    for id in 0..8 {
        let handle = lru.lookup_with(&key(id), options.clone()).unwrap();
        assert_eq!(handle.state(), HandleState::Present);
        let block = block_of(&handle);
        assert_eq!(block.id, id);
        assert_eq!(block.payload, Block::new(id, 4 * KB).payload);
    }
    assert_eq!(statistics.get(Ticker::CacheMiss), 8);
    assert_eq!(statistics.get(Ticker::SecondaryCacheHit), 8);
    assert_eq!(statistics.get(Ticker::Promotion), 8);

    // Promoted blocks are handed over, not copied.
    assert!(matches!(secondary.lookup(&key(0)), SecondaryLookup::Miss));
    assert!(lru.lookup_with(&key(60), options).is_some());
    assert_eq!(statistics.get(Ticker::CacheHit), 1);
}

#[test_log::test]
fn test_async_secondary_with_wait_all() {
    let secondary = Arc::new(CompressedSecondaryCache::new(CompressedSecondaryCacheOptions {
        keep_on_lookup: true,
        spawner: Some(Spawner::dedicated("strata-it-decompress", 2).unwrap()),
        ..CompressedSecondaryCacheOptions::new(16 * 1024 * KB)
    }));
    let cache = tiered(1024 * KB, secondary.clone());
    for id in 0..16u64 {
        secondary.insert_block(id).unwrap();
    }

    let options = LookupOptions::new().with_helper(&BLOCK).with_wait(false);
    let mut handles = (0..16u64)
        .map(|id| cache.lookup_with(&key(id), options.clone()).unwrap())
        .collect::<Vec<_>>();
    assert!(handles.iter().all(|h| h.value().is_none()));
    // A secondary miss is known right away.
    assert!(cache.lookup_with(&key(99), options).is_none());
    Handle::wait_all(&mut handles);

    for (id, handle) in handles.iter().enumerate() {
        assert_eq!(handle.state(), HandleState::Present);
        assert_eq!(block_of(handle).id, id as u64);
        // Kept by the secondary tier, so it will not be written back.
        assert!(!handle.helper().unwrap().is_secondary_compatible());
    }
    assert_eq!(cache.pinned_usage(), 16 * 2 * KB);
    drop(handles);
    assert_eq!(cache.pinned_usage(), 0);
    assert_eq!(secondary.len(), 16);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_wait_async() {
    let secondary = Arc::new(CompressedSecondaryCache::new(CompressedSecondaryCacheOptions {
        spawner: Spawner::try_current(),
        ..CompressedSecondaryCacheOptions::new(1024 * KB)
    }));
    secondary.insert_block(7).unwrap();
    let cache = strata::LruCache::new(strata::LruCacheOptions {
        secondary_cache: Some(secondary.clone()),
        ..strata::LruCacheOptions::new(1024 * KB)
    })
    .unwrap();

    let mut handle = cache
        .lookup_with(&key(7), LookupOptions::new().with_helper(&BLOCK).with_wait(false))
        .unwrap();
    handle.wait_async().await;
    assert_eq!(block_of(&handle).id, 7);
    assert_eq!(cache.usage(), 2 * KB);
}

#[test_log::test]
fn test_concurrent_mixed_workload() {
    const THREADS: u64 = 8;
    const OPS: usize = 5_000;
    const KEYS: u64 = 256;

    let secondary = Arc::new(CompressedSecondaryCache::new(CompressedSecondaryCacheOptions::new(4 * 1024 * KB)));
    let cache = tiered(128 * KB, secondary.clone());
    let before = DESTROYED.load(Ordering::Relaxed);
    let created = Arc::new(AtomicUsize::new(0));

    let workers = (0..THREADS)
        .map(|t| {
            let cache = cache.clone();
            let created = created.clone();
            thread::spawn(move || {
                let mut rng = SmallRng::seed_from_u64(t);
                let options = LookupOptions::new().with_helper(&BLOCK);
                for _ in 0..OPS {
                    let id = rng.random_range(0..KEYS);
                    match rng.random_range(0..10) {
                        0..=3 => {
                            let block = Block::new(id, rng.random_range(1..4) * KB);
                            let charge = block.payload.len();
                            if cache
                                .insert(&key(id), Box::new(block), &BLOCK, charge, Priority::Low)
                                .is_ok()
                            {
                                created.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        4..=8 => {
                            let found = cache.lookup_with(&key(id), options.clone());
                            if found.as_ref().is_some_and(|h| h.state() == HandleState::Present) {
                                assert_eq!(found.as_ref().map(|h| block_of(h).id), Some(id));
                            }
                        }
                        _ => cache.erase(&key(id)),
                    }
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(cache.pinned_usage(), 0);
    assert!(cache.usage() <= 128 * KB);

    let mut resident = 0;
    cache.apply_to_all_entries(
        &mut |_, object, charge, _| {
            assert_eq!(charge, object.downcast_ref::<Block>().unwrap().payload.len());
            resident += 1;
        },
        Default::default(),
    );
    assert_eq!(Some(resident), cache.occupancy_count());

    drop(cache);
    // Promoted blocks are created by the helper, so only a lower bound holds across tests.
    assert!(DESTROYED.load(Ordering::Relaxed) - before >= created.load(Ordering::Relaxed));
}

trait InsertBlock {
    fn insert_block(&self, id: u64) -> Result<()>;
}

impl InsertBlock for CompressedSecondaryCache {
    fn insert_block(&self, id: u64) -> Result<()> {
        SecondaryCache::insert(self, &key(id), Block::new(id, 2 * KB).encode().into())
    }
}
