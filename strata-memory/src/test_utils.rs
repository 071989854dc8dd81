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

//! Utilities for testing.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use strata_common::{
    allocator::MemoryAllocator,
    error::{Error, Result},
    properties::EntryRole,
    statistics::{Statistics, Ticker},
};
use tokio::sync::Semaphore;

use crate::{
    helper::{CreateContext, EntryHelper, Object, ObjectRef},
    secondary::{SecondaryCache, SecondaryLookup, SecondaryValue},
};

/// A test object that reports its destruction to a [`DestroyCounter`].
#[derive(Debug)]
pub struct TestObject {
    /// Payload of the object.
    pub data: Vec<u8>,
    counter: DestroyCounter,
}

/// Counts destroyed [`TestObject`]s.
///
/// Pass a clone as the create context of lookups to count rebuilt objects too.
#[derive(Debug, Clone, Default)]
pub struct DestroyCounter(Arc<AtomicUsize>);

impl DestroyCounter {
    /// Build a test object counted by this counter.
    pub fn object(&self, data: &[u8]) -> Object {
        Box::new(TestObject {
            data: data.to_vec(),
            counter: self.clone(),
        })
    }

    /// Number of destroyed objects.
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

fn destroy(object: Object, _: Option<&dyn MemoryAllocator>) {
    if let Ok(object) = object.downcast::<TestObject>() {
        object.counter.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn size(object: ObjectRef<'_>) -> usize {
    object
        .downcast_ref::<TestObject>()
        .map(|o| o.data.len())
        .unwrap_or_default()
}

fn save_to(object: ObjectRef<'_>, offset: usize, out: &mut [u8]) -> Result<()> {
    let object = object
        .downcast_ref::<TestObject>()
        .ok_or_else(|| Error::invalid_argument("not a test object"))?;
    out.copy_from_slice(&object.data[offset..offset + out.len()]);
    Ok(())
}

/// Payloads starting with this prefix fail to be rebuilt.
pub const CORRUPTED: &[u8] = b"corrupted";

fn create(data: &[u8], context: Option<&CreateContext>, _: Option<&dyn MemoryAllocator>) -> Result<(Object, usize)> {
    if data.starts_with(CORRUPTED) {
        return Err(Error::reconstruction("corrupted test object"));
    }
    let counter = context
        .and_then(|c| c.downcast_ref::<DestroyCounter>())
        .cloned()
        .unwrap_or_default();
    Ok((counter.object(data), data.len()))
}

/// Test helper without secondary tier support.
pub static TEST_HELPER_PLAIN: EntryHelper = EntryHelper::with_deleter(EntryRole::DataBlock, destroy);

/// Test helper with secondary tier support.
pub static TEST_HELPER: EntryHelper =
    EntryHelper::with_secondary(EntryRole::DataBlock, Some(destroy), size, save_to, create, &TEST_HELPER_PLAIN);

/// Payload of a test object.
pub fn data_of(object: ObjectRef<'_>) -> Option<&[u8]> {
    object.downcast_ref::<TestObject>().map(|o| o.data.as_slice())
}

/// A [`Statistics`] sink whose counters can be read back.
#[derive(Debug, Default)]
pub struct CountingStatistics {
    counters: [AtomicUsize; Ticker::COUNT],
}

impl CountingStatistics {
    /// Current value of the counter of `ticker`.
    pub fn get(&self, ticker: Ticker) -> usize {
        self.counters[ticker as usize].load(Ordering::SeqCst)
    }
}

impl Statistics for CountingStatistics {
    fn record_tick(&self, ticker: Ticker, count: u64) {
        self.counters[ticker as usize].fetch_add(count as usize, Ordering::SeqCst);
    }
}

/// An in-memory secondary tier that records its traffic.
///
/// In pending mode, lookups stay pending until [`MockSecondary::open`] is called.
#[derive(Debug)]
pub struct MockSecondary {
    entries: Mutex<HashMap<Vec<u8>, Bytes>>,
    inserts: AtomicUsize,
    lookups: AtomicUsize,
    keep: bool,
    pending: bool,
    gate: Arc<Semaphore>,
    stall: Mutex<()>,
}

impl Default for MockSecondary {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl MockSecondary {
    /// `keep` controls whether entries survive lookups, `pending` whether lookups complete asynchronously.
    pub fn new(keep: bool, pending: bool) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            inserts: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            keep,
            pending,
            gate: Arc::new(Semaphore::new(0)),
            stall: Mutex::new(()),
        }
    }

    /// Store an entry directly.
    pub fn put(&self, key: &[u8], data: &[u8]) {
        self.entries.lock().insert(key.to_vec(), Bytes::copy_from_slice(data));
    }

    /// Get an entry without counting a lookup.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.entries.lock().get(key).cloned()
    }

    /// Number of stored inserts.
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of lookups.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Let every pending lookup complete.
    pub fn open(&self) {
        self.gate.close();
    }

    /// Inserts block until the guard drops.
    pub fn stall_inserts(&self) -> MutexGuard<'_, ()> {
        self.stall.lock()
    }
}

impl SecondaryCache for MockSecondary {
    fn name(&self) -> &str {
        "MockSecondary"
    }

    fn insert(&self, key: &[u8], data: Bytes) -> Result<()> {
        let _stall = self.stall.lock();
        self.entries.lock().insert(key.to_vec(), data);
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn lookup(&self, key: &[u8]) -> SecondaryLookup {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let data = {
            let mut entries = self.entries.lock();
            if self.keep {
                entries.get(key).cloned()
            } else {
                entries.remove(key)
            }
        };
        let value = data.map(|data| SecondaryValue { data, kept: self.keep });
        if self.pending {
            let gate = self.gate.clone();
            return SecondaryLookup::Pending(Box::pin(async move {
                let _ = gate.acquire().await;
                value
            }));
        }
        match value {
            Some(value) => SecondaryLookup::Ready(value),
            None => SecondaryLookup::Miss,
        }
    }

    fn erase(&self, key: &[u8]) {
        self.entries.lock().remove(key);
    }
}
