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

use std::{fmt::Debug, sync::Arc};

use strata_common::{allocator::MemoryAllocator, properties::Priority, statistics::Statistics};

use crate::{
    error::InsertError,
    handle::Handle,
    helper::{CreateContext, EntryHelper, Object},
    shard::Visitor,
};

/// Options of [`Cache::lookup_with`].
#[derive(Debug, Clone)]
pub struct LookupOptions {
    /// Helper used to rebuild the object from the secondary tier. Without one, or with one that does not support the
    /// secondary tier, a primary miss is final.
    pub helper: Option<&'static EntryHelper>,
    /// Passed to the create callback of the helper.
    pub create_context: Option<Arc<CreateContext>>,
    /// Priority of the promoted entry.
    pub priority: Priority,
    /// Resolve a secondary tier fetch before returning.
    pub wait: bool,
    /// Sink of the lookup counters.
    pub statistics: Option<Arc<dyn Statistics>>,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            helper: None,
            create_context: None,
            priority: Priority::Low,
            wait: true,
            statistics: None,
        }
    }
}

impl LookupOptions {
    /// Options of a primary only, waiting lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the helper used for promotion.
    pub fn with_helper(mut self, helper: &'static EntryHelper) -> Self {
        self.helper = Some(helper);
        self
    }

    /// Set the create context.
    pub fn with_create_context(mut self, create_context: Arc<CreateContext>) -> Self {
        self.create_context = Some(create_context);
        self
    }

    /// Set the priority of the promoted entry.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set whether to wait for the secondary tier.
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Set the statistics sink.
    pub fn with_statistics(mut self, statistics: Arc<dyn Statistics>) -> Self {
        self.statistics = Some(statistics);
        self
    }
}

/// Options of [`Cache::apply_to_all_entries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyToAllEntriesOptions {
    /// Entries visited per lock acquisition. Fewer entries mean shorter lock hold times but more acquisitions.
    pub average_entries_per_lock: usize,
}

impl Default for ApplyToAllEntriesOptions {
    fn default() -> Self {
        Self {
            average_entries_per_lock: 256,
        }
    }
}

/// The public contract of an object cache.
///
/// Every operation may be called concurrently from any number of threads, apart from operations on one pending
/// [`Handle`], which require `&mut` access anyway.
pub trait Cache: Send + Sync + Debug + 'static {
    /// Name of the implementation.
    fn name(&self) -> &'static str;

    /// Insert `object` under `key`, replacing the current binding of the key for future lookups.
    ///
    /// On success the cache owns the object and destroys it with `helper` exactly once. A rejected object is returned
    /// within the error.
    fn insert(
        &self,
        key: &[u8],
        object: Object,
        helper: &'static EntryHelper,
        charge: usize,
        priority: Priority,
    ) -> Result<(), InsertError>;

    /// Like [`Cache::insert`], returning a handle that keeps the entry resident.
    fn insert_with_handle(
        &self,
        key: &[u8],
        object: Object,
        helper: &'static EntryHelper,
        charge: usize,
        priority: Priority,
    ) -> Result<Handle, InsertError>;

    /// Look up `key` in the primary tier only.
    fn lookup(&self, key: &[u8]) -> Option<Handle> {
        self.lookup_with(key, LookupOptions::default())
    }

    /// Look up `key`, continuing in the secondary tier on a primary miss if `options` allow it.
    fn lookup_with(&self, key: &[u8], options: LookupOptions) -> Option<Handle>;

    /// Take one more reference of the entry of a present handle. `None` for pending or failed handles.
    fn ref_handle(&self, handle: &Handle) -> Option<Handle> {
        handle.try_ref()
    }

    /// Release a handle. Returns whether the entry has left the cache.
    ///
    /// A not `useful` entry is moved to the cold end of its pool. With `erase_if_last_ref`, releasing the last
    /// reference erases the entry.
    ///
    /// # Panics
    ///
    /// In debug builds, if the handle is still pending.
    fn release(&self, handle: Handle, useful: bool, erase_if_last_ref: bool) -> bool {
        handle.release(useful, erase_if_last_ref)
    }

    /// Unbind `key`. The object is destroyed once its last handle is released.
    fn erase(&self, key: &[u8]);

    /// A new id, unique for this cache instance, for callers to build distinct key prefixes.
    fn new_id(&self) -> u64;

    /// Change the capacity. Unreferenced entries are evicted to fit, referenced ones once released.
    fn set_capacity(&self, capacity: usize);

    /// Total capacity.
    fn capacity(&self) -> usize;

    /// Change whether inserts that cannot fit are rejected. Applies to future inserts.
    fn set_strict_capacity_limit(&self, strict: bool);

    /// Whether inserts that cannot fit are rejected.
    fn has_strict_capacity_limit(&self) -> bool;

    /// Total charge of resident entries.
    fn usage(&self) -> usize;

    /// Total charge of referenced entries.
    fn pinned_usage(&self) -> usize;

    /// Number of entries bound to a key. `None` if unsupported.
    fn occupancy_count(&self) -> Option<usize>;

    /// Number of slots of the key tables. `None` if unsupported.
    fn table_address_count(&self) -> Option<usize>;

    /// Call `visitor` with the key, object, charge and helper of every entry.
    ///
    /// The visit is not a consistent snapshot. The visitor runs with locks held and must not call back into the cache.
    fn apply_to_all_entries(&self, visitor: &mut Visitor<'_>, options: ApplyToAllEntriesOptions);

    /// Erase every unreferenced entry.
    fn erase_unref_entries(&self);

    /// Give up every entry without destroying the objects, for a fast shutdown.
    fn disown_data(&self);

    /// Human readable options.
    fn printable_options(&self) -> String;

    /// Log detected problems.
    fn report_problems(&self);

    /// The allocator handed to the entry callbacks.
    fn memory_allocator(&self) -> Option<Arc<dyn MemoryAllocator>>;
}
