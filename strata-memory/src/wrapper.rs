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

use strata_common::{allocator::MemoryAllocator, properties::Priority};

use crate::{
    cache::{ApplyToAllEntriesOptions, Cache, LookupOptions},
    error::InsertError,
    handle::Handle,
    helper::{EntryHelper, Object},
    shard::Visitor,
};

/// A [`Cache`] that forwards every operation to a target cache.
///
/// Meant as the base of decorators: wrap a cache, then override the operations of interest in a type that holds the
/// wrapper.
#[derive(Debug, Clone)]
pub struct CacheWrapper {
    target: Arc<dyn Cache>,
}

impl CacheWrapper {
    /// Wrap `target`.
    pub fn new(target: Arc<dyn Cache>) -> Self {
        Self { target }
    }

    /// The wrapped cache.
    pub fn target(&self) -> &Arc<dyn Cache> {
        &self.target
    }
}

impl Cache for CacheWrapper {
    fn name(&self) -> &'static str {
        self.target.name()
    }

    fn insert(
        &self,
        key: &[u8],
        object: Object,
        helper: &'static EntryHelper,
        charge: usize,
        priority: Priority,
    ) -> Result<(), InsertError> {
        self.target.insert(key, object, helper, charge, priority)
    }

    fn insert_with_handle(
        &self,
        key: &[u8],
        object: Object,
        helper: &'static EntryHelper,
        charge: usize,
        priority: Priority,
    ) -> Result<Handle, InsertError> {
        self.target.insert_with_handle(key, object, helper, charge, priority)
    }

    fn lookup(&self, key: &[u8]) -> Option<Handle> {
        self.target.lookup(key)
    }

    fn lookup_with(&self, key: &[u8], options: LookupOptions) -> Option<Handle> {
        self.target.lookup_with(key, options)
    }

    fn ref_handle(&self, handle: &Handle) -> Option<Handle> {
        self.target.ref_handle(handle)
    }

    fn release(&self, handle: Handle, useful: bool, erase_if_last_ref: bool) -> bool {
        self.target.release(handle, useful, erase_if_last_ref)
    }

    fn erase(&self, key: &[u8]) {
        self.target.erase(key)
    }

    fn new_id(&self) -> u64 {
        self.target.new_id()
    }

    fn set_capacity(&self, capacity: usize) {
        self.target.set_capacity(capacity)
    }

    fn capacity(&self) -> usize {
        self.target.capacity()
    }

    fn set_strict_capacity_limit(&self, strict: bool) {
        self.target.set_strict_capacity_limit(strict)
    }

    fn has_strict_capacity_limit(&self) -> bool {
        self.target.has_strict_capacity_limit()
    }

    fn usage(&self) -> usize {
        self.target.usage()
    }

    fn pinned_usage(&self) -> usize {
        self.target.pinned_usage()
    }

    fn occupancy_count(&self) -> Option<usize> {
        self.target.occupancy_count()
    }

    fn table_address_count(&self) -> Option<usize> {
        self.target.table_address_count()
    }

    fn apply_to_all_entries(&self, visitor: &mut Visitor<'_>, options: ApplyToAllEntriesOptions) {
        self.target.apply_to_all_entries(visitor, options)
    }

    fn erase_unref_entries(&self) {
        self.target.erase_unref_entries()
    }

    fn disown_data(&self) {
        self.target.disown_data()
    }

    fn printable_options(&self) -> String {
        self.target.printable_options()
    }

    fn report_problems(&self) {
        self.target.report_problems()
    }

    fn memory_allocator(&self) -> Option<Arc<dyn MemoryAllocator>> {
        self.target.memory_allocator()
    }
}
