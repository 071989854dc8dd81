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
    fmt::Debug,
    sync::{
        atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
};

use bitflags::bitflags;
use bytes::Bytes;
use strata_common::{allocator::MemoryAllocator, properties::Priority};

use crate::{
    helper::{EntryHelper, Object, ObjectRef},
    slab::Token,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        /// The record is bound to its key in the table of its shard.
        const IN_TABLE = 0b0000_0001;
        /// The object is leaked instead of destroyed when the record drops.
        const DISOWNED = 0b0000_0010;
    }
}

/// [`Record`] is the internal entry of the cache.
///
/// The object is destroyed when the last `Arc` of the record drops. The table holds one `Arc` while the record is
/// bound to its key, and every handle holds another, so destruction happens exactly once, after the record is unbound
/// and unreferenced.
///
/// `refs`, `flags` and `token` are only modified with the lock of the owning shard held.
pub struct Record {
    key: Bytes,
    hash: u64,
    charge: usize,
    priority: Priority,
    helper: &'static EntryHelper,
    object: Option<Object>,
    allocator: Option<Arc<dyn MemoryAllocator>>,

    refs: AtomicUsize,
    flags: AtomicU8,
    token: AtomicU32,
}

impl Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("hash", &self.hash)
            .field("charge", &self.charge)
            .field("priority", &self.priority)
            .field("refs", &self.refs())
            .field("flags", &self.flags())
            .finish()
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        if self.flags().contains(Flags::DISOWNED) {
            std::mem::forget(object);
        } else {
            self.helper.destroy(object, self.allocator.as_deref());
        }
    }
}

impl Record {
    pub fn new(
        key: &[u8],
        hash: u64,
        object: Object,
        helper: &'static EntryHelper,
        charge: usize,
        priority: Priority,
        allocator: Option<Arc<dyn MemoryAllocator>>,
    ) -> Self {
        Self {
            key: Bytes::copy_from_slice(key),
            hash,
            charge,
            priority,
            helper,
            object: Some(object),
            allocator,
            refs: AtomicUsize::new(0),
            flags: AtomicU8::new(0),
            token: AtomicU32::new(0),
        }
    }

    /// Take the object back. The record will destroy nothing when it drops.
    pub fn take_object(&mut self) -> Option<Object> {
        self.object.take()
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn key_bytes(&self) -> &Bytes {
        &self.key
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn charge(&self) -> usize {
        self.charge
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn helper(&self) -> &'static EntryHelper {
        self.helper
    }

    pub fn object(&self) -> Option<ObjectRef<'_>> {
        self.object.as_deref()
    }

    pub fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Returns the reference count after the increment.
    pub fn inc_refs(&self) -> usize {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the reference count after the decrement.
    pub fn dec_refs(&self) -> usize {
        self.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn flags(&self) -> Flags {
        Flags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub fn set_flags(&self, flags: Flags, enable: bool) {
        if enable {
            self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
        } else {
            self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
        }
    }

    pub fn is_in_table(&self) -> bool {
        self.flags().contains(Flags::IN_TABLE)
    }

    pub fn token(&self) -> Option<Token> {
        Token::new(self.token.load(Ordering::Acquire))
    }

    pub fn set_token(&self, token: Option<Token>) {
        self.token.store(token.map_or(0, |t| t.get()), Ordering::Release);
    }
}
