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

use hashbrown::HashTable;
use strata_common::{error::Error, strict_assert};

use crate::{
    eviction::PriorityLru,
    helper::{EntryHelper, ObjectRef},
    record::{Flags, Record},
    slab::Token,
};

/// A record that has left its shard. Dropped, and maybe offered to the secondary tier, out of the lock.
#[derive(Debug)]
pub struct Garbage {
    pub record: Arc<Record>,
    /// Left for capacity reasons. Only evicted records are offered to the secondary tier.
    pub evicted: bool,
}

impl Garbage {
    fn evicted(record: Arc<Record>) -> Self {
        Self { record, evicted: true }
    }

    fn removed(record: Arc<Record>) -> Self {
        Self { record, evicted: false }
    }
}

/// Outcome of a successful insertion.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// The record is bound to its key.
    Resident,
    /// The record did not fit and was released right away. Only happens without a handle or a strict limit.
    Evicted,
}

pub type Visitor<'a> = dyn FnMut(&[u8], ObjectRef<'_>, usize, &'static EntryHelper) + 'a;

/// One partition of the cache, always accessed with its lock held.
///
/// `usage` covers records bound in the table plus detached records, which are unbound but still referenced.
/// `pinned` covers every record with a non-zero reference count.
#[derive(Debug)]
pub struct Shard {
    table: HashTable<(u64, Token)>,
    lru: PriorityLru,

    usage: usize,
    pinned: usize,
    detached: usize,
    capacity: usize,
}

impl Shard {
    pub fn new(capacity: usize, high_pri_pool_ratio: f64, low_pri_pool_ratio: f64) -> Self {
        Self {
            table: HashTable::new(),
            lru: PriorityLru::new(capacity, high_pri_pool_ratio, low_pri_pool_ratio),
            usage: 0,
            pinned: 0,
            detached: 0,
            capacity,
        }
    }

    fn find(&self, hash: u64, key: &[u8]) -> Option<Token> {
        self.table
            .find(hash, |(h, t)| {
                *h == hash && self.lru.record(*t).is_some_and(|r| r.key() == key)
            })
            .map(|(_, t)| *t)
    }

    fn unbind(&mut self, hash: u64, token: Token) {
        if let Ok(entry) = self.table.find_entry(hash, |(_, t)| *t == token) {
            entry.remove();
        }
    }

    /// Remove a bound record from the table and the slab, and stop accounting for it.
    fn take(&mut self, token: Token) -> Option<Arc<Record>> {
        let record = self.lru.remove(token)?;
        self.unbind(record.hash(), token);
        record.set_flags(Flags::IN_TABLE, false);
        record.set_token(None);
        self.usage -= record.charge();
        Some(record)
    }

    /// Unbind a record from its key. Unreferenced records are dropped, referenced ones become detached.
    fn unbind_record(&mut self, token: Token, garbages: &mut Vec<Garbage>) {
        let Some(record) = self.lru.record(token).cloned() else {
            return;
        };
        if record.refs() == 0 {
            if let Some(record) = self.take(token) {
                garbages.push(Garbage::removed(record));
            }
            return;
        }
        self.lru.remove(token);
        self.unbind(record.hash(), token);
        record.set_flags(Flags::IN_TABLE, false);
        record.set_token(None);
        self.detached += record.charge();
    }

    /// Evict unreferenced records until the usage fits `target`.
    fn evict(&mut self, target: usize, garbages: &mut Vec<Garbage>) {
        while self.usage > target {
            let Some(token) = self.lru.pop() else {
                break;
            };
            if let Some(record) = self.take(token) {
                tracing::trace!(hash = record.hash(), charge = record.charge(), "[shard]: evict");
                garbages.push(Garbage::evicted(record));
            }
        }
    }

    /// Bind `record` to its key, evicting as needed.
    ///
    /// With `pin`, the caller receives the first reference of the record. A strict limit that cannot be met leaves the
    /// shard as it is, apart from the evictions already made.
    pub fn insert(
        &mut self,
        record: &Arc<Record>,
        pin: bool,
        strict: bool,
        garbages: &mut Vec<Garbage>,
    ) -> Result<Admission, Error> {
        let charge = record.charge();
        self.evict(self.capacity.saturating_sub(charge), garbages);

        if self.usage + charge > self.capacity {
            if strict {
                return Err(Error::capacity_exceeded(self.capacity, self.usage, charge));
            }
            if !pin {
                garbages.push(Garbage::evicted(record.clone()));
                return Ok(Admission::Evicted);
            }
        }

        if let Some(old) = self.find(record.hash(), record.key()) {
            self.unbind_record(old, garbages);
        }

        let token = self.lru.insert(record.clone());
        let hash = record.hash();
        self.table.insert_unique(hash, (hash, token), |(h, _)| *h);
        record.set_token(Some(token));
        record.set_flags(Flags::IN_TABLE, true);
        self.usage += charge;

        if pin {
            record.inc_refs();
            self.pinned += charge;
        } else {
            self.lru.push(token, false);
        }
        Ok(Admission::Resident)
    }

    /// Reference the record bound to `key`.
    pub fn lookup(&mut self, hash: u64, key: &[u8]) -> Option<Arc<Record>> {
        let token = self.find(hash, key)?;
        let record = self.lru.record(token)?.clone();
        if record.refs() == 0 {
            self.lru.detach(token);
            self.pinned += record.charge();
        }
        record.inc_refs();
        Some(record)
    }

    /// Add one more reference to an already referenced record.
    pub fn acquire(&mut self, record: &Arc<Record>) {
        strict_assert!(record.refs() > 0);
        if record.refs() == 0 {
            return;
        }
        record.inc_refs();
    }

    /// Drop one reference. Returns whether the record has left the cache.
    pub fn release(
        &mut self,
        record: &Arc<Record>,
        useful: bool,
        erase_if_last_ref: bool,
        garbages: &mut Vec<Garbage>,
    ) -> bool {
        strict_assert!(record.refs() > 0);
        if record.refs() == 0 || record.dec_refs() > 0 {
            return false;
        }
        let charge = record.charge();
        self.pinned -= charge;

        if !record.is_in_table() {
            self.detached -= charge;
            self.usage -= charge;
            garbages.push(Garbage::removed(record.clone()));
            return true;
        }

        let Some(token) = record.token() else {
            return false;
        };
        if erase_if_last_ref || self.usage > self.capacity {
            if let Some(record) = self.take(token) {
                garbages.push(Garbage {
                    record,
                    evicted: !erase_if_last_ref,
                });
            }
            return true;
        }

        self.lru.push(token, !useful);
        false
    }

    pub fn erase(&mut self, hash: u64, key: &[u8], garbages: &mut Vec<Garbage>) {
        if let Some(token) = self.find(hash, key) {
            self.unbind_record(token, garbages);
        }
    }

    pub fn set_capacity(&mut self, capacity: usize, garbages: &mut Vec<Garbage>) {
        self.capacity = capacity;
        self.lru.update(capacity);
        self.evict(capacity, garbages);
    }

    pub fn erase_unref_entries(&mut self, garbages: &mut Vec<Garbage>) {
        while let Some(token) = self.lru.pop() {
            if let Some(record) = self.take(token) {
                garbages.push(Garbage::removed(record));
            }
        }
    }

    /// Give up every record. Objects will be leaked rather than destroyed.
    pub fn disown(&mut self, garbages: &mut Vec<Garbage>) {
        for token in self.lru.tokens() {
            if let Some(record) = self.lru.record(token) {
                record.set_flags(Flags::DISOWNED, true);
            }
            self.unbind_record(token, garbages);
        }
    }

    /// Visit at most `limit` records after `continuation`. Returns where to continue, `None` once exhausted.
    pub fn apply(&self, continuation: Option<Token>, limit: usize, visitor: &mut Visitor<'_>) -> Option<Token> {
        let mut last = None;
        let mut visited = 0;
        for (token, node) in self.lru.iter_from(continuation).take(limit) {
            if let Some(object) = node.record.object() {
                visitor(node.record.key(), object, node.record.charge(), node.record.helper());
            }
            last = Some(token);
            visited += 1;
        }
        if visited < limit {
            None
        } else {
            last
        }
    }

    pub fn usage(&self) -> usize {
        self.usage
    }

    pub fn pinned_usage(&self) -> usize {
        self.pinned
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn occupancy(&self) -> usize {
        self.table.len()
    }

    pub fn table_address_count(&self) -> usize {
        self.table.capacity()
    }

    /// Check the accounting against the records actually held.
    #[cfg(test)]
    pub fn validate(&self) {
        let mut usage = 0;
        let mut pinned = 0;
        for (token, node) in self.lru.iter_from(None) {
            let record = &node.record;
            assert!(record.is_in_table());
            assert_eq!(record.token(), Some(token));
            assert_eq!(self.find(record.hash(), record.key()), Some(token));
            usage += record.charge();
            if record.refs() > 0 {
                assert!(node.pool.is_none(), "a referenced record must not be evictable");
                pinned += record.charge();
            } else {
                assert!(node.pool.is_some(), "an unreferenced record must be evictable");
            }
        }
        assert_eq!(self.table.len(), self.lru.len());
        assert_eq!(usage + self.detached, self.usage);
        assert_eq!(pinned + self.detached, self.pinned);
    }
}
