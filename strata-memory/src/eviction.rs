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

//! Priority pooled LRU.
//!
//! Every record of a shard lives in the slab. Unreferenced records are linked into one of three pools, one per
//! [`Priority`], each ordered from the oldest (head) to the most recently used (tail). Referenced records are not
//! linked anywhere, so they can never be picked for eviction.
//!
//! The high priority pool is capped at `capacity * high_pri_pool_ratio`, its oldest records overflow into the low
//! priority pool. With a non-zero `low_pri_pool_ratio`, the low priority pool is capped the same way and overflows into
//! the bottom priority pool.

use std::sync::Arc;

use strata_common::{properties::Priority, strict_assert};

use crate::{
    record::Record,
    slab::{LinkedSlab, Token},
};

#[derive(Debug)]
pub struct Node {
    pub record: Arc<Record>,
    /// The pool the record is linked into, `None` while referenced.
    pub pool: Option<Priority>,
}

#[derive(Debug)]
pub struct PriorityLru {
    slab: LinkedSlab<Node>,
    heads: [Option<Token>; 3],
    pool_usage: [usize; 3],

    high_pri_pool_ratio: f64,
    low_pri_pool_ratio: f64,
    high_pri_pool_capacity: usize,
    low_pri_pool_capacity: usize,
}

impl PriorityLru {
    pub fn new(capacity: usize, high_pri_pool_ratio: f64, low_pri_pool_ratio: f64) -> Self {
        strict_assert!((0.0..=1.0).contains(&high_pri_pool_ratio));
        strict_assert!((0.0..=1.0).contains(&low_pri_pool_ratio));
        let mut lru = Self {
            slab: LinkedSlab::new(),
            heads: [None; 3],
            pool_usage: [0; 3],
            high_pri_pool_ratio,
            low_pri_pool_ratio,
            high_pri_pool_capacity: 0,
            low_pri_pool_capacity: 0,
        };
        lru.update(capacity);
        lru
    }

    /// Recompute the pool caps for a new capacity.
    pub fn update(&mut self, capacity: usize) {
        self.high_pri_pool_capacity = (capacity as f64 * self.high_pri_pool_ratio) as usize;
        self.low_pri_pool_capacity = if self.low_pri_pool_ratio > 0.0 {
            (capacity as f64 * self.low_pri_pool_ratio) as usize
        } else {
            usize::MAX
        };
        self.maintain_pools();
    }

    /// Store a record, initially not linked into any pool.
    pub fn insert(&mut self, record: Arc<Record>) -> Token {
        self.slab.insert(Node { record, pool: None })
    }

    pub fn get(&self, token: Token) -> Option<&Node> {
        self.slab.get(token)
    }

    pub fn record(&self, token: Token) -> Option<&Arc<Record>> {
        self.slab.get(token).map(|node| &node.record)
    }

    #[cfg_attr(not(test), expect(dead_code))]
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    /// Unlink a record from its pool if linked, and drop it from the slab.
    pub fn remove(&mut self, token: Token) -> Option<Arc<Record>> {
        self.detach(token);
        self.slab.remove(token).map(|node| node.record)
    }

    /// Link a record at the tail of the pool of its priority, or at the head if `cold`.
    pub fn push(&mut self, token: Token, cold: bool) {
        let Some(priority) = self.slab.get(token).map(|node| node.record.priority()) else {
            return;
        };
        self.link(token, priority, cold);
        self.maintain_pools();
    }

    /// Unlink a record from its pool, keeping it in the slab. Returns the pool it was linked into.
    pub fn detach(&mut self, token: Token) -> Option<Priority> {
        let node = self.slab.get_mut(token)?;
        let pool = node.pool.take()?;
        let charge = node.record.charge();
        let next = self.slab.unlink(token);
        let i = pool.index();
        if self.heads[i] == Some(token) {
            self.heads[i] = next;
        }
        self.pool_usage[i] -= charge;
        Some(pool)
    }

    /// Unlink the oldest record of the most disposable non-empty pool.
    pub fn pop(&mut self) -> Option<Token> {
        let token = Priority::EVICTION_ORDER.iter().find_map(|p| self.heads[p.index()])?;
        self.detach(token);
        Some(token)
    }

    /// Usage of the records linked into `pool`.
    pub fn pool_usage(&self, pool: Priority) -> usize {
        self.pool_usage[pool.index()]
    }

    pub fn iter_from(&self, continuation: Option<Token>) -> impl Iterator<Item = (Token, &Node)> + '_ {
        self.slab.iter_from(continuation)
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.slab.tokens()
    }

    fn link(&mut self, token: Token, pool: Priority, cold: bool) {
        let Some(node) = self.slab.get_mut(token) else {
            return;
        };
        strict_assert!(node.pool.is_none());
        node.pool = Some(pool);
        let charge = node.record.charge();
        let i = pool.index();
        self.slab.link(token, self.heads[i]);
        if cold || self.heads[i].is_none() {
            self.heads[i] = Some(token);
        }
        self.pool_usage[i] += charge;
    }

    fn maintain_pools(&mut self) {
        self.overflow(Priority::High, Priority::Low, self.high_pri_pool_capacity);
        self.overflow(Priority::Low, Priority::Bottom, self.low_pri_pool_capacity);
    }

    fn overflow(&mut self, from: Priority, to: Priority, cap: usize) {
        while self.pool_usage[from.index()] > cap {
            let Some(head) = self.heads[from.index()] else {
                break;
            };
            self.detach(head);
            self.link(head, to, false);
        }
    }

    /// Walk a pool from the oldest to the newest record.
    #[cfg(test)]
    pub fn pool(&self, pool: Priority) -> Vec<Token> {
        self.slab.walk(self.heads[pool.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::NOOP_HELPER;

    fn record(key: &str, charge: usize, priority: Priority) -> Arc<Record> {
        Arc::new(Record::new(
            key.as_bytes(),
            0,
            Box::new(()),
            &NOOP_HELPER,
            charge,
            priority,
            None,
        ))
    }

    fn keys(lru: &PriorityLru, pool: Priority) -> Vec<String> {
        lru.pool(pool)
            .into_iter()
            .map(|t| String::from_utf8(lru.record(t).unwrap().key().to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_eviction_order() {
        let mut lru = PriorityLru::new(100, 0.5, 0.0);
        let tokens = [
            ("h1", Priority::High),
            ("l1", Priority::Low),
            ("b1", Priority::Bottom),
            ("l2", Priority::Low),
            ("b2", Priority::Bottom),
        ]
        .into_iter()
        .map(|(k, p)| {
            let t = lru.insert(record(k, 1, p));
            lru.push(t, false);
            t
        })
        .collect::<Vec<_>>();

        assert_eq!(keys(&lru, Priority::Bottom), vec!["b1", "b2"]);
        assert_eq!(keys(&lru, Priority::Low), vec!["l1", "l2"]);
        assert_eq!(keys(&lru, Priority::High), vec!["h1"]);

        let popped = std::iter::from_fn(|| lru.pop()).collect::<Vec<_>>();
        assert_eq!(popped, vec![tokens[2], tokens[4], tokens[1], tokens[3], tokens[0]]);
        assert_eq!(lru.len(), 5);
        for p in Priority::EVICTION_ORDER {
            assert_eq!(lru.pool_usage(p), 0);
        }
    }

    #[test]
    fn test_detach_and_cold_push() {
        let mut lru = PriorityLru::new(100, 0.5, 0.0);
        let a = lru.insert(record("a", 1, Priority::Low));
        let b = lru.insert(record("b", 1, Priority::Low));
        let c = lru.insert(record("c", 1, Priority::Low));
        for t in [a, b, c] {
            lru.push(t, false);
        }

        assert_eq!(lru.detach(a), Some(Priority::Low));
        assert_eq!(lru.detach(a), None);
        assert_eq!(keys(&lru, Priority::Low), vec!["b", "c"]);

        lru.push(a, true);
        assert_eq!(keys(&lru, Priority::Low), vec!["a", "b", "c"]);

        lru.detach(a);
        lru.push(a, false);
        assert_eq!(keys(&lru, Priority::Low), vec!["b", "c", "a"]);

        let removed = lru.remove(c).unwrap();
        assert_eq!(removed.key(), b"c");
        assert_eq!(keys(&lru, Priority::Low), vec!["b", "a"]);
        assert_eq!(lru.pool_usage(Priority::Low), 2);
    }

    #[test]
    fn test_high_priority_overflow() {
        let mut lru = PriorityLru::new(100, 0.2, 0.0);
        for k in ["h1", "h2", "h3"] {
            let t = lru.insert(record(k, 10, Priority::High));
            lru.push(t, false);
        }
        assert_eq!(keys(&lru, Priority::High), vec!["h2", "h3"]);
        assert_eq!(keys(&lru, Priority::Low), vec!["h1"]);
        assert_eq!(lru.pool_usage(Priority::High), 20);

        // Shrinking overflows the pool again.
        lru.update(50);
        assert_eq!(keys(&lru, Priority::High), vec!["h3"]);
        assert_eq!(keys(&lru, Priority::Low), vec!["h1", "h2"]);
    }

    #[test]
    fn test_low_priority_overflow() {
        let mut lru = PriorityLru::new(100, 0.0, 0.1);
        for k in ["l1", "l2"] {
            let t = lru.insert(record(k, 10, Priority::Low));
            lru.push(t, false);
        }
        let t = lru.insert(record("h1", 10, Priority::High));
        lru.push(t, false);

        assert!(keys(&lru, Priority::High).is_empty());
        assert_eq!(keys(&lru, Priority::Low), vec!["h1"]);
        assert_eq!(keys(&lru, Priority::Bottom), vec!["l1", "l2"]);
    }
}
