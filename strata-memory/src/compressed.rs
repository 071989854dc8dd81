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

//! An in-memory secondary tier that keeps serialized entries lz4 compressed.

use std::{
    fmt::{Debug, Write as _},
    hash::BuildHasher,
    io::{Read, Write},
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use hashbrown::HashTable;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strata_common::{
    error::{Error, Result},
    spawn::Spawner,
};

use crate::{
    secondary::{SecondaryCache, SecondaryLookup, SecondaryValue},
    slab::{LinkedSlab, Token},
};

/// Compression algorithm of stored entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    /// Stored as is.
    None,
    /// lz4 frame.
    #[default]
    Lz4,
}

impl Compression {
    fn compress(self, data: &[u8]) -> Result<Bytes> {
        match self {
            Compression::None => Ok(Bytes::copy_from_slice(data)),
            Compression::Lz4 => {
                let mut encoder = lz4::EncoderBuilder::new()
                    .checksum(lz4::ContentChecksum::NoChecksum)
                    .build(Vec::with_capacity(data.len() / 2))?;
                encoder.write_all(data)?;
                let (buf, res) = encoder.finish();
                res?;
                Ok(buf.into())
            }
        }
    }

    fn decompress(self, data: &Bytes, len: usize) -> Result<Bytes> {
        match self {
            Compression::None => Ok(data.clone()),
            Compression::Lz4 => {
                let mut decoder = lz4::Decoder::new(&data[..])?;
                let mut buf = Vec::with_capacity(len);
                decoder.read_to_end(&mut buf)?;
                if buf.len() != len {
                    return Err(Error::corruption("decompressed length mismatch")
                        .with_context("expected", len)
                        .with_context("actual", buf.len()));
                }
                Ok(buf.into())
            }
        }
    }
}

/// Options of [`CompressedSecondaryCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressedSecondaryCacheOptions {
    /// Bytes of compressed data and keys the tier holds before evicting.
    pub capacity: usize,
    /// Compression of stored entries.
    pub compression: Compression,
    /// Entries shorter than this are stored uncompressed.
    pub min_compress_len: usize,
    /// Keep a copy after a hit instead of handing the entry back to the primary tier.
    pub keep_on_lookup: bool,
    /// Decompress on this spawner, making lookups asynchronous.
    #[serde(skip)]
    pub spawner: Option<Spawner>,
}

impl Default for CompressedSecondaryCacheOptions {
    fn default() -> Self {
        Self {
            capacity: 64 << 20,
            compression: Compression::default(),
            min_compress_len: 128,
            keep_on_lookup: false,
            spawner: None,
        }
    }
}

impl CompressedSecondaryCacheOptions {
    /// Default options with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
struct Item {
    key: Bytes,
    hash: u64,
    data: Bytes,
    len: usize,
    compression: Compression,
}

impl Item {
    fn charge(&self) -> usize {
        self.key.len() + self.data.len()
    }
}

#[derive(Debug, Default)]
struct Inner {
    slab: LinkedSlab<Item>,
    index: HashTable<(u64, Token)>,
    /// The least recently used item. Items are linked at the tail, right before it.
    head: Option<Token>,
    usage: usize,
}

impl Inner {
    fn find(&self, hash: u64, key: &[u8]) -> Option<Token> {
        self.index
            .find(hash, |(h, token)| {
                *h == hash && self.slab.get(*token).is_some_and(|item| item.key == key)
            })
            .map(|(_, token)| *token)
    }

    fn push(&mut self, token: Token) {
        match self.head {
            Some(head) => self.slab.link(token, Some(head)),
            None => self.head = Some(token),
        }
    }

    fn unlink(&mut self, token: Token) {
        let next = self.slab.unlink(token);
        if self.head == Some(token) {
            self.head = next;
        }
    }

    fn remove(&mut self, token: Token) -> Option<Item> {
        self.unlink(token);
        let item = self.slab.remove(token)?;
        if let Ok(entry) = self.index.find_entry(item.hash, |(_, t)| *t == token) {
            entry.remove();
        }
        self.usage -= item.charge();
        Some(item)
    }

    fn evict(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.usage > target {
            let Some(head) = self.head else {
                break;
            };
            self.remove(head);
            evicted += 1;
        }
        evicted
    }
}

/// A capacity bounded LRU store of compressed serialized entries.
pub struct CompressedSecondaryCache {
    inner: Mutex<Inner>,
    hash_builder: ahash::RandomState,
    options: CompressedSecondaryCacheOptions,

    inserts: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Debug for CompressedSecondaryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedSecondaryCache")
            .field("options", &self.options)
            .field("usage", &self.usage())
            .finish()
    }
}

impl CompressedSecondaryCache {
    /// Build an empty store.
    pub fn new(options: CompressedSecondaryCacheOptions) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            hash_builder: ahash::RandomState::new(),
            options,
            inserts: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Bytes held, keys included.
    pub fn usage(&self) -> usize {
        self.inner.lock().usage
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.inner.lock().slab.len()
    }

    /// Whether no entry is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.options.capacity
    }

    /// Forget every entry.
    pub fn clear(&self) {
        self.inner.lock().evict(0);
    }

    fn take(&self, key: &[u8]) -> Option<Item> {
        let hash = self.hash_builder.hash_one(key);
        let mut inner = self.inner.lock();
        let token = inner.find(hash, key)?;
        if !self.options.keep_on_lookup {
            return inner.remove(token);
        }
        inner.unlink(token);
        inner.push(token);
        inner.slab.get(token).map(|item| Item {
            key: item.key.clone(),
            hash,
            data: item.data.clone(),
            len: item.len,
            compression: item.compression,
        })
    }
}

impl SecondaryCache for CompressedSecondaryCache {
    fn name(&self) -> &str {
        "CompressedSecondaryCache"
    }

    fn insert(&self, key: &[u8], data: Bytes) -> Result<()> {
        let compression = if data.len() < self.options.min_compress_len {
            Compression::None
        } else {
            self.options.compression
        };
        let item = Item {
            key: Bytes::copy_from_slice(key),
            hash: self.hash_builder.hash_one(key),
            data: compression.compress(&data)?,
            len: data.len(),
            compression,
        };
        let charge = item.charge();
        if charge > self.options.capacity {
            return Err(Error::capacity_exceeded(self.options.capacity, self.usage(), charge));
        }

        let mut inner = self.inner.lock();
        if let Some(old) = inner.find(item.hash, key) {
            inner.remove(old);
        }
        let evicted = inner.evict(self.options.capacity - charge);
        let hash = item.hash;
        let token = inner.slab.insert(item);
        inner.index.insert_unique(hash, (hash, token), |(h, _)| *h);
        inner.push(token);
        inner.usage += charge;
        drop(inner);

        self.inserts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(len = data.len(), charge, evicted, "[compressed]: insert");
        Ok(())
    }

    fn lookup(&self, key: &[u8]) -> SecondaryLookup {
        let Some(item) = self.take(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return SecondaryLookup::Miss;
        };
        self.hits.fetch_add(1, Ordering::Relaxed);
        let kept = self.options.keep_on_lookup;

        let decompress = move || match item.compression.decompress(&item.data, item.len) {
            Ok(data) => Some(SecondaryValue { data, kept }),
            Err(e) => {
                tracing::debug!(%e, "[compressed]: decompress failed, treated as a miss");
                None
            }
        };

        match self.options.spawner.as_ref() {
            None => match decompress() {
                Some(value) => SecondaryLookup::Ready(value),
                None => SecondaryLookup::Miss,
            },
            Some(spawner) => {
                let handle = spawner.spawn_blocking(decompress);
                SecondaryLookup::Pending(Box::pin(async move { handle.await.ok().flatten() }))
            }
        }
    }

    fn erase(&self, key: &[u8]) {
        let hash = self.hash_builder.hash_one(key);
        let mut inner = self.inner.lock();
        if let Some(token) = inner.find(hash, key) {
            inner.remove(token);
        }
    }

    fn printable_options(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "    capacity : {}", self.options.capacity);
        let _ = writeln!(s, "    compression_type : {:?}", self.options.compression);
        let _ = writeln!(s, "    min_compress_len : {}", self.options.min_compress_len);
        let _ = writeln!(s, "    keep_on_lookup : {}", u8::from(self.options.keep_on_lookup));
        let _ = writeln!(s, "    async_lookup : {}", u8::from(self.options.spawner.is_some()));
        let _ = writeln!(
            s,
            "    inserts : {}, hits : {}, misses : {}",
            self.inserts.load(Ordering::Relaxed),
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed)
        );
        s
    }
}
