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

pub use crate::{
    common::{
        allocator::MemoryAllocator,
        error::{Error, ErrorKind, Result},
        properties::{EntryRole, Priority},
        scope::Scope,
        spawn::Spawner,
        statistics::{MetricsStatistics, Statistics, Ticker},
    },
    memory::{
        parse_size, ApplyToAllEntriesOptions, Cache, CacheBuilder, CacheWrapper, CompressedSecondaryCache,
        CompressedSecondaryCacheOptions, Compression, CreateContext, CreateFn, DeleterFn, EntryHelper, Handle,
        HandleState, InsertError, LookupOptions, LruCache, LruCacheOptions, Object, ObjectRef, OfferPolicy, SaveToFn,
        SecondaryCache, SecondaryLookup, SecondaryValue, SizeFn, Visitor, MAX_SHARD_BITS, NOOP_HELPER,
    },
};
