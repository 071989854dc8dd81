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

#[cfg(any(test, feature = "test_utils"))]
pub use crate::test_utils::{
    CountingStatistics, DestroyCounter, MockSecondary, TestObject, TEST_HELPER, TEST_HELPER_PLAIN,
};
pub use strata_common::{
    allocator::MemoryAllocator,
    error::{Error, ErrorKind, Result},
    properties::{EntryRole, Priority},
    spawn::Spawner,
    statistics::{MetricsStatistics, Statistics, Ticker},
};

pub use crate::{
    cache::{ApplyToAllEntriesOptions, Cache, LookupOptions},
    compressed::{Compression, CompressedSecondaryCache, CompressedSecondaryCacheOptions},
    error::InsertError,
    handle::{Handle, HandleState},
    helper::{
        CreateContext, CreateFn, DeleterFn, EntryHelper, Object, ObjectRef, SaveToFn, SizeFn, NOOP_HELPER,
    },
    options::{parse_size, CacheBuilder, LruCacheOptions, OfferPolicy, MAX_SHARD_BITS},
    raw::LruCache,
    secondary::{SecondaryCache, SecondaryLookup, SecondaryValue},
    shard::Visitor,
    wrapper::CacheWrapper,
};
