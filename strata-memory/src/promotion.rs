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

//! Promotion of entries from the secondary tier into the primary tier.
//!
//! A primary miss with a secondary compatible helper queries the secondary tier. Bytes that are available right away
//! are rebuilt and inserted before the lookup returns. Otherwise the lookup returns a pending handle, which is
//! resolved by polling or waiting on it.

use std::sync::Arc;

use bytes::Bytes;
use strata_common::{
    properties::Priority,
    statistics::{Statistics, Ticker},
};

use crate::{
    cache::LookupOptions,
    handle::{Handle, HandleState, State},
    helper::{CreateContext, EntryHelper},
    raw::LruCacheInner,
    secondary::{SecondaryCache, SecondaryLookup, SecondaryValue},
};

/// Everything needed to finish a lookup once the secondary tier has answered.
pub(crate) struct Pending {
    pub cache: Arc<LruCacheInner>,
    pub key: Bytes,
    pub hash: u64,
    pub helper: &'static EntryHelper,
    pub create_context: Option<Arc<CreateContext>>,
    pub priority: Priority,
    pub statistics: Option<Arc<dyn Statistics>>,
}

impl Pending {
    fn tick(&self, ticker: Ticker) {
        if let Some(statistics) = self.statistics.as_ref() {
            statistics.record_tick(ticker, 1);
        }
    }
}

/// Continue a primary miss in the secondary tier.
pub(crate) fn lookup(
    cache: &Arc<LruCacheInner>,
    secondary: &dyn SecondaryCache,
    key: &[u8],
    hash: u64,
    helper: &'static EntryHelper,
    options: LookupOptions,
) -> Option<Handle> {
    let pending = Pending {
        cache: cache.clone(),
        key: Bytes::copy_from_slice(key),
        hash,
        helper,
        create_context: options.create_context,
        priority: options.priority,
        statistics: options.statistics,
    };

    let mut handle = match secondary.lookup(key) {
        SecondaryLookup::Miss => {
            pending.tick(Ticker::SecondaryCacheMiss);
            return None;
        }
        SecondaryLookup::Ready(value) => {
            pending.tick(Ticker::SecondaryCacheHit);
            tracing::trace!(hash, len = value.data.len(), "[promotion]: secondary hit");
            return match promote(Box::new(pending), value) {
                state @ State::Present { .. } => Some(Handle::from_state(state)),
                _ => None,
            };
        }
        SecondaryLookup::Pending(fetch) => Handle::pending(pending, fetch),
    };

    if options.wait {
        handle.wait();
        if handle.state() == HandleState::Failed {
            return None;
        }
    }
    Some(handle)
}

/// The secondary tier fetch of a pending handle has completed.
pub(crate) fn fetched(pending: Box<Pending>, value: Option<SecondaryValue>) -> State {
    match value {
        Some(value) => {
            pending.tick(Ticker::SecondaryCacheHit);
            State::PendingReady { pending, value }
        }
        None => {
            pending.tick(Ticker::SecondaryCacheMiss);
            State::Failed
        }
    }
}

/// Rebuild the object and insert it into the primary tier.
///
/// An entry the secondary tier still holds is inserted with the secondary incompatible variant of its helper, so that
/// evicting it again does not write it back.
pub(crate) fn promote(pending: Box<Pending>, value: SecondaryValue) -> State {
    let cache = &pending.cache;
    let (object, charge) = match pending.helper.create(
        &value.data,
        pending.create_context.as_deref(),
        cache.allocator(),
    ) {
        Ok(created) => created,
        Err(_) => {
            pending.tick(Ticker::SecondaryCacheCreateFailure);
            return State::Failed;
        }
    };

    let helper = if value.kept {
        pending.helper.without_secondary_compat()
    } else {
        pending.helper
    };

    match cache.insert_record(&pending.key, pending.hash, object, helper, charge, pending.priority, true) {
        Ok(record) => {
            pending.tick(Ticker::Promotion);
            tracing::debug!(hash = pending.hash, charge, kept = value.kept, "[promotion]: promoted");
            State::Present {
                cache: cache.clone(),
                record,
            }
        }
        Err(e) => {
            if let Some(object) = e.into_object() {
                helper.destroy(object, cache.allocator());
            }
            State::Failed
        }
    }
}
