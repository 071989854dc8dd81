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
    sync::Arc,
    task::{Context, Poll},
};

use futures::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use strata_common::strict_assert;

use crate::{
    helper::{EntryHelper, ObjectRef},
    promotion::{self, Pending},
    raw::LruCacheInner,
    record::Record,
    secondary::SecondaryValue,
};

/// Lifecycle state of a [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// The object is resident and usable.
    Present,
    /// A fetch from the secondary tier is in flight.
    PendingNotReady,
    /// The secondary tier has produced bytes that are not rebuilt into an object yet.
    PendingReady,
    /// Terminal, no object.
    Failed,
}

pub(crate) enum State {
    Present {
        cache: Arc<LruCacheInner>,
        record: Arc<Record>,
    },
    PendingNotReady {
        pending: Box<Pending>,
        // Only touched through `&mut self`. The lock makes the handle `Sync` and is never contended.
        fetch: Mutex<BoxFuture<'static, Option<SecondaryValue>>>,
    },
    PendingReady {
        pending: Box<Pending>,
        value: SecondaryValue,
    },
    Failed,
}

/// A reference to one cache entry.
///
/// A present handle owns one reference of its entry, which is kept resident until every handle to it is released or
/// dropped. Dropping a handle releases it as useful.
///
/// A pending handle comes from a lookup that missed the primary tier and went to the secondary tier. Only
/// [`Handle::value`], [`Handle::is_ready`] and the wait functions may be used on it until it reaches
/// [`HandleState::Present`] or [`HandleState::Failed`].
pub struct Handle {
    state: State,
}

impl Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Handle");
        s.field("state", &self.state());
        if let State::Present { record, .. } = &self.state {
            s.field("record", record);
        }
        s.finish()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let State::Present { cache, record } = &self.state {
            cache.release(record, true, false);
        }
    }
}

impl Handle {
    pub(crate) fn present(cache: Arc<LruCacheInner>, record: Arc<Record>) -> Self {
        Self {
            state: State::Present { cache, record },
        }
    }

    pub(crate) fn from_state(state: State) -> Self {
        Self { state }
    }

    pub(crate) fn pending(pending: Pending, fetch: BoxFuture<'static, Option<SecondaryValue>>) -> Self {
        Self {
            state: State::PendingNotReady {
                pending: Box::new(pending),
                fetch: Mutex::new(fetch),
            },
        }
    }

    /// Current state of the handle.
    pub fn state(&self) -> HandleState {
        match self.state {
            State::Present { .. } => HandleState::Present,
            State::PendingNotReady { .. } => HandleState::PendingNotReady,
            State::PendingReady { .. } => HandleState::PendingReady,
            State::Failed => HandleState::Failed,
        }
    }

    /// Key of the entry, `None` once failed.
    pub fn key(&self) -> Option<&[u8]> {
        match &self.state {
            State::Present { record, .. } => Some(record.key()),
            State::PendingNotReady { pending, .. } | State::PendingReady { pending, .. } => Some(&pending.key),
            State::Failed => None,
        }
    }

    /// The cached object. `None` unless the handle is present.
    ///
    /// After waiting, `None` always means the lookup failed.
    pub fn value(&self) -> Option<ObjectRef<'_>> {
        match &self.state {
            State::Present { record, .. } => record.object(),
            _ => None,
        }
    }

    /// The cached object as a `T`.
    pub fn value_as<T: 'static>(&self) -> Option<&T> {
        self.value().and_then(|object| object.downcast_ref::<T>())
    }

    /// Charge of the entry, `0` unless the handle is present.
    pub fn charge(&self) -> usize {
        match &self.state {
            State::Present { record, .. } => record.charge(),
            _ => 0,
        }
    }

    /// The helper governing the entry.
    pub fn helper(&self) -> Option<&'static EntryHelper> {
        match &self.state {
            State::Present { record, .. } => Some(record.helper()),
            State::PendingNotReady { pending, .. } | State::PendingReady { pending, .. } => Some(pending.helper),
            State::Failed => None,
        }
    }

    /// Poll the secondary tier fetch without blocking.
    ///
    /// Returns `false` only while the fetch is in flight.
    pub fn is_ready(&mut self) -> bool {
        let polled = match &mut self.state {
            State::PendingNotReady { fetch, .. } => {
                let mut cx = Context::from_waker(futures::task::noop_waker_ref());
                fetch.get_mut().poll_unpin(&mut cx)
            }
            _ => return true,
        };
        match polled {
            Poll::Pending => false,
            Poll::Ready(value) => {
                self.fetched(value);
                true
            }
        }
    }

    /// Block until the handle is present or failed.
    pub fn wait(&mut self) {
        if self.is_ready() {
            self.promote();
            return;
        }
        futures::executor::block_on(self.wait_async());
    }

    /// Wait until the handle is present or failed.
    pub async fn wait_async(&mut self) {
        if let State::PendingNotReady { fetch, .. } = &mut self.state {
            let value = fetch.get_mut().await;
            self.fetched(value);
        }
        self.promote();
    }

    /// Block until every handle is present or failed.
    pub fn wait_all(handles: &mut [Handle]) {
        futures::executor::block_on(Self::wait_all_async(handles));
    }

    /// Wait until every handle is present or failed. The fetches proceed concurrently.
    pub async fn wait_all_async(handles: &mut [Handle]) {
        futures::future::join_all(handles.iter_mut().map(|handle| handle.wait_async())).await;
    }

    /// Take one more reference of a present entry.
    pub(crate) fn try_ref(&self) -> Option<Handle> {
        match &self.state {
            State::Present { cache, record } => {
                cache.acquire(record);
                Some(Handle::present(cache.clone(), record.clone()))
            }
            _ => None,
        }
    }

    /// Release the handle. Returns whether the entry has left the cache.
    pub(crate) fn release(mut self, useful: bool, erase_if_last_ref: bool) -> bool {
        match std::mem::replace(&mut self.state, State::Failed) {
            State::Present { cache, record } => cache.release(&record, useful, erase_if_last_ref),
            State::PendingNotReady { .. } | State::PendingReady { .. } => {
                strict_assert!(false, "a pending handle must be waited before it is released");
                false
            }
            State::Failed => false,
        }
    }

    fn fetched(&mut self, value: Option<SecondaryValue>) {
        if !matches!(self.state, State::PendingNotReady { .. }) {
            return;
        }
        if let State::PendingNotReady { pending, .. } = std::mem::replace(&mut self.state, State::Failed) {
            self.state = promotion::fetched(pending, value);
        }
    }

    fn promote(&mut self) {
        if !matches!(self.state, State::PendingReady { .. }) {
            return;
        }
        if let State::PendingReady { pending, value } = std::mem::replace(&mut self.state, State::Failed) {
            self.state = promotion::promote(pending, value);
        }
    }
}
