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
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use flume::TrySendError;
use strata_common::spawn::Spawner;

use crate::{record::Record, secondary::SecondaryCache};

#[derive(Debug)]
enum Payload {
    /// Serialized by the worker, which also destroys the record if it holds the last reference.
    Record(Arc<Record>),
    /// Serialized by the sender, for objects the cache never took ownership of.
    Serialized(Bytes),
}

/// An entry on its way to the secondary tier.
#[derive(Debug)]
pub struct Offer {
    key: Bytes,
    payload: Payload,
}

impl Offer {
    pub fn record(record: Arc<Record>) -> Self {
        Self {
            key: record.key_bytes().clone(),
            payload: Payload::Record(record),
        }
    }

    pub fn serialized(key: &[u8], data: Bytes) -> Self {
        Self {
            key: Bytes::copy_from_slice(key),
            payload: Payload::Serialized(data),
        }
    }
}

/// Pipe carries entries from the primary tier to the secondary tier.
///
/// Sending never blocks. An offer may be dropped at any time.
pub trait Pipe: Send + Sync + Debug + 'static {
    /// Whether offers are accepted at all.
    fn is_enabled(&self) -> bool;

    /// Offer an entry to the secondary tier.
    fn send(&self, offer: Offer);

    /// Block until every offer sent before this call has been handled.
    fn flush(&self);

    /// Offers dropped since the last call.
    fn take_dropped(&self) -> u64 {
        0
    }
}

/// A pipe that is never enabled.
#[derive(Debug, Default)]
pub struct NoopPipe;

impl Pipe for NoopPipe {
    fn is_enabled(&self) -> bool {
        false
    }

    fn send(&self, _: Offer) {}

    fn flush(&self) {}
}

enum Message {
    Offer(Offer),
    Flush(flume::Sender<()>),
}

/// A pipe backed by a bounded queue, drained by one worker that writes into the secondary tier.
#[derive(Debug)]
pub struct OfferPipe {
    tx: flume::Sender<Message>,
    dropped: AtomicU64,
    _spawner: Spawner,
}

impl OfferPipe {
    pub fn new(secondary: Arc<dyn SecondaryCache>, queue_capacity: usize, spawner: Spawner) -> Self {
        let (tx, rx) = flume::bounded(queue_capacity.max(1));
        // The worker exits once the pipe, which owns the only sender, is dropped, or once its runtime shuts down.
        drop(spawner.spawn(Self::run(secondary, rx)));
        Self {
            tx,
            dropped: AtomicU64::new(0),
            _spawner: spawner,
        }
    }

    async fn run(secondary: Arc<dyn SecondaryCache>, rx: flume::Receiver<Message>) {
        while let Ok(message) = rx.recv_async().await {
            match message {
                Message::Offer(offer) => Self::offer(secondary.as_ref(), offer),
                Message::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!(secondary = secondary.name(), "[pipe]: worker exits");
    }

    fn offer(secondary: &dyn SecondaryCache, offer: Offer) {
        let data = match offer.payload {
            Payload::Serialized(data) => data,
            Payload::Record(record) => {
                let Some(object) = record.object() else {
                    return;
                };
                match record.helper().serialize(object) {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::debug!(%e, "[pipe]: serialize failed, offer dropped");
                        return;
                    }
                }
            }
        };
        let len = data.len();
        match secondary.insert(&offer.key, data) {
            Ok(()) => tracing::trace!(len, "[pipe]: offered"),
            Err(e) => tracing::debug!(%e, "[pipe]: secondary rejected offer"),
        }
    }
}

impl Pipe for OfferPipe {
    fn is_enabled(&self) -> bool {
        true
    }

    fn send(&self, offer: Offer) {
        match self.tx.try_send(Message::Offer(offer)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    tracing::warn!("[pipe]: offer queue is full, offers to the secondary tier are dropped");
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn flush(&self) {
        let (tx, rx) = flume::bounded(1);
        if self.tx.send(Message::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }

    fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}
