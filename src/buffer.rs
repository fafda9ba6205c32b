//! Read/write event buffers (spec.md §4.G): lossy hit-event channel, non-
//! lossy add/update/delete-event channel, both drained by the maintenance
//! loop.
//!
//! `crossbeam-channel` bounded channels stand in for the lock-free MPSC
//! rings the specification describes; this is the same substitution
//! `jamestiotio-moka`'s `sync::cache` makes for its own `ReadOp`/`WriteOp`
//! channels (`read_op_ch`/`write_op_ch`), which this module's naming and
//! backpressure policy mirror directly. Events carry `Arc<Entry<K, V>>`
//! rather than a raw pointer so an entry removed from its shard while an
//! event referencing it is still in flight stays alive until the
//! maintenance loop actually drains that event.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::entry::Entry;

pub(crate) enum ReadEvent<K, V> {
    Hit {
        entry: Arc<Entry<K, V>>,
        hash: u64,
    },
}

pub(crate) enum WriteEvent<K, V> {
    Add {
        entry: Arc<Entry<K, V>>,
        hash: u64,
    },
    /// A fresh entry replaced an existing one under the same key; `old`
    /// must be unlinked from the policy lists and wheel, then dropped.
    Update {
        entry: Arc<Entry<K, V>>,
        hash: u64,
        old: Arc<Entry<K, V>>,
    },
    Delete {
        entry: Arc<Entry<K, V>>,
    },
}

// Events only ever move an owning `Arc<Entry<K,V>>` from a producing caller
// thread to the single maintenance-loop consumer. Declared manually (rather
// than relying on `Arc<T>: Send where T: Send + Sync`) so sending an event
// only requires `K: Send, V: Send`, matching `Entry`'s own relaxed bound.
unsafe impl<K: Send, V: Send> Send for ReadEvent<K, V> {}
unsafe impl<K: Send, V: Send> Send for WriteEvent<K, V> {}

pub(crate) struct ReadBuffer<K, V> {
    sender: Sender<ReadEvent<K, V>>,
    pub(crate) receiver: Receiver<ReadEvent<K, V>>,
}

impl<K, V> ReadBuffer<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Records a hit. Silently dropped if the buffer is saturated — Gets
    /// must never block on policy-state backpressure.
    pub(crate) fn record_hit(&self, entry: Arc<Entry<K, V>>, hash: u64) {
        let _ = self.sender.try_send(ReadEvent::Hit { entry, hash });
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }
}

pub(crate) struct WriteBuffer<K, V> {
    sender: Sender<WriteEvent<K, V>>,
    pub(crate) receiver: Receiver<WriteEvent<K, V>>,
}

/// Returned when the write buffer is full; the caller should run one
/// maintenance cycle inline (assisting the housekeeper) before retrying.
pub(crate) struct Saturated<K, V>(pub(crate) WriteEvent<K, V>);

impl<K, V> WriteBuffer<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Never lossy: on a full buffer the event is handed back so the
    /// caller can assist the maintenance loop for one cycle and retry.
    pub(crate) fn push(&self, event: WriteEvent<K, V>) -> Result<(), Saturated<K, V>> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => Err(Saturated(event)),
            Err(TrySendError::Disconnected(_)) => {
                unreachable!("write buffer receiver is owned by the same cache handle")
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.sender.capacity().unwrap_or(usize::MAX)
    }
}
