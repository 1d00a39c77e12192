// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Bounded ingestion queue between the socket reader and the processor.
//!
//! The queue is the sole backpressure mechanism of the pipeline: bounded
//! capacity, drop-oldest on overflow, non-blocking producer. Overflow is a
//! soft condition counted and logged, never raised as an error. Eviction and
//! insertion happen under a single lock acquisition, so the configured
//! capacity is a hard bound.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use tokio::sync::Notify;

use crate::transport::Frame;

/// A frame captured by the reader, awaiting processing.
#[derive(Debug)]
pub struct QueuedMessage {
    /// The raw frame payload.
    pub payload: Frame,
    /// When the reader enqueued the frame.
    pub enqueued_at: Instant,
}

/// Bounded drop-oldest FIFO queue with a single async consumer.
#[derive(Debug)]
pub struct IngestQueue {
    inner: Mutex<VecDeque<QueuedMessage>>,
    capacity: usize,
    notify: Notify,
    overflow_count: AtomicU64,
    closed: AtomicBool,
}

impl IngestQueue {
    /// Creates a queue holding at most `capacity` messages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            overflow_count: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current queue length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("ingest queue lock poisoned").len()
    }

    /// Returns whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of messages evicted due to overflow.
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Enqueues a frame, evicting the oldest entry when at capacity.
    ///
    /// The incoming frame is always admitted; the pipeline favors freshness
    /// over completeness.
    pub fn push(&self, payload: Frame) {
        {
            let mut inner = self.inner.lock().expect("ingest queue lock poisoned");
            if inner.len() == self.capacity {
                inner.pop_front();
                let evicted = self.overflow_count.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    capacity = self.capacity,
                    evicted,
                    "Ingestion queue overflow, dropped oldest message"
                );
            }
            inner.push_back(QueuedMessage {
                payload,
                enqueued_at: Instant::now(),
            });
        }
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<QueuedMessage> {
        self.inner
            .lock()
            .expect("ingest queue lock poisoned")
            .pop_front()
    }

    /// Dequeues the next message in strict FIFO order.
    ///
    /// Waits until a message is available. Returns `None` once the queue is
    /// closed and drained.
    pub async fn pop(&self) -> Option<QueuedMessage> {
        loop {
            let notified = self.notify.notified();
            if let Some(message) = self.try_pop() {
                return Some(message);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Closes the queue, waking the consumer once remaining entries drain.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Discards all queued entries, returning how many were dropped.
    ///
    /// Used on shutdown: undelivered messages are discarded, not replayed.
    pub fn drain(&self) -> usize {
        let mut inner = self.inner.lock().expect("ingest queue lock poisoned");
        let dropped = inner.len();
        inner.clear();
        dropped
    }
}
