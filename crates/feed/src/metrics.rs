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

//! Processing performance accumulators.
//!
//! Counters are fire-and-forget atomics written by the processor loop; the
//! EWMA and running max are single-writer so plain load/store is sufficient.
//! [`MetricsSnapshot`] is the owned view handed to callers.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::Serialize;

/// EWMA smoothing factor for the average processing time.
const EWMA_ALPHA: f64 = 0.1;

/// Process-lifetime performance accumulator fed by the processor loop.
#[derive(Debug, Default)]
pub struct FeedMetrics {
    messages_processed: AtomicU64,
    error_count: AtomicU64,
    reconnection_count: AtomicU64,
    /// f64 bits of the EWMA of processing time in microseconds.
    avg_processing_time_us: AtomicU64,
    max_processing_time_us: AtomicU64,
    sub_millisecond_count: AtomicU64,
    latency_violation_count: AtomicU64,
}

impl FeedMetrics {
    /// Creates a zeroed accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one processed message and its wall-clock duration.
    pub fn record_processed(&self, duration: Duration, latency_threshold: Duration) {
        let processed = self.messages_processed.fetch_add(1, Ordering::Relaxed) + 1;
        let micros = duration.as_micros() as u64;

        // Single writer: the processor loop. Plain load/store is sufficient.
        let avg = if processed == 1 {
            micros as f64
        } else {
            let previous = f64::from_bits(self.avg_processing_time_us.load(Ordering::Relaxed));
            EWMA_ALPHA * micros as f64 + (1.0 - EWMA_ALPHA) * previous
        };
        self.avg_processing_time_us
            .store(avg.to_bits(), Ordering::Relaxed);
        self.max_processing_time_us
            .fetch_max(micros, Ordering::Relaxed);

        if duration < Duration::from_millis(1) {
            self.sub_millisecond_count.fetch_add(1, Ordering::Relaxed);
        }
        if duration > latency_threshold {
            let violations = self.latency_violation_count.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                duration_us = micros,
                threshold_ms = latency_threshold.as_millis() as u64,
                violations,
                "Processing latency violation"
            );
        }
    }

    /// Records one handler failure.
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one successful reconnect.
    pub fn record_reconnection(&self) {
        self.reconnection_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns an owned snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self, queue_overflow_count: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            reconnection_count: self.reconnection_count.load(Ordering::Relaxed),
            avg_processing_time_ms: f64::from_bits(
                self.avg_processing_time_us.load(Ordering::Relaxed),
            ) / 1_000.0,
            max_processing_time_ms: self.max_processing_time_us.load(Ordering::Relaxed) as f64
                / 1_000.0,
            sub_millisecond_count: self.sub_millisecond_count.load(Ordering::Relaxed),
            latency_violation_count: self.latency_violation_count.load(Ordering::Relaxed),
            queue_overflow_count,
        }
    }
}

/// Owned view of the performance counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Messages dequeued and dispatched.
    pub messages_processed: u64,
    /// Handler failures (isolated per message).
    pub error_count: u64,
    /// Successful reconnects, excluding the first connection.
    pub reconnection_count: u64,
    /// EWMA of per-message processing time, milliseconds.
    pub avg_processing_time_ms: f64,
    /// Maximum per-message processing time, milliseconds.
    pub max_processing_time_ms: f64,
    /// Messages processed in under one millisecond.
    pub sub_millisecond_count: u64,
    /// Messages whose processing exceeded the configured threshold.
    pub latency_violation_count: u64,
    /// Messages evicted from the ingestion queue (soft condition).
    pub queue_overflow_count: u64,
}
