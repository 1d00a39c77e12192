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

//! Reconnection policy and backoff bookkeeping.
//!
//! [`ReconnectionPolicy`] is pure configuration: given an attempt index and an
//! error classification it yields a delay and a retry/no-retry decision.
//! [`BackoffState`] holds the mutable attempt counter and is written only from
//! within the connection loop.
//!
//! # Reconnection Strategy
//!
//! The default policy uses unlimited reconnection attempts
//! (`max_attempts: None`). This is intentional for trading systems because
//! venues may be down for extended periods but eventually recover, and
//! exponential backoff already prevents resource waste. Use `Some(n)`
//! primarily for testing, development, or non-critical connections.

use std::time::Duration;

use crate::error::ErrorKind;

/// Immutable reconnection configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectionPolicy {
    /// Maximum number of reconnection attempts before giving up.
    /// `None` means unlimited (default, recommended for production).
    pub max_attempts: Option<u32>,
    /// The initial reconnection delay.
    pub delay_initial: Duration,
    /// The exponential backoff factor applied per attempt.
    pub backoff_factor: f64,
    /// The maximum delay the exponential progression is capped at.
    pub delay_max: Duration,
    /// The maximum jitter added on top of each computed delay.
    pub jitter_ms: u64,
    /// Whether an abnormal closure resets the attempt counter, so the next
    /// delay restarts from `delay_initial`.
    pub reset_on_abnormal_closure: bool,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            delay_initial: Duration::from_millis(250),
            backoff_factor: 2.0,
            delay_max: Duration::from_secs(5),
            jitter_ms: 200,
            reset_on_abnormal_closure: true,
        }
    }
}

impl ReconnectionPolicy {
    /// Returns the deterministic delay for the given attempt index.
    ///
    /// `delay(i) = min(delay_initial * backoff_factor^i, delay_max)`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.delay_initial.as_millis() as f64;
        let factor = self.backoff_factor.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = (base * factor).min(self.delay_max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Returns the delay for the given attempt with jitter applied.
    ///
    /// Jitter only ever extends the deterministic delay, so the deterministic
    /// component stays monotonically non-decreasing.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter_ms == 0 {
            return delay;
        }
        let jitter = rand::random_range(0..=self.jitter_ms);
        delay + Duration::from_millis(jitter)
    }

    /// Returns whether another attempt should be made.
    ///
    /// `attempt` is the number of failures observed so far. Returns `false`
    /// once `max_attempts` is reached or the kind is non-retryable.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        if !kind.is_retryable() {
            return false;
        }
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

/// Mutable attempt counter owned by the connection loop.
#[derive(Clone, Debug, Default)]
pub struct BackoffState {
    attempts: u32,
}

impl BackoffState {
    /// Creates a new state with zero recorded failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of consecutive failures recorded.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Clears the counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Records a failure and returns the delay before the next attempt, or
    /// `None` when the policy says to stop retrying.
    ///
    /// An abnormal closure under `reset_on_abnormal_closure` restarts the
    /// exponential progression from attempt zero.
    pub fn on_failure(&mut self, policy: &ReconnectionPolicy, kind: ErrorKind) -> Option<Duration> {
        if policy.reset_on_abnormal_closure && kind == ErrorKind::AbnormalClosure {
            self.attempts = 0;
        }
        self.attempts += 1;
        if !policy.should_retry(self.attempts, kind) {
            return None;
        }
        Some(policy.delay_with_jitter(self.attempts - 1))
    }
}
