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

//! One-shot tracker correlating a handshake request with its outcome.
//!
//! The authenticator calls [`AuthTracker::begin`] before sending the
//! handshake, then awaits the receiver; the message handler resolves it with
//! [`AuthTracker::succeed`] or [`AuthTracker::fail`] when the venue's
//! acknowledgment arrives. Starting a new round cancels any round still in
//! flight.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::oneshot;

use crate::error::{WsError, WsResult};

type AuthOutcome = Result<(), String>;

/// Tracks the in-flight authentication round for one connection.
#[derive(Clone, Debug, Default)]
pub struct AuthTracker {
    pending: Arc<Mutex<Option<oneshot::Sender<AuthOutcome>>>>,
}

impl AuthTracker {
    /// Creates a new tracker with no round in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a new round, returning the receiver to await.
    ///
    /// Any previous round still in flight is cancelled.
    #[must_use]
    pub fn begin(&self) -> oneshot::Receiver<AuthOutcome> {
        let (tx, rx) = oneshot::channel();
        let previous = self
            .pending
            .lock()
            .expect("auth tracker lock poisoned")
            .replace(tx);
        if previous.is_some() {
            tracing::warn!("Superseding in-flight authentication round");
        }
        rx
    }

    /// Resolves the in-flight round as successful.
    pub fn succeed(&self) {
        if let Some(tx) = self.take() {
            let _ = tx.send(Ok(()));
        }
    }

    /// Resolves the in-flight round as failed.
    pub fn fail(&self, reason: impl Into<String>) {
        if let Some(tx) = self.take() {
            let _ = tx.send(Err(reason.into()));
        }
    }

    /// Returns whether a round is currently in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .expect("auth tracker lock poisoned")
            .is_some()
    }

    /// Awaits the outcome of a round begun with [`Self::begin`].
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Timeout`] if no resolution arrives within `timeout`,
    /// or [`WsError::Authentication`] if the round failed or was cancelled.
    pub async fn wait(
        &self,
        timeout: Duration,
        rx: oneshot::Receiver<AuthOutcome>,
    ) -> WsResult<()> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(WsError::Authentication(reason)),
            Ok(Err(_)) => Err(WsError::Authentication(
                "authentication round cancelled".to_string(),
            )),
            Err(_) => {
                // Clear the superseded sender so a late ack cannot resolve
                // a round nobody is waiting on
                let _ = self.take();
                Err(WsError::Timeout(format!(
                    "no authentication response within {timeout:?}"
                )))
            }
        }
    }

    fn take(&self) -> Option<oneshot::Sender<AuthOutcome>> {
        self.pending
            .lock()
            .expect("auth tracker lock poisoned")
            .take()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[tokio::test]
    async fn test_succeed_resolves_wait() {
        let tracker = AuthTracker::new();
        let rx = tracker.begin();
        tracker.succeed();
        assert!(tracker.wait(Duration::from_secs(1), rx).await.is_ok());
        assert!(!tracker.is_pending());
    }

    #[tokio::test]
    async fn test_fail_resolves_wait_with_reason() {
        let tracker = AuthTracker::new();
        let rx = tracker.begin();
        tracker.fail("invalid signature");
        let err = tracker.wait(Duration::from_secs(1), rx).await.unwrap_err();
        match err {
            WsError::Authentication(reason) => assert_eq!(reason, "invalid signature"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let tracker = AuthTracker::new();
        let rx = tracker.begin();
        let err = tracker.wait(Duration::from_millis(10), rx).await.unwrap_err();
        assert!(matches!(err, WsError::Timeout(_)));
        assert!(!tracker.is_pending());
    }

    #[tokio::test]
    async fn test_begin_supersedes_previous_round() {
        let tracker = AuthTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        tracker.succeed();

        let err = tracker.wait(Duration::from_millis(50), first).await.unwrap_err();
        assert!(matches!(err, WsError::Authentication(_)));
        assert!(tracker.wait(Duration::from_secs(1), second).await.is_ok());
    }

    #[rstest]
    fn test_resolution_without_round_is_noop() {
        let tracker = AuthTracker::new();
        tracker.succeed();
        tracker.fail("ignored");
        assert!(!tracker.is_pending());
    }
}
