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

//! Session authentication over an established connection.
//!
//! The authenticator builds the signed handshake from the venue's strategy,
//! sends it, and waits on the shared [`AuthTracker`] for the resolution the
//! private handler provides when the acknowledgment arrives. Venues without
//! an acknowledgment assume success once the wait elapses. The authenticated
//! flag is reset on every disconnect; it is `false` whenever the connection
//! is not live.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use riptide_network::{AuthTracker, WsError, WsResult, WsWriter};
use uuid::Uuid;

use crate::{
    common::{credential::Credential, unix_ms_now},
    venue::{AuthConfirmation, AuthSpec},
};

/// Performs the authentication handshake and owns the session's auth state.
pub struct Authenticator {
    credential: Option<Credential>,
    spec: AuthSpec,
    tracker: AuthTracker,
    authenticated: Arc<AtomicBool>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Authenticator))
            .field("required", &self.spec.required)
            .field("has_credential", &self.credential.is_some())
            .field("is_authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Creates a new authenticator.
    #[must_use]
    pub fn new(credential: Option<Credential>, spec: AuthSpec) -> Self {
        Self {
            credential,
            spec,
            tracker: AuthTracker::new(),
            authenticated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns whether this connection requires a handshake.
    #[must_use]
    pub fn requires_authentication(&self) -> bool {
        self.spec.required
    }

    /// Returns whether the session is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Returns the shared authenticated flag, for the private handler's gate.
    #[must_use]
    pub fn authenticated_flag(&self) -> Arc<AtomicBool> {
        self.authenticated.clone()
    }

    /// Returns the tracker the private handler resolves acknowledgments on.
    #[must_use]
    pub fn tracker(&self) -> AuthTracker {
        self.tracker.clone()
    }

    /// Clears the authenticated state. Called on every disconnect.
    pub fn reset(&self) {
        self.authenticated.store(false, Ordering::Release);
    }

    /// Runs the handshake on the given connection.
    ///
    /// No-op when authentication is not required. Waits up to the spec's
    /// timeout for an explicit acknowledgment; with
    /// [`AuthConfirmation::AssumeAfterTimeout`] the elapsed wait itself is
    /// success. A failure leaves the session unauthenticated and aborts the
    /// current connection attempt; authentication is never retried on the
    /// same socket.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Authentication`] when credentials are missing, the
    /// venue rejects the handshake, or an expected acknowledgment never
    /// arrives.
    pub async fn authenticate(&self, writer: &WsWriter) -> WsResult<()> {
        if !self.spec.required {
            return Ok(());
        }

        let credential = self.credential.as_ref().ok_or_else(|| {
            WsError::Authentication("API credentials not configured".to_string())
        })?;

        let timestamp = unix_ms_now();
        let nonce = Uuid::new_v4().to_string();
        let payload = (self.spec.handshake)(credential, timestamp, &nonce);

        tracing::info!(
            api_key = %credential.api_key_masked(),
            "Authenticating session"
        );

        let rx = self.tracker.begin();
        writer.send_text(serde_json::to_string(&payload).map_err(WsError::from)?)?;

        match self.tracker.wait(self.spec.timeout, rx).await {
            Ok(()) => {
                self.authenticated.store(true, Ordering::Release);
                tracing::info!("Session authenticated");
                Ok(())
            }
            Err(WsError::Timeout(_))
                if self.spec.confirmation == AuthConfirmation::AssumeAfterTimeout =>
            {
                self.authenticated.store(true, Ordering::Release);
                tracing::debug!("No acknowledgment expected, assuming authenticated");
                Ok(())
            }
            Err(WsError::Timeout(detail)) => {
                self.authenticated.store(false, Ordering::Release);
                Err(WsError::Authentication(format!(
                    "handshake unconfirmed: {detail}"
                )))
            }
            Err(e) => {
                self.authenticated.store(false, Ordering::Release);
                tracing::error!(error = %e, "Authentication failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use serde_json::Value;

    use super::*;

    fn spec(required: bool, confirmation: AuthConfirmation, timeout_ms: u64) -> AuthSpec {
        AuthSpec {
            required,
            handshake: Arc::new(|credential, timestamp, nonce| {
                serde_json::json!({
                    "op": "auth",
                    "key": credential.api_key(),
                    "sig": credential.sign(&format!("{timestamp}\n{nonce}")),
                })
            }),
            confirmation,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn credential() -> Credential {
        Credential::new("key".to_string(), "secret".to_string())
    }

    #[rstest]
    fn test_not_required_reports_no_authentication() {
        let auth = Authenticator::new(None, AuthSpec::none());
        assert!(!auth.requires_authentication());
        assert!(!auth.is_authenticated());
    }

    #[rstest]
    fn test_reset_clears_flag() {
        let auth = Authenticator::new(Some(credential()), spec(true, AuthConfirmation::Explicit, 100));
        auth.authenticated_flag().store(true, Ordering::Release);
        assert!(auth.is_authenticated());
        auth.reset();
        assert!(!auth.is_authenticated());
    }

    #[rstest]
    fn test_handshake_payload_is_signed() {
        let credential = credential();
        let spec = spec(true, AuthConfirmation::Explicit, 100);
        let payload: Value = (spec.handshake)(&credential, 42, "n");
        assert_eq!(payload["op"], "auth");
        assert_eq!(payload["key"], "key");
        assert_eq!(
            payload["sig"],
            Value::String(credential.sign("42\nn"))
        );
    }

    #[tokio::test]
    async fn test_tracker_resolution_shared_with_handler() {
        let auth = Authenticator::new(Some(credential()), spec(true, AuthConfirmation::Explicit, 100));
        let tracker = auth.tracker();
        let rx = tracker.begin();
        tracker.succeed();
        assert!(tracker.wait(Duration::from_millis(100), rx).await.is_ok());
    }
}
