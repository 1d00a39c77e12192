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

//! Venue profile: the per-exchange strategy value.
//!
//! One [`VenueProfile`] replaces a class hierarchy of per-exchange clients.
//! Everything a venue does differently (URL, channel naming, envelope
//! shapes, handshake signing, acknowledgment style) is a field here, driving
//! one generic implementation. The composition root constructs profiles
//! explicitly; there is no ambient registry.

use std::{sync::Arc, time::Duration};

use riptide_network::ReconnectionPolicy;
use serde_json::{Value, json};
use ustr::Ustr;

use crate::{
    common::{
        consts::{
            DEFAULT_AUTH_TIMEOUT_SECS, DEFAULT_LATENCY_THRESHOLD_MS, DEFAULT_QUEUE_CAPACITY,
            RIPTIDE_USER_AGENT,
        },
        credential::Credential,
    },
    enums::{ChannelType, SymbolKey},
};

/// Subscribe/unsubscribe selector passed to the envelope builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscribeOp {
    /// Start streaming the channels.
    Subscribe,
    /// Stop streaming the channels.
    Unsubscribe,
}

/// Maps `(symbol, channel type)` to the venue's channel names.
///
/// Returning an empty vector means the venue has no stream for that
/// combination; the subscription manager logs and skips it.
pub type ChannelNamingFn = Arc<dyn Fn(&SymbolKey, ChannelType) -> Vec<String> + Send + Sync>;

/// Builds the wire envelope carrying a subscribe or unsubscribe request.
pub type EnvelopeFn = Arc<dyn Fn(SubscribeOp, &[String], u64) -> Value + Send + Sync>;

/// Builds the signed handshake payload from credentials, a millisecond
/// timestamp, and a nonce.
pub type HandshakeFn = Arc<dyn Fn(&Credential, u64, &str) -> Value + Send + Sync>;

/// How the venue acknowledges a handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthConfirmation {
    /// The venue sends an explicit acknowledgment message.
    Explicit,
    /// No acknowledgment is sent; success is assumed once the wait elapses.
    AssumeAfterTimeout,
}

/// Authentication strategy for a venue.
#[derive(Clone)]
pub struct AuthSpec {
    /// Whether this connection requires a handshake at all.
    pub required: bool,
    /// Builds the signed handshake payload.
    pub handshake: HandshakeFn,
    /// How the venue acknowledges the handshake.
    pub confirmation: AuthConfirmation,
    /// How long to wait for the acknowledgment (or, for
    /// [`AuthConfirmation::AssumeAfterTimeout`], before assuming success).
    pub timeout: Duration,
}

impl std::fmt::Debug for AuthSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(AuthSpec))
            .field("required", &self.required)
            .field("confirmation", &self.confirmation)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AuthSpec {
    /// Creates a spec for venues requiring no authentication.
    #[must_use]
    pub fn none() -> Self {
        Self {
            required: false,
            handshake: Arc::new(|_, _, _| Value::Null),
            confirmation: AuthConfirmation::Explicit,
            timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
        }
    }
}

/// The per-exchange strategy value driving one generic feed client.
#[derive(Clone)]
pub struct VenueProfile {
    /// Venue name, for logging and diagnostics.
    pub name: Ustr,
    /// The WebSocket URL to connect to.
    pub ws_url: String,
    /// Headers for the connection upgrade request.
    pub headers: Vec<(String, String)>,
    /// Optional heartbeat interval (seconds).
    pub heartbeat: Option<u64>,
    /// Optional heartbeat text message; `None` sends protocol pings.
    pub heartbeat_msg: Option<String>,
    /// Reconnection policy for this venue.
    pub policy: ReconnectionPolicy,
    /// Ingestion queue capacity (messages).
    pub queue_capacity: usize,
    /// Processing duration above this increments the violation counter.
    pub latency_threshold: Duration,
    /// Maps symbols and channel types to venue channel names.
    pub naming: ChannelNamingFn,
    /// Builds subscribe/unsubscribe envelopes.
    pub envelope: EnvelopeFn,
    /// Authentication strategy.
    pub auth: AuthSpec,
}

impl std::fmt::Debug for VenueProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(VenueProfile))
            .field("name", &self.name)
            .field("ws_url", &self.ws_url)
            .field("heartbeat", &self.heartbeat)
            .field("queue_capacity", &self.queue_capacity)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl VenueProfile {
    /// Creates a profile speaking the canonical JSON protocol.
    ///
    /// Channel names are `{channel}.{symbol}.{market}`; envelopes are
    /// `{"op": "subscribe"|"unsubscribe", "args": [...], "id": n}`; the
    /// handshake signs `{timestamp}\n{nonce}` with HMAC-SHA256. This is the
    /// protocol the mock servers in the test suites speak, and a reasonable
    /// starting point to adapt per venue.
    #[must_use]
    pub fn reference(name: &str, ws_url: impl Into<String>, requires_auth: bool) -> Self {
        let naming: ChannelNamingFn = Arc::new(|key: &SymbolKey, channel: ChannelType| {
            if channel.is_private() {
                vec![channel.as_ref().to_string()]
            } else {
                vec![format!("{}.{key}", channel.as_ref())]
            }
        });

        let envelope: EnvelopeFn = Arc::new(|op: SubscribeOp, channels: &[String], id: u64| {
            let op = match op {
                SubscribeOp::Subscribe => "subscribe",
                SubscribeOp::Unsubscribe => "unsubscribe",
            };
            json!({
                "op": op,
                "args": channels,
                "id": id,
            })
        });

        let handshake: HandshakeFn =
            Arc::new(|credential: &Credential, timestamp: u64, nonce: &str| {
                let signature = credential.sign(&format!("{timestamp}\n{nonce}"));
                json!({
                    "op": "auth",
                    "args": {
                        "api_key": credential.api_key(),
                        "timestamp": timestamp,
                        "nonce": nonce,
                        "signature": signature,
                    },
                })
            });

        Self {
            name: Ustr::from(name),
            ws_url: ws_url.into(),
            headers: vec![("user-agent".to_string(), RIPTIDE_USER_AGENT.to_string())],
            heartbeat: None,
            heartbeat_msg: None,
            policy: ReconnectionPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            latency_threshold: Duration::from_millis(DEFAULT_LATENCY_THRESHOLD_MS),
            naming,
            envelope,
            auth: AuthSpec {
                required: requires_auth,
                handshake,
                confirmation: AuthConfirmation::Explicit,
                timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::enums::MarketKind;

    #[rstest]
    fn test_reference_channel_naming() {
        let profile = VenueProfile::reference("test", "wss://example.com/ws", false);
        let key = SymbolKey::new("BTC-USDT", MarketKind::Spot);

        let channels = (profile.naming)(&key, ChannelType::Orderbook);
        assert_eq!(channels, vec!["orderbook.BTC-USDT.spot".to_string()]);

        let private = (profile.naming)(&key, ChannelType::Orders);
        assert_eq!(private, vec!["orders".to_string()]);
    }

    #[rstest]
    fn test_reference_envelope_shape() {
        let profile = VenueProfile::reference("test", "wss://example.com/ws", false);
        let channels = vec!["trades.ETH-USDT.spot".to_string()];

        let subscribe = (profile.envelope)(SubscribeOp::Subscribe, &channels, 7);
        assert_eq!(subscribe["op"], "subscribe");
        assert_eq!(subscribe["args"][0], "trades.ETH-USDT.spot");
        assert_eq!(subscribe["id"], 7);

        let unsubscribe = (profile.envelope)(SubscribeOp::Unsubscribe, &channels, 8);
        assert_eq!(unsubscribe["op"], "unsubscribe");
    }

    #[rstest]
    fn test_reference_handshake_is_signed() {
        let profile = VenueProfile::reference("test", "wss://example.com/ws", true);
        let credential = Credential::new("key".to_string(), "secret".to_string());

        let handshake = (profile.auth.handshake)(&credential, 1_700_000_000_000, "nonce-1");
        assert_eq!(handshake["op"], "auth");
        assert_eq!(handshake["args"]["api_key"], "key");
        let expected = credential.sign("1700000000000\nnonce-1");
        assert_eq!(handshake["args"]["signature"], Value::String(expected));
    }

    #[rstest]
    fn test_auth_none_short_circuits() {
        let spec = AuthSpec::none();
        assert!(!spec.required);
    }
}
