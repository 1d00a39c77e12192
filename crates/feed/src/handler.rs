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

//! Message handler framework: detect type, then route.
//!
//! Both handler families implement the [`MessageRouter`] template: an injected
//! classifier maps the raw payload to a message type, and `route` parses the
//! canonical record and invokes the registered callbacks. Callback failures
//! are logged individually and never propagate to the router; a routing
//! failure is a [`WsError::Handler`] isolated to that one message.
//!
//! The private family gates order/balance/position/execution dispatch on the
//! session's authenticated flag: while unauthenticated those messages are
//! discarded with a warning, never processed or raised as errors.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use riptide_network::{AuthTracker, SubscriptionState, WsError, WsResult, WsWriter};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::{
    enums::{PrivateMessageType, PublicMessageType},
    messages::{
        AuthResponse, BalanceUpdate, ExecutionReport, FeedError, OrderUpdate, OrderbookUpdate,
        PositionUpdate, SubscriptionAck, TickerUpdate, TradeUpdate,
    },
};

/// Callback registered for a parsed record type.
pub type Callback<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Classifier mapping a raw payload to a public message type.
pub type PublicClassifyFn = Arc<dyn Fn(&Value) -> Option<PublicMessageType> + Send + Sync>;

/// Classifier mapping a raw payload to a private message type.
pub type PrivateClassifyFn = Arc<dyn Fn(&Value) -> Option<PrivateMessageType> + Send + Sync>;

/// The shared detect-then-route template both handler families follow.
pub trait MessageRouter: Send + Sync {
    /// The message type enumeration this family dispatches on.
    type Kind: Copy + std::fmt::Debug;

    /// Detects the message type, or `None` for unrecognized payloads.
    fn detect(&self, raw: &Value) -> Option<Self::Kind>;

    /// Routes a detected message to its type handler.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Handler`] when parsing the canonical record fails.
    fn route(&self, kind: Self::Kind, raw: &Value, writer: &WsWriter) -> WsResult<()>;

    /// Detects and routes one message.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Handler`] for unrecognized payloads or record parse
    /// failures; the error is isolated to this message.
    fn handle(&self, raw: &Value, writer: &WsWriter) -> WsResult<()> {
        match self.detect(raw) {
            Some(kind) => self.route(kind, raw, writer),
            None => Err(WsError::Handler(format!(
                "unrecognized message: {}",
                truncate(raw)
            ))),
        }
    }
}

fn truncate(raw: &Value) -> String {
    let mut text = raw.to_string();
    if text.len() > 256 {
        text.truncate(256);
        text.push_str("...");
    }
    text
}

fn parse_record<T: DeserializeOwned>(raw: &Value, label: &str) -> WsResult<T> {
    let payload = raw.get("data").unwrap_or(raw);
    serde_json::from_value(payload.clone())
        .map_err(|e| WsError::Handler(format!("failed to parse {label}: {e}")))
}

fn dispatch<T>(callbacks: &RwLock<Vec<Callback<T>>>, record: &T, label: &str) {
    let callbacks = callbacks.read().expect("callback lock poisoned");
    for callback in callbacks.iter() {
        if let Err(e) = callback(record) {
            tracing::warn!(handler = label, error = %e, "Callback failed");
        }
    }
}

fn type_field(raw: &Value) -> Option<&str> {
    raw.get("type").and_then(Value::as_str)
}

/// Returns the canonical public classifier, dispatching on the `type` field.
#[must_use]
pub fn default_public_classifier() -> PublicClassifyFn {
    Arc::new(|raw| match type_field(raw)? {
        "orderbook" => Some(PublicMessageType::Orderbook),
        "trade" => Some(PublicMessageType::Trade),
        "ticker" => Some(PublicMessageType::Ticker),
        "ping" => Some(PublicMessageType::Ping),
        "ack" => Some(PublicMessageType::SubscriptionAck),
        "error" => Some(PublicMessageType::Error),
        _ => None,
    })
}

/// Returns the canonical private classifier, dispatching on the `type` field.
#[must_use]
pub fn default_private_classifier() -> PrivateClassifyFn {
    Arc::new(|raw| match type_field(raw)? {
        "order" => Some(PrivateMessageType::OrderUpdate),
        "balance" => Some(PrivateMessageType::BalanceUpdate),
        "position" => Some(PrivateMessageType::PositionUpdate),
        "execution" => Some(PrivateMessageType::ExecutionReport),
        "auth" => Some(PrivateMessageType::AuthResponse),
        "error" => Some(PrivateMessageType::Error),
        _ => None,
    })
}

/// Handler for the public market-data message family.
pub struct PublicFeedHandler {
    classify: PublicClassifyFn,
    subscriptions: SubscriptionState,
    orderbook_callbacks: RwLock<Vec<Callback<OrderbookUpdate>>>,
    trade_callbacks: RwLock<Vec<Callback<TradeUpdate>>>,
    ticker_callbacks: RwLock<Vec<Callback<TickerUpdate>>>,
    error_callbacks: RwLock<Vec<Callback<FeedError>>>,
}

impl std::fmt::Debug for PublicFeedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(PublicFeedHandler))
            .field("confirmed_channels", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl PublicFeedHandler {
    /// Creates a handler with the given classifier (or the canonical default).
    #[must_use]
    pub fn new(classify: Option<PublicClassifyFn>, subscriptions: SubscriptionState) -> Self {
        Self {
            classify: classify.unwrap_or_else(default_public_classifier),
            subscriptions,
            orderbook_callbacks: RwLock::new(Vec::new()),
            trade_callbacks: RwLock::new(Vec::new()),
            ticker_callbacks: RwLock::new(Vec::new()),
            error_callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Registers an order book callback.
    pub fn on_orderbook(&self, callback: Callback<OrderbookUpdate>) {
        self.orderbook_callbacks
            .write()
            .expect("callback lock poisoned")
            .push(callback);
    }

    /// Registers a trade callback.
    pub fn on_trade(&self, callback: Callback<TradeUpdate>) {
        self.trade_callbacks
            .write()
            .expect("callback lock poisoned")
            .push(callback);
    }

    /// Registers a ticker callback.
    pub fn on_ticker(&self, callback: Callback<TickerUpdate>) {
        self.ticker_callbacks
            .write()
            .expect("callback lock poisoned")
            .push(callback);
    }

    /// Registers an error callback.
    pub fn on_error(&self, callback: Callback<FeedError>) {
        self.error_callbacks
            .write()
            .expect("callback lock poisoned")
            .push(callback);
    }
}

impl MessageRouter for PublicFeedHandler {
    type Kind = PublicMessageType;

    fn detect(&self, raw: &Value) -> Option<Self::Kind> {
        (self.classify)(raw)
    }

    fn route(&self, kind: Self::Kind, raw: &Value, writer: &WsWriter) -> WsResult<()> {
        match kind {
            PublicMessageType::Orderbook => {
                let record: OrderbookUpdate = parse_record(raw, "orderbook")?;
                dispatch(&self.orderbook_callbacks, &record, "orderbook");
            }
            PublicMessageType::Trade => {
                let record: TradeUpdate = parse_record(raw, "trade")?;
                dispatch(&self.trade_callbacks, &record, "trade");
            }
            PublicMessageType::Ticker => {
                let record: TickerUpdate = parse_record(raw, "ticker")?;
                dispatch(&self.ticker_callbacks, &record, "ticker");
            }
            PublicMessageType::Ping => {
                tracing::trace!("Replying to application-level ping");
                if let Err(e) = writer.send_text(json!({"op": "pong"}).to_string()) {
                    tracing::debug!(error = %e, "Pong reply not sent");
                }
            }
            PublicMessageType::SubscriptionAck => {
                let ack: SubscriptionAck = parse_record(raw, "subscription ack")?;
                for channel in &ack.channels {
                    if ack.success {
                        self.subscriptions.confirm_subscribe(channel);
                        tracing::debug!(channel, "Subscription confirmed");
                    } else {
                        self.subscriptions.mark_failure(channel);
                        tracing::warn!(channel, "Subscription rejected");
                    }
                }
            }
            PublicMessageType::Error => {
                let error: FeedError = parse_record(raw, "error")?;
                tracing::error!(code = ?error.code, message = %error.message, "Venue error");
                dispatch(&self.error_callbacks, &error, "error");
            }
        }
        Ok(())
    }
}

/// Handler for the private trading-data message family.
pub struct PrivateFeedHandler {
    classify: PrivateClassifyFn,
    authenticated: Arc<AtomicBool>,
    auth_tracker: AuthTracker,
    order_callbacks: RwLock<Vec<Callback<OrderUpdate>>>,
    balance_callbacks: RwLock<Vec<Callback<BalanceUpdate>>>,
    position_callbacks: RwLock<Vec<Callback<PositionUpdate>>>,
    execution_callbacks: RwLock<Vec<Callback<ExecutionReport>>>,
    error_callbacks: RwLock<Vec<Callback<FeedError>>>,
}

impl std::fmt::Debug for PrivateFeedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(PrivateFeedHandler))
            .field("is_authenticated", &self.authenticated.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PrivateFeedHandler {
    /// Creates a handler with the given classifier (or the canonical default).
    ///
    /// `authenticated` and `auth_tracker` are shared with the
    /// [`crate::auth::Authenticator`]: the flag gates dispatch, the tracker
    /// resolves the in-flight handshake when its acknowledgment arrives.
    #[must_use]
    pub fn new(
        classify: Option<PrivateClassifyFn>,
        authenticated: Arc<AtomicBool>,
        auth_tracker: AuthTracker,
    ) -> Self {
        Self {
            classify: classify.unwrap_or_else(default_private_classifier),
            authenticated,
            auth_tracker,
            order_callbacks: RwLock::new(Vec::new()),
            balance_callbacks: RwLock::new(Vec::new()),
            position_callbacks: RwLock::new(Vec::new()),
            execution_callbacks: RwLock::new(Vec::new()),
            error_callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Registers an order update callback.
    pub fn on_order_update(&self, callback: Callback<OrderUpdate>) {
        self.order_callbacks
            .write()
            .expect("callback lock poisoned")
            .push(callback);
    }

    /// Registers a balance update callback.
    pub fn on_balance_update(&self, callback: Callback<BalanceUpdate>) {
        self.balance_callbacks
            .write()
            .expect("callback lock poisoned")
            .push(callback);
    }

    /// Registers a position update callback.
    pub fn on_position_update(&self, callback: Callback<PositionUpdate>) {
        self.position_callbacks
            .write()
            .expect("callback lock poisoned")
            .push(callback);
    }

    /// Registers an execution report callback.
    pub fn on_execution_report(&self, callback: Callback<ExecutionReport>) {
        self.execution_callbacks
            .write()
            .expect("callback lock poisoned")
            .push(callback);
    }

    /// Registers an error callback.
    pub fn on_error(&self, callback: Callback<FeedError>) {
        self.error_callbacks
            .write()
            .expect("callback lock poisoned")
            .push(callback);
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }
}

impl MessageRouter for PrivateFeedHandler {
    type Kind = PrivateMessageType;

    fn detect(&self, raw: &Value) -> Option<Self::Kind> {
        (self.classify)(raw)
    }

    fn route(&self, kind: Self::Kind, raw: &Value, _writer: &WsWriter) -> WsResult<()> {
        if !kind.allowed_unauthenticated() && !self.is_authenticated() {
            tracing::warn!(
                kind = ?kind,
                "Discarding private message received before authentication"
            );
            return Ok(());
        }

        match kind {
            PrivateMessageType::OrderUpdate => {
                let record: OrderUpdate = parse_record(raw, "order update")?;
                dispatch(&self.order_callbacks, &record, "order update");
            }
            PrivateMessageType::BalanceUpdate => {
                let record: BalanceUpdate = parse_record(raw, "balance update")?;
                dispatch(&self.balance_callbacks, &record, "balance update");
            }
            PrivateMessageType::PositionUpdate => {
                let record: PositionUpdate = parse_record(raw, "position update")?;
                dispatch(&self.position_callbacks, &record, "position update");
            }
            PrivateMessageType::ExecutionReport => {
                let record: ExecutionReport = parse_record(raw, "execution report")?;
                dispatch(&self.execution_callbacks, &record, "execution report");
            }
            PrivateMessageType::AuthResponse => {
                let response: AuthResponse = parse_record(raw, "auth response")?;
                if response.success {
                    // Flip the gate before resolving the tracker so private
                    // frames right behind the acknowledgment are dispatched,
                    // not discarded
                    self.authenticated.store(true, Ordering::Release);
                    self.auth_tracker.succeed();
                } else {
                    let reason = response
                        .message
                        .unwrap_or_else(|| "handshake rejected".to_string());
                    self.authenticated.store(false, Ordering::Release);
                    self.auth_tracker.fail(reason);
                }
            }
            PrivateMessageType::Error => {
                let error: FeedError = parse_record(raw, "error")?;
                tracing::error!(code = ?error.code, message = %error.message, "Venue error");
                if self.auth_tracker.is_pending() {
                    self.auth_tracker.fail(error.message.clone());
                }
                dispatch(&self.error_callbacks, &error, "error");
            }
        }
        Ok(())
    }
}

/// Routes messages through the handler families on one connection.
///
/// The public family is always present; the private family exists when the
/// venue authenticates the connection. Messages the private classifier
/// recognizes (including auth acknowledgments and errors) route there first;
/// everything else goes through the public family.
#[derive(Debug)]
pub struct FeedRouter {
    public: PublicFeedHandler,
    private: Option<PrivateFeedHandler>,
}

impl FeedRouter {
    /// Creates a router from the two families.
    #[must_use]
    pub fn new(public: PublicFeedHandler, private: Option<PrivateFeedHandler>) -> Self {
        Self { public, private }
    }

    /// Detects and routes one message.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Handler`] for unrecognized payloads or record parse
    /// failures.
    pub fn handle(&self, raw: &Value, writer: &WsWriter) -> WsResult<()> {
        if let Some(private) = &self.private
            && let Some(kind) = private.detect(raw)
        {
            return private.route(kind, raw, writer);
        }
        self.public.handle(raw, writer)
    }

    /// Returns the public handler.
    #[must_use]
    pub fn public(&self) -> &PublicFeedHandler {
        &self.public
    }

    /// Returns the private handler, when present.
    #[must_use]
    pub fn private(&self) -> Option<&PrivateFeedHandler> {
        self.private.as_ref()
    }
}
