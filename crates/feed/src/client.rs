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

//! The feed client composition root.
//!
//! [`FeedClient`] wires the network layer to the venue strategy: it owns the
//! [`riptide_network::WebSocketClient`], the subscription manager, the
//! authenticator, the handler router, and the processor task draining the
//! ingestion queue. Composition replaces inheritance: each collaborator is an
//! injected field, not a base class.
//!
//! The post-connect hook runs on every established connection: it
//! authenticates (when the venue requires it), then rebuilds subscriptions
//! from the manager's state, the single source of truth, independent of
//! anything the previous socket knew.

use std::{
    sync::{
        Arc, Mutex,
        atomic::AtomicU64,
    },
    time::{Duration, Instant},
};

use futures_util::future::BoxFuture;
use riptide_network::{
    ConnectionState, Frame, IngestQueue, PostConnectHook, RECONNECTED, StateListener,
    SubscriptionState, WebSocketClient, WebSocketConfig, WsError, WsResult, WsWriter,
};
use serde_json::Value;

use crate::{
    auth::Authenticator,
    common::{consts::DEFAULT_CONNECT_TIMEOUT_SECS, credential::Credential},
    enums::{ChannelType, SymbolKey},
    handler::{
        Callback, FeedRouter, PrivateClassifyFn, PrivateFeedHandler, PublicClassifyFn,
        PublicFeedHandler,
    },
    messages::{
        BalanceUpdate, ExecutionReport, FeedError, OrderUpdate, OrderbookUpdate, PositionUpdate,
        TickerUpdate, TradeUpdate,
    },
    metrics::{FeedMetrics, MetricsSnapshot},
    subscription::SubscriptionManager,
    venue::VenueProfile,
};

/// Streaming feed client for one venue connection.
pub struct FeedClient {
    profile: VenueProfile,
    ws: Arc<WebSocketClient>,
    subscriptions: Arc<SubscriptionManager>,
    authenticator: Arc<Authenticator>,
    router: Arc<FeedRouter>,
    channel_state: SubscriptionState,
    metrics: Arc<FeedMetrics>,
    processor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(FeedClient))
            .field("venue", &self.profile.name)
            .field("url", &self.profile.ws_url)
            .field("state", &self.ws.state())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// Creates a client with the canonical message classifiers.
    ///
    /// The private handler family is attached when the venue authenticates
    /// the connection or a credential is supplied; a purely public feed has
    /// only the public family.
    #[must_use]
    pub fn new(profile: VenueProfile, credential: Option<Credential>) -> Self {
        Self::with_classifiers(profile, credential, None, None)
    }

    /// Creates a client with classifier overrides for venues whose frames
    /// need different type detection.
    #[must_use]
    pub fn with_classifiers(
        profile: VenueProfile,
        credential: Option<Credential>,
        public_classify: Option<PublicClassifyFn>,
        private_classify: Option<PrivateClassifyFn>,
    ) -> Self {
        let channel_state = SubscriptionState::new();
        let has_private = profile.auth.required || credential.is_some();
        let authenticator = Arc::new(Authenticator::new(credential, profile.auth.clone()));

        let public = PublicFeedHandler::new(public_classify, channel_state.clone());
        let private = has_private.then(|| {
            PrivateFeedHandler::new(
                private_classify,
                authenticator.authenticated_flag(),
                authenticator.tracker(),
            )
        });
        let router = Arc::new(FeedRouter::new(public, private));
        Self::build(profile, authenticator, router, channel_state)
    }

    fn build(
        profile: VenueProfile,
        authenticator: Arc<Authenticator>,
        router: Arc<FeedRouter>,
        channel_state: SubscriptionState,
    ) -> Self {
        let request_ids = Arc::new(AtomicU64::new(1));
        let subscriptions = Arc::new(SubscriptionManager::new(
            profile.clone(),
            request_ids.clone(),
        ));

        let hook: PostConnectHook = {
            let authenticator = authenticator.clone();
            let subscriptions = subscriptions.clone();
            let channel_state = channel_state.clone();
            Arc::new(move |writer: WsWriter| -> BoxFuture<'static, WsResult<()>> {
                let authenticator = authenticator.clone();
                let subscriptions = subscriptions.clone();
                let channel_state = channel_state.clone();
                Box::pin(async move {
                    // Confirmations from the previous socket no longer hold
                    channel_state.mark_all_failed();

                    authenticator.authenticate(&writer).await?;

                    let messages = subscriptions.resubscription_messages();
                    if messages.is_empty() {
                        return Ok(());
                    }
                    for subscription in subscriptions.subscriptions() {
                        for channel in &subscription.channels {
                            channel_state.mark_subscribe(channel);
                        }
                    }
                    for message in messages {
                        let text = serde_json::to_string(&message).map_err(WsError::from)?;
                        writer.send_text(text)?;
                    }
                    tracing::info!("Resubscription messages sent");
                    Ok(())
                })
            })
        };

        let config = WebSocketConfig {
            url: profile.ws_url.clone(),
            headers: profile.headers.clone(),
            heartbeat: profile.heartbeat,
            heartbeat_msg: profile.heartbeat_msg.clone(),
            policy: profile.policy.clone(),
            queue_capacity: profile.queue_capacity,
            ..Default::default()
        };
        let ws = Arc::new(WebSocketClient::with_tungstenite(config, Some(hook)));

        // The session is unauthenticated whenever it is not live
        let auth_for_listener = authenticator.clone();
        ws.add_state_listener(Arc::new(move |from, to| {
            if from == ConnectionState::Connected && to != ConnectionState::Connected {
                auth_for_listener.reset();
            }
        }));

        Self {
            profile,
            ws,
            subscriptions,
            authenticator,
            router,
            channel_state,
            metrics: Arc::new(FeedMetrics::new()),
            processor: Mutex::new(None),
        }
    }

    /// Connects, waits for an active session, and subscribes the given
    /// symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if the client already reached terminal state, the
    /// connection does not become active in time, or the initial subscribe
    /// cannot be sent.
    pub async fn initialize(
        &self,
        symbols: &[SymbolKey],
        channel_types: &[ChannelType],
    ) -> WsResult<()> {
        self.start_processor();
        self.ws.connect()?;
        self.ws
            .wait_until_active(DEFAULT_CONNECT_TIMEOUT_SECS)
            .await?;
        if self.authenticator.requires_authentication() {
            self.wait_until_authenticated().await?;
        }
        if !symbols.is_empty() {
            self.subscribe(symbols, channel_types)?;
        }
        Ok(())
    }

    /// Waits for the post-connect handshake driven by the connection loop.
    async fn wait_until_authenticated(&self) -> WsResult<()> {
        let deadline = self.profile.auth.timeout + Duration::from_secs(5);
        let wait = async {
            loop {
                if self.authenticator.is_authenticated() {
                    return Ok(());
                }
                if self.ws.state() == ConnectionState::Closed {
                    return Err(WsError::Closed);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(deadline, wait)
            .await
            .map_err(|_| WsError::Timeout("authentication did not complete".to_string()))?
    }

    /// Records subscriptions and sends the derived subscribe messages.
    ///
    /// The recorded state survives reconnects; it is rebuilt into
    /// resubscription messages by the post-connect hook.
    ///
    /// # Errors
    ///
    /// Returns an error if a message cannot be sent; the subscription state
    /// is still recorded and will be established on the next (re)connect.
    pub fn subscribe(
        &self,
        symbols: &[SymbolKey],
        channel_types: &[ChannelType],
    ) -> WsResult<()> {
        let messages = self.subscriptions.subscribe(symbols, channel_types);
        for subscription in self.subscriptions.subscriptions() {
            if symbols.contains(&subscription.key) {
                for channel in &subscription.channels {
                    self.channel_state.mark_subscribe(channel);
                }
            }
        }
        self.send_all(messages)
    }

    /// Removes subscriptions and sends the derived unsubscribe messages.
    ///
    /// Symbols without a recorded subscription are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if a message cannot be sent.
    pub fn unsubscribe(&self, symbols: &[SymbolKey]) -> WsResult<()> {
        let removed_channels: Vec<String> = self
            .subscriptions
            .subscriptions()
            .into_iter()
            .filter(|s| symbols.contains(&s.key))
            .flat_map(|s| s.channels)
            .collect();

        let messages = self.subscriptions.unsubscribe(symbols);
        for channel in &removed_channels {
            self.channel_state.mark_unsubscribe(channel);
        }
        self.send_all(messages)
    }

    /// Sends an arbitrary message on the connection.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::NotConnected`] unless the session is live.
    pub fn send_message(&self, message: &Value) -> WsResult<()> {
        let text = serde_json::to_string(message).map_err(WsError::from)?;
        self.ws.send_text(text)
    }

    fn send_all(&self, messages: Vec<Value>) -> WsResult<()> {
        for message in messages {
            let text = serde_json::to_string(&message).map_err(WsError::from)?;
            self.ws.send_text(text)?;
        }
        Ok(())
    }

    /// Stops the connection and the processor, driving the state to `Closed`.
    pub async fn close(&self) {
        self.ws.close().await;
        let handle = self.processor.lock().expect("processor lock poisoned").take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(Duration::from_secs(1), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }
    }

    /// Returns whether the session is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.ws.is_active()
    }

    /// Returns whether the session is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticator.is_authenticated()
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.ws.state()
    }

    /// Returns a snapshot of the performance counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.ws.queue().overflow_count())
    }

    /// Registers a listener invoked on every connection state transition.
    ///
    /// Register before [`Self::initialize`] to observe the full sequence.
    /// The terminal `Closed` notification is delivered exactly once.
    pub fn on_state_change(&self, listener: StateListener) {
        self.ws.add_state_listener(listener);
    }

    /// Returns the subscription manager.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Returns the public handler.
    #[must_use]
    pub fn public_handler(&self) -> &PublicFeedHandler {
        self.router.public()
    }

    /// Returns the private handler, when this connection authenticates.
    #[must_use]
    pub fn private_handler(&self) -> Option<&PrivateFeedHandler> {
        self.router.private()
    }

    /// Registers an order book callback.
    pub fn on_orderbook(&self, callback: Callback<OrderbookUpdate>) {
        self.public_handler().on_orderbook(callback);
    }

    /// Registers a trade callback.
    pub fn on_trade(&self, callback: Callback<TradeUpdate>) {
        self.public_handler().on_trade(callback);
    }

    /// Registers a ticker callback.
    pub fn on_ticker(&self, callback: Callback<TickerUpdate>) {
        self.public_handler().on_ticker(callback);
    }

    /// Registers an order update callback (private family).
    pub fn on_order_update(&self, callback: Callback<OrderUpdate>) {
        match self.private_handler() {
            Some(handler) => handler.on_order_update(callback),
            None => tracing::warn!("Order update callbacks require an authenticated client"),
        }
    }

    /// Registers a balance update callback (private family).
    pub fn on_balance_update(&self, callback: Callback<BalanceUpdate>) {
        match self.private_handler() {
            Some(handler) => handler.on_balance_update(callback),
            None => tracing::warn!("Balance update callbacks require an authenticated client"),
        }
    }

    /// Registers a position update callback (private family).
    pub fn on_position_update(&self, callback: Callback<PositionUpdate>) {
        match self.private_handler() {
            Some(handler) => handler.on_position_update(callback),
            None => tracing::warn!("Position update callbacks require an authenticated client"),
        }
    }

    /// Registers an execution report callback (private family).
    pub fn on_execution_report(&self, callback: Callback<ExecutionReport>) {
        match self.private_handler() {
            Some(handler) => handler.on_execution_report(callback),
            None => tracing::warn!("Execution report callbacks require an authenticated client"),
        }
    }

    /// Registers an error callback.
    ///
    /// Errors route through the private family when it is present, otherwise
    /// through the public family.
    pub fn on_error(&self, callback: Callback<FeedError>) {
        match self.private_handler() {
            Some(handler) => handler.on_error(callback),
            None => self.public_handler().on_error(callback),
        }
    }

    fn start_processor(&self) {
        let mut slot = self.processor.lock().expect("processor lock poisoned");
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let queue = self.ws.queue();
        let router = self.router.clone();
        let metrics = self.metrics.clone();
        let writer = self.ws.writer();
        let threshold = self.profile.latency_threshold;
        *slot = Some(tokio::spawn(process_loop(
            queue, router, metrics, writer, threshold,
        )));
    }
}

/// Single-consumer processing loop: strict FIFO, one message at a time.
///
/// A handler failure is counted and logged; it never stops the loop.
/// Failure of message N must never block processing of message N+1.
async fn process_loop(
    queue: Arc<IngestQueue>,
    router: Arc<FeedRouter>,
    metrics: Arc<FeedMetrics>,
    writer: WsWriter,
    latency_threshold: Duration,
) {
    while let Some(message) = queue.pop().await {
        match message.payload {
            Frame::Text(text) => {
                if text == RECONNECTED {
                    metrics.record_reconnection();
                    tracing::info!("Session re-established");
                    continue;
                }
                tracing::trace!(
                    queue_age_us = message.enqueued_at.elapsed().as_micros() as u64,
                    "Processing message"
                );

                let started = Instant::now();
                let outcome = serde_json::from_str::<Value>(&text)
                    .map_err(|e| WsError::Handler(format!("malformed frame: {e}")))
                    .and_then(|raw| router.handle(&raw, &writer));
                metrics.record_processed(started.elapsed(), latency_threshold);

                if let Err(e) = outcome {
                    metrics.record_error();
                    tracing::warn!(error = %e, "Message handling failed");
                }
            }
            Frame::Binary(data) => {
                tracing::debug!(len = data.len(), "Ignoring binary frame");
            }
            _ => {}
        }
    }
    tracing::debug!("Processor loop finished");
}
