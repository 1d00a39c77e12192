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

//! Integration tests for the feed client using a mock Axum server speaking
//! the canonical protocol.

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use riptide_feed::{
    AuthConfirmation, ChannelType, Credential, FeedClient, SymbolKey, VenueProfile,
};
use riptide_network::{ConnectionState, ReconnectionPolicy, WsError};
use serde_json::{Value, json};

// ------------------------------------------------------------------------------------------------
// Mock server
// ------------------------------------------------------------------------------------------------

#[derive(Default)]
struct ServerState {
    connection_count: AtomicUsize,
    subscribe_msgs: Mutex<Vec<Value>>,
    unsubscribe_msgs: Mutex<Vec<Value>>,
    auth_requests: Mutex<Vec<Value>>,
    reject_auth: AtomicBool,
    ignore_auth: AtomicBool,
    send_early_order: AtomicBool,
    drop_first_connection_after_ack: AtomicBool,
    garbage_before_data: AtomicBool,
}

fn order_frame(order_id: &str) -> Message {
    let frame = json!({
        "type": "order",
        "data": {
            "symbol": "BTC-USDT",
            "order_id": order_id,
            "side": "buy",
            "status": "new",
            "size": 1.0,
            "timestamp": 1_700_000_000_000u64,
        },
    });
    Message::Text(frame.to_string().into())
}

fn orderbook_frame(symbol: &str) -> Message {
    let frame = json!({
        "type": "orderbook",
        "data": {
            "symbol": symbol,
            "bids": [{"price": 50_000.0, "size": 1.5}],
            "asks": [{"price": 50_001.0, "size": 2.0}],
            "is_snapshot": true,
            "timestamp": 1_700_000_000_000u64,
        },
    });
    Message::Text(frame.to_string().into())
}

fn trade_frame(symbol: &str) -> Message {
    let frame = json!({
        "type": "trade",
        "data": {
            "symbol": symbol,
            "price": 50_000.5,
            "size": 0.25,
            "side": "sell",
            "trade_id": "t-1",
            "timestamp": 1_700_000_000_000u64,
        },
    });
    Message::Text(frame.to_string().into())
}

async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ServerState>) {
    let connection = state.connection_count.fetch_add(1, Ordering::SeqCst) + 1;

    // A private frame delivered before any handshake completes must be
    // discarded by the client, not dispatched
    if state.send_early_order.load(Ordering::SeqCst)
        && socket.send(order_frame("early")).await.is_err()
    {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        match value.get("op").and_then(Value::as_str) {
            Some("auth") => {
                state.auth_requests.lock().unwrap().push(value.clone());
                if state.ignore_auth.load(Ordering::SeqCst) {
                    continue;
                }
                let success = !state.reject_auth.load(Ordering::SeqCst);
                let response = json!({
                    "type": "auth",
                    "success": success,
                    "message": if success { Value::Null } else { json!("invalid signature") },
                });
                if socket
                    .send(Message::Text(response.to_string().into()))
                    .await
                    .is_err()
                {
                    return;
                }
                if success
                    && state.send_early_order.load(Ordering::SeqCst)
                    && socket.send(order_frame("post-auth")).await.is_err()
                {
                    return;
                }
            }
            Some("subscribe") => {
                state.subscribe_msgs.lock().unwrap().push(value.clone());
                let channels: Vec<String> = value["args"]
                    .as_array()
                    .map(|args| {
                        args.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();

                let ack = json!({
                    "type": "ack",
                    "data": {"channels": channels, "success": true},
                });
                if socket
                    .send(Message::Text(ack.to_string().into()))
                    .await
                    .is_err()
                {
                    return;
                }

                if state.garbage_before_data.load(Ordering::SeqCst)
                    && socket
                        .send(Message::Text("this is not json".to_string().into()))
                        .await
                        .is_err()
                {
                    return;
                }

                for channel in &channels {
                    let mut parts = channel.split('.');
                    let stream = parts.next().unwrap_or_default();
                    let symbol = parts.next().unwrap_or_default();
                    let frame = match stream {
                        "orderbook" => Some(orderbook_frame(symbol)),
                        "trades" => Some(trade_frame(symbol)),
                        _ => None,
                    };
                    if let Some(frame) = frame
                        && socket.send(frame).await.is_err()
                    {
                        return;
                    }
                }

                if connection == 1
                    && state
                        .drop_first_connection_after_ack
                        .load(Ordering::SeqCst)
                {
                    // Abrupt drop, no close handshake
                    return;
                }
            }
            Some("unsubscribe") => {
                state.unsubscribe_msgs.lock().unwrap().push(value.clone());
                let ack = json!({"type": "ack", "data": {"channels": [], "success": true}});
                if socket
                    .send(Message::Text(ack.to_string().into()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            _ => {}
        }
    }
}

async fn spawn_server(state: Arc<ServerState>) -> SocketAddr {
    let app = Router::new()
        .route("/ws", get(handle_ws_upgrade))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });
    addr
}

fn profile_for(addr: SocketAddr, requires_auth: bool) -> VenueProfile {
    let mut profile = VenueProfile::reference("mock", format!("ws://{addr}/ws"), requires_auth);
    profile.policy = ReconnectionPolicy {
        max_attempts: Some(5),
        delay_initial: Duration::from_millis(10),
        backoff_factor: 2.0,
        delay_max: Duration::from_millis(50),
        jitter_ms: 0,
        reset_on_abnormal_closure: false,
    };
    profile.auth.timeout = Duration::from_secs(2);
    profile
}

fn credential() -> Credential {
    Credential::new("test_key".to_string(), "test_secret".to_string())
}

async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ------------------------------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------------------------------

#[tokio::test]
async fn test_authenticated_subscribe_dispatches_orderbook_once() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_server(state.clone()).await;

    let client = FeedClient::new(profile_for(addr, true), Some(credential()));
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    client.on_orderbook(Arc::new(move |update| {
        received_clone
            .lock()
            .unwrap()
            .push((update.symbol, update.bids.len()));
        Ok(())
    }));

    client
        .initialize(&[SymbolKey::spot("BTC-USDT")], &[ChannelType::Orderbook])
        .await
        .unwrap();

    assert!(
        wait_until(|| !received.lock().unwrap().is_empty(), Duration::from_secs(5)).await,
        "orderbook callback was not invoked"
    );
    // Settle, then confirm the callback fired exactly once
    tokio::time::sleep(Duration::from_millis(200)).await;
    {
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.as_str(), "BTC-USDT");
        assert_eq!(received[0].1, 1);
    }

    assert!(client.is_authenticated());
    assert_eq!(state.auth_requests.lock().unwrap().len(), 1);

    // Exactly one derived subscribe message, covering exactly the derived channel
    let subscribes = state.subscribe_msgs.lock().unwrap();
    assert_eq!(subscribes.len(), 1);
    assert_eq!(subscribes[0]["args"][0], "orderbook.BTC-USDT.spot");

    drop(subscribes);
    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_private_frames_before_authentication_are_discarded() {
    let state = Arc::new(ServerState::default());
    state.send_early_order.store(true, Ordering::SeqCst);
    let addr = spawn_server(state.clone()).await;

    let client = FeedClient::new(profile_for(addr, true), Some(credential()));
    let order_ids = Arc::new(Mutex::new(Vec::new()));
    let order_ids_clone = order_ids.clone();
    client.on_order_update(Arc::new(move |update| {
        order_ids_clone.lock().unwrap().push(update.order_id.clone());
        Ok(())
    }));

    client.initialize(&[], &[]).await.unwrap();

    assert!(
        wait_until(|| !order_ids.lock().unwrap().is_empty(), Duration::from_secs(5)).await,
        "post-auth order update was not dispatched"
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The pre-auth frame was discarded; only the post-auth one dispatched
    let order_ids = order_ids.lock().unwrap();
    assert_eq!(order_ids.as_slice(), ["post-auth".to_string()]);

    drop(order_ids);
    client.close().await;
}

#[tokio::test]
async fn test_handler_error_does_not_block_next_message() {
    let state = Arc::new(ServerState::default());
    state.garbage_before_data.store(true, Ordering::SeqCst);
    let addr = spawn_server(state.clone()).await;

    let client = FeedClient::new(profile_for(addr, false), None);
    let trades = Arc::new(Mutex::new(0usize));
    let trades_clone = trades.clone();
    client.on_trade(Arc::new(move |_| {
        *trades_clone.lock().unwrap() += 1;
        Ok(())
    }));

    client
        .initialize(&[SymbolKey::spot("ETH-USDT")], &[ChannelType::Trades])
        .await
        .unwrap();

    // The garbage frame precedes the trade frame; the trade must still arrive
    assert!(
        wait_until(|| *trades.lock().unwrap() > 0, Duration::from_secs(5)).await,
        "trade callback was not invoked after a handler error"
    );

    let metrics = client.metrics();
    assert!(metrics.error_count >= 1);
    assert!(metrics.messages_processed >= 2);

    client.close().await;
}

#[tokio::test]
async fn test_reconnect_reauthenticates_and_resubscribes() {
    let state = Arc::new(ServerState::default());
    state
        .drop_first_connection_after_ack
        .store(true, Ordering::SeqCst);
    let addr = spawn_server(state.clone()).await;

    let client = FeedClient::new(profile_for(addr, true), Some(credential()));
    client
        .initialize(&[SymbolKey::spot("BTC-USDT")], &[ChannelType::Orderbook])
        .await
        .unwrap();

    // The first connection is dropped after the subscribe ack; the client
    // must reconnect, re-authenticate, and rebuild the subscription from
    // its own state
    assert!(
        wait_until(
            || state.subscribe_msgs.lock().unwrap().len() >= 2,
            Duration::from_secs(5),
        )
        .await,
        "no resubscription after reconnect"
    );

    assert!(state.connection_count.load(Ordering::SeqCst) >= 2);
    assert!(state.auth_requests.lock().unwrap().len() >= 2);

    let subscribes = state.subscribe_msgs.lock().unwrap();
    let initial: Vec<&Value> = subscribes[0]["args"].as_array().unwrap().iter().collect();
    let resub: Vec<&Value> = subscribes[1]["args"].as_array().unwrap().iter().collect();
    assert_eq!(initial, resub);

    drop(subscribes);
    assert!(
        wait_until(|| client.metrics().reconnection_count >= 1, Duration::from_secs(5)).await
    );

    client.close().await;
}

#[tokio::test]
async fn test_auth_rejection_terminates_without_retry() {
    let state = Arc::new(ServerState::default());
    state.reject_auth.store(true, Ordering::SeqCst);
    let addr = spawn_server(state.clone()).await;

    let client = FeedClient::new(profile_for(addr, true), Some(credential()));
    let terminal_count = Arc::new(AtomicUsize::new(0));
    let terminal_clone = terminal_count.clone();
    client.on_state_change(Arc::new(move |_, to| {
        if to == ConnectionState::Closed {
            terminal_clone.fetch_add(1, Ordering::SeqCst);
        }
    }));

    // Initialization may observe the brief Connected window or the terminal
    // state; either way the client must end Closed without retrying auth
    let _ = client.initialize(&[], &[]).await;

    assert!(
        wait_until(
            || client.state() == ConnectionState::Closed,
            Duration::from_secs(5),
        )
        .await,
        "client did not reach terminal state"
    );
    assert!(!client.is_authenticated());
    assert_eq!(terminal_count.load(Ordering::SeqCst), 1);
    assert_eq!(state.auth_requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_assume_after_timeout_authentication() {
    let state = Arc::new(ServerState::default());
    state.ignore_auth.store(true, Ordering::SeqCst);
    let addr = spawn_server(state.clone()).await;

    let mut profile = profile_for(addr, true);
    profile.auth.confirmation = AuthConfirmation::AssumeAfterTimeout;
    profile.auth.timeout = Duration::from_millis(200);

    let client = FeedClient::new(profile, Some(credential()));
    client.initialize(&[], &[]).await.unwrap();

    assert!(
        wait_until(|| client.is_authenticated(), Duration::from_secs(5)).await,
        "session was not assumed authenticated after the timeout"
    );

    client.close().await;
}

#[tokio::test]
async fn test_unsubscribe_sends_envelope_and_clears_state() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_server(state.clone()).await;

    let client = FeedClient::new(profile_for(addr, false), None);
    let symbols = [SymbolKey::spot("BTC-USDT")];
    client
        .initialize(&symbols, &[ChannelType::Orderbook])
        .await
        .unwrap();

    client.unsubscribe(&symbols).unwrap();
    assert!(
        wait_until(
            || state.unsubscribe_msgs.lock().unwrap().len() == 1,
            Duration::from_secs(5),
        )
        .await
    );
    assert!(!client.subscriptions().contains(&symbols[0]));

    // Unsubscribing again is a no-op
    client.unsubscribe(&symbols).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.unsubscribe_msgs.lock().unwrap().len(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_exhausted_attempts_reach_terminal_closed() {
    // Reserve a port then drop the listener so connects are refused
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = FeedClient::new(profile_for(addr, false), None);
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let transitions_clone = transitions.clone();
    client.on_state_change(Arc::new(move |from, to| {
        transitions_clone.lock().unwrap().push((from, to));
    }));

    let result = client.initialize(&[], &[]).await;
    assert!(matches!(result, Err(WsError::Closed | WsError::Timeout(_))));

    assert!(
        wait_until(
            || client.state() == ConnectionState::Closed,
            Duration::from_secs(10),
        )
        .await
    );

    let transitions = transitions.lock().unwrap();
    for (from, to) in transitions.iter() {
        assert!(from.can_transition_to(*to), "invalid edge {from} -> {to}");
    }
    let terminal = transitions
        .iter()
        .filter(|(_, to)| *to == ConnectionState::Closed)
        .count();
    assert_eq!(terminal, 1);
}
