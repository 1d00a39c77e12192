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

//! Persistent-connection network layer for streaming venue connectivity.
//!
//! This crate provides the transport-level building blocks shared by every feed
//! client: the connection lifecycle state machine, the reconnection/backoff
//! policy, the error taxonomy with retry classification, the bounded ingestion
//! queue, per-channel subscription acknowledgment state, the authentication
//! tracker, and the generic [`websocket::WebSocketClient`] that ties them
//! together into a supervised connection loop.
//!
//! Exchange-specific concerns (channel naming, message envelopes, handshake
//! signing, payload parsing) live above this crate and are injected as strategy
//! values.

pub mod auth;
pub mod backoff;
pub mod config;
pub mod error;
pub mod mode;
pub mod queue;
pub mod subscription;
pub mod transport;
pub mod websocket;

pub use auth::AuthTracker;
pub use backoff::{BackoffState, ReconnectionPolicy};
pub use config::WebSocketConfig;
pub use error::{ErrorKind, WsError, WsResult};
pub use mode::{ConnectionState, ConnectionStateMachine, StateListener};
pub use queue::{IngestQueue, QueuedMessage};
pub use subscription::{ChannelStatus, SubscriptionState};
pub use transport::{Frame, Transport, TransportSink, TransportStream, TungsteniteTransport};
pub use websocket::{PostConnectHook, RECONNECTED, WebSocketClient, WsWriter};
