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

//! Configuration for WebSocket client connections.

use std::time::Duration;

use crate::backoff::ReconnectionPolicy;

/// Static configuration for a [`crate::websocket::WebSocketClient`].
///
/// Runtime callbacks (post-connect hook, state listeners) are passed
/// separately; this struct contains only data.
#[derive(Clone, Debug)]
pub struct WebSocketConfig {
    /// The URL to connect to.
    pub url: String,
    /// The default headers.
    pub headers: Vec<(String, String)>,
    /// The optional heartbeat interval (seconds).
    pub heartbeat: Option<u64>,
    /// The optional heartbeat message. When `None`, a protocol-level ping
    /// frame is sent instead of a text frame.
    pub heartbeat_msg: Option<String>,
    /// The timeout for a single transport open attempt.
    pub open_timeout: Duration,
    /// The reconnection policy driving backoff and retry decisions.
    pub policy: ReconnectionPolicy,
    /// The ingestion queue capacity (messages).
    pub queue_capacity: usize,
    /// The grace period allowed for in-flight work during `close()`.
    pub grace_period: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: Vec::new(),
            heartbeat: None,
            heartbeat_msg: None,
            open_timeout: Duration::from_secs(10),
            policy: ReconnectionPolicy::default(),
            queue_capacity: 10_000,
            grace_period: Duration::from_secs(5),
        }
    }
}

impl WebSocketConfig {
    /// Creates a config for the given URL with defaults for everything else.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}
