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

//! Error taxonomy and retry classification for the connection layer.
//!
//! Classification is typed at conversion time rather than inferred at the
//! catching site: transport failures carry their [`ErrorKind`] from the moment
//! they are mapped out of tungstenite, and [`classify`] is a total function
//! from error to kind. Retry eligibility is a property of the kind alone.

use std::io;

use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Classification buckets consumed by the reconnection policy.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumIter, EnumString)]
pub enum ErrorKind {
    /// An operation exceeded its deadline.
    Timeout,
    /// The remote endpoint refused the connection.
    ConnectionRefused,
    /// The connection dropped without a closing handshake.
    AbnormalClosure,
    /// The handshake was rejected or unconfirmed.
    AuthenticationFailure,
    /// The venue signalled request throttling.
    RateLimit,
    /// A malformed or unsupported frame, permanent for this payload.
    ProtocolError,
    /// Anything not covered by a more specific bucket.
    Unknown,
}

impl ErrorKind {
    /// Returns whether errors of this kind are eligible for reconnection.
    ///
    /// Authentication rejections and protocol violations will fail identically
    /// on the next attempt, so they terminate the loop instead of retrying.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::AuthenticationFailure | Self::ProtocolError)
    }
}

/// Error types for the streaming connection layer.
#[derive(Debug, Clone, Error)]
pub enum WsError {
    /// Client is not connected.
    #[error("Not connected")]
    NotConnected,
    /// Transport-level failure, classified at conversion time.
    #[error("Transport error ({kind}): {message}")]
    Transport {
        /// The classification bucket for this failure.
        kind: ErrorKind,
        /// Human-readable failure detail.
        message: String,
    },
    /// Failed to hand a message to the outbound writer.
    #[error("Send error: {0}")]
    Send(String),
    /// Malformed or unsupported frame content.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// JSON serialization/deserialization failure.
    #[error("JSON error: {0}")]
    Json(String),
    /// Handshake rejected, or unconfirmed where confirmation is required.
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// Failure isolated to a single message's parse or dispatch.
    #[error("Handler error: {0}")]
    Handler(String),
    /// An operation exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// The client reached terminal state.
    #[error("Client closed")]
    Closed,
}

/// Result type alias for connection-layer operations.
pub type WsResult<T> = Result<T, WsError>;

impl WsError {
    /// Creates a transport error with the given kind.
    #[must_use]
    pub fn transport(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }
}

/// Maps an error to its classification bucket.
#[must_use]
pub fn classify(error: &WsError) -> ErrorKind {
    match error {
        WsError::Transport { kind, .. } => *kind,
        WsError::Timeout(_) => ErrorKind::Timeout,
        WsError::Authentication(_) => ErrorKind::AuthenticationFailure,
        WsError::Protocol(_) | WsError::Json(_) => ErrorKind::ProtocolError,
        WsError::NotConnected | WsError::Send(_) | WsError::Handler(_) | WsError::Closed => {
            ErrorKind::Unknown
        }
    }
}

fn classify_io(error: &io::Error) -> ErrorKind {
    match error.kind() {
        io::ErrorKind::TimedOut => ErrorKind::Timeout,
        io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ErrorKind::AbnormalClosure,
        _ => ErrorKind::Unknown,
    }
}

impl From<tungstenite::Error> for WsError {
    fn from(error: tungstenite::Error) -> Self {
        let message = error.to_string();
        let kind = match &error {
            tungstenite::Error::Io(e) => classify_io(e),
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                ErrorKind::AbnormalClosure
            }
            tungstenite::Error::Protocol(
                tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
            ) => ErrorKind::AbnormalClosure,
            tungstenite::Error::Protocol(_) => ErrorKind::ProtocolError,
            tungstenite::Error::Http(response) => match response.status().as_u16() {
                429 => ErrorKind::RateLimit,
                401 | 403 => ErrorKind::AuthenticationFailure,
                _ => ErrorKind::Unknown,
            },
            _ => ErrorKind::Unknown,
        };
        Self::Transport { kind, message }
    }
}

impl From<serde_json::Error> for WsError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}
