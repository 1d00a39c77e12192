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

//! Connection lifecycle state machine.
//!
//! A connection is always in exactly one [`ConnectionState`], stored as an
//! atomic so it can be read lock-free from any task. Transitions are edges of
//! a fixed graph; an attempt to take an edge outside the graph is rejected
//! rather than applied. Registered listeners are notified on every applied
//! transition, which makes the terminal `Closed` notification exactly-once by
//! construction (`Closed` has no outgoing edges).

use std::sync::{
    RwLock,
    atomic::{AtomicU8, Ordering},
};

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The lifecycle state of a WebSocket connection.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumIter, EnumString, Default,
)]
#[repr(u8)]
pub enum ConnectionState {
    /// Initial state, no connection attempt made yet.
    #[default]
    Disconnected = 0,
    /// A transport open is in flight.
    Connecting = 1,
    /// The transport is open and the session is live.
    Connected = 2,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting = 3,
    /// The last open attempt failed.
    Error = 4,
    /// An explicit stop is in progress.
    Closing = 5,
    /// Terminal state, requires a new client to connect again.
    Closed = 6,
}

impl ConnectionState {
    /// Converts a `u8` into a [`ConnectionState`].
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::Error,
            5 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Converts this state into its `u8` representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns whether `self -> next` is an edge of the lifecycle graph.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Disconnected, Self::Closing)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Error)
                | (Self::Connected, Self::Reconnecting)
                | (Self::Connected, Self::Closing)
                | (Self::Error, Self::Reconnecting)
                | (Self::Error, Self::Closed)
                | (Self::Reconnecting, Self::Connecting)
                | (Self::Reconnecting, Self::Closed)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Returns whether this state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Listener invoked with `(from, to)` on every applied transition.
pub type StateListener = std::sync::Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

/// Error returned when a transition outside the lifecycle graph is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid connection state transition: {from} -> {to}")]
pub struct InvalidTransition {
    /// The state the machine was in.
    pub from: ConnectionState,
    /// The state that was requested.
    pub to: ConnectionState,
}

/// Atomic holder of the current [`ConnectionState`] with transition validation.
#[derive(Default)]
pub struct ConnectionStateMachine {
    state: AtomicU8,
    listeners: RwLock<Vec<StateListener>>,
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ConnectionStateMachine))
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionStateMachine {
    /// Creates a new machine in [`ConnectionState::Disconnected`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Registers a listener invoked on every applied transition.
    ///
    /// Listeners registered before `connect()` observe the full transition
    /// sequence. Listener panics are not caught; listeners must not panic.
    pub fn add_listener(&self, listener: StateListener) {
        self.listeners
            .write()
            .expect("state listener lock poisoned")
            .push(listener);
    }

    /// Applies `current -> to` if it is an edge of the lifecycle graph.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the edge is not in the graph or the
    /// current state changed concurrently to one without that edge.
    pub fn transition(&self, to: ConnectionState) -> Result<(), InvalidTransition> {
        loop {
            let from = self.state();
            if !from.can_transition_to(to) {
                return Err(InvalidTransition { from, to });
            }
            if self
                .state
                .compare_exchange(
                    from.as_u8(),
                    to.as_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                tracing::debug!("Connection state: {from} -> {to}");
                self.notify(from, to);
                return Ok(());
            }
        }
    }

    fn notify(&self, from: ConnectionState, to: ConnectionState) {
        let listeners = self
            .listeners
            .read()
            .expect("state listener lock poisoned");
        for listener in listeners.iter() {
            listener(from, to);
        }
    }
}
