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

//! Exchange-agnostic streaming feed client.
//!
//! [`client::FeedClient`] composes the network layer with the venue-specific
//! strategy values of a [`venue::VenueProfile`]: channel naming, message
//! envelopes, handshake signing, and message classification. Everything a
//! venue does differently is data on the profile; everything venues share
//! (the lifecycle loop, subscription bookkeeping, the bounded pipeline,
//! metric accounting) is implemented once here and in `riptide-network`.
//!
//! A connection serves either the public market-data family or the private
//! trading-data family of messages; run one client per family, as venues
//! typically expose them on separate endpoints.

pub mod auth;
pub mod client;
pub mod common;
pub mod enums;
pub mod handler;
pub mod messages;
pub mod metrics;
pub mod subscription;
pub mod venue;

pub use auth::Authenticator;
pub use client::FeedClient;
pub use common::credential::Credential;
pub use enums::{ChannelType, MarketKind, PrivateMessageType, PublicMessageType, SymbolKey};
pub use handler::{Callback, FeedRouter, MessageRouter, PrivateFeedHandler, PublicFeedHandler};
pub use messages::{
    AuthResponse, BalanceUpdate, BookLevel, ExecutionReport, FeedError, OrderUpdate,
    OrderbookUpdate, PositionUpdate, SubscriptionAck, TickerUpdate, TradeUpdate,
};
pub use metrics::{FeedMetrics, MetricsSnapshot};
pub use subscription::{Subscription, SubscriptionManager};
pub use venue::{AuthConfirmation, AuthSpec, SubscribeOp, VenueProfile};
