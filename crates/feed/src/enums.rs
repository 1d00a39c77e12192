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

//! Enumerations and symbol keys for the feed client.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use ustr::Ustr;

/// Data streams a symbol can be subscribed to.
///
/// The venue profile's naming function maps `(symbol, channel type)` to the
/// venue's channel names; an unsupported combination maps to no channels.
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelType {
    /// Order book depth updates.
    Orderbook,
    /// Public trade prints.
    Trades,
    /// Best bid/ask and statistics.
    Ticker,
    /// Private order lifecycle updates.
    Orders,
    /// Private balance updates.
    Balances,
    /// Private position updates.
    Positions,
    /// Private execution/fill reports.
    Executions,
}

impl ChannelType {
    /// Returns whether this channel carries private trading data.
    #[must_use]
    pub const fn is_private(self) -> bool {
        matches!(
            self,
            Self::Orders | Self::Balances | Self::Positions | Self::Executions
        )
    }
}

/// Market variant a symbol trades on.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MarketKind {
    /// Spot market.
    #[default]
    Spot,
    /// Linear (USD-margined) futures.
    Linear,
    /// Inverse (coin-margined) futures.
    Inverse,
}

/// Stable key identifying a symbol on a market variant.
///
/// The same raw symbol on spot and futures is two distinct subscriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolKey {
    /// The venue's raw symbol (e.g., `BTC-USDT`).
    pub symbol: Ustr,
    /// The market variant.
    pub market: MarketKind,
}

impl SymbolKey {
    /// Creates a new [`SymbolKey`] instance.
    #[must_use]
    pub fn new(symbol: impl AsRef<str>, market: MarketKind) -> Self {
        Self {
            symbol: Ustr::from(symbol.as_ref()),
            market,
        }
    }

    /// Creates a spot-market key.
    #[must_use]
    pub fn spot(symbol: impl AsRef<str>) -> Self {
        Self::new(symbol, MarketKind::Spot)
    }
}

impl std::fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.symbol, self.market)
    }
}

/// Message types dispatched by the public market-data handler.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumIter, EnumString)]
pub enum PublicMessageType {
    /// Order book snapshot or delta.
    Orderbook,
    /// A trade print.
    Trade,
    /// Ticker update.
    Ticker,
    /// Application-level keepalive requiring a pong reply.
    Ping,
    /// Subscription acknowledgment.
    SubscriptionAck,
    /// Venue-reported error.
    Error,
}

/// Message types dispatched by the private trading-data handler.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, AsRefStr, EnumIter, EnumString)]
pub enum PrivateMessageType {
    /// Order lifecycle update.
    OrderUpdate,
    /// Account balance update.
    BalanceUpdate,
    /// Position update.
    PositionUpdate,
    /// Execution/fill report.
    ExecutionReport,
    /// Authentication handshake acknowledgment.
    AuthResponse,
    /// Venue-reported error.
    Error,
}

impl PrivateMessageType {
    /// Returns whether this type may be dispatched before authentication.
    ///
    /// Everything else is discarded with a warning while unauthenticated.
    #[must_use]
    pub const fn allowed_unauthenticated(self) -> bool {
        matches!(self, Self::AuthResponse | Self::Error)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_symbol_key_display() {
        let key = SymbolKey::new("BTC-USDT", MarketKind::Linear);
        assert_eq!(key.to_string(), "BTC-USDT.linear");
        assert_eq!(SymbolKey::spot("ETH-USDT").to_string(), "ETH-USDT.spot");
    }

    #[rstest]
    fn test_symbol_key_distinguishes_markets() {
        let spot = SymbolKey::spot("BTC-USDT");
        let linear = SymbolKey::new("BTC-USDT", MarketKind::Linear);
        assert_ne!(spot, linear);
    }

    #[rstest]
    #[case(ChannelType::Orderbook, false)]
    #[case(ChannelType::Trades, false)]
    #[case(ChannelType::Ticker, false)]
    #[case(ChannelType::Orders, true)]
    #[case(ChannelType::Balances, true)]
    #[case(ChannelType::Positions, true)]
    #[case(ChannelType::Executions, true)]
    fn test_channel_privacy(#[case] channel: ChannelType, #[case] expected: bool) {
        assert_eq!(channel.is_private(), expected);
    }

    #[rstest]
    fn test_private_pre_auth_allowance() {
        assert!(PrivateMessageType::AuthResponse.allowed_unauthenticated());
        assert!(PrivateMessageType::Error.allowed_unauthenticated());
        assert!(!PrivateMessageType::OrderUpdate.allowed_unauthenticated());
        assert!(!PrivateMessageType::BalanceUpdate.allowed_unauthenticated());
        assert!(!PrivateMessageType::PositionUpdate.allowed_unauthenticated());
        assert!(!PrivateMessageType::ExecutionReport.allowed_unauthenticated());
    }

    #[rstest]
    fn test_channel_type_wire_format() {
        assert_eq!(ChannelType::Orderbook.as_ref(), "orderbook");
        assert_eq!(MarketKind::Linear.as_ref(), "linear");
    }
}
