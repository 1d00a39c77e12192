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

//! Canonical structured records dispatched to callbacks.
//!
//! These are the generic forms the handler framework parses payloads into.
//! Venue adapters that need richer schemas parse their own types upstream and
//! map into these before dispatch; the core never depends on venue field
//! names beyond the canonical layout.

use serde::{Deserialize, Serialize};
use ustr::Ustr;

/// A single price level of an order book side.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Level price.
    pub price: f64,
    /// Level size; zero deletes the level in delta updates.
    pub size: f64,
}

/// Order book snapshot or delta.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderbookUpdate {
    /// The venue's raw symbol.
    pub symbol: Ustr,
    /// Bid levels, best first.
    pub bids: Vec<BookLevel>,
    /// Ask levels, best first.
    pub asks: Vec<BookLevel>,
    /// Whether this is a full snapshot rather than a delta.
    #[serde(default)]
    pub is_snapshot: bool,
    /// Venue timestamp in milliseconds.
    pub timestamp: u64,
}

/// A public trade print.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeUpdate {
    /// The venue's raw symbol.
    pub symbol: Ustr,
    /// Trade price.
    pub price: f64,
    /// Trade size.
    pub size: f64,
    /// Aggressor side (`buy` or `sell`).
    pub side: String,
    /// Venue trade identifier.
    #[serde(default)]
    pub trade_id: Option<String>,
    /// Venue timestamp in milliseconds.
    pub timestamp: u64,
}

/// Best bid/ask ticker update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TickerUpdate {
    /// The venue's raw symbol.
    pub symbol: Ustr,
    /// Best bid price.
    pub bid: f64,
    /// Best ask price.
    pub ask: f64,
    /// Last traded price, when provided.
    #[serde(default)]
    pub last: Option<f64>,
    /// Venue timestamp in milliseconds.
    pub timestamp: u64,
}

/// Private order lifecycle update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// The venue's raw symbol.
    pub symbol: Ustr,
    /// Venue order identifier.
    pub order_id: String,
    /// Client-assigned order identifier, when echoed.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Order side (`buy` or `sell`).
    pub side: String,
    /// Venue order status (e.g., `new`, `filled`, `canceled`).
    pub status: String,
    /// Limit price, when applicable.
    #[serde(default)]
    pub price: Option<f64>,
    /// Order size.
    pub size: f64,
    /// Cumulative filled size.
    #[serde(default)]
    pub filled: f64,
    /// Venue timestamp in milliseconds.
    pub timestamp: u64,
}

/// Private balance update for one asset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceUpdate {
    /// Asset code (e.g., `USDT`).
    pub asset: Ustr,
    /// Free balance.
    pub free: f64,
    /// Locked balance.
    #[serde(default)]
    pub locked: f64,
    /// Venue timestamp in milliseconds.
    pub timestamp: u64,
}

/// Private position update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// The venue's raw symbol.
    pub symbol: Ustr,
    /// Signed position size; negative is short.
    pub size: f64,
    /// Average entry price, when provided.
    #[serde(default)]
    pub entry_price: Option<f64>,
    /// Unrealized PnL, when provided.
    #[serde(default)]
    pub unrealized_pnl: Option<f64>,
    /// Venue timestamp in milliseconds.
    pub timestamp: u64,
}

/// Private execution/fill report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The venue's raw symbol.
    pub symbol: Ustr,
    /// Venue order identifier.
    pub order_id: String,
    /// Venue execution identifier.
    pub exec_id: String,
    /// Fill price.
    pub price: f64,
    /// Fill size.
    pub size: f64,
    /// Fee charged, when provided.
    #[serde(default)]
    pub fee: Option<f64>,
    /// Liquidity flag (`maker` or `taker`), when provided.
    #[serde(default)]
    pub liquidity: Option<String>,
    /// Venue timestamp in milliseconds.
    pub timestamp: u64,
}

/// Authentication handshake acknowledgment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Whether the handshake was accepted.
    pub success: bool,
    /// Venue-provided detail, present on rejection.
    #[serde(default)]
    pub message: Option<String>,
}

/// Venue-reported error payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedError {
    /// Venue error code, when provided.
    #[serde(default)]
    pub code: Option<i64>,
    /// Venue error message.
    pub message: String,
}

/// Subscription acknowledgment payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionAck {
    /// The channels the acknowledgment covers.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Whether the subscription was accepted.
    #[serde(default = "default_true")]
    pub success: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn test_orderbook_deserializes_canonical_form() {
        let raw = json!({
            "symbol": "BTC-USDT",
            "bids": [{"price": 50_000.0, "size": 1.5}],
            "asks": [{"price": 50_001.0, "size": 0.25}],
            "is_snapshot": true,
            "timestamp": 1_700_000_000_000u64,
        });
        let update: OrderbookUpdate = serde_json::from_value(raw).unwrap();
        assert_eq!(update.symbol.as_str(), "BTC-USDT");
        assert_eq!(update.bids.len(), 1);
        assert!(update.is_snapshot);
    }

    #[rstest]
    fn test_orderbook_snapshot_flag_defaults_to_false() {
        let raw = json!({
            "symbol": "BTC-USDT",
            "bids": [],
            "asks": [],
            "timestamp": 0,
        });
        let update: OrderbookUpdate = serde_json::from_value(raw).unwrap();
        assert!(!update.is_snapshot);
    }

    #[rstest]
    fn test_trade_optional_fields() {
        let raw = json!({
            "symbol": "ETH-USDT",
            "price": 3_000.5,
            "size": 2.0,
            "side": "sell",
            "timestamp": 1_700_000_000_000u64,
        });
        let trade: TradeUpdate = serde_json::from_value(raw).unwrap();
        assert_eq!(trade.trade_id, None);
        assert_eq!(trade.side, "sell");
    }

    #[rstest]
    fn test_subscription_ack_success_defaults_true() {
        let raw = json!({"channels": ["orderbook.BTC-USDT.spot"]});
        let ack: SubscriptionAck = serde_json::from_value(raw).unwrap();
        assert!(ack.success);
        assert_eq!(ack.channels.len(), 1);
    }

    #[rstest]
    fn test_auth_response_rejection_carries_message() {
        let raw = json!({"success": false, "message": "invalid signature"});
        let response: AuthResponse = serde_json::from_value(raw).unwrap();
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("invalid signature"));
    }
}
