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

//! Symbol-level subscription bookkeeping.
//!
//! [`SubscriptionManager`] is the single source of truth for what the client
//! is subscribed to. Wire messages are always rebuilt from this state, never
//! from anything the transport remembers, which is what makes resubscription
//! after a reconnect deterministic. All mutation happens under one mutex.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use serde_json::Value;

use crate::{
    common::unix_ms_now,
    enums::{ChannelType, SymbolKey},
    venue::{SubscribeOp, VenueProfile},
};

/// An active subscription for one symbol key.
#[derive(Clone, Debug)]
pub struct Subscription {
    /// The symbol key this subscription covers.
    pub key: SymbolKey,
    /// The venue channel names derived for this symbol.
    pub channels: Vec<String>,
    /// When the subscription was last (re)subscribed, Unix milliseconds.
    pub subscribed_at_ms: u64,
    /// Whether the subscription is active.
    pub active: bool,
}

/// Tracks subscriptions and builds (re)subscribe/unsubscribe wire messages.
pub struct SubscriptionManager {
    profile: VenueProfile,
    subscriptions: Mutex<HashMap<SymbolKey, Subscription>>,
    request_ids: Arc<AtomicU64>,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(SubscriptionManager))
            .field("venue", &self.profile.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl SubscriptionManager {
    /// Creates a new manager for the given venue profile.
    ///
    /// `request_ids` is shared with the client so envelope identifiers are
    /// unique across all request kinds on the connection.
    #[must_use]
    pub fn new(profile: VenueProfile, request_ids: Arc<AtomicU64>) -> Self {
        Self {
            profile,
            subscriptions: Mutex::new(HashMap::new()),
            request_ids,
        }
    }

    fn next_request_id(&self) -> u64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Records subscriptions for the given symbols and channel types,
    /// returning the wire messages to send.
    ///
    /// Existing state for a symbol is overwritten. A symbol whose derived
    /// channel list is empty is logged and skipped.
    pub fn subscribe(&self, symbols: &[SymbolKey], channel_types: &[ChannelType]) -> Vec<Value> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .expect("subscription lock poisoned");
        let mut messages = Vec::new();

        for key in symbols {
            let channels: Vec<String> = channel_types
                .iter()
                .flat_map(|channel| (self.profile.naming)(key, *channel))
                .collect();
            if channels.is_empty() {
                tracing::warn!(symbol = %key, "No channels derivable for symbol, skipping");
                continue;
            }

            messages.push((self.profile.envelope)(
                SubscribeOp::Subscribe,
                &channels,
                self.next_request_id(),
            ));
            subscriptions.insert(
                *key,
                Subscription {
                    key: *key,
                    channels,
                    subscribed_at_ms: unix_ms_now(),
                    active: true,
                },
            );
        }

        messages
    }

    /// Removes subscriptions for the given symbols, returning the wire
    /// messages to send.
    ///
    /// Symbols with no recorded subscription contribute nothing.
    pub fn unsubscribe(&self, symbols: &[SymbolKey]) -> Vec<Value> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .expect("subscription lock poisoned");
        let mut messages = Vec::new();

        for key in symbols {
            if let Some(subscription) = subscriptions.remove(key) {
                messages.push((self.profile.envelope)(
                    SubscribeOp::Unsubscribe,
                    &subscription.channels,
                    self.next_request_id(),
                ));
            } else {
                tracing::debug!(symbol = %key, "Unsubscribe for unknown symbol, no-op");
            }
        }

        messages
    }

    /// Builds messages re-establishing every active subscription, refreshing
    /// each entry's timestamp.
    ///
    /// Idempotent with respect to channel coverage: calling this twice
    /// without intervening subscribe/unsubscribe yields the same channels.
    pub fn resubscription_messages(&self) -> Vec<Value> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .expect("subscription lock poisoned");

        let now = unix_ms_now();
        let mut channels: Vec<String> = Vec::new();
        for subscription in subscriptions.values_mut() {
            if !subscription.active {
                continue;
            }
            subscription.subscribed_at_ms = now;
            channels.extend(subscription.channels.iter().cloned());
        }

        if channels.is_empty() {
            return Vec::new();
        }
        channels.sort();
        channels.dedup();

        vec![(self.profile.envelope)(
            SubscribeOp::Subscribe,
            &channels,
            self.next_request_id(),
        )]
    }

    /// Returns a snapshot of all recorded subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Returns whether the symbol has a recorded subscription.
    #[must_use]
    pub fn contains(&self, key: &SymbolKey) -> bool {
        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .contains_key(key)
    }

    /// Returns the number of recorded subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .len()
    }

    /// Returns whether no subscriptions are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::enums::MarketKind;

    #[fixture]
    fn manager() -> SubscriptionManager {
        let profile = VenueProfile::reference("test", "wss://example.com/ws", false);
        SubscriptionManager::new(profile, Arc::new(AtomicU64::new(1)))
    }

    fn channel_set(message: &Value) -> Vec<String> {
        message["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[rstest]
    fn test_subscribe_builds_one_message_per_symbol(manager: SubscriptionManager) {
        let symbols = [SymbolKey::spot("BTC-USDT"), SymbolKey::spot("ETH-USDT")];
        let messages = manager.subscribe(&symbols, &[ChannelType::Orderbook]);

        assert_eq!(messages.len(), 2);
        assert_eq!(manager.len(), 2);
        assert_eq!(
            channel_set(&messages[0]),
            vec!["orderbook.BTC-USDT.spot".to_string()]
        );
    }

    #[rstest]
    fn test_subscribe_overwrites_existing_state(manager: SubscriptionManager) {
        let symbols = [SymbolKey::spot("BTC-USDT")];
        manager.subscribe(&symbols, &[ChannelType::Orderbook]);
        manager.subscribe(&symbols, &[ChannelType::Trades]);

        assert_eq!(manager.len(), 1);
        let subscription = &manager.subscriptions()[0];
        assert_eq!(
            subscription.channels,
            vec!["trades.BTC-USDT.spot".to_string()]
        );
    }

    #[rstest]
    fn test_resubscription_covers_exactly_subscribed_channels(manager: SubscriptionManager) {
        let symbols = [SymbolKey::spot("BTC-USDT"), SymbolKey::spot("ETH-USDT")];
        manager.subscribe(&symbols, &[ChannelType::Orderbook, ChannelType::Trades]);

        let messages = manager.resubscription_messages();
        assert_eq!(messages.len(), 1);
        let mut channels = channel_set(&messages[0]);
        channels.sort();
        assert_eq!(
            channels,
            vec![
                "orderbook.BTC-USDT.spot".to_string(),
                "orderbook.ETH-USDT.spot".to_string(),
                "trades.BTC-USDT.spot".to_string(),
                "trades.ETH-USDT.spot".to_string(),
            ]
        );

        // Idempotent: a second call yields the same coverage
        let again = manager.resubscription_messages();
        let mut channels_again = channel_set(&again[0]);
        channels_again.sort();
        assert_eq!(channels, channels_again);
    }

    #[rstest]
    fn test_resubscription_with_no_subscriptions_is_empty(manager: SubscriptionManager) {
        assert!(manager.resubscription_messages().is_empty());
    }

    #[rstest]
    fn test_unsubscribe_unknown_symbol_is_noop(manager: SubscriptionManager) {
        let messages = manager.unsubscribe(&[SymbolKey::spot("XRP-USDT")]);
        assert!(messages.is_empty());
        assert!(manager.is_empty());
    }

    #[rstest]
    fn test_unsubscribe_removes_state(manager: SubscriptionManager) {
        let symbols = [SymbolKey::spot("BTC-USDT")];
        manager.subscribe(&symbols, &[ChannelType::Orderbook]);
        assert!(manager.contains(&symbols[0]));

        let messages = manager.unsubscribe(&symbols);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["op"], "unsubscribe");
        assert!(!manager.contains(&symbols[0]));

        // Resubscription no longer covers the removed symbol
        assert!(manager.resubscription_messages().is_empty());
    }

    #[rstest]
    fn test_markets_are_distinct_subscriptions(manager: SubscriptionManager) {
        let spot = SymbolKey::spot("BTC-USDT");
        let linear = SymbolKey::new("BTC-USDT", MarketKind::Linear);
        manager.subscribe(&[spot, linear], &[ChannelType::Trades]);

        assert_eq!(manager.len(), 2);
        manager.unsubscribe(&[spot]);
        assert!(!manager.contains(&spot));
        assert!(manager.contains(&linear));
    }
}
