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

//! Per-channel subscription acknowledgment state.
//!
//! Tracks the wire-level lifecycle of each channel name: a subscribe request
//! marks the channel pending, the venue's acknowledgment confirms it, and a
//! reconnect marks everything failed until resubscription goes through. The
//! symbol-level source of truth lives above this layer.

use std::sync::Arc;

use dashmap::DashMap;
use strum::{AsRefStr, Display};

/// The acknowledgment status of a single channel.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, AsRefStr)]
pub enum ChannelStatus {
    /// Subscribe sent, acknowledgment not yet received.
    PendingSubscribe,
    /// The venue confirmed the subscription.
    Confirmed,
    /// Unsubscribe sent, acknowledgment not yet received.
    PendingUnsubscribe,
    /// The subscription failed or was invalidated by a reconnect.
    Failed,
}

/// Shared acknowledgment state for all channels on one connection.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionState {
    channels: Arc<DashMap<String, ChannelStatus>>,
}

impl SubscriptionState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a channel as pending subscription.
    pub fn mark_subscribe(&self, channel: &str) {
        self.channels
            .insert(channel.to_string(), ChannelStatus::PendingSubscribe);
    }

    /// Confirms a channel subscription.
    pub fn confirm_subscribe(&self, channel: &str) {
        self.channels
            .insert(channel.to_string(), ChannelStatus::Confirmed);
    }

    /// Marks a channel as pending unsubscription.
    pub fn mark_unsubscribe(&self, channel: &str) {
        self.channels
            .insert(channel.to_string(), ChannelStatus::PendingUnsubscribe);
    }

    /// Confirms an unsubscription, removing the channel.
    pub fn confirm_unsubscribe(&self, channel: &str) {
        self.channels.remove(channel);
    }

    /// Marks a single channel as failed.
    pub fn mark_failure(&self, channel: &str) {
        if let Some(mut entry) = self.channels.get_mut(channel) {
            *entry.value_mut() = ChannelStatus::Failed;
        }
    }

    /// Marks every tracked channel as failed, returning their names.
    ///
    /// Called on reconnect: transport-held subscriptions did not survive the
    /// old socket.
    pub fn mark_all_failed(&self) -> Vec<String> {
        let names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        for name in &names {
            self.mark_failure(name);
        }
        names
    }

    /// Returns the status of a channel, if tracked.
    #[must_use]
    pub fn status(&self, channel: &str) -> Option<ChannelStatus> {
        self.channels.get(channel).map(|e| *e.value())
    }

    /// Returns all confirmed channel names.
    #[must_use]
    pub fn confirmed_channels(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|e| *e.value() == ChannelStatus::Confirmed)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Returns the number of tracked channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns whether no channels are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_subscribe_confirm_lifecycle() {
        let state = SubscriptionState::new();
        state.mark_subscribe("orderbook.BTC-USDT.spot");
        assert_eq!(
            state.status("orderbook.BTC-USDT.spot"),
            Some(ChannelStatus::PendingSubscribe)
        );

        state.confirm_subscribe("orderbook.BTC-USDT.spot");
        assert_eq!(
            state.status("orderbook.BTC-USDT.spot"),
            Some(ChannelStatus::Confirmed)
        );
        assert_eq!(state.confirmed_channels().len(), 1);
    }

    #[rstest]
    fn test_unsubscribe_removes_on_confirm() {
        let state = SubscriptionState::new();
        state.mark_subscribe("trades.ETH-USDT.spot");
        state.confirm_subscribe("trades.ETH-USDT.spot");
        state.mark_unsubscribe("trades.ETH-USDT.spot");
        assert_eq!(
            state.status("trades.ETH-USDT.spot"),
            Some(ChannelStatus::PendingUnsubscribe)
        );

        state.confirm_unsubscribe("trades.ETH-USDT.spot");
        assert_eq!(state.status("trades.ETH-USDT.spot"), None);
        assert!(state.is_empty());
    }

    #[rstest]
    fn test_mark_all_failed() {
        let state = SubscriptionState::new();
        state.confirm_subscribe("a");
        state.confirm_subscribe("b");

        let mut failed = state.mark_all_failed();
        failed.sort();
        assert_eq!(failed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(state.status("a"), Some(ChannelStatus::Failed));
        assert!(state.confirmed_channels().is_empty());
    }

    #[rstest]
    fn test_mark_failure_on_unknown_channel_is_noop() {
        let state = SubscriptionState::new();
        state.mark_failure("unknown");
        assert!(state.is_empty());
    }
}
