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

//! Constants shared across the feed client.

/// User agent sent with connection upgrade requests.
pub const RIPTIDE_USER_AGENT: &str = concat!("RiptideFeed/", env!("CARGO_PKG_VERSION"));

/// Default authentication handshake timeout in seconds.
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 30;

/// Default ingestion queue capacity in messages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default processing latency threshold in milliseconds; durations above this
/// increment the violation counter.
pub const DEFAULT_LATENCY_THRESHOLD_MS: u64 = 100;

/// Default timeout for `initialize` to reach an active connection (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 30.0;
