//! The bus engine and its supporting pieces.
//!
//! # Key Re-exported Components:
//!
//! *   [`ChannelApp`]: The entry point for launching a bus.
//! *   [`Bus`]: The publish/send/subscribe facade.
//! *   [`ChannelConfig`]: XDG/TOML configuration.
//! *   [`Reply`]: Helpers for handler return types.
//! *   [`MemoryNetwork`]: An in-process cluster for tests and demos.
//!
//! Registry, dispatcher, reply correlator and cluster gateway are internal.

/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */


// --- Public Re-exports ---
pub use bus::Bus;
pub use channel_app::ChannelApp;
pub use cluster::{MemoryNetwork, MemoryTransport};
pub use config::{ChannelConfig, CONFIG};
pub use logging::init_tracing;
pub use reply::Reply;
pub use stats::BusStats;
pub use types::{FutureBox, NodeId};

// --- Crate-Internal Re-exports ---
pub(crate) use bus_inner::BusInner;
pub(crate) use stats::StatsCounters;
pub(crate) use types::{box_handler, box_reply_handler, MessageHandler, ReplyHandler};

// --- Submodules ---

/// Type aliases and node ids.
mod types;

/// Defines the `Bus` facade.
mod bus;
/// Defines the state shared by all clones of a `Bus`.
mod bus_inner;
/// Defines the `ChannelApp` entry point.
mod channel_app;
/// Cluster gateway, codec and in-memory transport.
pub mod cluster;
/// Defines the configuration system.
pub mod config;
/// Reply topics and pending replies.
mod correlator;
/// Publish, send, reply and inbound delivery.
mod dispatcher;
/// Tracing subscriber installation.
mod logging;
/// Topic → handlers, remote nodes and round-robin cursors.
mod registry;
/// Defines the `Reply` helpers.
mod reply;
/// Bus counters.
mod stats;
