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


#![forbid(unsafe_code)]
#![forbid(missing_docs)]

//! # Realtime Channel
//!
//! A lightweight event bus that spans processes. Publish/subscribe,
//! point-to-point sends and request/response conversations share one
//! namespace of string topics, and work the same whether sender and
//! receiver live in the same process or on different nodes.
//!
//! ## Key Concepts
//!
//! - **Bus (`Bus`)**: the facade. `publish` reaches every handler of a topic,
//!   `send` reaches exactly one (round-robin), and `send_with_reply` /
//!   `request` wait for an answer.
//! - **Messages (`Message`)**: what handlers receive. A message can be
//!   answered with `reply`, `reply_with` (which waits for the sender's own
//!   answer, to any depth) or `fail`.
//! - **Registrations (`Registration`)**: `subscribe` registers a handler
//!   visible to the cluster, `subscribe_local` one visible to this node only.
//! - **Cluster**: a `ClusterTransport` links bus instances; the bus
//!   advertises its topics to peers and routes messages to them.
//!   `MemoryNetwork` provides an in-process transport.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use realtime_channel::prelude::*;
//!
//! #[channel_message]
//! struct Ping {
//!     count: u32,
//! }
//!
//! #[channel_main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = ChannelApp::launch_async().await;
//!     bus.subscribe("ping", |message| async move {
//!         let ping: Ping = message.payload_as().unwrap();
//!         message.reply(Ping { count: ping.count + 1 });
//!     });
//!     let pong = bus.request("ping", Ping { count: 1 }).await?;
//!     println!("{:?}", pong.payload());
//!     bus.shutdown().await
//! }
//! ```

/// The bus engine, configuration, logging and cluster plumbing.
pub(crate) mod common;

/// Message, registration and error types.
pub(crate) mod message;

/// Extension points: cluster transports and timeout policies.
pub(crate) mod traits;

pub use common::{init_tracing, ChannelConfig, CONFIG};

/// Cluster plumbing usable by transport implementations.
pub mod cluster {
    pub use crate::common::cluster::{
        Format, FrameCodec, MemoryNetwork, MemoryTransport, HEADER_SIZE, WIRE_VERSION,
    };
    pub use crate::message::{DeliveryKind, Envelope};
    pub use crate::traits::{ClusterEvent, ClusterTransport};
}

/// Configuration types.
pub mod config {
    pub use crate::common::config::{
        BehaviorConfig, ChannelConfig, DefaultsConfig, LimitsConfig, PathsConfig, TimeoutConfig,
        TracingConfig, CONFIG,
    };
}

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Macros (from `realtime-channel-macro`)
/// *   `channel_message`: Attribute macro for payload types.
/// *   `channel_main`: Attribute macro for the application entry point.
///
/// ## External Crates
/// *   `async_trait`: For implementing [`ClusterTransport`](crate::traits::ClusterTransport).
/// *   `tokio`: Used by `channel_main`.
///
/// ## Core Types
/// *   [`crate::common::ChannelApp`], [`crate::common::Bus`], [`crate::common::Reply`]
/// *   [`crate::message::Message`], [`crate::message::Registration`], [`crate::message::BusError`]
/// *   [`crate::traits::TimeoutPolicy`] and its implementations
pub mod prelude {
    pub use realtime_channel_macro::*;

    pub use async_trait::async_trait;
    pub use tokio;

    pub use crate::common::{
        Bus, BusStats, ChannelApp, ChannelConfig, FutureBox, MemoryNetwork, MemoryTransport,
        NodeId, Reply,
    };
    pub use crate::message::{
        validate_topic, BusError, Message, Registration, Scope, TransportError,
    };
    pub use crate::traits::{
        ClusterEvent, ClusterTransport, FixedTimeout, NoTimeout, TimeoutPolicy,
    };
}
