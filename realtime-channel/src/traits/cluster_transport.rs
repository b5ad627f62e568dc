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


use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::common::NodeId;
use crate::message::TransportError;

/// Something that happened on the cluster, pushed by a transport into the
/// sink handed to [`ClusterTransport::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    /// An encoded envelope arrived from `from`.
    EnvelopeReceived {
        /// The sending node.
        from: NodeId,
        /// The frame as produced by the sender's codec.
        frame: Vec<u8>,
    },
    /// `node` now has cluster-visible handlers for `topic`.
    TopicAdvertised {
        /// The advertised topic.
        topic: String,
        /// The advertising node.
        node: NodeId,
    },
    /// `node` no longer has cluster-visible handlers for `topic`.
    TopicWithdrawn {
        /// The withdrawn topic.
        topic: String,
        /// The withdrawing node.
        node: NodeId,
    },
    /// A node joined the cluster.
    NodeJoined(NodeId),
    /// A node left the cluster, gracefully or not.
    NodeLeft(NodeId),
}

/// The physical link between bus instances.
///
/// The bus drives a transport through this trait and never blocks callers on
/// it: forwards and advertisements are queued and performed by background
/// tasks, one ordered queue per destination node and one for control
/// traffic.
#[async_trait]
pub trait ClusterTransport: Send + Sync + 'static {
    /// The id of the local node on this transport.
    fn node_id(&self) -> &NodeId;

    /// Joins the cluster. From now on the transport pushes events into `events`.
    async fn connect(&self, events: mpsc::UnboundedSender<ClusterEvent>)
        -> Result<(), TransportError>;

    /// Delivers one encoded envelope to `node`.
    async fn forward(&self, node: &NodeId, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Tells every peer that `node` handles `topic`.
    async fn advertise(&self, topic: &str, node: &NodeId) -> Result<(), TransportError>;

    /// Tells every peer that `node` no longer handles `topic`.
    async fn withdraw(&self, topic: &str, node: &NodeId) -> Result<(), TransportError>;

    /// Leaves the cluster.
    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
