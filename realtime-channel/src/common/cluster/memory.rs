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


//! An in-process cluster.
//!
//! [`MemoryNetwork`] links several bus instances inside one process. Every
//! transport created from the same network sees the others join and leave,
//! receives their advertisements, and exchanges frames with them through
//! unbounded channels. Tests and demos use it to exercise cluster behavior
//! without sockets.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::common::NodeId;
use crate::message::TransportError;
use crate::traits::{ClusterEvent, ClusterTransport};

/// A shared, in-process cluster membership.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<DashMap<NodeId, mpsc::UnboundedSender<ClusterEvent>>>,
}

impl MemoryNetwork {
    /// An empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport for a node named `name` on this network.
    ///
    /// The node becomes visible to others once its bus connects.
    pub fn transport(&self, name: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            node: NodeId::new(name),
            network: self.clone(),
        }
    }

    /// Removes `node` abruptly, as if its process died. Peers receive
    /// [`ClusterEvent::NodeLeft`]; the node itself receives nothing more.
    pub fn disconnect(&self, node: &NodeId) {
        if self.nodes.remove(node).is_some() {
            debug!(%node, "node disconnected from memory network");
            self.broadcast(node, &ClusterEvent::NodeLeft(node.clone()));
        }
    }

    /// The currently connected nodes.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|entry| entry.key().clone()).collect()
    }

    fn broadcast(&self, from: &NodeId, event: &ClusterEvent) {
        for entry in self.nodes.iter() {
            if entry.key() != from {
                let _ = entry.value().send(event.clone());
            }
        }
    }
}

/// One node's view of a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    node: NodeId,
    network: MemoryNetwork,
}

#[async_trait]
impl ClusterTransport for MemoryTransport {
    fn node_id(&self) -> &NodeId {
        &self.node
    }

    async fn connect(&self, events: mpsc::UnboundedSender<ClusterEvent>) -> Result<(), TransportError> {
        match self.network.nodes.entry(self.node.clone()) {
            Entry::Occupied(_) => {
                return Err(TransportError::new(self.node.clone(), "node id already connected"));
            }
            Entry::Vacant(slot) => {
                slot.insert(events.clone());
            }
        }
        // Peers react to the join by advertising to us, so we must already be reachable.
        for entry in self.network.nodes.iter() {
            if entry.key() != &self.node {
                let _ = events.send(ClusterEvent::NodeJoined(entry.key().clone()));
            }
        }
        self.network
            .broadcast(&self.node, &ClusterEvent::NodeJoined(self.node.clone()));
        debug!(node = %self.node, "node joined memory network");
        Ok(())
    }

    async fn forward(&self, node: &NodeId, frame: Vec<u8>) -> Result<(), TransportError> {
        let sink = self
            .network
            .nodes
            .get(node)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::new(node.clone(), "unknown node"))?;
        trace!(from = %self.node, to = %node, bytes = frame.len(), "forwarding frame");
        sink.send(ClusterEvent::EnvelopeReceived {
            from: self.node.clone(),
            frame,
        })
        .map_err(|_| TransportError::new(node.clone(), "node stopped receiving"))
    }

    async fn advertise(&self, topic: &str, node: &NodeId) -> Result<(), TransportError> {
        self.network.broadcast(
            &self.node,
            &ClusterEvent::TopicAdvertised {
                topic: topic.to_string(),
                node: node.clone(),
            },
        );
        Ok(())
    }

    async fn withdraw(&self, topic: &str, node: &NodeId) -> Result<(), TransportError> {
        self.network.broadcast(
            &self.node,
            &ClusterEvent::TopicWithdrawn {
                topic: topic.to_string(),
                node: node.clone(),
            },
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.network.disconnect(&self.node);
        Ok(())
    }
}
