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


//! The cluster gateway.
//!
//! Sits between the bus and its [`ClusterTransport`]. Outgoing envelopes are
//! encoded synchronously and queued on one ordered queue per destination
//! node, each drained by its own task; advertise/withdraw calls share a
//! single ordered control queue. Incoming transport events are handled by
//! one loop, in arrival order.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::common::cluster::FrameCodec;
use crate::common::{BusInner, ChannelConfig, NodeId};
use crate::message::{BusError, Envelope, TransportError};
use crate::traits::{ClusterEvent, ClusterTransport};

struct Outbound {
    frame: Vec<u8>,
    /// Reply topic awaiting an answer to this frame, failed if the forward fails.
    reply_topic: Option<String>,
}

#[derive(Debug)]
enum ControlOp {
    Advertise(String),
    Withdraw(String),
}

pub(crate) struct ClusterGateway {
    transport: Arc<dyn ClusterTransport>,
    node_id: NodeId,
    codec: FrameCodec,
    forward_timeout: Duration,
    outbound: DashMap<NodeId, mpsc::UnboundedSender<Outbound>>,
    control: mpsc::UnboundedSender<ControlOp>,
    control_queue: Mutex<Option<mpsc::UnboundedReceiver<ControlOp>>>,
    bus: Weak<BusInner>,
    handle: Handle,
    cancellation_token: CancellationToken,
}

impl ClusterGateway {
    pub(crate) fn new(
        transport: Arc<dyn ClusterTransport>,
        bus: Weak<BusInner>,
        config: &ChannelConfig,
        handle: Handle,
        cancellation_token: CancellationToken,
    ) -> Self {
        let (control, control_queue) = mpsc::unbounded_channel();
        Self {
            node_id: transport.node_id().clone(),
            transport,
            codec: FrameCodec::new(config.limits.max_frame_size),
            forward_timeout: config.forward_timeout(),
            outbound: DashMap::new(),
            control,
            control_queue: Mutex::new(Some(control_queue)),
            bus,
            handle,
            cancellation_token,
        }
    }

    /// Connects the transport and starts the inbound and control loops.
    pub(crate) async fn start(&self) -> Result<(), TransportError> {
        let (events_tx, events) = mpsc::unbounded_channel();
        self.transport.connect(events_tx).await?;

        self.handle.spawn(run_inbound(
            self.bus.clone(),
            events,
            self.cancellation_token.clone(),
        ));
        if let Some(ops) = self.control_queue.lock().take() {
            self.handle.spawn(run_control(
                Arc::clone(&self.transport),
                self.node_id.clone(),
                ops,
                self.forward_timeout,
                self.cancellation_token.clone(),
            ));
        }
        debug!(node = %self.node_id, "cluster gateway started");
        Ok(())
    }

    pub(crate) fn advertise(&self, topic: &str) {
        let _ = self.control.send(ControlOp::Advertise(topic.to_string()));
    }

    pub(crate) fn withdraw(&self, topic: &str) {
        let _ = self.control.send(ControlOp::Withdraw(topic.to_string()));
    }

    pub(crate) fn decode(&self, frame: &[u8]) -> Result<Envelope, BusError> {
        self.codec.decode(frame)
    }

    /// Encodes `envelope` and queues it for `node`.
    pub(crate) fn forward(&self, node: &NodeId, envelope: &Envelope) -> Result<(), BusError> {
        if self.cancellation_token.is_cancelled() {
            return Err(BusError::Closed);
        }
        let outbound = Outbound {
            frame: self.codec.encode(envelope)?,
            reply_topic: envelope.reply_topic.clone(),
        };
        let queue = self
            .outbound
            .entry(node.clone())
            .or_insert_with(|| self.spawn_outbound(node.clone()))
            .clone();
        queue.send(outbound).map_err(|_| BusError::Transport {
            node: node.clone(),
            reason: "outbound queue closed".to_string(),
        })
    }

    /// Drops the outbound queue of a departed node.
    pub(crate) fn forget_node(&self, node: &NodeId) {
        self.outbound.remove(node);
    }

    /// Withdraws `topics` and disconnects, bypassing the control queue.
    pub(crate) async fn leave(&self, topics: &[String]) -> Result<(), TransportError> {
        for topic in topics {
            match tokio::time::timeout(
                self.forward_timeout,
                self.transport.withdraw(topic, &self.node_id),
            )
            .await
            {
                Ok(Ok(())) => trace!(topic = %topic, "withdrawn"),
                Ok(Err(e)) => warn!(topic = %topic, "withdraw failed: {e}"),
                Err(_) => warn!(topic = %topic, "withdraw timed out"),
            }
        }
        self.transport.disconnect().await
    }

    fn spawn_outbound(&self, node: NodeId) -> mpsc::UnboundedSender<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.handle.spawn(run_outbound(
            node,
            rx,
            Arc::clone(&self.transport),
            self.bus.clone(),
            self.forward_timeout,
            self.cancellation_token.clone(),
        ));
        tx
    }
}

async fn run_outbound(
    node: NodeId,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    transport: Arc<dyn ClusterTransport>,
    bus: Weak<BusInner>,
    forward_timeout: Duration,
    cancellation_token: CancellationToken,
) {
    trace!(%node, "outbound queue started");
    loop {
        let item = tokio::select! {
            biased;
            () = cancellation_token.cancelled() => break,
            item = queue.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        let result =
            match tokio::time::timeout(forward_timeout, transport.forward(&node, item.frame)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::new(
                    node.clone(),
                    format!("forward timed out after {forward_timeout:?}"),
                )),
            };
        if let Err(error) = result {
            warn!(%node, "forward failed: {error}");
            if let (Some(reply_topic), Some(bus)) = (item.reply_topic, bus.upgrade()) {
                bus.fail_reply(&reply_topic, BusError::from(error));
            }
        }
    }
    trace!(%node, "outbound queue stopped");
}

async fn run_control(
    transport: Arc<dyn ClusterTransport>,
    node: NodeId,
    mut ops: mpsc::UnboundedReceiver<ControlOp>,
    op_timeout: Duration,
    cancellation_token: CancellationToken,
) {
    loop {
        let op = tokio::select! {
            biased;
            () = cancellation_token.cancelled() => break,
            op = ops.recv() => match op {
                Some(op) => op,
                None => break,
            },
        };
        let result = match &op {
            ControlOp::Advertise(topic) => {
                tokio::time::timeout(op_timeout, transport.advertise(topic, &node)).await
            }
            ControlOp::Withdraw(topic) => {
                tokio::time::timeout(op_timeout, transport.withdraw(topic, &node)).await
            }
        };
        match result {
            Ok(Ok(())) => trace!(?op, "control operation applied"),
            Ok(Err(e)) => warn!(?op, "control operation failed: {e}"),
            Err(_) => warn!(?op, "control operation timed out"),
        }
    }
}

async fn run_inbound(
    bus: Weak<BusInner>,
    mut events: mpsc::UnboundedReceiver<ClusterEvent>,
    cancellation_token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancellation_token.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(bus) = bus.upgrade() else {
            break;
        };
        bus.on_cluster_event(event);
    }
    trace!("inbound loop stopped");
}
