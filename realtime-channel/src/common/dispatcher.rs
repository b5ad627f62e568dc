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


//! Delivery: publish fan-out, round-robin sends, replies, inbound cluster
//! traffic and the per-registration inbox task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::common::registry::{Reach, Target};
use crate::common::{BusInner, MessageHandler, NodeId, ReplyHandler, StatsCounters};
use crate::message::{
    validate_topic, BusError, DeliveryKind, Envelope, LocalRegistration, Message,
};
use crate::traits::ClusterEvent;

impl BusInner {
    /// Delivers `payload` to every matching handler; with `include_remote`,
    /// also to every node advertising the topic.
    pub(crate) fn publish_value(&self, topic: &str, payload: Value, include_remote: bool) {
        if self.is_closed() {
            warn!(topic, "publish on a closed bus dropped");
            StatsCounters::bump(&self.stats.dropped);
            return;
        }
        if let Err(e) = validate_topic(topic) {
            warn!("publish dropped: {e}");
            StatsCounters::bump(&self.stats.dropped);
            return;
        }
        StatsCounters::bump(&self.stats.published);

        let include_remote = include_remote && self.gateway.is_some();
        let (local, remote) = self.registry.fan_out(topic, Reach::Any, include_remote);
        trace!(topic, local = local.len(), remote = remote.len(), "publishing");

        let payload = Arc::new(payload);
        for registration in &local {
            let message = self.local_message(DeliveryKind::Publish, topic, None, Arc::clone(&payload));
            self.deliver_local(registration, message);
        }
        for node in &remote {
            let envelope = Envelope::new(
                DeliveryKind::Publish,
                topic,
                None,
                self.node_id.clone(),
                payload.as_ref().clone(),
            );
            self.forward_envelope(node, envelope);
        }
    }

    /// Delivers `payload` to exactly one handler, chosen round-robin among
    /// local handlers and, with `include_remote`, advertising nodes.
    pub(crate) fn send_value(
        &self,
        topic: &str,
        payload: Value,
        handler: Option<ReplyHandler>,
        include_remote: bool,
    ) {
        if self.is_closed() {
            self.reject(topic, handler, BusError::Closed);
            return;
        }
        if let Err(e) = validate_topic(topic) {
            self.reject(topic, handler, e);
            return;
        }

        let include_remote = include_remote && self.gateway.is_some();
        let Some(target) = self.registry.next_target(topic, Reach::Any, include_remote) else {
            debug!(topic, "send found no handlers");
            self.reject(
                topic,
                handler,
                BusError::NoHandlers {
                    topic: topic.to_string(),
                },
            );
            return;
        };
        StatsCounters::bump(&self.stats.sent);

        match target {
            Target::Local(registration) => {
                let reply_topic = handler.map(|handler| self.await_reply(topic, handler, None));
                let message =
                    self.local_message(DeliveryKind::Send, topic, reply_topic, Arc::new(payload));
                self.deliver_local(&registration, message);
            }
            Target::Remote(node) => {
                trace!(topic, %node, "send routed to remote node");
                let reply_topic =
                    handler.map(|handler| self.await_reply(topic, handler, Some(node.clone())));
                let envelope = Envelope::new(
                    DeliveryKind::Send,
                    topic,
                    reply_topic,
                    self.node_id.clone(),
                    payload,
                );
                self.forward_envelope(&node, envelope);
            }
        }
    }

    /// Answers `original`. Replies to remote messages go straight back to
    /// the node that produced them.
    pub(crate) fn reply_to(&self, original: &Message, payload: Value, handler: Option<ReplyHandler>) {
        let Some(reply_topic) = original.reply_topic() else {
            trace!(topic = original.topic(), "no reply expected");
            return;
        };
        if !original.claim_answer() {
            warn!(topic = original.topic(), "message already answered; reply ignored");
            return;
        }

        if original.origin() == &self.node_id {
            self.send_value(reply_topic, payload, handler, false);
            return;
        }
        if self.is_closed() {
            self.reject(reply_topic, handler, BusError::Closed);
            return;
        }
        StatsCounters::bump(&self.stats.sent);
        let origin = original.origin().clone();
        let next_reply_topic =
            handler.map(|handler| self.await_reply(reply_topic, handler, Some(origin.clone())));
        let envelope = Envelope::new(
            DeliveryKind::Reply,
            reply_topic,
            next_reply_topic,
            self.node_id.clone(),
            payload,
        );
        self.forward_envelope(&origin, envelope);
    }

    /// Fails `original`; its sender's reply handler receives `error`.
    pub(crate) fn fail_to(&self, original: &Message, error: BusError) {
        let Some(reply_topic) = original.reply_topic() else {
            trace!(topic = original.topic(), "no reply expected; failure dropped");
            return;
        };
        if !original.claim_answer() {
            warn!(topic = original.topic(), "message already answered; failure ignored");
            return;
        }

        if original.origin() == &self.node_id {
            self.fail_reply(reply_topic, error);
        } else {
            let envelope = Envelope::failure(reply_topic, self.node_id.clone(), &error);
            self.forward_envelope(original.origin(), envelope);
        }
    }

    /// Answers a message that will never reach its handler with
    /// [`BusError::NoHandlers`].
    pub(crate) fn reject_undelivered(&self, message: &Message) {
        if message.reply_topic().is_some() && !message.has_answered() {
            self.fail_to(
                message,
                BusError::NoHandlers {
                    topic: message.topic().to_string(),
                },
            );
        }
    }

    pub(crate) fn on_cluster_event(&self, event: ClusterEvent) {
        match event {
            ClusterEvent::EnvelopeReceived { from, frame } => {
                let Some(gateway) = &self.gateway else {
                    return;
                };
                match gateway.decode(&frame) {
                    Ok(envelope) => self.deliver_inbound(envelope),
                    Err(e) => warn!(%from, "dropping undecodable frame: {e}"),
                }
            }
            ClusterEvent::TopicAdvertised { topic, node } => {
                if node != self.node_id && self.registry.add_remote(&topic, &node) {
                    debug!(topic = %topic, %node, "remote handler advertised");
                }
            }
            ClusterEvent::TopicWithdrawn { topic, node } => {
                if self.registry.remove_remote(&topic, &node) {
                    debug!(topic = %topic, %node, "remote handler withdrawn");
                }
            }
            ClusterEvent::NodeJoined(node) => {
                debug!(%node, "node joined; re-advertising local topics");
                if let Some(gateway) = &self.gateway {
                    for topic in self.registry.cluster_topics() {
                        gateway.advertise(&topic);
                    }
                }
            }
            ClusterEvent::NodeLeft(node) => {
                let pruned = self.registry.prune_node(&node);
                debug!(%node, topics = pruned.len(), "node left; pruned");
                if let Some(gateway) = &self.gateway {
                    gateway.forget_node(&node);
                }
                self.fail_pending_for(&node, "node left the cluster");
            }
        }
    }

    fn deliver_inbound(&self, envelope: Envelope) {
        StatsCounters::bump(&self.stats.received);
        if let Some(error) = envelope.error() {
            self.fail_reply(&envelope.topic, error);
            return;
        }

        let Envelope {
            kind,
            topic,
            reply_topic,
            origin,
            payload,
            ..
        } = envelope;
        let payload = Arc::new(payload);

        match kind {
            DeliveryKind::Publish => {
                let (local, _) = self.registry.fan_out(&topic, Reach::Cluster, false);
                for registration in &local {
                    let message = self.remote_message(kind, &topic, None, Arc::clone(&payload), &origin);
                    self.deliver_local(registration, message);
                }
            }
            DeliveryKind::Send | DeliveryKind::Reply => {
                let reach = if kind == DeliveryKind::Send {
                    Reach::Cluster
                } else {
                    Reach::Reply
                };
                match self.registry.next_target(&topic, reach, false) {
                    Some(Target::Local(registration)) => {
                        let message = self.remote_message(kind, &topic, reply_topic, payload, &origin);
                        self.deliver_local(&registration, message);
                    }
                    _ => {
                        debug!(topic = %topic, %origin, ?kind, "no handler for inbound message");
                        StatsCounters::bump(&self.stats.dropped);
                        if let Some(reply_topic) = reply_topic {
                            let error = BusError::NoHandlers { topic };
                            self.forward_envelope(
                                &origin,
                                Envelope::failure(reply_topic, self.node_id.clone(), &error),
                            );
                        }
                    }
                }
            }
        }
    }

    fn local_message(
        &self,
        kind: DeliveryKind,
        topic: &str,
        reply_topic: Option<String>,
        payload: Arc<Value>,
    ) -> Message {
        Message::new(kind, topic, reply_topic, payload, self.node_id.clone(), true, self.weak())
    }

    fn remote_message(
        &self,
        kind: DeliveryKind,
        topic: &str,
        reply_topic: Option<String>,
        payload: Arc<Value>,
        origin: &NodeId,
    ) -> Message {
        Message::new(kind, topic, reply_topic, payload, origin.clone(), false, self.weak())
    }

    fn deliver_local(&self, registration: &LocalRegistration, message: Message) {
        match registration.enqueue(message) {
            Ok(depth) => {
                StatsCounters::bump(&self.stats.delivered);
                if depth == self.config.limits.inbox_high_water_mark.saturating_add(1) {
                    warn!(
                        topic = registration.topic(),
                        depth, "handler inbox above high-water mark"
                    );
                }
            }
            Err(message) => {
                StatsCounters::bump(&self.stats.dropped);
                self.reject_undelivered(&message);
            }
        }
    }

    fn forward_envelope(&self, node: &NodeId, envelope: Envelope) {
        let Some(gateway) = &self.gateway else {
            return;
        };
        match gateway.forward(node, &envelope) {
            Ok(()) => StatsCounters::bump(&self.stats.forwarded),
            Err(error) => {
                warn!(%node, topic = %envelope.topic, "forward failed: {error}");
                StatsCounters::bump(&self.stats.dropped);
                if let Some(reply_topic) = &envelope.reply_topic {
                    self.fail_reply(reply_topic, error);
                }
            }
        }
    }
}

/// Drains one registration's inbox, awaiting each handler future before
/// taking the next message.
pub(crate) async fn run_inbox(
    bus: Weak<BusInner>,
    registration: Arc<LocalRegistration>,
    mut inbox: mpsc::UnboundedReceiver<Message>,
    handler: MessageHandler,
) {
    let cancelled = registration.cancellation().clone();
    loop {
        let message = tokio::select! {
            biased;
            () = cancelled.cancelled() => break,
            message = inbox.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        registration.dequeued();
        if !registration.is_active() {
            if let Some(bus) = bus.upgrade() {
                bus.reject_undelivered(&message);
            }
            break;
        }
        invoke(&bus, &handler, message).await;
    }

    inbox.close();
    if let Some(bus) = bus.upgrade() {
        while let Ok(message) = inbox.try_recv() {
            bus.reject_undelivered(&message);
        }
    }
    trace!(topic = registration.topic(), id = registration.id(), "inbox closed");
}

async fn invoke(bus: &Weak<BusInner>, handler: &MessageHandler, message: Message) {
    let outcome = AssertUnwindSafe(async { handler(message.clone()).await })
        .catch_unwind()
        .await;
    let Err(panic) = outcome else {
        return;
    };

    let reason = panic_reason(panic.as_ref());
    error!(topic = message.topic(), "handler panicked: {reason}");
    if let Some(bus) = bus.upgrade() {
        StatsCounters::bump(&bus.stats.panics);
        if !message.has_answered() {
            bus.fail_to(
                &message,
                BusError::HandlerFailure {
                    code: BusError::HANDLER_PANIC,
                    message: reason,
                },
            );
        }
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}
