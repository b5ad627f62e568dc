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


use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::anyhow;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::common::cluster::ClusterGateway;
use crate::common::correlator::{PendingReply, ReplyCorrelator};
use crate::common::dispatcher::run_inbox;
use crate::common::registry::Registry;
use crate::common::{
    ChannelConfig, FutureBox, MessageHandler, NodeId, ReplyHandler, StatsCounters,
};
use crate::message::{validate_topic, BusError, LocalRegistration, Message, Registration, Scope};
use crate::traits::{ClusterTransport, TimeoutPolicy};

/// Crate-internal: the state shared by every clone of a [`Bus`](crate::common::Bus).
pub(crate) struct BusInner {
    pub(crate) node_id: NodeId,
    pub(crate) config: ChannelConfig,
    pub(crate) registry: Registry,
    pub(crate) correlator: ReplyCorrelator,
    pub(crate) gateway: Option<ClusterGateway>,
    pub(crate) stats: StatsCounters,
    timeout_policy: Box<dyn TimeoutPolicy>,
    handle: Handle,
    cancellation_token: CancellationToken,
    closed: AtomicBool,
    next_registration_id: AtomicU64,
    self_ref: Weak<BusInner>,
}

impl BusInner {
    pub(crate) fn new(
        config: ChannelConfig,
        transport: Option<Arc<dyn ClusterTransport>>,
        timeout_policy: Box<dyn TimeoutPolicy>,
        handle: Handle,
    ) -> Arc<Self> {
        let node_id = transport.as_ref().map_or_else(
            || NodeId::generate(&config.defaults.node_name_prefix),
            |transport| transport.node_id().clone(),
        );
        let cancellation_token = CancellationToken::new();
        Arc::new_cyclic(|self_ref| Self {
            gateway: transport.map(|transport| {
                ClusterGateway::new(
                    transport,
                    self_ref.clone(),
                    &config,
                    handle.clone(),
                    cancellation_token.clone(),
                )
            }),
            node_id,
            correlator: ReplyCorrelator::new(config.defaults.reply_topic_prefix.clone()),
            registry: Registry::default(),
            stats: StatsCounters::default(),
            timeout_policy,
            handle,
            cancellation_token,
            closed: AtomicBool::new(false),
            next_registration_id: AtomicU64::new(1),
            self_ref: self_ref.clone(),
            config,
        })
    }

    pub(crate) fn weak(&self) -> Weak<BusInner> {
        self.self_ref.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Registers a handler, or returns an inert registration when the bus is
    /// closed or the topic is invalid.
    pub(crate) fn subscribe(&self, topic: &str, scope: Scope, handler: MessageHandler) -> Registration {
        if self.is_closed() {
            warn!(topic, "subscribe on a closed bus ignored");
            return Registration::inert(topic, scope);
        }
        if let Err(e) = validate_topic(topic) {
            warn!("subscribe ignored: {e}");
            return Registration::inert(topic, scope);
        }
        Registration::new(self.register(topic, scope, handler), self.weak())
    }

    pub(crate) fn register(&self, topic: &str, scope: Scope, handler: MessageHandler) -> Arc<LocalRegistration> {
        let id = self.next_registration_id.fetch_add(1, Ordering::Relaxed);
        let (inbox, queue) = mpsc::unbounded_channel();
        let registration = Arc::new(LocalRegistration::new(
            id,
            topic.to_string(),
            scope,
            inbox,
            self.cancellation_token.child_token(),
        ));
        self.handle
            .spawn(run_inbox(self.weak(), Arc::clone(&registration), queue, handler));
        self.registry.insert(Arc::clone(&registration), |topic| {
            if let Some(gateway) = &self.gateway {
                gateway.advertise(topic);
            }
        });
        trace!(topic, id, ?scope, "registered");
        registration
    }

    pub(crate) fn unregister(&self, registration: &LocalRegistration) {
        if !registration.retire() {
            return;
        }
        self.registry
            .remove(registration.topic(), registration.id(), |topic| {
                if let Some(gateway) = &self.gateway {
                    gateway.withdraw(topic);
                }
            });
        trace!(topic = registration.topic(), id = registration.id(), "unregistered");
    }

    /// Creates a reply topic bound to `handler` and returns it.
    ///
    /// `target` is the node the request goes to, if remote; its departure
    /// fails the pending reply.
    pub(crate) fn await_reply(
        &self,
        request_topic: &str,
        handler: ReplyHandler,
        target: Option<NodeId>,
    ) -> String {
        let reply_topic = self.correlator.next_topic();
        let registration = self.register(&reply_topic, Scope::Reply, self.reply_relay());
        let timer = self.cancellation_token.child_token();
        let deadline = self.timeout_policy.reply_deadline(request_topic);

        self.correlator.insert(
            reply_topic.clone(),
            PendingReply {
                request_topic: request_topic.to_string(),
                handler: Mutex::new(handler),
                target,
                registration,
                timer: timer.clone(),
            },
        );

        if let Some(after) = deadline {
            self.handle.spawn(expire_reply(
                self.weak(),
                reply_topic.clone(),
                request_topic.to_string(),
                after,
                timer,
            ));
        }
        reply_topic
    }

    /// The handler of every one-shot reply subscription.
    fn reply_relay(&self) -> MessageHandler {
        let bus = self.weak();
        Arc::new(move |message: Message| {
            let bus = bus.clone();
            Box::pin(async move {
                let completion = bus.upgrade().and_then(|bus| {
                    let reply_topic = message.topic().to_string();
                    bus.complete_reply(&reply_topic, Ok(message))
                });
                if let Some(completion) = completion {
                    completion.await;
                }
            }) as FutureBox
        })
    }

    /// Retires the pending reply for `reply_topic` and returns its handler's
    /// future, or `None` if the reply was already consumed.
    pub(crate) fn complete_reply(
        &self,
        reply_topic: &str,
        result: Result<Message, BusError>,
    ) -> Option<FutureBox> {
        let pending = self.correlator.take(reply_topic)?;
        pending.timer.cancel();
        self.unregister(&pending.registration);
        match &result {
            Ok(_) => StatsCounters::bump(&self.stats.replies),
            Err(e) => {
                StatsCounters::bump(&self.stats.failures);
                debug!(request = %pending.request_topic, "request failed: {e}");
            }
        }
        Some((pending.handler.into_inner())(result))
    }

    /// Completes a pending reply with an error, running the handler on the runtime.
    pub(crate) fn fail_reply(&self, reply_topic: &str, error: BusError) {
        if let Some(completion) = self.complete_reply(reply_topic, Err(error)) {
            self.spawn_handler(completion);
        }
    }

    /// Fails every pending reply whose request went to `node`.
    pub(crate) fn fail_pending_for(&self, node: &NodeId, reason: &str) {
        for reply_topic in self.correlator.awaiting(node) {
            self.fail_reply(
                &reply_topic,
                BusError::Transport {
                    node: node.clone(),
                    reason: reason.to_string(),
                },
            );
        }
    }

    /// Hands a send that cannot be dispatched to its reply handler.
    pub(crate) fn reject(&self, topic: &str, handler: Option<ReplyHandler>, error: BusError) {
        StatsCounters::bump(&self.stats.dropped);
        match handler {
            Some(handler) => self.spawn_handler(handler(Err(error))),
            None => debug!(topic, "send dropped: {error}"),
        }
    }

    pub(crate) fn spawn_handler(&self, future: FutureBox) {
        self.handle.spawn(async move {
            if AssertUnwindSafe(future).catch_unwind().await.is_err() {
                error!("reply handler panicked");
            }
        });
    }

    pub(crate) async fn shutdown(&self) -> anyhow::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let timeout = self.config.system_shutdown_timeout();
        let topics = self.registry.cluster_topics();
        let departure = async {
            match &self.gateway {
                Some(gateway) => gateway.leave(&topics).await,
                None => Ok(()),
            }
        };
        let outcome = tokio::time::timeout(timeout, departure).await;

        for registration in self.registry.clear() {
            registration.retire();
        }
        for pending in self.correlator.drain() {
            pending.timer.cancel();
            self.spawn_handler((pending.handler.into_inner())(Err(BusError::Closed)));
        }
        self.cancellation_token.cancel();
        debug!(node = %self.node_id, "bus shut down");

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!(e).context("failed to leave the cluster")),
            Err(_) => Err(anyhow!("bus shutdown timed out after {timeout:?}")),
        }
    }
}

async fn expire_reply(
    bus: Weak<BusInner>,
    reply_topic: String,
    request_topic: String,
    after: Duration,
    timer: CancellationToken,
) {
    tokio::select! {
        () = timer.cancelled() => {}
        () = tokio::time::sleep(after) => {
            let completion = bus.upgrade().and_then(|bus| {
                bus.complete_reply(
                    &reply_topic,
                    Err(BusError::DeliveryTimeout { topic: request_topic, after }),
                )
            });
            if let Some(completion) = completion {
                completion.await;
            }
        }
    }
}
