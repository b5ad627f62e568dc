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


use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{instrument, warn};

use crate::common::{
    box_handler, box_reply_handler, BusInner, BusStats, ChannelConfig, NodeId, ReplyHandler,
};
use crate::message::{BusError, Message, Registration, Scope};

/// A handle to one bus instance.
///
/// `Bus` is cheap to clone; all clones drive the same instance. Every method
/// returns without waiting for delivery: handlers run on their own tasks and
/// answers come back through reply handlers. The methods can be called from
/// any thread, inside or outside the Tokio runtime the bus was launched on.
///
/// ```rust,ignore
/// let bus = ChannelApp::launch_async().await;
///
/// bus.subscribe("greet", |message| async move {
///     let name: String = message.payload_as().unwrap_or_default();
///     message.reply(format!("hello, {name}"));
/// });
///
/// let answer = bus.request("greet", "ada").await?;
/// assert_eq!(answer.payload(), "hello, ada");
/// ```
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

static_assertions::assert_impl_all!(Bus: Send, Sync, Clone);
static_assertions::assert_impl_all!(Message: Send, Sync, Clone);
static_assertions::assert_impl_all!(Registration: Send, Sync);

impl Bus {
    pub(crate) fn new(inner: Arc<BusInner>) -> Self {
        Self { inner }
    }

    /// Delivers `payload` to every handler of `topic` on every node.
    ///
    /// Handler failures are isolated from each other and invisible to the
    /// publisher. A payload that cannot be serialized is dropped and logged.
    pub fn publish<P: Serialize>(&self, topic: impl AsRef<str>, payload: P) -> &Self {
        self.dispatch_publish(topic.as_ref(), payload, true)
    }

    /// Delivers `payload` to every handler of `topic` on this node only.
    pub fn publish_local<P: Serialize>(&self, topic: impl AsRef<str>, payload: P) -> &Self {
        self.dispatch_publish(topic.as_ref(), payload, false)
    }

    /// Delivers `payload` to one handler of `topic`, chosen round-robin among
    /// the handlers on this node and the nodes advertising the topic.
    ///
    /// Without a reply handler, failures cannot be observed.
    pub fn send<P: Serialize>(&self, topic: impl AsRef<str>, payload: P) -> &Self {
        self.dispatch_send(topic.as_ref(), payload, None, true)
    }

    /// Like [`Bus::send`], and hands the recipient's answer (or the reason
    /// there is none) to `handler`.
    pub fn send_with_reply<P, F, Fut>(&self, topic: impl AsRef<str>, payload: P, handler: F) -> &Self
    where
        P: Serialize,
        F: FnOnce(Result<Message, BusError>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatch_send(topic.as_ref(), payload, Some(box_reply_handler(handler)), true)
    }

    /// Like [`Bus::send`], restricted to handlers on this node.
    pub fn send_local<P: Serialize>(&self, topic: impl AsRef<str>, payload: P) -> &Self {
        self.dispatch_send(topic.as_ref(), payload, None, false)
    }

    /// Like [`Bus::send_with_reply`], restricted to handlers on this node.
    pub fn send_local_with_reply<P, F, Fut>(
        &self,
        topic: impl AsRef<str>,
        payload: P,
        handler: F,
    ) -> &Self
    where
        P: Serialize,
        F: FnOnce(Result<Message, BusError>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatch_send(topic.as_ref(), payload, Some(box_reply_handler(handler)), false)
    }

    /// Sends `payload` and waits for the answer.
    ///
    /// # Errors
    ///
    /// Whatever the reply handler would have received as an error:
    /// [`BusError::NoHandlers`], a recipient's [`BusError::HandlerFailure`],
    /// [`BusError::DeliveryTimeout`] under a timeout policy, and so on. With
    /// no timeout policy this waits until the recipient answers.
    pub async fn request<P: Serialize>(&self, topic: impl AsRef<str>, payload: P) -> Result<Message, BusError> {
        let (tx, rx) = oneshot::channel();
        self.send_with_reply(topic, payload, move |result| async move {
            let _ = tx.send(result);
        });
        rx.await.map_err(|_| BusError::Closed)?
    }

    /// Like [`Bus::request`], restricted to handlers on this node.
    ///
    /// # Errors
    ///
    /// As for [`Bus::request`].
    pub async fn request_local<P: Serialize>(
        &self,
        topic: impl AsRef<str>,
        payload: P,
    ) -> Result<Message, BusError> {
        let (tx, rx) = oneshot::channel();
        self.send_local_with_reply(topic, payload, move |result| async move {
            let _ = tx.send(result);
        });
        rx.await.map_err(|_| BusError::Closed)?
    }

    /// Registers `handler` for `topic`, visible to the whole cluster.
    ///
    /// Messages from one sender reach the handler in the order they were sent.
    /// An empty topic or a closed bus yields an inactive registration.
    pub fn subscribe<F, Fut>(&self, topic: impl AsRef<str>, handler: F) -> Registration
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .subscribe(topic.as_ref(), Scope::Cluster, box_handler(handler))
    }

    /// Registers `handler` for `topic`, reachable only from this node.
    pub fn subscribe_local<F, Fut>(&self, topic: impl AsRef<str>, handler: F) -> Registration
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .subscribe(topic.as_ref(), Scope::Local, box_handler(handler))
    }

    /// This bus's node id.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    /// The configuration the bus was launched with.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// A snapshot of the bus counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.inner.stats.snapshot()
    }

    /// `true` once [`Bus::shutdown`] has begun.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of active handlers for `topic` on this node.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> usize {
        self.inner.registry.handler_count(topic)
    }

    /// `true` when this node has at least one active handler for `topic`.
    #[must_use]
    pub fn has_local_handlers(&self, topic: &str) -> bool {
        self.inner.registry.has_local_handlers(topic)
    }

    /// The peers currently known to handle `topic`.
    #[must_use]
    pub fn remote_nodes(&self, topic: &str) -> Vec<NodeId> {
        self.inner.registry.remote_nodes(topic)
    }

    /// Number of topics with local handlers or known remote handlers.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.inner.registry.topic_count()
    }

    /// Number of senders on this node still waiting for an answer.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.inner.correlator.len()
    }

    /// Shuts the bus down.
    ///
    /// Withdraws this node's topics from the cluster and leaves it, retires
    /// every registration, and completes every pending reply with
    /// [`BusError::Closed`]. Afterwards, publishes are dropped, sends fail
    /// with [`BusError::Closed`] and subscriptions are inert. Calling it
    /// again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if leaving the cluster failed or exceeded
    /// `timeouts.system_shutdown_timeout_ms`; the bus is closed regardless.
    #[instrument(skip(self), fields(node = %self.inner.node_id))]
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.inner.shutdown().await
    }

    fn dispatch_publish<P: Serialize>(&self, topic: &str, payload: P, include_remote: bool) -> &Self {
        match serde_json::to_value(payload) {
            Ok(value) => self.inner.publish_value(topic, value, include_remote),
            Err(e) => warn!(topic, "publish dropped: payload could not be serialized: {e}"),
        }
        self
    }

    fn dispatch_send<P: Serialize>(
        &self,
        topic: &str,
        payload: P,
        handler: Option<ReplyHandler>,
        include_remote: bool,
    ) -> &Self {
        match serde_json::to_value(payload) {
            Ok(value) => self.inner.send_value(topic, value, handler, include_remote),
            Err(e) => self.inner.reject(topic, handler, BusError::from(e)),
        }
        self
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("node_id", &self.inner.node_id)
            .field("closed", &self.is_closed())
            .field("topics", &self.topic_count())
            .finish()
    }
}
