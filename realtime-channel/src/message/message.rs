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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::common::{box_reply_handler, BusInner, NodeId, ReplyHandler};
use crate::message::{BusError, DeliveryKind};

/// A message delivered to a handler.
///
/// Cloning is cheap; clones share the payload and the answered state, so a
/// message can be answered once no matter how many clones exist.
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

struct MessageInner {
    kind: DeliveryKind,
    topic: String,
    reply_topic: Option<String>,
    payload: Arc<Value>,
    origin: NodeId,
    is_local: bool,
    responded: AtomicBool,
    bus: Weak<BusInner>,
}

impl Message {
    pub(crate) fn new(
        kind: DeliveryKind,
        topic: impl Into<String>,
        reply_topic: Option<String>,
        payload: Arc<Value>,
        origin: NodeId,
        is_local: bool,
        bus: Weak<BusInner>,
    ) -> Self {
        Self {
            inner: Arc::new(MessageInner {
                kind,
                topic: topic.into(),
                reply_topic,
                payload,
                origin,
                is_local,
                responded: AtomicBool::new(false),
                bus,
            }),
        }
    }

    /// The topic this message was addressed to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// The topic an answer should be sent to, if the sender awaits one.
    #[must_use]
    pub fn reply_topic(&self) -> Option<&str> {
        self.inner.reply_topic.as_deref()
    }

    /// The raw JSON payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.inner.payload
    }

    /// Deserializes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Serialization`] if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        Ok(T::deserialize(self.inner.payload.as_ref())?)
    }

    /// `true` when the message was produced by this bus instance.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.inner.is_local
    }

    /// The node that produced the message.
    #[must_use]
    pub fn origin(&self) -> &NodeId {
        &self.inner.origin
    }

    /// Answers the sender with `payload`.
    ///
    /// Does nothing when the sender did not ask for a reply. Only the first
    /// `reply`, `reply_with` or `fail` on a message takes effect.
    pub fn reply<P: Serialize>(&self, payload: P) {
        self.answer(payload, None);
    }

    /// Answers the sender with `payload` and waits for the sender's own answer.
    ///
    /// The sender's reply handler sees a message whose reply topic leads back
    /// to `handler`, which allows conversations of any depth.
    pub fn reply_with<P, F, Fut>(&self, payload: P, handler: F)
    where
        P: Serialize,
        F: FnOnce(Result<Message, BusError>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.answer(payload, Some(box_reply_handler(handler)));
    }

    /// Fails the message; the sender's reply handler receives
    /// [`BusError::HandlerFailure`] with `code` and `message`.
    ///
    /// Does nothing when the sender did not ask for a reply.
    pub fn fail(&self, code: i32, message: impl Into<String>) {
        self.fail_with(BusError::HandlerFailure {
            code,
            message: message.into(),
        });
    }

    pub(crate) fn fail_with(&self, error: BusError) {
        if let Some(bus) = self.bus() {
            bus.fail_to(self, error);
        }
    }

    fn answer<P: Serialize>(&self, payload: P, handler: Option<ReplyHandler>) {
        let Some(bus) = self.bus() else {
            return;
        };
        match serde_json::to_value(payload) {
            Ok(value) => bus.reply_to(self, value, handler),
            Err(err) => {
                warn!(topic = self.topic(), "reply payload could not be serialized: {err}");
                bus.fail_to(self, BusError::from(err));
            }
        }
    }

    fn bus(&self) -> Option<Arc<BusInner>> {
        let bus = self.inner.bus.upgrade();
        if bus.is_none() {
            debug!(topic = self.topic(), "bus dropped; answer discarded");
        }
        bus
    }

    /// Claims the right to answer. Returns `false` if already answered.
    pub(crate) fn claim_answer(&self) -> bool {
        !self.inner.responded.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn has_answered(&self) -> bool {
        self.inner.responded.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.inner.kind)
            .field("topic", &self.inner.topic)
            .field("reply_topic", &self.inner.reply_topic)
            .field("origin", &self.inner.origin)
            .field("is_local", &self.inner.is_local)
            .field("payload", &self.inner.payload)
            .finish_non_exhaustive()
    }
}
