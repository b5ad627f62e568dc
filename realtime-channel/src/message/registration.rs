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
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::common::BusInner;
use crate::message::Message;

/// Visibility of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Advertised to the cluster; reachable from every node.
    Cluster,
    /// Reachable only from the bus instance it was registered on.
    Local,
    /// A one-shot reply subscription. Never advertised, but reachable by
    /// replies addressed directly to this node.
    Reply,
}

/// Crate-internal: the shared state of one registration.
///
/// Owns the sending half of the registration's inbox; the receiving half
/// is drained by a single task, which is what keeps per-sender order.
pub(crate) struct LocalRegistration {
    id: u64,
    topic: String,
    scope: Scope,
    active: AtomicBool,
    queued: AtomicUsize,
    inbox: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

impl LocalRegistration {
    pub(crate) fn new(
        id: u64,
        topic: String,
        scope: Scope,
        inbox: mpsc::UnboundedSender<Message>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            topic,
            scope,
            active: AtomicBool::new(true),
            queued: AtomicUsize::new(0),
            inbox,
            cancel,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn scope(&self) -> Scope {
        self.scope
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Marks the registration inactive and stops its inbox task.
    /// Returns `false` if it was already retired.
    pub(crate) fn retire(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        if was_active {
            self.cancel.cancel();
        }
        was_active
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queues a message. On failure the message is handed back.
    ///
    /// The returned depth is the number of queued, not yet dequeued, messages.
    pub(crate) fn enqueue(&self, message: Message) -> Result<usize, Message> {
        if !self.is_active() {
            return Err(message);
        }
        let depth = self.queued.fetch_add(1, Ordering::AcqRel) + 1;
        self.inbox.send(message).map_err(|err| {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            err.0
        })?;
        Ok(depth)
    }

    pub(crate) fn dequeued(&self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for LocalRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRegistration")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("scope", &self.scope)
            .field("active", &self.is_active())
            .finish()
    }
}

/// A handle to one handler bound to one topic.
///
/// Dropping the handle does not unregister the handler; call
/// [`Registration::unregister`].
#[derive(Clone)]
pub struct Registration {
    topic: String,
    scope: Scope,
    shared: Option<Arc<LocalRegistration>>,
    bus: Weak<BusInner>,
}

impl Registration {
    pub(crate) fn new(shared: Arc<LocalRegistration>, bus: Weak<BusInner>) -> Self {
        Self {
            topic: shared.topic().to_string(),
            scope: shared.scope(),
            shared: Some(shared),
            bus,
        }
    }

    /// A registration that was never active, returned when subscribing on a
    /// closed bus or with an invalid topic.
    pub(crate) fn inert(topic: &str, scope: Scope) -> Self {
        Self {
            topic: topic.to_string(),
            scope,
            shared: None,
            bus: Weak::new(),
        }
    }

    /// Removes the handler from the bus.
    ///
    /// Messages dequeued after this returns are not handed to the handler; a
    /// message the handler is already processing runs to completion. Calling
    /// this more than once is a no-op.
    pub fn unregister(&self) {
        let Some(shared) = &self.shared else {
            return;
        };
        if let Some(bus) = self.bus.upgrade() {
            bus.unregister(shared);
        } else {
            shared.retire();
        }
    }

    /// The topic the handler is bound to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// `true` when the handler was registered with `subscribe_local`.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.scope == Scope::Local
    }

    /// `true` until the handler is unregistered or the bus shuts down.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.as_ref().is_some_and(|shared| shared.is_active())
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("topic", &self.topic)
            .field("scope", &self.scope)
            .field("active", &self.is_active())
            .finish()
    }
}
