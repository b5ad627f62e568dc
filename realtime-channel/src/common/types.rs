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


//! Type aliases and small value types shared across the bus.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::message::{BusError, Message};

/// A pinned, boxed future resolving to `()`, as produced by every handler.
pub type FutureBox = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Crate-internal: the type-erased form of a subscription handler.
pub(crate) type MessageHandler = Arc<dyn Fn(Message) -> FutureBox + Send + Sync + 'static>;

/// Crate-internal: the type-erased form of a one-shot reply handler.
pub(crate) type ReplyHandler =
    Box<dyn FnOnce(Result<Message, BusError>) -> FutureBox + Send + 'static>;

/// Identifies one bus instance within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from an explicit name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a unique node id of the form `{prefix}-{uuid}`.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Crate-internal: boxes a caller's subscription closure.
pub(crate) fn box_handler<F, Fut>(handler: F) -> MessageHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |message| Box::pin(handler(message)) as FutureBox)
}

/// Crate-internal: boxes a caller's reply closure.
pub(crate) fn box_reply_handler<F, Fut>(handler: F) -> ReplyHandler
where
    F: FnOnce(Result<Message, BusError>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |result| Box::pin(handler(result)) as FutureBox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_node_ids_carry_prefix_and_differ() {
        let a = NodeId::generate("node");
        let b = NodeId::generate("node");
        assert!(a.as_str().starts_with("node-"));
        assert_ne!(a, b);
    }

    #[test]
    fn node_id_serializes_as_plain_string() {
        let id = NodeId::new("alpha");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"alpha\"");
        assert_eq!(id.to_string(), "alpha");
    }
}
