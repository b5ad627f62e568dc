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


//! The cluster wire representation of a message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::NodeId;
use crate::message::BusError;

/// How an envelope is to be delivered by the receiving node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// Fan out to every cluster-visible handler of the topic.
    Publish,
    /// Deliver to exactly one cluster-visible handler, chosen round-robin.
    Send,
    /// Deliver to the one-shot reply subscription named by the topic.
    Reply,
}

/// A message as it travels between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Delivery mode at the receiving node.
    pub kind: DeliveryKind,
    /// Destination topic (a reply topic for [`DeliveryKind::Reply`]).
    pub topic: String,
    /// Where the recipient should send its answer, if the sender awaits one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_topic: Option<String>,
    /// The node that produced this envelope.
    pub origin: NodeId,
    /// JSON payload.
    #[serde(default)]
    pub payload: Value,
    /// Whether this envelope carries a failure instead of a payload.
    #[serde(default)]
    pub is_failure: bool,
    /// Failure code, present when `is_failure` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<i32>,
    /// Failure detail, present when `is_failure` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl Envelope {
    /// Creates a payload-carrying envelope.
    pub fn new(
        kind: DeliveryKind,
        topic: impl Into<String>,
        reply_topic: Option<String>,
        origin: NodeId,
        payload: Value,
    ) -> Self {
        Self {
            kind,
            topic: topic.into(),
            reply_topic,
            origin,
            payload,
            is_failure: false,
            failure_code: None,
            failure_message: None,
        }
    }

    /// Creates a failure answer addressed to `reply_topic` on the origin node.
    pub fn failure(reply_topic: impl Into<String>, origin: NodeId, error: &BusError) -> Self {
        let (code, detail) = error.to_wire();
        Self {
            kind: DeliveryKind::Reply,
            topic: reply_topic.into(),
            reply_topic: None,
            origin,
            payload: Value::Null,
            is_failure: true,
            failure_code: Some(code),
            failure_message: Some(detail),
        }
    }

    /// Returns the carried failure, if this envelope is a failure answer.
    #[must_use]
    pub fn error(&self) -> Option<BusError> {
        self.is_failure.then(|| {
            BusError::from_wire(
                self.failure_code.unwrap_or(BusError::HANDLER_PANIC),
                self.failure_message.clone().unwrap_or_default(),
            )
        })
    }
}
