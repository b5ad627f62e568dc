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


//! Topic names and the filter matching rule used by subscriptions.
//!
//! Topics are opaque, non-empty strings compared case-sensitively. A
//! subscription filter is itself a topic: it matches exactly one topic
//! string, with no wildcard or hierarchical expansion.

use crate::message::BusError;

/// Validates a topic or topic filter supplied by a caller.
///
/// # Errors
///
/// Returns [`BusError::InvalidTopic`] for the empty string.
pub fn validate_topic(topic: &str) -> Result<(), BusError> {
    if topic.is_empty() {
        Err(BusError::InvalidTopic)
    } else {
        Ok(())
    }
}

/// Crate-internal: `true` when a subscription registered under `filter`
/// receives messages addressed to `topic`.
pub(crate) fn topic_matches(filter: &str, topic: &str) -> bool {
    !filter.is_empty() && filter == topic
}

/// Crate-internal: builds a fresh, unguessable reply topic.
pub(crate) fn reply_topic(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4())
}
