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


//! Pending replies, keyed by their generated reply topic.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::common::{NodeId, ReplyHandler};
use crate::message::{reply_topic, LocalRegistration};

/// Crate-internal: one caller waiting for an answer.
pub(crate) struct PendingReply {
    /// Topic of the request, used in timeout errors.
    pub(crate) request_topic: String,
    /// Behind a mutex so the map stays `Sync`; taken exactly once.
    pub(crate) handler: Mutex<ReplyHandler>,
    /// The node the request went to, if remote.
    pub(crate) target: Option<NodeId>,
    /// The one-shot subscription that receives the answer.
    pub(crate) registration: Arc<LocalRegistration>,
    /// Cancels the deadline task, if any.
    pub(crate) timer: CancellationToken,
}

pub(crate) struct ReplyCorrelator {
    prefix: String,
    pending: DashMap<String, PendingReply>,
}

impl ReplyCorrelator {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pending: DashMap::new(),
        }
    }

    /// A fresh reply topic.
    pub(crate) fn next_topic(&self) -> String {
        reply_topic(&self.prefix)
    }

    pub(crate) fn insert(&self, reply_topic: String, pending: PendingReply) {
        self.pending.insert(reply_topic, pending);
    }

    /// Removes and returns the pending reply. At most one caller gets it.
    pub(crate) fn take(&self, reply_topic: &str) -> Option<PendingReply> {
        self.pending.remove(reply_topic).map(|(_, pending)| pending)
    }

    /// Reply topics of requests that went to `node`.
    pub(crate) fn awaiting(&self, node: &NodeId) -> Vec<String> {
        self.pending
            .iter()
            .filter(|entry| entry.target.as_ref() == Some(node))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Removes and returns every pending reply.
    pub(crate) fn drain(&self) -> Vec<PendingReply> {
        let topics: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        topics.iter().filter_map(|topic| self.take(topic)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FutureBox;
    use crate::message::Scope;
    use tokio::sync::mpsc;

    fn pending(topic: &str, target: Option<&str>) -> PendingReply {
        let (tx, _rx) = mpsc::unbounded_channel();
        PendingReply {
            request_topic: "request".into(),
            handler: Mutex::new(Box::new(|_| Box::pin(async {}) as FutureBox)),
            target: target.map(NodeId::new),
            registration: Arc::new(LocalRegistration::new(
                1,
                topic.to_string(),
                Scope::Reply,
                tx,
                CancellationToken::new(),
            )),
            timer: CancellationToken::new(),
        }
    }

    #[test]
    fn pending_replies_are_taken_at_most_once() {
        let correlator = ReplyCorrelator::new("@reply.");
        let topic = correlator.next_topic();
        correlator.insert(topic.clone(), pending(&topic, None));
        assert!(correlator.take(&topic).is_some());
        assert!(correlator.take(&topic).is_none());
    }

    #[test]
    fn awaiting_filters_by_target_node() {
        let correlator = ReplyCorrelator::new("@reply.");
        correlator.insert("a".into(), pending("a", Some("n1")));
        correlator.insert("b".into(), pending("b", Some("n2")));
        correlator.insert("c".into(), pending("c", None));
        assert_eq!(correlator.awaiting(&NodeId::new("n1")), vec!["a".to_string()]);
        assert_eq!(correlator.drain().len(), 3);
        assert_eq!(correlator.len(), 0);
    }

    static_assertions::assert_impl_all!(ReplyCorrelator: Send, Sync);

    #[test]
    fn pending_replies_can_be_taken_from_another_thread() {
        let correlator = Arc::new(ReplyCorrelator::new("@reply."));
        correlator.insert("t".into(), pending("t", Some("n1")));

        let shared = Arc::clone(&correlator);
        let taken = std::thread::spawn(move || shared.take("t").map(|p| p.request_topic))
            .join()
            .unwrap();
        assert_eq!(taken.as_deref(), Some("request"));
        assert_eq!(correlator.len(), 0);
    }
}
