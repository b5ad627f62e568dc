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


//! The registration registry.
//!
//! One [`DashMap`] entry per topic holds everything dispatch needs: the local
//! registrations in insertion order, the remote nodes currently advertising
//! the topic, and the round-robin cursor. Each lookup works on a snapshot
//! taken under the entry's shard lock, so concurrent subscribe/unregister
//! never disturbs a dispatch in progress.
//!
//! Entries are keyed by subscription filter. Dispatch finds the entry for a
//! topic by key and confirms it with `topic_matches`; with exact matching
//! that entry is the only candidate.

use std::sync::Arc;

use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;

use crate::common::NodeId;
use crate::message::{topic_matches, LocalRegistration, Scope};

/// Which registrations a dispatch may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reach {
    /// Local callers reach every registration.
    Any,
    /// Publishes and sends from peers reach cluster-visible handlers only.
    Cluster,
    /// Replies from peers reach one-shot reply subscriptions only.
    Reply,
}

impl Reach {
    fn admits(self, scope: Scope) -> bool {
        match self {
            Self::Any => true,
            Self::Cluster => scope == Scope::Cluster,
            Self::Reply => scope == Scope::Reply,
        }
    }
}

/// The one receiver a send was routed to.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Local(Arc<LocalRegistration>),
    Remote(NodeId),
}

#[derive(Debug, Default)]
struct TopicEntry {
    local: Vec<Arc<LocalRegistration>>,
    remote: Vec<NodeId>,
    cursor: usize,
}

impl TopicEntry {
    fn cluster_handlers(&self) -> usize {
        self.local
            .iter()
            .filter(|reg| reg.scope() == Scope::Cluster)
            .count()
    }

    fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    topics: DashMap<String, TopicEntry>,
}

impl Registry {
    /// The entry whose filter matches `topic`.
    fn matching(&self, topic: &str) -> Option<Ref<'_, String, TopicEntry>> {
        self.topics
            .get(topic)
            .filter(|entry| topic_matches(entry.key(), topic))
    }

    fn matching_mut(&self, topic: &str) -> Option<RefMut<'_, String, TopicEntry>> {
        self.topics
            .get_mut(topic)
            .filter(|entry| topic_matches(entry.key(), topic))
    }

    /// Appends a registration to its topic.
    ///
    /// `advertise` runs, still under the entry lock, when the registration
    /// is the topic's first cluster-visible one on this node.
    pub(crate) fn insert(&self, registration: Arc<LocalRegistration>, advertise: impl FnOnce(&str)) {
        let topic = registration.topic().to_string();
        let mut entry = self.topics.entry(topic).or_default();
        let first = registration.scope() == Scope::Cluster && entry.cluster_handlers() == 0;
        entry.local.push(Arc::clone(&registration));
        if first {
            advertise(registration.topic());
        }
    }

    /// Removes the registration with `id` from `topic`.
    ///
    /// `withdraw` runs, still under the entry lock, when the last
    /// cluster-visible registration for the topic goes away. Returns
    /// `false` if the registration was not present.
    pub(crate) fn remove(&self, topic: &str, id: u64, withdraw: impl FnOnce(&str)) -> bool {
        {
            let Some(mut entry) = self.topics.get_mut(topic) else {
                return false;
            };
            let Some(position) = entry.local.iter().position(|reg| reg.id() == id) else {
                return false;
            };
            let removed = entry.local.remove(position);
            if removed.scope() == Scope::Cluster && entry.cluster_handlers() == 0 {
                withdraw(topic);
            }
        }
        self.topics.remove_if(topic, |_, entry| entry.is_empty());
        true
    }

    /// Snapshot of the publish targets for `topic`.
    pub(crate) fn fan_out(
        &self,
        topic: &str,
        reach: Reach,
        include_remote: bool,
    ) -> (Vec<Arc<LocalRegistration>>, Vec<NodeId>) {
        self.matching(topic).map_or_else(Default::default, |entry| {
            let local = entry
                .local
                .iter()
                .filter(|reg| reach.admits(reg.scope()) && reg.is_active())
                .cloned()
                .collect();
            let remote = if include_remote {
                entry.remote.clone()
            } else {
                Vec::new()
            };
            (local, remote)
        })
    }

    /// Picks the next send target for `topic` and advances the cursor.
    ///
    /// Candidates are the admitted local registrations in insertion order,
    /// followed by the advertising remote nodes when `include_remote` is set.
    pub(crate) fn next_target(&self, topic: &str, reach: Reach, include_remote: bool) -> Option<Target> {
        let mut guard = self.matching_mut(topic)?;
        let TopicEntry {
            local,
            remote,
            cursor,
        } = &mut *guard;

        let candidates: Vec<&Arc<LocalRegistration>> = local
            .iter()
            .filter(|reg| reach.admits(reg.scope()) && reg.is_active())
            .collect();
        let remote_count = if include_remote { remote.len() } else { 0 };
        let total = candidates.len() + remote_count;
        if total == 0 {
            return None;
        }

        let index = *cursor % total;
        *cursor = cursor.wrapping_add(1);
        Some(match candidates.get(index) {
            Some(reg) => Target::Local(Arc::clone(reg)),
            None => Target::Remote(remote[index - candidates.len()].clone()),
        })
    }

    /// Records that `node` advertises `topic`. Returns `true` if it was new.
    pub(crate) fn add_remote(&self, topic: &str, node: &NodeId) -> bool {
        let mut entry = self.topics.entry(topic.to_string()).or_default();
        if entry.remote.contains(node) {
            false
        } else {
            entry.remote.push(node.clone());
            true
        }
    }

    /// Forgets that `node` advertises `topic`. Returns `true` if it was known.
    pub(crate) fn remove_remote(&self, topic: &str, node: &NodeId) -> bool {
        let removed = {
            let Some(mut entry) = self.topics.get_mut(topic) else {
                return false;
            };
            let before = entry.remote.len();
            entry.remote.retain(|known| known != node);
            entry.remote.len() != before
        };
        self.topics.remove_if(topic, |_, entry| entry.is_empty());
        removed
    }

    /// Drops `node` from every topic. Returns the topics it was removed from.
    pub(crate) fn prune_node(&self, node: &NodeId) -> Vec<String> {
        let mut pruned = Vec::new();
        for mut entry in self.topics.iter_mut() {
            let before = entry.remote.len();
            entry.remote.retain(|known| known != node);
            if entry.remote.len() != before {
                pruned.push(entry.key().clone());
            }
        }
        for topic in &pruned {
            self.topics.remove_if(topic, |_, entry| entry.is_empty());
        }
        pruned
    }

    /// Topics this node currently advertises.
    pub(crate) fn cluster_topics(&self) -> Vec<String> {
        self.topics
            .iter()
            .filter(|entry| entry.cluster_handlers() > 0)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of active local handlers for `topic`, one-shot reply
    /// subscriptions excluded.
    pub(crate) fn handler_count(&self, topic: &str) -> usize {
        self.matching(topic).map_or(0, |entry| {
            entry
                .local
                .iter()
                .filter(|reg| reg.scope() != Scope::Reply && reg.is_active())
                .count()
        })
    }

    pub(crate) fn has_local_handlers(&self, topic: &str) -> bool {
        self.handler_count(topic) > 0
    }

    pub(crate) fn remote_nodes(&self, topic: &str) -> Vec<NodeId> {
        self.matching(topic)
            .map_or_else(Vec::new, |entry| entry.remote.clone())
    }

    /// Number of topics with at least one local registration or remote node.
    pub(crate) fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Empties the registry, returning every local registration.
    pub(crate) fn clear(&self) -> Vec<Arc<LocalRegistration>> {
        let registrations = self
            .topics
            .iter()
            .flat_map(|entry| entry.local.clone())
            .collect();
        self.topics.clear();
        registrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn registration(id: u64, topic: &str, scope: Scope) -> Arc<LocalRegistration> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(LocalRegistration::new(
            id,
            topic.to_string(),
            scope,
            tx,
            CancellationToken::new(),
        ))
    }

    fn local_id(target: Option<Target>) -> u64 {
        match target {
            Some(Target::Local(reg)) => reg.id(),
            other => panic!("expected a local target, got {other:?}"),
        }
    }

    #[test]
    fn round_robin_alternates_in_insertion_order() {
        let registry = Registry::default();
        registry.insert(registration(1, "t", Scope::Cluster), |_| {});
        registry.insert(registration(2, "t", Scope::Cluster), |_| {});

        let picks: Vec<u64> = (0..4)
            .map(|_| local_id(registry.next_target("t", Reach::Any, true)))
            .collect();
        assert_eq!(picks, vec![1, 2, 1, 2]);
    }

    #[test]
    fn remote_nodes_join_the_rotation_after_local_handlers() {
        let registry = Registry::default();
        registry.insert(registration(1, "t", Scope::Cluster), |_| {});
        registry.add_remote("t", &NodeId::new("peer"));

        assert_eq!(local_id(registry.next_target("t", Reach::Any, true)), 1);
        assert!(matches!(
            registry.next_target("t", Reach::Any, true),
            Some(Target::Remote(node)) if node.as_str() == "peer"
        ));
        assert_eq!(local_id(registry.next_target("t", Reach::Any, false)), 1);
    }

    #[test]
    fn lookups_match_topics_exactly() {
        let registry = Registry::default();
        registry.insert(registration(1, "orders.created", Scope::Cluster), |_| {});
        registry.add_remote("orders.created", &NodeId::new("peer"));

        assert_eq!(registry.handler_count("orders.created"), 1);
        assert_eq!(registry.handler_count("Orders.Created"), 0);
        assert_eq!(registry.handler_count("orders"), 0);
        assert!(registry.next_target("orders.*", Reach::Any, true).is_none());
        assert!(registry.remote_nodes("orders.created.v2").is_empty());
        assert_eq!(registry.fan_out("orders.created", Reach::Any, true).1.len(), 1);
    }

    #[test]
    fn advertise_and_withdraw_follow_the_cluster_handler_set() {
        let registry = Registry::default();
        let advertised = Cell::new(0);
        let withdrawn = Cell::new(0);

        registry.insert(registration(1, "t", Scope::Cluster), |_| advertised.set(advertised.get() + 1));
        registry.insert(registration(2, "t", Scope::Cluster), |_| advertised.set(advertised.get() + 1));
        registry.insert(registration(3, "t", Scope::Local), |_| advertised.set(advertised.get() + 1));
        assert_eq!(advertised.get(), 1);
        assert_eq!(registry.cluster_topics(), vec!["t".to_string()]);

        assert!(registry.remove("t", 1, |_| withdrawn.set(withdrawn.get() + 1)));
        assert_eq!(withdrawn.get(), 0);
        assert!(registry.remove("t", 2, |_| withdrawn.set(withdrawn.get() + 1)));
        assert_eq!(withdrawn.get(), 1);
        assert!(registry.cluster_topics().is_empty());
        assert!(registry.has_local_handlers("t"));

        assert!(registry.remove("t", 3, |_| withdrawn.set(withdrawn.get() + 1)));
        assert!(!registry.remove("t", 3, |_| withdrawn.set(withdrawn.get() + 1)));
        assert_eq!(withdrawn.get(), 1);
        assert_eq!(registry.topic_count(), 0);
    }

    #[test]
    fn peers_only_reach_cluster_scope() {
        let registry = Registry::default();
        registry.insert(registration(1, "t", Scope::Local), |_| {});
        assert!(registry.next_target("t", Reach::Cluster, false).is_none());
        let (local, _) = registry.fan_out("t", Reach::Cluster, false);
        assert!(local.is_empty());
        let (local, _) = registry.fan_out("t", Reach::Any, false);
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn retired_registrations_are_skipped() {
        let registry = Registry::default();
        let first = registration(1, "t", Scope::Cluster);
        registry.insert(Arc::clone(&first), |_| {});
        registry.insert(registration(2, "t", Scope::Cluster), |_| {});
        first.retire();

        assert_eq!(local_id(registry.next_target("t", Reach::Any, false)), 2);
        assert_eq!(local_id(registry.next_target("t", Reach::Any, false)), 2);
        assert_eq!(registry.handler_count("t"), 1);
    }

    #[test]
    fn advertisements_are_idempotent_and_pruned_with_the_node() {
        let registry = Registry::default();
        let peer = NodeId::new("peer");
        assert!(registry.add_remote("a", &peer));
        assert!(!registry.add_remote("a", &peer));
        assert!(registry.add_remote("b", &peer));
        assert_eq!(registry.remote_nodes("a"), vec![peer.clone()]);

        let mut pruned = registry.prune_node(&peer);
        pruned.sort();
        assert_eq!(pruned, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.topic_count(), 0);
        assert!(!registry.remove_remote("a", &peer));
    }

    #[test]
    fn reply_subscriptions_are_not_counted_as_handlers() {
        let registry = Registry::default();
        registry.insert(registration(1, "@reply.x", Scope::Reply), |_| {});
        assert_eq!(registry.handler_count("@reply.x"), 0);
        assert!(registry.cluster_topics().is_empty());
        assert_eq!(local_id(registry.next_target("@reply.x", Reach::Reply, false)), 1);
    }
}
