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


use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Calls to `publish`/`publish_local` that were admitted.
    pub published: u64,
    /// Calls to the `send` family, replies included, that found a target.
    pub sent: u64,
    /// Messages handed to local handler inboxes.
    pub delivered: u64,
    /// Envelopes queued towards remote nodes.
    pub forwarded: u64,
    /// Envelopes received from remote nodes.
    pub received: u64,
    /// Pending replies completed with a message.
    pub replies: u64,
    /// Pending replies completed with an error.
    pub failures: u64,
    /// Handler invocations that panicked.
    pub panics: u64,
    /// Messages dropped for lack of a handler, closed bus or invalid input.
    pub dropped: u64,
}

/// Crate-internal: lock-free counters behind [`BusStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) published: AtomicU64,
    pub(crate) sent: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) forwarded: AtomicU64,
    pub(crate) received: AtomicU64,
    pub(crate) replies: AtomicU64,
    pub(crate) failures: AtomicU64,
    pub(crate) panics: AtomicU64,
    pub(crate) dropped: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
