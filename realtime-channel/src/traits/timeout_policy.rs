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


use std::time::Duration;

use crate::common::ChannelConfig;

/// Chooses how long a sender waits for a reply before its reply handler
/// receives [`BusError::DeliveryTimeout`](crate::message::BusError::DeliveryTimeout).
///
/// Closures of the form `Fn(&str) -> Option<Duration>` implement this trait,
/// so a per-topic policy can be written inline:
///
/// ```ignore
/// ChannelApp::new().with_timeout_policy(|topic: &str| {
///     topic.starts_with("slow.").then(|| Duration::from_secs(30))
/// });
/// ```
pub trait TimeoutPolicy: Send + Sync + 'static {
    /// The reply deadline for a request sent to `topic`; `None` waits forever.
    fn reply_deadline(&self, topic: &str) -> Option<Duration>;
}

/// Replies are awaited without a deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTimeout;

impl TimeoutPolicy for NoTimeout {
    fn reply_deadline(&self, _topic: &str) -> Option<Duration> {
        None
    }
}

/// Every reply is awaited for the same duration.
#[derive(Debug, Clone, Copy, derive_new::new)]
pub struct FixedTimeout {
    after: Duration,
}

impl TimeoutPolicy for FixedTimeout {
    fn reply_deadline(&self, _topic: &str) -> Option<Duration> {
        Some(self.after)
    }
}

impl<F> TimeoutPolicy for F
where
    F: Fn(&str) -> Option<Duration> + Send + Sync + 'static,
{
    fn reply_deadline(&self, topic: &str) -> Option<Duration> {
        self(topic)
    }
}

/// Crate-internal: the policy implied by `timeouts.reply_timeout_ms`.
pub(crate) fn policy_from_config(config: &ChannelConfig) -> Box<dyn TimeoutPolicy> {
    match config.reply_timeout() {
        Some(after) => Box::new(FixedTimeout::new(after)),
        None => Box::new(NoTimeout),
    }
}
