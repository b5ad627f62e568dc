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


use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::{info, instrument, trace};

use crate::common::{Bus, BusInner, ChannelConfig, CONFIG};
use crate::traits::{policy_from_config, ClusterTransport, TimeoutPolicy};

/// The entry point for creating a bus.
///
/// - [`ChannelApp::launch_async()`] starts a standalone bus configured from
///   the XDG configuration file.
/// - The builder methods attach explicit configuration, a cluster transport
///   or a timeout policy before [`ChannelApp::launch`].
///
/// ```rust,ignore
/// let network = MemoryNetwork::new();
/// let bus = ChannelApp::new()
///     .with_transport(network.transport("node-a"))
///     .with_timeout_policy(FixedTimeout::new(Duration::from_secs(2)))
///     .launch()
///     .await?;
/// ```
#[derive(Default)]
pub struct ChannelApp {
    config: Option<ChannelConfig>,
    transport: Option<Arc<dyn ClusterTransport>>,
    timeout_policy: Option<Box<dyn TimeoutPolicy>>,
}

impl ChannelApp {
    /// A builder with no configuration, transport or policy attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `config` instead of the process-wide [`CONFIG`].
    #[must_use]
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Joins the cluster reachable through `transport`.
    #[must_use]
    pub fn with_transport(mut self, transport: impl ClusterTransport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Overrides the reply deadline derived from `timeouts.reply_timeout_ms`.
    #[must_use]
    pub fn with_timeout_policy(mut self, policy: impl TimeoutPolicy) -> Self {
        self.timeout_policy = Some(Box::new(policy));
        self
    }

    /// Starts the bus on the current Tokio runtime.
    ///
    /// Without [`ChannelApp::with_config`], the bus uses a copy of [`CONFIG`].
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to connect.
    #[instrument(skip(self))]
    pub async fn launch(self) -> anyhow::Result<Bus> {
        let config = self.config.unwrap_or_else(|| CONFIG.clone());
        let policy = self
            .timeout_policy
            .unwrap_or_else(|| policy_from_config(&config));
        let inner = BusInner::new(config, self.transport, policy, Handle::current());
        if let Some(gateway) = &inner.gateway {
            gateway
                .start()
                .await
                .with_context(|| format!("node {} failed to join the cluster", inner.node_id))?;
        }
        info!(node = %inner.node_id, clustered = inner.gateway.is_some(), "bus launched");
        Ok(Bus::new(inner))
    }

    /// Starts a standalone bus configured from the XDG configuration file.
    pub async fn launch_async() -> Bus {
        trace!("Starting standalone bus");
        let config = ChannelConfig::load();
        trace!("Configuration loaded: {:?}", config);
        let policy = policy_from_config(&config);
        Bus::new(BusInner::new(config, None, policy, Handle::current()))
    }
}
