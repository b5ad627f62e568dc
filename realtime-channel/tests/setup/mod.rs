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

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use realtime_channel::prelude::*;
use tokio::sync::mpsc;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod messages;

#[allow(unused_imports)]
pub use messages::*;

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// How long a test waits for something that should happen.
pub const PATIENCE: Duration = Duration::from_secs(3);

/// How long a test waits to be confident something does not happen.
pub const QUIET: Duration = Duration::from_millis(150);

/// Initializes the global tracing subscriber for tests.
///
/// Output goes to `logs/channel_tests.txt`; `std::sync::Once` keeps repeated
/// calls from different tests harmless.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "channel_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("info")
            .add_directive("realtime_channel=trace".parse().unwrap())
            .add_directive("realtime_channel::common::cluster::gateway=debug".parse().unwrap())
            .add_directive("publish_tests=trace".parse().unwrap())
            .add_directive("send_tests=trace".parse().unwrap())
            .add_directive("reply_tests=trace".parse().unwrap())
            .add_directive("cluster_tests=trace".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// Configuration used by tests: defaults, never read from disk.
pub fn test_config() -> ChannelConfig {
    ChannelConfig::default()
}

/// A standalone bus with the test configuration.
pub async fn standalone() -> anyhow::Result<Bus> {
    initialize_tracing();
    ChannelApp::new().with_config(test_config()).launch().await
}

/// One bus per name, all joined through a shared in-memory network.
pub async fn cluster(names: &[&str]) -> anyhow::Result<(MemoryNetwork, Vec<Bus>)> {
    initialize_tracing();
    let network = MemoryNetwork::new();
    let mut buses = Vec::with_capacity(names.len());
    for name in names {
        let bus = ChannelApp::new()
            .with_config(test_config())
            .with_transport(network.transport(*name))
            .launch()
            .await?;
        buses.push(bus);
    }
    Ok((network, buses))
}

/// Waits until `condition` holds, failing the test after [`PATIENCE`].
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Waits until `bus` knows that `node` handles `topic`.
pub async fn await_advertised(bus: &Bus, topic: &str, node: &NodeId) {
    eventually(&format!("{node} to advertise {topic}"), || {
        bus.remote_nodes(topic).contains(node)
    })
    .await;
}

/// Receives the next collected item, failing the test after [`PATIENCE`].
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(PATIENCE, rx.recv())
        .await
        .expect("timed out waiting for a delivery")
        .expect("collector closed")
}

/// Receives exactly `n` collected items.
pub async fn take<T>(rx: &mut mpsc::UnboundedReceiver<T>, n: usize) -> Vec<T> {
    let mut items = Vec::with_capacity(n);
    for _ in 0..n {
        items.push(next(rx).await);
    }
    items
}

/// Asserts that nothing arrives within [`QUIET`].
pub async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(Some(item)) = tokio::time::timeout(QUIET, rx.recv()).await {
        panic!("unexpected delivery: {item:?}");
    }
}
