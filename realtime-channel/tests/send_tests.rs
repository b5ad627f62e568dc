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

use channel_test::prelude::*;
use realtime_channel::prelude::*;
use serde_json::json;
use tokio::sync::{mpsc, Notify};

use crate::setup::*;

mod setup;

fn recording(
    bus: &Bus,
    topic: &str,
    name: &'static str,
    tx: &mpsc::UnboundedSender<(&'static str, u32)>,
) -> Registration {
    let tx = tx.clone();
    bus.subscribe(topic, move |message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send((name, message.payload_as::<u32>().unwrap()));
        }
    })
}

/// H1, H2 on "t"; sends 1..4 land on H1 {1,3} and H2 {2,4}.
#[channel_test]
async fn test_send_round_robin_between_two_handlers() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    recording(&bus, "t", "h1", &tx);
    recording(&bus, "t", "h2", &tx);

    for n in 1..=4u32 {
        bus.send("t", n);
    }

    let mut h1 = Vec::new();
    let mut h2 = Vec::new();
    for (name, n) in take(&mut rx, 4).await {
        match name {
            "h1" => h1.push(n),
            _ => h2.push(n),
        }
    }
    assert_eq!(h1, vec![1, 3]);
    assert_eq!(h2, vec![2, 4]);
    assert_silent(&mut rx).await;
    bus.shutdown().await
}

#[channel_test]
async fn test_k_sends_reach_k_handlers_once_each() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let names = ["a", "b", "c", "d", "e"];
    for name in names {
        recording(&bus, "work", name, &tx);
    }

    for n in 0..names.len() as u32 {
        bus.send("work", n);
    }

    let mut receivers: Vec<&str> = take(&mut rx, names.len()).await.into_iter().map(|(name, _)| name).collect();
    receivers.sort_unstable();
    assert_eq!(receivers, names.to_vec());
    bus.shutdown().await
}

#[channel_test]
async fn test_single_sender_order_is_preserved() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.subscribe("ordered", move |message| {
        let tx = tx.clone();
        async move {
            // Yield so that a reordering inbox would have a chance to show it.
            tokio::task::yield_now().await;
            let _ = tx.send(message.payload_as::<Seq>().unwrap());
        }
    });

    for n in 0..200 {
        bus.send("ordered", Seq(n));
    }

    let received = take(&mut rx, 200).await;
    assert_eq!(received, (0..200).map(Seq).collect::<Vec<_>>());
    bus.shutdown().await
}

#[channel_test]
async fn test_send_without_handlers_reports_no_handlers() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bus.send_with_reply("missing", json!(1), move |result| async move {
        let _ = tx.send(result);
    });

    let error = next(&mut rx).await.unwrap_err();
    assert_eq!(
        error,
        BusError::NoHandlers {
            topic: "missing".into()
        }
    );
    assert_eq!(error.code(), BusError::NO_HANDLERS);
    bus.shutdown().await
}

#[channel_test]
async fn test_send_to_empty_topic_reports_invalid_topic() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let result = bus.request("", json!(1)).await;
    assert_eq!(result.unwrap_err(), BusError::InvalidTopic);
    bus.shutdown().await
}

#[channel_test]
async fn test_send_local_with_reply() -> anyhow::Result<()> {
    let bus = standalone().await?;
    bus.subscribe_local("double", |message| async move {
        let n: u32 = message.payload_as().unwrap();
        message.reply(n * 2);
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.send_local_with_reply("double", 21, move |result| async move {
        let _ = tx.send(result.map(|reply| reply.payload_as::<u32>()));
    });

    assert_eq!(next(&mut rx).await, Ok(Ok(42)));
    assert_eq!(bus.request_local("double", 5).await?.payload_as::<u32>()?, 10);
    bus.shutdown().await
}

#[channel_test(allow_panics)]
async fn test_panicking_send_handler_reports_handler_panic() -> anyhow::Result<()> {
    let bus = standalone().await?;
    bus.subscribe("explode", |_| async move {
        panic!("kaboom");
    });

    let error = bus.request("explode", json!({})).await.unwrap_err();
    assert_eq!(error.code(), BusError::HANDLER_PANIC);
    assert_eq!(error.message(), "kaboom");
    bus.shutdown().await
}

#[channel_test]
async fn test_unregistered_handler_leaves_the_rotation() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = recording(&bus, "jobs", "first", &tx);
    recording(&bus, "jobs", "second", &tx);

    first.unregister();
    for n in 0..3u32 {
        bus.send("jobs", n);
    }

    let receivers: Vec<&str> = take(&mut rx, 3).await.into_iter().map(|(name, _)| name).collect();
    assert_eq!(receivers, vec!["second"; 3]);
    bus.shutdown().await
}

/// A send queued behind a busy handler that is then unregistered is
/// answered with `NoHandlers`, while the message in progress completes.
#[channel_test]
async fn test_queued_send_is_rejected_after_unregister() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let gate = Arc::new(Notify::new());
    let (started_tx, mut started) = mpsc::unbounded_channel();

    let release = Arc::clone(&gate);
    let registration = bus.subscribe("busy", move |message| {
        let release = Arc::clone(&release);
        let started_tx = started_tx.clone();
        async move {
            let _ = started_tx.send(());
            release.notified().await;
            message.reply("done");
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let first_tx = tx.clone();
    bus.send_with_reply("busy", 1, move |result| async move {
        let _ = first_tx.send((1, result.map(|m| m.payload().clone())));
    });
    next(&mut started).await;
    bus.send_with_reply("busy", 2, move |result| async move {
        let _ = tx.send((2, result.map(|m| m.payload().clone())));
    });

    registration.unregister();
    gate.notify_one();

    let mut results = take(&mut rx, 2).await;
    results.sort_by_key(|(n, _)| *n);
    assert_eq!(results[0], (1, Ok(json!("done"))));
    assert_eq!(
        results[1],
        (
            2,
            Err(BusError::NoHandlers {
                topic: "busy".into()
            })
        )
    );
    bus.shutdown().await
}
