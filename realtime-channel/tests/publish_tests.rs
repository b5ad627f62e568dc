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


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use channel_test::prelude::*;
use realtime_channel::prelude::*;
use serde_json::json;
use tokio::sync::mpsc;

use crate::setup::*;

mod setup;

/// H on "a.b"; publishing {"x":1} invokes H once with that payload, locally.
#[channel_test]
async fn test_publish_reaches_single_handler_once() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bus.subscribe("a.b", move |message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send((message.payload().clone(), message.is_local()));
        }
    });
    bus.publish("a.b", json!({"x": 1}));

    assert_eq!(next(&mut rx).await, (json!({"x": 1}), true));
    assert_silent(&mut rx).await;
    bus.shutdown().await
}

#[channel_test]
async fn test_publish_fans_out_to_every_handler() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    for handler in 0..3 {
        let tx = tx.clone();
        bus.subscribe("prices", move |message| {
            let tx = tx.clone();
            async move {
                let order: Order = message.payload_as().unwrap();
                let _ = tx.send((handler, order));
            }
        });
    }
    let order = Order {
        id: 1,
        item: "widget".into(),
    };
    bus.publish("prices", &order);

    let mut seen = take(&mut rx, 3).await;
    seen.sort_by_key(|(handler, _)| *handler);
    assert_eq!(seen.iter().map(|(h, _)| *h).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(seen.iter().all(|(_, received)| received == &order));
    assert_eq!(bus.stats().delivered, 3);
    bus.shutdown().await
}

#[channel_test]
async fn test_publish_without_handlers_is_silent() -> anyhow::Result<()> {
    let bus = standalone().await?;
    bus.publish("nobody.home", json!("hello"))
        .publish_local("nobody.home", json!("again"));

    let stats = bus.stats();
    assert_eq!(stats.published, 2);
    assert_eq!(stats.delivered, 0);
    bus.shutdown().await
}

#[channel_test]
async fn test_publish_to_empty_topic_is_dropped() -> anyhow::Result<()> {
    let bus = standalone().await?;
    bus.publish("", json!(1));
    assert_eq!(bus.stats().published, 0);
    assert_eq!(bus.stats().dropped, 1);
    bus.shutdown().await
}

#[channel_test(allow_panics)]
async fn test_panicking_handler_does_not_affect_others() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    bus.subscribe("events", move |_| {
        let count = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if count == 0 {
                panic!("first event is poison");
            }
        }
    });
    bus.subscribe("events", move |message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(message.payload_as::<u32>().unwrap());
        }
    });

    bus.publish("events", 1).publish("events", 2);

    assert_eq!(take(&mut rx, 2).await, vec![1, 2]);
    eventually("the panicking handler to see both events", || {
        calls.load(Ordering::SeqCst) == 2
    })
    .await;
    assert_eq!(bus.stats().panics, 1);
    bus.shutdown().await
}

#[channel_test]
async fn test_publish_from_a_plain_thread() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.subscribe("from.thread", move |message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(message.payload_as::<String>().unwrap());
        }
    });

    let publisher = bus.clone();
    std::thread::spawn(move || {
        publisher.publish("from.thread", "outside the runtime");
    })
    .join()
    .expect("publisher thread panicked");

    assert_eq!(next(&mut rx).await, "outside the runtime");
    bus.shutdown().await
}

#[channel_test]
async fn test_handlers_can_use_reply_helpers() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bus.subscribe("audit", move |message| {
        let _ = tx.send(message.topic().to_string());
        Reply::ready()
    });
    bus.publish("audit", json!(null));

    assert_eq!(next(&mut rx).await, "audit");
    bus.shutdown().await
}

#[channel_test]
async fn test_handlers_can_mix_ready_and_pending_replies() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bus.subscribe("mixed", move |message| {
        let tx = tx.clone();
        if message.payload().is_null() {
            return Reply::ready();
        }
        Reply::pending(async move {
            tokio::task::yield_now().await;
            let _ = tx.send(message.payload_as::<u32>().unwrap());
        })
    });
    bus.publish("mixed", json!(null));
    bus.publish("mixed", 7);

    assert_eq!(next(&mut rx).await, 7);
    assert_silent(&mut rx).await;
    bus.shutdown().await
}
