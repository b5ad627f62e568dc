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


use std::sync::{Arc, OnceLock};

use channel_test::prelude::*;
use realtime_channel::prelude::*;
use serde_json::json;
use tokio::sync::mpsc;

use crate::setup::*;

mod setup;

#[channel_test]
async fn test_unregister_is_idempotent() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let registration = bus.subscribe("ticks", move |message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(message.payload_as::<u32>().unwrap());
        }
    });
    assert!(registration.is_active());

    bus.publish("ticks", 1);
    assert_eq!(next(&mut rx).await, 1);

    registration.unregister();
    registration.unregister();
    assert!(!registration.is_active());
    assert_eq!(bus.handler_count("ticks"), 0);

    bus.publish("ticks", 2);
    assert_silent(&mut rx).await;
    bus.shutdown().await
}

#[channel_test]
async fn test_registration_reports_scope_and_topic() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let shared = bus.subscribe("scoped", |_| Reply::ready());
    let private = bus.subscribe_local("scoped", |_| Reply::ready());

    assert_eq!(shared.topic(), "scoped");
    assert!(!shared.is_local());
    assert!(private.is_local());
    assert_eq!(bus.handler_count("scoped"), 2);
    assert!(bus.has_local_handlers("scoped"));

    let rendered = format!("{private:?}");
    assert!(rendered.contains("Local"), "{rendered}");
    bus.shutdown().await
}

#[channel_test]
async fn test_empty_topic_yields_inert_registration() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let registration = bus.subscribe("", |_| Reply::ready());

    assert!(!registration.is_active());
    assert_eq!(bus.topic_count(), 0);
    registration.unregister();
    bus.shutdown().await
}

#[channel_test]
async fn test_closed_bus_refuses_new_work() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let before = bus.subscribe("late", move |message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(message.topic().to_string());
        }
    });

    bus.shutdown().await?;
    assert!(bus.is_closed());
    assert!(!before.is_active());

    let after = bus.subscribe("late", |_| Reply::ready());
    assert!(!after.is_active());
    assert_eq!(bus.handler_count("late"), 0);

    bus.publish("late", json!(1));
    assert_silent(&mut rx).await;
    assert_eq!(bus.stats().dropped, 1);

    let error = bus.request("late", json!(2)).await.unwrap_err();
    assert_eq!(error, BusError::Closed);
    assert_eq!(error.code(), BusError::CLOSED);

    // A second shutdown is harmless.
    bus.shutdown().await
}

#[channel_test]
async fn test_handler_can_unregister_itself() -> anyhow::Result<()> {
    let bus = standalone().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let slot: Arc<OnceLock<Registration>> = Arc::new(OnceLock::new());

    let own = Arc::clone(&slot);
    let registration = bus.subscribe("once", move |message| {
        let tx = tx.clone();
        let own = Arc::clone(&own);
        async move {
            let _ = tx.send(message.payload_as::<u32>().unwrap());
            if let Some(registration) = own.get() {
                registration.unregister();
            }
        }
    });
    let _ = slot.set(registration);

    bus.publish("once", 1);
    assert_eq!(next(&mut rx).await, 1);
    eventually("the handler to unregister itself", || bus.handler_count("once") == 0).await;

    bus.publish("once", 2);
    assert_silent(&mut rx).await;
    bus.shutdown().await
}

#[channel_test]
async fn test_reply_subscriptions_are_not_counted_as_handlers() -> anyhow::Result<()> {
    let bus = standalone().await?;
    bus.subscribe("quiet", |_| Reply::ready());

    bus.send_with_reply("quiet", json!(null), |_| Reply::ready());
    eventually("the request to be pending", || bus.pending_replies() == 1).await;

    assert_eq!(bus.handler_count("quiet"), 1);
    assert_eq!(bus.topic_count(), 2);
    bus.shutdown().await
}
