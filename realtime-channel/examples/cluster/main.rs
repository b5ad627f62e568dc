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

use realtime_channel::init_tracing;
use realtime_channel::prelude::*;

#[channel_message]
struct PriceQuery {
    fruit: String,
}

#[channel_message]
struct Price {
    fruit: String,
    cents: u32,
}

async fn node(network: &MemoryNetwork, name: &str) -> anyhow::Result<Bus> {
    ChannelApp::new()
        .with_config(ChannelConfig::default())
        .with_transport(network.transport(name))
        // a quote older than half a second is no use to anyone
        .with_timeout_policy(FixedTimeout::new(Duration::from_millis(500)))
        .launch()
        .await
}

#[channel_main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_tracing(&ChannelConfig::default());
    let network = MemoryNetwork::new();
    let market = node(&network, "market").await?;
    let warehouse = node(&network, "warehouse").await?;
    let shopper = node(&network, "shopper").await?;

    // two nodes can answer price queries; sends alternate between them
    for seller in [&market, &warehouse] {
        let name = seller.node_id().to_string();
        seller.subscribe("prices.query", move |message| {
            let name = name.clone();
            async move {
                let Ok(query) = message.payload_as::<PriceQuery>() else {
                    return message.fail(400, "unreadable query");
                };
                let cents = if name == "market" { 120 } else { 95 };
                println!("{name} quoting {}", query.fruit);
                message.reply(Price {
                    fruit: query.fruit,
                    cents,
                });
            }
        });
    }

    // local subscriptions never leave their node
    market.subscribe_local("prices.audit", |message| {
        println!("audit on market: {}", message.payload());
        Reply::ready()
    });

    while shopper.remote_nodes("prices.query").len() < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for fruit in ["apple", "pear", "plum", "fig"] {
        let reply = shopper
            .request(
                "prices.query",
                PriceQuery {
                    fruit: fruit.to_string(),
                },
            )
            .await?;
        let price: Price = reply.payload_as()?;
        println!("{} costs {} cents (from {})", price.fruit, price.cents, reply.origin());
    }

    match shopper.request("prices.audit", "anything").await {
        Err(e) => println!("shopper cannot reach the audit log: {e}"),
        Ok(_) => println!("audit log unexpectedly answered"),
    }

    println!("shopper stats: {:?}", shopper.stats());
    for bus in [shopper, warehouse, market] {
        bus.shutdown().await?;
    }
    Ok(())
}
