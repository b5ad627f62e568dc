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


use realtime_channel::prelude::*;

// payloads must be serializable, cloneable and thread-safe
#[channel_message]
struct Ping {
    count: u32,
}

// the same macro works for enums and tuple structs
#[channel_message]
enum Pong {
    Again(u32),
    Done,
}

#[channel_main]
async fn main() -> anyhow::Result<()> {
    let bus = ChannelApp::launch_async().await;

    // every handler returns a future; async blocks are the easiest way
    bus.subscribe("ping", |message| async move {
        let ping: Ping = match message.payload_as() {
            Ok(ping) => ping,
            // positive codes are yours to define
            Err(e) => return message.fail(1, e.to_string()),
        };
        println!("ping #{}", ping.count);
        if ping.count < 3 {
            message.reply(Pong::Again(ping.count));
        } else {
            message.reply(Pong::Done);
        }
    });

    // everyone subscribed to a topic gets a publish
    bus.subscribe("greetings", |message| {
        if message.payload().is_null() {
            // no async work to do? return a finished future
            return Reply::ready();
        }
        // branches returning different futures need the boxed form
        Reply::pending(async move {
            println!("greeting: {}", message.payload());
        })
    });
    bus.publish("greetings", "hello, bus");

    let mut count = 1;
    loop {
        let reply = bus.request("ping", Ping { count }).await?;
        match reply.payload_as::<Pong>()? {
            Pong::Again(n) => count = n + 1,
            Pong::Done => break,
        }
    }
    println!("pong says we're done after {count} pings");

    // nobody listens here, so the reply handler gets NoHandlers
    bus.send_with_reply("nobody.home", Ping { count: 0 }, |result| async move {
        if let Err(e) = result {
            println!("as expected: {e} (code {})", e.code());
        }
    });

    bus.shutdown().await
}
