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

/// A typed order payload.
#[channel_message]
#[derive(PartialEq)]
pub struct Order {
    pub id: u32,
    pub item: String,
}

/// A numbered step in a conversation.
#[channel_message]
#[derive(PartialEq)]
pub struct Step {
    pub n: u32,
}

/// A sequence number used by ordering tests.
#[channel_message]
#[derive(PartialEq, Eq, PartialOrd, Ord)]
pub struct Seq(pub u32);
