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


//! Message, registration and error types, plus the cluster wire envelope.

pub use bus_error::{BusError, TransportError};
pub use envelope::{DeliveryKind, Envelope};
pub use message::Message;
pub use registration::{Registration, Scope};
pub use topic::validate_topic;
pub(crate) use topic::topic_matches;

pub(crate) use registration::LocalRegistration;
pub(crate) use topic::reply_topic;

mod bus_error;
mod envelope;
#[allow(clippy::module_inception)]
mod message;
mod registration;
mod topic;
