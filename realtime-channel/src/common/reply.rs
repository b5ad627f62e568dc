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


//! Convenient helpers for creating handler return types.
//!
//! Subscription handlers return any `Send` future; for closures that finish
//! synchronously, or that need to name the future type, [`Reply`] builds the
//! boxed form:
//!
//! ```ignore
//! bus.subscribe("audit", |message| {
//!     tracing::info!(topic = message.topic(), "seen");
//!     Reply::ready()
//! });
//!
//! bus.subscribe("lookup", move |message| {
//!     let store = store.clone();
//!     Reply::pending(async move {
//!         let row = store.fetch(message.payload()).await;
//!         message.reply(row);
//!     })
//! });
//! ```

use std::future::Future;

use crate::common::FutureBox;

/// A utility namespace for creating handler return types.
pub struct Reply;

impl Reply {
    /// Returns a future that completes immediately.
    #[must_use]
    pub fn ready() -> FutureBox {
        Box::pin(async {})
    }

    /// Boxes an async block so it can be returned from a handler.
    pub fn pending<F>(future: F) -> FutureBox
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Box::pin(future)
    }
}
