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


//! Test support for `realtime-channel`.
//!
//! ```rust,ignore
//! use channel_test::prelude::*;
//!
//! #[channel_test]
//! async fn delivers() -> anyhow::Result<()> {
//!     let bus = ChannelApp::launch_async().await;
//!     // ...
//!     bus.shutdown().await
//! }
//! ```

/// Items a test module usually wants in scope.
pub mod prelude {
    pub use channel_test_macro::channel_test;
}

/// Crates referenced by code generated from `#[channel_test]`.
#[doc(hidden)]
pub mod reexports {
    pub use parking_lot;
    pub use tokio;
    pub use tracing;
}
