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

#![forbid(unsafe_code)]

//! Realtime Channel Macro Library
//!
//! Procedural macros for the `realtime-channel` event bus.
//!
//! # Message Macro
//!
//! [`channel_message`] prepares a type for use as a bus payload. Payloads
//! cross node boundaries as JSON, so the macro derives the serde traits along
//! with `Clone` and `Debug`:
//!
//! ```ignore
//! #[channel_message]
//! pub struct PriceTick {
//!     pub symbol: String,
//!     pub price: f64,
//! }
//!
//! bus.publish("prices", &PriceTick { symbol: "ACME".into(), price: 12.5 });
//! ```
//!
//! # Main Entry Point
//!
//! [`channel_main`] turns an `async fn main` into a synchronous one running on
//! a Tokio runtime:
//!
//! ```ignore
//! use realtime_channel::prelude::*;
//!
//! #[channel_main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = ChannelApp::launch_async().await;
//!     // ...
//!     bus.shutdown().await
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, DeriveInput, ItemFn};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.segments.last().is_some_and(|s| s.ident == trait_name) {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Derives the traits a type needs to travel as a bus payload.
///
/// Expands to:
/// - `#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]`, skipping
///   any trait the type already derives
/// - A compile-time assertion that the type is `Send + Sync + 'static`
///
/// The expansion refers to `::serde`, so the calling crate depends on `serde`
/// with the `derive` feature.
#[proc_macro_attribute]
pub fn channel_message(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if !has_derive(&input, "Serialize") {
            traits.push(quote!(::serde::Serialize));
        }
        if !has_derive(&input, "Deserialize") {
            traits.push(quote!(::serde::Deserialize));
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let assert_ident = quote::format_ident!("_AssertChannelMessage_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}

/// Entry point macro for bus applications.
///
/// Builds a Tokio runtime and blocks on the annotated `async fn main`.
///
/// - `flavor = "current_thread"` selects the single-threaded runtime
/// - `worker_threads = N` sizes the multi-threaded runtime
///
/// ```ignore
/// #[channel_main(worker_threads = 2)]
/// async fn main() { }
/// ```
#[proc_macro_attribute]
pub fn channel_main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            sig.fn_token,
            "the async keyword is missing from the function declaration",
        )
        .to_compile_error()
        .into();
    }

    if sig.ident != "main" {
        return syn::Error::new_spanned(
            &sig.ident,
            "channel_main can only be applied to the main function",
        )
        .to_compile_error()
        .into();
    }

    let attr_string = attr.to_string();
    let use_current_thread = attr_string.contains("current_thread");
    let worker_threads: Option<usize> = attr_string
        .split(',')
        .find(|s| s.contains("worker_threads"))
        .and_then(|s| s.split('=').nth(1).and_then(|v| v.trim().parse().ok()));

    let runtime_builder = if use_current_thread {
        quote! {
            ::realtime_channel::prelude::tokio::runtime::Builder::new_current_thread()
        }
    } else if let Some(threads) = worker_threads {
        quote! {
            ::realtime_channel::prelude::tokio::runtime::Builder::new_multi_thread()
                .worker_threads(#threads)
        }
    } else {
        quote! {
            ::realtime_channel::prelude::tokio::runtime::Builder::new_multi_thread()
        }
    };

    let fn_name = &sig.ident;
    let fn_inputs = &sig.inputs;
    let fn_output = &sig.output;

    let expanded = quote! {
        #(#attrs)*
        #vis fn #fn_name(#fn_inputs) #fn_output {
            #runtime_builder
                .enable_all()
                .build()
                .expect("Failed to build realtime-channel runtime")
                .block_on(async #body)
        }
    };

    TokenStream::from(expanded)
}
