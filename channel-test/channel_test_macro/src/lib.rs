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


//! Implementation of the `#[channel_test]` attribute.

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Runs an `async fn` test on a fresh multi-threaded Tokio runtime.
///
/// The test body executes inside a `channel_test` tracing span. A panic raised
/// on the test thread or on one of this test's runtime workers (for example
/// inside a handler task) is recorded through a panic hook and re-raised with
/// its source location once the body returns.
///
/// Tests that panic on purpose inside handlers opt out of the recording with
/// `#[channel_test(allow_panics)]`.
///
/// The annotated function must return a `Result`; an `Err` fails the test.
#[proc_macro_attribute]
pub fn channel_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let allow_panics = attr.to_string().split(',').any(|part| part.trim() == "allow_panics");
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let attrs = &input.attrs;
    let name = &sig.ident;
    let inputs = &sig.inputs;
    let output = &sig.output;

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(sig.fn_token, "#[channel_test] requires an async fn")
            .to_compile_error()
            .into();
    }

    let async_name = syn::Ident::new(&format!("__{name}_async"), name.span());
    let worker_name = format!("channel-test-{name}");

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() {
            use std::sync::atomic::{AtomicBool, Ordering};
            use std::sync::Arc;
            use std::panic;
            use ::channel_test::reexports::parking_lot::Mutex;

            #[derive(Clone, Default)]
            struct PanicRecord {
                occurred: Arc<AtomicBool>,
                message: Arc<Mutex<Option<String>>>,
                location: Arc<Mutex<Option<String>>>,
            }

            let record = PanicRecord::default();
            let hook_record = record.clone();
            let test_thread = std::thread::current().name().map(str::to_owned);

            let orig_hook = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                let current = std::thread::current();
                let ours = current.name() == Some(#worker_name)
                    || (test_thread.is_some() && current.name() == test_thread.as_deref());
                if ours && !#allow_panics {
                    hook_record.occurred.store(true, Ordering::SeqCst);
                    *hook_record.message.lock() = info
                        .payload()
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| info.payload().downcast_ref::<String>().cloned());
                    *hook_record.location.lock() = info
                        .location()
                        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
                }
                orig_hook(info);
            }));

            let runtime = ::channel_test::reexports::tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name(#worker_name)
                .build()
                .expect("failed to build test runtime");

            let result = runtime.block_on(async {
                let test_span = ::channel_test::reexports::tracing::info_span!(
                    "channel_test",
                    name = stringify!(#name)
                );
                let _enter = test_span.enter();
                #async_name().await
            });

            if record.occurred.load(Ordering::SeqCst) {
                let message = record.message.lock().clone();
                let location = record
                    .location
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "unknown location".to_string());
                let cleaned = message
                    .unwrap_or_else(|| "No error message".to_string())
                    .trim()
                    .replace('\n', " ");
                ::channel_test::reexports::tracing::error!("Panic: {}", cleaned);
                panic!("Panic at {}: {}", location, cleaned);
            }

            result.unwrap();
        }

        async fn #async_name(#inputs) #output #body
    };

    expanded.into()
}
