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


use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::common::ChannelConfig;

/// Installs a global `tracing` subscriber configured from `config`.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `tracing.level`. With `behavior.log_to_file` the output goes through a
/// non-blocking writer to `tracing.log_file_name` inside
/// `paths.log_directory`, and the returned guard must be kept alive for the
/// writer to flush.
///
/// Returns `None` when tracing is disabled, when logging to stdout, or when
/// a global subscriber is already installed.
pub fn init_tracing(config: &ChannelConfig) -> Option<WorkerGuard> {
    if !config.behavior.enable_tracing {
        return None;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.tracing.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NONE)
        .with_thread_names(true)
        .compact();

    if config.behavior.log_to_file {
        let directory = config.log_directory();
        if let Err(e) = std::fs::create_dir_all(&directory) {
            eprintln!("could not create log directory {}: {e}", directory.display());
            return None;
        }
        let appender =
            RollingFileAppender::new(Rotation::NEVER, directory, &config.tracing.log_file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        builder
            .with_ansi(false)
            .with_writer(writer)
            .try_init()
            .ok()
            .map(|()| guard)
    } else {
        let _ = builder.try_init();
        None
    }
}
