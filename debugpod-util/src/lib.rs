// Copyright 2025 The Debugpod Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod signal;
pub mod task;

use std::io;

// Re-export tracing mostly for use in macros.
pub use tracing as __tracing;

/// Environment variable selecting the log format: `compact`, `pretty` or `json`.
pub const LOG_FORMAT_ENV: &str = "DEBUGPOD_LOG";

/// Transport crates whose events would drown out the session's own logs.
const QUIET_TARGETS: [&str; 3] = ["hyper=off", "tower=off", "rustls=off"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    /// Unrecognized values fall back to [`LogFormat::Compact`].
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("pretty") => Self::Pretty,
            Some("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Initialize tracing.
///
/// Events go to stderr; stdout carries the remote session.
pub fn init_tracing() -> Result<(), debugpod_error::Error> {
    static LOGGING_INITIALIZED: std::sync::Mutex<bool> = std::sync::Mutex::new(false);
    let mut logging_initialized_guard = LOGGING_INITIALIZED.lock().map_err(|_| {
        debugpod_error::make_err!(debugpod_error::Code::Internal, "Logging lock poisoned")
    })?;
    if *logging_initialized_guard {
        return Err(debugpod_error::make_err!(
            debugpod_error::Code::Internal,
            "Logging already initialized"
        ));
    }
    *logging_initialized_guard = true;

    let mut env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::metadata::LevelFilter::INFO.into())
        .from_env_lossy();
    for directive in QUIET_TARGETS {
        env_filter = env_filter.add_directive(directive.parse().map_err(|e| {
            debugpod_error::make_err!(
                debugpod_error::Code::Internal,
                "Invalid log directive {directive}: {e}"
            )
        })?);
    }

    let format = LogFormat::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref());
    let builder = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(env_filter);
    let result = match format {
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| {
        debugpod_error::make_err!(
            debugpod_error::Code::Internal,
            "Could not install tracing subscriber: {e}"
        )
    })
}
