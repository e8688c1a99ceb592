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

use core::fmt;

#[cfg(target_family = "unix")]
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

/// Termination request delivered to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupt,
    Terminate,
    Hangup,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
        })
    }
}

/// Resolves on the first SIGINT, SIGTERM or SIGHUP.
///
/// A handler that cannot be registered is logged and never fires; if none can
/// be registered the future stays pending.
#[cfg(target_family = "unix")]
pub async fn wait_for_termination() -> Termination {
    let mut interrupt = register(SignalKind::interrupt(), Termination::Interrupt);
    let mut terminate = register(SignalKind::terminate(), Termination::Terminate);
    let mut hangup = register(SignalKind::hangup(), Termination::Hangup);

    let received = tokio::select! {
        Some(()) = recv(interrupt.as_mut()) => Termination::Interrupt,
        Some(()) = recv(terminate.as_mut()) => Termination::Terminate,
        Some(()) = recv(hangup.as_mut()) => Termination::Hangup,
        else => futures::future::pending().await,
    };
    info!(signal = %received, "Received termination signal");
    received
}

#[cfg(not(target_family = "unix"))]
pub async fn wait_for_termination() -> Termination {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "Failed to listen for Ctrl-C");
        futures::future::pending::<()>().await;
    }
    info!(signal = %Termination::Interrupt, "Received termination signal");
    Termination::Interrupt
}

#[cfg(target_family = "unix")]
fn register(kind: SignalKind, which: Termination) -> Option<tokio::signal::unix::Signal> {
    match signal(kind) {
        Ok(listener) => Some(listener),
        Err(e) => {
            warn!(signal = %which, ?e, "Failed to register signal handler");
            None
        }
    }
}

#[cfg(target_family = "unix")]
async fn recv(listener: Option<&mut tokio::signal::unix::Signal>) -> Option<()> {
    match listener {
        Some(listener) => listener.recv().await,
        None => futures::future::pending().await,
    }
}
