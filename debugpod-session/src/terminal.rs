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

use std::io::IsTerminal;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use debugpod_error::{Error, ResultExt};
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use kube::api::TerminalSize;
use tracing::{debug, warn};

/// Columns and rows of the local terminal, if there is one.
pub fn size() -> Option<(u16, u16)> {
    crossterm::terminal::size().ok()
}

/// Fires whenever the local terminal is resized (`SIGWINCH`).
#[cfg(target_family = "unix")]
pub fn window_changes() -> BoxStream<'static, ()> {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::window_change()) {
        Ok(listener) => futures::stream::unfold(listener, |mut listener| async move {
            listener.recv().await.map(|()| ((), listener))
        })
        .boxed(),
        Err(e) => {
            warn!(?e, "Terminal resizes will not be forwarded");
            futures::stream::pending().boxed()
        }
    }
}

#[cfg(not(target_family = "unix"))]
pub fn window_changes() -> BoxStream<'static, ()> {
    futures::stream::pending().boxed()
}

/// Sends the current size to `sink`, then again after every item of
/// `resizes`. Returns once `resizes` ends or the remote side stops
/// accepting sizes.
pub async fn forward_resizes<R, S>(
    mut resizes: R,
    size_fn: fn() -> Option<(u16, u16)>,
    mut sink: S,
) where
    R: Stream<Item = ()> + Unpin,
    S: Sink<TerminalSize> + Unpin,
{
    loop {
        if let Some((width, height)) = size_fn() {
            if sink.send(TerminalSize { width, height }).await.is_err() {
                debug!("Remote terminal closed, no longer forwarding resizes");
                return;
            }
        }
        if resizes.next().await.is_none() {
            return;
        }
    }
}

/// Puts the local terminal in raw mode for the lifetime of the guard so that
/// keystrokes such as Ctrl-C reach the remote shell.
#[derive(Debug)]
#[must_use]
pub struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    /// Raw mode is only entered for TTY sessions whose stdin is a terminal.
    pub fn enter(tty: bool) -> Result<Self, Error> {
        if !tty || !std::io::stdin().is_terminal() {
            return Ok(Self { enabled: false });
        }
        enable_raw_mode().err_tip(|| "Failed to put the terminal in raw mode")?;
        Ok(Self { enabled: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            if let Err(e) = disable_raw_mode() {
                warn!(?e, "Failed to restore the terminal");
            }
        }
    }
}
