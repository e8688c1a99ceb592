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

use core::time::Duration;

use debugpod_error::{Code, Error, make_err};
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info, warn};

use crate::cluster::{PodEvent, PodSubscription};

/// How long the helper may stay pending, eg: while its image is pulled.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(15 * 60);

pub type SleepFn = fn(Duration) -> BoxFuture<'static, ()>;

pub fn tokio_sleep(duration: Duration) -> BoxFuture<'static, ()> {
    Box::pin(tokio::time::sleep(duration))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Pending,
    Running,
    /// The pod terminated or was deleted. With `restartPolicy: Never` it
    /// will not come back.
    Failed,
    TimedOut,
}

/// Outcome of a wait, with the last pod snapshot observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Readiness {
    pub state: ReadinessState,
    pub pod: Pod,
}

fn phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.phase.as_deref()
}

fn name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

impl Readiness {
    /// The running pod, or an error describing why it is not running.
    pub fn ensure_running(self) -> Result<Pod, Error> {
        let name = name(&self.pod);
        let phase = phase(&self.pod).unwrap_or("Unknown");
        match self.state {
            ReadinessState::Running => Ok(self.pod),
            ReadinessState::TimedOut => Err(make_err!(
                Code::DeadlineExceeded,
                "pod {name} failed to reach state running (last phase {phase})"
            )),
            ReadinessState::Failed | ReadinessState::Pending => Err(make_err!(
                Code::FailedPrecondition,
                "pod {name} failed to reach state running (last phase {phase})"
            )),
        }
    }
}

/// Follows a helper pod from creation until it runs.
#[derive(Clone, Copy)]
pub struct ReadinessWaiter {
    timeout: Duration,
    sleep_fn: SleepFn,
}

impl core::fmt::Debug for ReadinessWaiter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadinessWaiter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for ReadinessWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_READY_TIMEOUT, tokio_sleep)
    }
}

impl ReadinessWaiter {
    pub const fn new(timeout: Duration, sleep_fn: SleepFn) -> Self {
        Self { timeout, sleep_fn }
    }

    /// Consumes events until the pod runs, terminates or the timeout fires.
    /// The subscription is stopped before returning on every path.
    pub async fn wait(
        &self,
        subscription: &mut dyn PodSubscription,
        initial: Pod,
    ) -> Result<Readiness, Error> {
        let mut last = initial;
        let mut sleep_fut = (self.sleep_fn)(self.timeout);
        let result = loop {
            tokio::select! {
                () = &mut sleep_fut => {
                    warn!(pod = %name(&last), timeout = ?self.timeout, "Helper pod did not start in time");
                    break Ok(ReadinessState::TimedOut);
                }
                event = subscription.next_event() => match event {
                    None => {
                        break Err(make_err!(
                            Code::Internal,
                            "Watch on pod {} ended before it was running",
                            name(&last)
                        ));
                    }
                    Some(Err(e)) => {
                        break Err(e.append(format!("While waiting for pod {} to run", name(&last))));
                    }
                    Some(Ok(PodEvent::Deleted(pod))) => {
                        last = pod;
                        break Ok(ReadinessState::Failed);
                    }
                    Some(Ok(PodEvent::Added(pod) | PodEvent::Modified(pod))) => {
                        last = pod;
                        match phase(&last) {
                            Some("Running") => break Ok(ReadinessState::Running),
                            Some("Failed" | "Succeeded") => break Ok(ReadinessState::Failed),
                            phase => debug!(pod = %name(&last), ?phase, "Helper pod not running yet"),
                        }
                    }
                },
            }
        };
        subscription.stop();

        let state = result?;
        if state == ReadinessState::Running {
            info!(pod = %name(&last), "Helper pod is running");
        }
        Ok(Readiness { state, pod: last })
    }
}
