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

use core::future::Future;
use std::sync::Arc;

use debugpod_error::{Code, Error, ResultExt, make_err};
use debugpod_util::background_spawn;
use debugpod_util::signal::Termination;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::cluster::{AttachOptions, ClusterApi};
use crate::discovery;
use crate::exec::PodExec;
use crate::locator::{self, ResolvedContainer, TargetReference};
use crate::manifest::{HELPER_CONTAINER_NAME, HelperManifest, HelperParams, temporary_namespace};
use crate::nsenter::EntryCommand;
use crate::port_forward::{ForwardOptions, PortForwarder};
use crate::readiness::ReadinessWaiter;
use crate::runtime::{self, RuntimeDescriptor};
use crate::terminal::RawModeGuard;

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub target: TargetReference,
    pub image: String,
    pub stdin: bool,
    pub tty: bool,
    /// Existing namespace for the helper. A temporary one is created when unset.
    pub helper_namespace: Option<String>,
    /// Probe runtime sockets instead of trusting the container ID prefix.
    pub detect_runtime: bool,
    /// Runs instead of a shell when not empty.
    pub command: Vec<String>,
    pub forward: Option<ForwardOptions>,
}

/// Everything decided before the first object is created.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub container: ResolvedContainer,
    /// `None` when the runtime is detected from inside the helper.
    pub runtime: Option<RuntimeDescriptor>,
    pub temporary_namespace: Option<Namespace>,
    pub helper: HelperManifest,
}

/// Deletes the helper pod and its temporary namespace exactly once.
///
/// Names are tracked before the objects are created so that an interrupted
/// create is cleaned up too. A guard that is dropped without
/// [`HelperGuard::release`] schedules the cleanup on the current runtime.
#[must_use]
pub struct HelperGuard {
    cluster: Arc<dyn ClusterApi>,
    pod: Option<(String, String)>,
    namespace: Option<String>,
}

impl core::fmt::Debug for HelperGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HelperGuard")
            .field("pod", &self.pod)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl HelperGuard {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self {
            cluster,
            pod: None,
            namespace: None,
        }
    }

    pub fn track_pod(&mut self, namespace: &str, name: &str) {
        self.pod = Some((namespace.to_string(), name.to_string()));
    }

    pub fn track_namespace(&mut self, name: &str) {
        self.namespace = Some(name.to_string());
    }

    pub async fn release(mut self) {
        let pod = self.pod.take();
        let namespace = self.namespace.take();
        cleanup(self.cluster.as_ref(), pod, namespace).await;
    }
}

impl Drop for HelperGuard {
    fn drop(&mut self) {
        let pod = self.pod.take();
        let namespace = self.namespace.take();
        if pod.is_none() && namespace.is_none() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(?pod, ?namespace, "No runtime left to remove the helper pod");
            return;
        }
        let cluster = self.cluster.clone();
        background_spawn!("helper_guard_drop", async move {
            cleanup(cluster.as_ref(), pod, namespace).await;
        });
    }
}

async fn cleanup(cluster: &dyn ClusterApi, pod: Option<(String, String)>, namespace: Option<String>) {
    if let Some((pod_namespace, name)) = pod {
        info!(pod = %name, "Removing debug pod");
        match cluster.delete_pod(&pod_namespace, &name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(pod = %name, "Debug pod already gone"),
            Err(e) => warn!(?e, pod = %name, "Unable to delete the debug pod"),
        }
    }
    if let Some(name) = namespace {
        match cluster.delete_namespace(&name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(namespace = %name, "Temporary namespace already gone"),
            Err(e) => warn!(?e, namespace = %name, "Unable to delete the temporary namespace"),
        }
    }
}

/// One debugging session against one target container.
pub struct DebugSession {
    cluster: Arc<dyn ClusterApi>,
    options: SessionOptions,
    waiter: ReadinessWaiter,
    rng: StdRng,
}

impl core::fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DebugSession")
            .field("options", &self.options)
            .field("waiter", &self.waiter)
            .finish_non_exhaustive()
    }
}

impl DebugSession {
    pub fn new(cluster: Arc<dyn ClusterApi>, options: SessionOptions) -> Self {
        Self {
            cluster,
            options,
            waiter: ReadinessWaiter::default(),
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Seeds the generator of helper and namespace names.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    #[must_use]
    pub const fn with_waiter(mut self, waiter: ReadinessWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    /// Resolves the target and builds the helper manifests. No cluster
    /// object is touched.
    pub fn plan_for_pod(&mut self, pod: &Pod) -> Result<SessionPlan, Error> {
        let target = &self.options.target;
        let container = locator::locate(pod, target)?;
        let runtime = if self.options.detect_runtime {
            None
        } else {
            Some(runtime::identify(&container.container_id)?)
        };

        let temp_namespace = match self.options.helper_namespace {
            Some(_) => None,
            None => Some(temporary_namespace(&mut self.rng)),
        };
        let namespace = self
            .options
            .helper_namespace
            .clone()
            .or_else(|| {
                temp_namespace
                    .as_ref()
                    .and_then(|ns| ns.metadata.name.clone())
            })
            .err_tip_with_code(|_| (Code::Internal, "Helper namespace has no name"))?;

        let helper = HelperManifest::build(
            &HelperParams {
                node: container.node_name.clone(),
                base_name: target.pod.clone(),
                namespace,
                image: self.options.image.clone(),
                stdin: self.options.stdin,
                tty: self.options.tty,
            },
            &mut self.rng,
        );
        Ok(SessionPlan {
            container,
            runtime,
            temporary_namespace: temp_namespace,
            helper,
        })
    }

    pub async fn plan(&mut self) -> Result<SessionPlan, Error> {
        let target = &self.options.target;
        let pod = self
            .cluster
            .get_pod(&target.namespace, &target.pod)
            .await
            .err_tip(|| format!("Failed to find pod {} in namespace {}", target.pod, target.namespace))?;
        self.plan_for_pod(&pod)
    }

    /// Runs the session to completion and returns the exit code of the
    /// remote command.
    ///
    /// `interrupt` races the whole session. Whichever finishes first, the
    /// helper pod is deleted once before this returns.
    pub async fn run<F>(mut self, interrupt: F) -> Result<i32, Error>
    where
        F: Future<Output = Termination>,
    {
        let plan = self.plan().await?;
        let mut guard = HelperGuard::new(self.cluster.clone());
        let outcome = tokio::select! {
            result = self.execute(&plan, &mut guard) => result,
            signal = interrupt => Err(make_err!(
                Code::Aborted,
                "Interrupted by {signal}"
            )),
        };
        guard.release().await;
        outcome
    }

    async fn execute(&self, plan: &SessionPlan, guard: &mut HelperGuard) -> Result<i32, Error> {
        let helper = &plan.helper;
        if let Some(namespace) = &plan.temporary_namespace {
            let name = namespace.metadata.name.as_deref().unwrap_or_default();
            guard.track_namespace(name);
            self.cluster.create_namespace(namespace).await?;
            debug!(namespace = %name, "Created temporary namespace");
        }

        guard.track_pod(&helper.namespace, &helper.name);
        info!(
            node = %plan.container.node_name,
            image = %self.options.image,
            pod = %helper.name,
            "Starting debug pod"
        );
        let created = self.cluster.create_pod(&helper.namespace, &helper.pod).await?;

        let mut subscription = self
            .cluster
            .watch_pod(&helper.namespace, &helper.name)
            .await
            .err_tip(|| format!("Failed to watch pod {}", helper.name))?;
        self.waiter
            .wait(subscription.as_mut(), created)
            .await?
            .ensure_running()?;

        let exec = PodExec::new(
            self.cluster.clone(),
            &helper.namespace,
            &helper.name,
            HELPER_CONTAINER_NAME,
        );
        let descriptor = match &plan.runtime {
            Some(descriptor) => descriptor.clone(),
            None => {
                let id = runtime::strip_runtime_prefix(&plan.container.container_id);
                runtime::detect(&exec, id).await?
            }
        };
        let pid_root = discovery::discover(&exec, &descriptor)
            .await
            .err_tip(|| format!("While locating container {}", plan.container.name))?;
        info!(
            "Filesystem of the target container is accessible at {}",
            pid_root.root
        );

        let _forwarder = match &self.options.forward {
            Some(forward) => Some(
                PortForwarder::start(
                    self.cluster.clone(),
                    &self.options.target.namespace,
                    &self.options.target.pod,
                    forward,
                )
                .await?,
            ),
            None => None,
        };

        let entry = EntryCommand::new(pid_root, self.options.command.clone());
        let _raw_mode = RawModeGuard::enter(self.options.tty)?;
        self.cluster
            .attach(
                &helper.namespace,
                &helper.name,
                HELPER_CONTAINER_NAME,
                entry.argv(),
                AttachOptions {
                    stdin: self.options.stdin,
                    tty: self.options.tty,
                },
            )
            .await
    }
}
