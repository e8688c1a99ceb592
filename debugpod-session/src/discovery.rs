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

use async_trait::async_trait;
use debugpod_error::{Code, Error, ResultExt, make_err};
use tracing::{debug, info};

use crate::exec::HelperExec;
use crate::manifest::HOST_MOUNT_PATH;
use crate::runtime::{Provider, RuntimeDescriptor};
use crate::scan::{FieldScanner, IndentScanner};

/// Where containerd keeps the root filesystem of a running task.
const CONTAINERD_ROOTFS_TEMPLATE: &str = "/run/containerd/io.containerd.runtime.v2.task/k8s.io";

/// State directory `runc` is run with under CRI-O.
const RUNC_STATE_ROOT: &str = "/run/runc";

/// The target process and its filesystem, as seen from the helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidRoot {
    pub pid: u32,
    /// Absolute path inside the helper, under [`HOST_MOUNT_PATH`].
    pub root: String,
}

/// Runtime CLI invocations made from inside the helper. Every tool runs
/// chrooted into the node's root filesystem, so it uses the node's own
/// binaries and sockets.
pub struct RuntimeQueries<'a> {
    exec: &'a dyn HelperExec,
    scanner: &'a dyn FieldScanner,
    descriptor: &'a RuntimeDescriptor,
}

impl core::fmt::Debug for RuntimeQueries<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RuntimeQueries")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

fn host_command<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ["chroot".to_string(), HOST_MOUNT_PATH.to_string()]
        .into_iter()
        .chain(args.into_iter().map(Into::into))
        .collect()
}

impl<'a> RuntimeQueries<'a> {
    pub const fn new(
        exec: &'a dyn HelperExec,
        scanner: &'a dyn FieldScanner,
        descriptor: &'a RuntimeDescriptor,
    ) -> Self {
        Self {
            exec,
            scanner,
            descriptor,
        }
    }

    pub const fn descriptor(&self) -> &RuntimeDescriptor {
        self.descriptor
    }

    pub const fn scanner(&self) -> &dyn FieldScanner {
        self.scanner
    }

    fn crictl(&self, args: &[&str]) -> Vec<String> {
        let endpoint = self.descriptor.endpoint();
        host_command(
            ["crictl", "--runtime-endpoint", endpoint.as_str()]
                .into_iter()
                .chain(args.iter().copied()),
        )
    }

    /// Fails unless the runtime answers on its socket.
    pub async fn verify_socket(&self) -> Result<(), Error> {
        let output = self.exec.run(self.crictl(&["info"])).await?;
        if !output.success() {
            return Err(make_err!(
                Code::FailedPrecondition,
                "container runtime socket {} is not reachable: {}",
                self.descriptor.socket_path,
                output.stderr.trim()
            ));
        }
        Ok(())
    }

    /// PID from `crictl inspect`, if the runtime reports one.
    pub async fn inspect_pid(&self) -> Result<Option<u32>, Error> {
        let id = self.descriptor.id.as_str();
        let output = self
            .exec
            .run(self.crictl(&["inspect", "--output", "yaml", id]))
            .await?;
        if !output.success() {
            debug!(%id, stderr = %output.stderr.trim(), "crictl inspect failed");
            return Ok(None);
        }
        Ok(self
            .scanner
            .field(&output.stdout, "pid")
            .and_then(|pid| pid.parse::<u32>().ok())
            .filter(|pid| *pid != 0))
    }

    /// Runs `docker inspect --format <format>` on the container.
    pub async fn docker_inspect(&self, format: &str) -> Result<Option<String>, Error> {
        let id = self.descriptor.id.as_str();
        let output = self
            .exec
            .run(host_command(["docker", "inspect", "--format", format, id]))
            .await?;
        if !output.success() {
            debug!(%id, stderr = %output.stderr.trim(), "docker inspect failed");
            return Ok(None);
        }
        let value = output.stdout.trim();
        Ok((!value.is_empty() && value != "<no value>").then(|| value.to_string()))
    }

    /// PID from `docker inspect`, for IDs that belong to the docker engine.
    pub async fn docker_pid(&self) -> Result<Option<u32>, Error> {
        Ok(self
            .docker_inspect("{{.State.Pid}}")
            .await?
            .and_then(|pid| pid.parse::<u32>().ok())
            .filter(|pid| *pid != 0))
    }

    /// `runc state` of the container.
    pub async fn runc_state(&self) -> Result<String, Error> {
        let id = self.descriptor.id.as_str();
        let output = self
            .exec
            .run(host_command(["runc", "--root", RUNC_STATE_ROOT, "state", id]))
            .await?;
        if !output.success() {
            return Err(make_err!(
                Code::FailedPrecondition,
                "runc state failed for container {id}: {}",
                output.stderr.trim()
            ));
        }
        Ok(output.stdout)
    }

    /// Whether `path` on the node is a directory.
    pub async fn host_dir_exists(&self, path: &str) -> Result<bool, Error> {
        let output = self
            .exec
            .run(vec![
                "test".to_string(),
                "-d".to_string(),
                format!("{HOST_MOUNT_PATH}{path}"),
            ])
            .await?;
        Ok(output.success())
    }
}

/// Per-runtime lookup of the target process and root filesystem.
#[async_trait]
pub trait ContainerDiscovery: Send + Sync {
    /// Asks the CRI first and falls back to the docker engine, which knows
    /// containers by their engine-native ID.
    async fn locate_pid(&self, queries: &RuntimeQueries<'_>) -> Result<u32, Error> {
        if let Some(pid) = queries.inspect_pid().await? {
            return Ok(pid);
        }
        let id = &queries.descriptor().id;
        info!(%id, "No PID in CRI inspection output, asking docker");
        queries
            .docker_pid()
            .await?
            .err_tip_with_code(|_| (Code::NotFound, format!("failed to find the PID of container {id}")))
    }

    /// Root filesystem path on the node.
    async fn locate_root(&self, queries: &RuntimeQueries<'_>) -> Result<Option<String>, Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DockerDiscovery;

#[async_trait]
impl ContainerDiscovery for DockerDiscovery {
    async fn locate_root(&self, queries: &RuntimeQueries<'_>) -> Result<Option<String>, Error> {
        queries.docker_inspect("{{.GraphDriver.Data.MergedDir}}").await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerdDiscovery;

#[async_trait]
impl ContainerDiscovery for ContainerdDiscovery {
    async fn locate_root(&self, queries: &RuntimeQueries<'_>) -> Result<Option<String>, Error> {
        Ok(Some(format!(
            "{CONTAINERD_ROOTFS_TEMPLATE}/{}/rootfs",
            queries.descriptor().id
        )))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CriODiscovery;

#[async_trait]
impl ContainerDiscovery for CriODiscovery {
    async fn locate_root(&self, queries: &RuntimeQueries<'_>) -> Result<Option<String>, Error> {
        let state = queries.runc_state().await?;
        Ok(queries.scanner().field(&state, "rootfs"))
    }
}

/// The discovery strategy of each provider.
pub fn discovery_for(provider: Provider) -> &'static dyn ContainerDiscovery {
    match provider {
        Provider::Docker => &DockerDiscovery,
        Provider::Containerd => &ContainerdDiscovery,
        Provider::CriO => &CriODiscovery,
    }
}

/// Finds the PID and root filesystem of the container in `descriptor`.
pub async fn discover(
    exec: &dyn HelperExec,
    descriptor: &RuntimeDescriptor,
) -> Result<PidRoot, Error> {
    let scanner = IndentScanner;
    discover_with(exec, &scanner, descriptor).await
}

pub async fn discover_with(
    exec: &dyn HelperExec,
    scanner: &dyn FieldScanner,
    descriptor: &RuntimeDescriptor,
) -> Result<PidRoot, Error> {
    let queries = RuntimeQueries::new(exec, scanner, descriptor);
    queries.verify_socket().await?;

    let discovery = discovery_for(descriptor.provider);
    let pid = discovery.locate_pid(&queries).await?;

    let root_error = || {
        make_err!(
            Code::NotFound,
            "failed to obtain the root directory of container {}",
            descriptor.id
        )
    };
    let root = discovery
        .locate_root(&queries)
        .await?
        .filter(|root| root.starts_with('/'))
        .ok_or_else(root_error)?;
    if !queries.host_dir_exists(&root).await? {
        return Err(root_error().append(format!("{root} does not exist on the node")));
    }

    info!(provider = %descriptor.provider, pid, %root, "Located target container");
    Ok(PidRoot {
        pid,
        root: format!("{HOST_MOUNT_PATH}{root}"),
    })
}
