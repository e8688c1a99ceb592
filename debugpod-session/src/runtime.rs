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

use debugpod_error::{Code, Error, make_err, make_input_err};
use tracing::{debug, info};

use crate::exec::HelperExec;
use crate::manifest::HOST_MOUNT_PATH;

/// Separator between the provider and the opaque ID in a kubelet container ID.
pub const CONTAINER_ID_SEPARATOR: &str = "://";

/// Container runtimes the helper knows how to introspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Docker behind dockershim or cri-dockerd.
    Docker,
    Containerd,
    CriO,
}

impl Provider {
    /// Every provider, in socket probing order.
    pub const ALL: [Self; 3] = [Self::Docker, Self::Containerd, Self::CriO];

    /// Provider key as it appears in `<provider>://<id>`.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Containerd => "containerd",
            Self::CriO => "cri-o",
        }
    }

    /// Host path of the CRI socket.
    pub const fn socket_path(self) -> &'static str {
        match self {
            Self::Docker => "/var/run/dockershim.sock",
            Self::Containerd => "/var/run/containerd/containerd.sock",
            Self::CriO => "/var/run/crio/crio.sock",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|provider| provider.key() == key)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How to reach one container through its runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDescriptor {
    pub provider: Provider,
    /// Runtime-native container ID.
    pub id: String,
    /// Host path of the runtime socket.
    pub socket_path: String,
}

impl RuntimeDescriptor {
    pub fn new(provider: Provider, id: impl Into<String>) -> Self {
        Self {
            provider,
            id: id.into(),
            socket_path: provider.socket_path().to_string(),
        }
    }

    /// Endpoint in the form `crictl --runtime-endpoint` expects.
    pub fn endpoint(&self) -> String {
        format!("unix://{}", self.socket_path)
    }
}

/// Parses a kubelet container ID such as `containerd://abc123`.
pub fn identify(container_id: &str) -> Result<RuntimeDescriptor, Error> {
    let Some((provider, id)) = container_id.split_once(CONTAINER_ID_SEPARATOR) else {
        return Err(make_input_err!("failed to parse containerID {container_id}"));
    };
    let provider = Provider::from_key(provider).ok_or_else(|| {
        make_err!(
            Code::Unimplemented,
            "unsupported container runtime: {provider} (containerID {container_id})"
        )
    })?;
    Ok(RuntimeDescriptor::new(provider, id))
}

/// Drops the `<provider>://` prefix if there is one.
pub fn strip_runtime_prefix(container_id: &str) -> &str {
    container_id
        .split_once(CONTAINER_ID_SEPARATOR)
        .map_or(container_id, |(_, id)| id)
}

/// Finds the runtime by probing the known sockets under the host mount of
/// the helper. The first socket present wins.
pub async fn detect(exec: &dyn HelperExec, opaque_id: &str) -> Result<RuntimeDescriptor, Error> {
    let mut probed = Vec::with_capacity(Provider::ALL.len());
    for provider in Provider::ALL {
        let path = format!("{HOST_MOUNT_PATH}{}", provider.socket_path());
        let output = exec
            .run(vec!["test".to_string(), "-S".to_string(), path.clone()])
            .await?;
        if output.success() {
            info!(%provider, socket = %path, "Detected container runtime");
            return Ok(RuntimeDescriptor::new(provider, opaque_id));
        }
        debug!(%provider, socket = %path, "Runtime socket not present");
        probed.push(path);
    }
    Err(make_err!(
        Code::FailedPrecondition,
        "could not detect the container runtime, none of these sockets exist: {probed:?}"
    ))
}
