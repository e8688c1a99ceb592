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

use debugpod_error::{Code, Error, ResultExt, make_err, make_input_err};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};

/// The container an operator asked to debug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReference {
    pub pod: String,
    pub namespace: String,
    /// Container name; `None` selects the only candidate.
    pub container: Option<String>,
    /// Restrict the selection to init containers.
    pub init_container: bool,
}

/// The single container a session operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContainer {
    pub name: String,
    pub is_init: bool,
    /// Runtime-qualified ID as reported by the kubelet, eg:
    /// `containerd://0f3c...`.
    pub container_id: String,
    pub node_name: String,
}

fn container_names(pod: &Pod) -> (Vec<String>, Vec<String>) {
    let Some(spec) = pod.spec.as_ref() else {
        return (Vec::new(), Vec::new());
    };
    let regular = spec.containers.iter().map(|c| c.name.clone()).collect();
    let init = spec
        .init_containers
        .iter()
        .flatten()
        .map(|c| c.name.clone())
        .collect();
    (regular, init)
}

fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

/// Picks the container to debug from the pod spec.
///
/// Returns the container name and whether it is an init container. A name
/// that only matches an init container is accepted even when
/// `want_init` is false.
pub fn resolve_container(
    pod: &Pod,
    requested: Option<&str>,
    want_init: bool,
) -> Result<(String, bool), Error> {
    let (containers, init_containers) = container_names(pod);
    let pod = pod_name(pod);
    let requested = requested.filter(|name| !name.is_empty());

    if want_init {
        return match requested {
            None if init_containers.len() == 1 => Ok((init_containers[0].clone(), true)),
            None => Err(make_input_err!(
                "an init container name must be specified for pod {pod}, choose one of: {init_containers:?}"
            )),
            Some(name) if init_containers.iter().any(|c| c == name) => Ok((name.to_string(), true)),
            Some(name) => Err(make_err!(
                Code::NotFound,
                "init container {name} not found in pod {pod}, choose one of: {init_containers:?}"
            )),
        };
    }

    match requested {
        None if containers.len() == 1 => Ok((containers[0].clone(), false)),
        None => Err(make_input_err!(
            "a container name must be specified for pod {pod}, choose one of: {containers:?} or one of the init containers: {init_containers:?}"
        )),
        Some(name) if containers.iter().any(|c| c == name) => Ok((name.to_string(), false)),
        Some(name) if init_containers.iter().any(|c| c == name) => Ok((name.to_string(), true)),
        Some(name) => Err(make_err!(
            Code::NotFound,
            "container {name} not found in pod {pod}, choose one of: {containers:?} or one of the init containers: {init_containers:?}"
        )),
    }
}

/// Looks up the runtime-qualified container ID in the pod status.
pub fn find_container_id(pod: &Pod, name: &str, is_init: bool) -> Result<String, Error> {
    let statuses: &[ContainerStatus] = pod
        .status
        .as_ref()
        .and_then(|status| {
            if is_init {
                status.init_container_statuses.as_deref()
            } else {
                status.container_statuses.as_deref()
            }
        })
        .unwrap_or_default();

    statuses
        .iter()
        .find(|status| status.name == name)
        .and_then(|status| status.container_id.clone())
        .filter(|id| !id.is_empty())
        .err_tip_with_code(|_| {
            (
                Code::FailedPrecondition,
                format!("cannot find containerID for container {name} (initContainer={is_init})"),
            )
        })
}

/// Resolves `target` against the live pod state.
pub fn locate(pod: &Pod, target: &TargetReference) -> Result<ResolvedContainer, Error> {
    let (name, is_init) =
        resolve_container(pod, target.container.as_deref(), target.init_container)?;
    let container_id = find_container_id(pod, &name, is_init)?;
    let node_name = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.node_name.clone())
        .filter(|node| !node.is_empty())
        .err_tip_with_code(|_| {
            (
                Code::FailedPrecondition,
                format!("pod {} is not scheduled to a node yet", target.pod),
            )
        })?;
    Ok(ResolvedContainer {
        name,
        is_init,
        container_id,
        node_name,
    })
}
