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

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, Namespace, Pod, PodSpec, SecurityContext, Toleration,
    Volume, VolumeMount,
};
use kube::api::ObjectMeta;
use rand::Rng;

/// Mount point of the node's root filesystem inside the helper.
pub const HOST_MOUNT_PATH: &str = "/host";

/// Name of the single container of the helper pod.
pub const HELPER_CONTAINER_NAME: &str = "debug";

/// Keeps the helper alive until it is deleted. The session itself runs
/// through exec.
pub const HELPER_IDLE_COMMAND: [&str; 3] =
    ["/bin/sh", "-c", "trap : TERM INT; sleep infinity & wait"];

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "kubectl-debugpod";

const HELPER_NAME_INFIX: &str = "-debug-";
const TEMPORARY_NAMESPACE_PREFIX: &str = "kubectl-debugpod-";
const RANDOM_SUFFIX_LEN: usize = 5;
const MAX_NAME_LEN: usize = 63;

/// Characters Kubernetes uses for generated name suffixes. Vowels and
/// look-alike digits are left out so suffixes never spell words.
const SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

const HOST_VOLUME_NAME: &str = "host";

/// Pod security admission labels that let privileged pods into a namespace.
const PRIVILEGED_NAMESPACE_LABELS: [(&str, &str); 4] = [
    ("pod-security.kubernetes.io/enforce", "privileged"),
    ("pod-security.kubernetes.io/audit", "privileged"),
    ("pod-security.kubernetes.io/warn", "privileged"),
    ("security.openshift.io/scc.podSecurityLabelSync", "false"),
];

/// Inputs of [`HelperManifest::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperParams {
    /// Node the target runs on. The helper is bound to it directly.
    pub node: String,
    /// Usually the target pod name.
    pub base_name: String,
    pub namespace: String,
    pub image: String,
    pub stdin: bool,
    pub tty: bool,
}

/// A helper pod ready to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct HelperManifest {
    pub name: String,
    pub namespace: String,
    pub pod: Pod,
}

pub fn random_suffix<R: Rng>(rng: &mut R) -> String {
    (0..RANDOM_SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())]))
        .collect()
}

/// `<base>-debug-<suffix>`, with `base` shortened so the result stays a
/// valid object name.
pub fn helper_name<R: Rng>(base_name: &str, rng: &mut R) -> String {
    let max_base = MAX_NAME_LEN - HELPER_NAME_INFIX.len() - RANDOM_SUFFIX_LEN;
    let mut base: String = base_name.chars().take(max_base).collect();
    while base.ends_with(['-', '.']) {
        base.pop();
    }
    format!("{base}{HELPER_NAME_INFIX}{}", random_suffix(rng))
}

impl HelperManifest {
    pub fn build<R: Rng>(params: &HelperParams, rng: &mut R) -> Self {
        let name = helper_name(&params.base_name, rng);
        let container = Container {
            name: HELPER_CONTAINER_NAME.to_string(),
            image: Some(params.image.clone()),
            command: Some(HELPER_IDLE_COMMAND.map(str::to_string).to_vec()),
            tty: Some(params.tty),
            stdin: Some(params.stdin),
            security_context: Some(SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            volume_mounts: Some(vec![VolumeMount {
                name: HOST_VOLUME_NAME.to_string(),
                mount_path: HOST_MOUNT_PATH.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(params.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    MANAGED_BY_VALUE.to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(params.node.clone()),
                containers: vec![container],
                host_network: Some(true),
                host_pid: Some(true),
                host_ipc: Some(true),
                restart_policy: Some("Never".to_string()),
                // Tainted nodes must not keep the helper from starting.
                tolerations: Some(vec![Toleration {
                    operator: Some("Exists".to_string()),
                    ..Default::default()
                }]),
                volumes: Some(vec![Volume {
                    name: HOST_VOLUME_NAME.to_string(),
                    host_path: Some(HostPathVolumeSource {
                        path: "/".to_string(),
                        type_: None,
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        Self {
            name,
            namespace: params.namespace.clone(),
            pod,
        }
    }
}

/// Throwaway namespace that admits privileged pods.
pub fn temporary_namespace<R: Rng>(rng: &mut R) -> Namespace {
    let mut labels: BTreeMap<String, String> = PRIVILEGED_NAMESPACE_LABELS
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    Namespace {
        metadata: ObjectMeta {
            name: Some(format!("{TEMPORARY_NAMESPACE_PREFIX}{}", random_suffix(rng))),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}
