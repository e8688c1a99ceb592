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

use std::sync::Arc;

use async_trait::async_trait;
use debugpod_error::{Error, ResultExt};
use tracing::trace;

use crate::cluster::ClusterApi;

/// Captured result of a non-interactive command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a command inside the helper pod and captures its output.
#[async_trait]
pub trait HelperExec: Send + Sync {
    async fn run(&self, argv: Vec<String>) -> Result<ExecOutput, Error>;
}

/// [`HelperExec`] backed by the cluster exec capability.
#[derive(Clone)]
pub struct PodExec {
    cluster: Arc<dyn ClusterApi>,
    namespace: String,
    pod: String,
    container: String,
}

impl core::fmt::Debug for PodExec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PodExec")
            .field("namespace", &self.namespace)
            .field("pod", &self.pod)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl PodExec {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }
}

#[async_trait]
impl HelperExec for PodExec {
    async fn run(&self, argv: Vec<String>) -> Result<ExecOutput, Error> {
        trace!(?argv, pod = %self.pod, "Running command in helper");
        self.cluster
            .exec(&self.namespace, &self.pod, &self.container, argv)
            .await
            .err_tip(|| format!("While running a command in helper pod {}", self.pod))
    }
}
