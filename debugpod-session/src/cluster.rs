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

use async_trait::async_trait;
use debugpod_error::{Code, Error, ResultExt, make_err};
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{AttachParams, AttachedProcess, DeleteParams, PostParams};
use kube::runtime::watcher;
use kube::{Api, Client};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, warn};

use crate::exec::ExecOutput;
use crate::terminal;

/// Change observed on a watched pod.
#[derive(Debug, Clone, PartialEq)]
pub enum PodEvent {
    Added(Pod),
    Modified(Pod),
    Deleted(Pod),
}

/// A live watch on one pod.
#[async_trait]
pub trait PodSubscription: Send {
    /// `None` once the watch has ended.
    async fn next_event(&mut self) -> Option<Result<PodEvent, Error>>;

    /// Closes the underlying watch. Safe to call more than once.
    fn stop(&mut self);
}

/// Byte stream to a port of a pod.
pub trait ForwardedStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ForwardedStream for T {}

/// Streams wired to an interactive command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachOptions {
    pub stdin: bool,
    pub tty: bool,
}

/// Everything a debug session needs from the cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync + 'static {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, Error>;

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, Error>;

    async fn delete_namespace(&self, name: &str) -> Result<(), Error>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, Error>;

    /// Deletes without a grace period.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error>;

    async fn watch_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Box<dyn PodSubscription>, Error>;

    /// Runs `command` to completion and captures its output.
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<ExecOutput, Error>;

    /// Runs `command` wired to the local terminal and returns its exit code.
    async fn attach(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
        options: AttachOptions,
    ) -> Result<i32, Error>;

    async fn port_forward(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<Box<dyn ForwardedStream>, Error>;
}

/// Exit code reported by the kubelet for a finished exec.
///
/// A missing status means the stream was cut before the command finished.
pub fn exit_code_from_status(status: Option<&Status>) -> Result<i32, Error> {
    let status = status.err_tip_with_code(|_| {
        (
            Code::Unavailable,
            "Exec stream closed without reporting an exit status",
        )
    })?;
    if status.status.as_deref() == Some("Success") {
        return Ok(0);
    }
    if status.reason.as_deref() == Some("NonZeroExitCode") {
        let code = status
            .details
            .as_ref()
            .and_then(|details| details.causes.as_ref())
            .into_iter()
            .flatten()
            .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
            .and_then(|cause| cause.message.as_deref())
            .err_tip_with_code(|_| (Code::Internal, "NonZeroExitCode status without an ExitCode"))?;
        return code
            .parse::<i32>()
            .err_tip(|| format!("Invalid exit code {code:?} in exec status"));
    }
    Err(make_err!(
        Code::Internal,
        "Exec failed: {}",
        status.message.as_deref().unwrap_or("no message")
    ))
}

/// [`ClusterApi`] backed by a kube client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeCluster")
            .field("default_namespace", &self.client.default_namespace())
            .finish_non_exhaustive()
    }
}

impl KubeCluster {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Uses the in-cluster config or the local kubeconfig.
    pub async fn try_default() -> Result<Self, Error> {
        let client = Client::try_default()
            .await
            .err_tip(|| "Failed to create a client from the kubeconfig")?;
        Ok(Self::new(client))
    }

    /// Namespace of the current kubeconfig context.
    pub fn default_namespace(&self) -> &str {
        self.client.default_namespace()
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

struct KubePodSubscription {
    stream: Option<BoxStream<'static, Result<watcher::Event<Pod>, watcher::Error>>>,
}

#[async_trait]
impl PodSubscription for KubePodSubscription {
    async fn next_event(&mut self) -> Option<Result<PodEvent, Error>> {
        let stream = self.stream.as_mut()?;
        loop {
            let event = match stream.next().await? {
                Ok(event) => event,
                Err(e) => {
                    return Some(Err(make_err!(Code::Internal, "Pod watch failed: {e}")));
                }
            };
            match event {
                watcher::Event::Apply(pod) => return Some(Ok(PodEvent::Modified(pod))),
                watcher::Event::InitApply(pod) => return Some(Ok(PodEvent::Added(pod))),
                watcher::Event::Delete(pod) => return Some(Ok(PodEvent::Deleted(pod))),
                watcher::Event::Init | watcher::Event::InitDone => {}
            }
        }
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closed pod watch");
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Result<String, Error> {
    let mut buffer = String::new();
    if let Some(mut reader) = reader {
        reader
            .read_to_string(&mut buffer)
            .await
            .err_tip(|| "Error reading exec output")?;
    }
    Ok(buffer)
}

async fn finish(mut process: AttachedProcess) -> Result<i32, Error> {
    let status = match process.take_status() {
        Some(status) => status.await,
        None => None,
    };
    if let Err(e) = process.join().await {
        warn!(?e, "Exec stream did not shut down cleanly");
    }
    exit_code_from_status(status.as_ref())
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, Error> {
        self.pods(namespace)
            .get(name)
            .await
            .err_tip(|| format!("Failed to find pod {name} in namespace {namespace}"))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, Error> {
        Api::<Namespace>::all(self.client.clone())
            .create(&PostParams::default(), namespace)
            .await
            .err_tip(|| "Failed to create the temporary namespace")
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        Api::<Namespace>::all(self.client.clone())
            .delete(name, &DeleteParams::default())
            .await
            .err_tip(|| format!("Failed to delete namespace {name}"))?;
        Ok(())
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, Error> {
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .err_tip(|| format!("Failed to create the helper pod in namespace {namespace}"))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let params = DeleteParams {
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        };
        self.pods(namespace)
            .delete(name, &params)
            .await
            .err_tip(|| format!("Failed to delete pod {name}"))?;
        Ok(())
    }

    async fn watch_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Box<dyn PodSubscription>, Error> {
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let stream = watcher(self.pods(namespace), config).boxed();
        Ok(Box::new(KubePodSubscription {
            stream: Some(stream),
        }))
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<ExecOutput, Error> {
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);
        let mut process = self
            .pods(namespace)
            .exec(pod, command, &params)
            .await
            .err_tip(|| format!("Failed to exec in pod {pod}"))?;
        let stdout = process.stdout();
        let stderr = process.stderr();
        let (stdout, stderr) = tokio::try_join!(read_all(stdout), read_all(stderr))?;
        let exit_code = finish(process).await?;
        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn attach(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
        options: AttachOptions,
    ) -> Result<i32, Error> {
        let params = AttachParams::default()
            .container(container)
            .stdin(options.stdin)
            .stdout(true)
            .stderr(!options.tty)
            .tty(options.tty);
        let mut process = self
            .pods(namespace)
            .exec(pod, command, &params)
            .await
            .err_tip(|| format!("Failed to attach to pod {pod}"))?;

        let resize_task = process.terminal_size().map(|sender| {
            debugpod_util::spawn!(
                "attach_resize",
                terminal::forward_resizes(terminal::window_changes(), terminal::size, sender)
            )
        });

        let stdin_task = process.stdin().map(|mut remote| {
            debugpod_util::spawn!("attach_stdin", async move {
                tokio::io::copy(&mut tokio::io::stdin(), &mut remote).await
            })
        });
        let stdout = process.stdout().map(|mut remote| async move {
            tokio::io::copy(&mut remote, &mut tokio::io::stdout()).await
        });
        let stderr = process.stderr().map(|mut remote| async move {
            tokio::io::copy(&mut remote, &mut tokio::io::stderr()).await
        });
        let (stdout_result, stderr_result) = tokio::join!(
            futures::future::OptionFuture::from(stdout),
            futures::future::OptionFuture::from(stderr),
        );
        for result in [stdout_result, stderr_result].into_iter().flatten() {
            if let Err(e) = result {
                debug!(?e, "Attach output stream ended with an error");
            }
        }
        // Stdin is read on a blocking thread; dropping the guard stops forwarding.
        drop(stdin_task);
        drop(resize_task);
        finish(process).await
    }

    async fn port_forward(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<Box<dyn ForwardedStream>, Error> {
        let mut forwarder = self
            .pods(namespace)
            .portforward(pod, &[port])
            .await
            .err_tip(|| format!("Failed to open a port-forward to {pod}:{port}"))?;
        let stream = forwarder
            .take_stream(port)
            .err_tip_with_code(|_| (Code::Internal, format!("No stream for port {port}")))?;
        let pod = pod.to_string();
        debugpod_util::background_spawn!("port_forward_join", async move {
            if let Err(e) = forwarder.join().await {
                warn!(?e, %pod, port, "Port-forward connection failed");
            }
        });
        Ok(Box::new(stream))
    }
}
