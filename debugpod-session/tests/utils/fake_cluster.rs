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

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use debugpod_error::{Code, Error, make_err};
use debugpod_session::cluster::{
    AttachOptions, ClusterApi, ForwardedStream, PodEvent, PodSubscription,
};
use debugpod_session::exec::{ExecOutput, HelperExec};
use k8s_openapi::api::core::v1::{
    Container, ContainerStatus, Namespace, Pod, PodSpec, PodStatus,
};
use kube::api::ObjectMeta;
use tokio::sync::Notify;

/// A pod with the given `(name, container ID)` containers, scheduled on `node`.
pub(crate) fn target_pod(
    name: &str,
    node: Option<&str>,
    containers: &[(&str, &str)],
    init_containers: &[(&str, &str)],
) -> Pod {
    let spec_of = |list: &[(&str, &str)]| -> Vec<Container> {
        list.iter()
            .map(|(name, _)| Container {
                name: (*name).to_string(),
                ..Default::default()
            })
            .collect()
    };
    let status_of = |list: &[(&str, &str)]| -> Vec<ContainerStatus> {
        list.iter()
            .map(|(name, id)| ContainerStatus {
                name: (*name).to_string(),
                container_id: (!id.is_empty()).then(|| (*id).to_string()),
                ..Default::default()
            })
            .collect()
    };
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: node.map(str::to_string),
            containers: spec_of(containers),
            init_containers: (!init_containers.is_empty()).then(|| spec_of(init_containers)),
            ..Default::default()
        }),
        status: Some(PodStatus {
            container_statuses: Some(status_of(containers)),
            init_container_statuses: Some(status_of(init_containers)),
            ..Default::default()
        }),
    }
}

/// `pod` with its phase set.
pub(crate) fn with_phase(mut pod: Pod, phase: &str) -> Pod {
    pod.status.get_or_insert_with(PodStatus::default).phase = Some(phase.to_string());
    pod
}

pub(crate) fn output(exit_code: i32, stdout: &str) -> ExecOutput {
    ExecOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code,
    }
}

type ExecHandler = Box<dyn Fn(&[String]) -> ExecOutput + Send + Sync>;

/// [`HelperExec`] answering from a handler and recording every command.
pub(crate) struct ScriptedExec {
    handler: ExecHandler,
    pub(crate) calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedExec {
    pub(crate) fn new(handler: impl Fn(&[String]) -> ExecOutput + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HelperExec for ScriptedExec {
    async fn run(&self, argv: Vec<String>) -> Result<ExecOutput, Error> {
        let result = (self.handler)(&argv);
        self.calls.lock().unwrap().push(argv);
        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    GetPod(String, String),
    CreateNamespace(String),
    DeleteNamespace(String),
    CreatePod(String, String),
    DeletePod(String, String),
    WatchPod(String, String),
    Attach(Vec<String>),
    PortForward(String, u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttachBehavior {
    Exit(i32),
    /// Never returns; used to interrupt a session mid-attach.
    Hang,
}

/// Watch that replays scripted events, then either ends or hangs.
pub(crate) struct FakeSubscription {
    events: VecDeque<Result<PodEvent, Error>>,
    hang_when_drained: bool,
    stops: Arc<AtomicUsize>,
}

impl FakeSubscription {
    pub(crate) fn new(events: Vec<Result<PodEvent, Error>>, hang_when_drained: bool) -> Self {
        Self {
            events: events.into(),
            hang_when_drained,
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn stop_counter(&self) -> Arc<AtomicUsize> {
        self.stops.clone()
    }
}

#[async_trait]
impl PodSubscription for FakeSubscription {
    async fn next_event(&mut self) -> Option<Result<PodEvent, Error>> {
        match self.events.pop_front() {
            Some(event) => Some(event),
            None if self.hang_when_drained => futures::future::pending().await,
            None => None,
        }
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory cluster. Created helper pods become `Running` on the first
/// watch event unless `helper_phase` says otherwise.
pub(crate) struct FakeCluster {
    pods: Mutex<HashMap<(String, String), Pod>>,
    pub(crate) calls: Mutex<Vec<Call>>,
    exec: ScriptedExec,
    pub(crate) attach_behavior: Mutex<AttachBehavior>,
    pub(crate) helper_phase: Mutex<String>,
    pub(crate) delete_error: Mutex<Option<Code>>,
    pub(crate) watch_stops: Arc<AtomicUsize>,
    pub(crate) attach_started: Notify,
}

impl FakeCluster {
    pub(crate) fn new(exec: ScriptedExec) -> Self {
        Self {
            pods: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            exec,
            attach_behavior: Mutex::new(AttachBehavior::Exit(0)),
            helper_phase: Mutex::new("Running".to_string()),
            delete_error: Mutex::new(None),
            watch_stops: Arc::new(AtomicUsize::new(0)),
            attach_started: Notify::new(),
        }
    }

    pub(crate) fn insert_pod(&self, pod: Pod) {
        let key = (
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        self.pods.lock().unwrap().insert(key, pod);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn exec_calls(&self) -> Vec<Vec<String>> {
        self.exec.calls()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn delete_result(&self) -> Result<(), Error> {
        match *self.delete_error.lock().unwrap() {
            Some(code) => Err(make_err!(code, "scripted delete failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, Error> {
        self.record(Call::GetPod(namespace.to_string(), name.to_string()));
        self.pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| make_err!(Code::NotFound, "pods \"{name}\" not found"))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, Error> {
        let name = namespace.metadata.name.clone().unwrap_or_default();
        self.record(Call::CreateNamespace(name));
        Ok(namespace.clone())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        self.record(Call::DeleteNamespace(name.to_string()));
        self.delete_result()
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, Error> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.record(Call::CreatePod(namespace.to_string(), name));
        let created = with_phase(pod.clone(), "Pending");
        self.insert_pod(created.clone());
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.record(Call::DeletePod(namespace.to_string(), name.to_string()));
        self.delete_result()
    }

    async fn watch_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Box<dyn PodSubscription>, Error> {
        self.record(Call::WatchPod(namespace.to_string(), name.to_string()));
        let pod = self
            .pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| make_err!(Code::NotFound, "pods \"{name}\" not found"))?;
        let phase = self.helper_phase.lock().unwrap().clone();
        let mut subscription =
            FakeSubscription::new(vec![Ok(PodEvent::Modified(with_phase(pod, &phase)))], true);
        subscription.stops = self.watch_stops.clone();
        Ok(Box::new(subscription))
    }

    async fn exec(
        &self,
        _namespace: &str,
        _pod: &str,
        _container: &str,
        command: Vec<String>,
    ) -> Result<ExecOutput, Error> {
        self.exec.run(command).await
    }

    async fn attach(
        &self,
        _namespace: &str,
        _pod: &str,
        _container: &str,
        command: Vec<String>,
        _options: AttachOptions,
    ) -> Result<i32, Error> {
        self.record(Call::Attach(command));
        self.attach_started.notify_one();
        let behavior = *self.attach_behavior.lock().unwrap();
        match behavior {
            AttachBehavior::Exit(code) => Ok(code),
            AttachBehavior::Hang => futures::future::pending().await,
        }
    }

    async fn port_forward(
        &self,
        _namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<Box<dyn ForwardedStream>, Error> {
        self.record(Call::PortForward(pod.to_string(), port));
        // Echo server standing in for the pod.
        let (client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(&mut server);
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
        });
        Ok(Box::new(client))
    }
}
