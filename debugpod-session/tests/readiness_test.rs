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

mod utils {
    pub(crate) mod fake_cluster;
}

use core::time::Duration;
use std::sync::atomic::Ordering;

use debugpod_error::{Code, Error, make_err};
use debugpod_macro::debugpod_test;
use debugpod_session::cluster::PodEvent;
use debugpod_session::readiness::{ReadinessState, ReadinessWaiter};
use futures::future::BoxFuture;
use pretty_assertions::assert_eq;

use crate::utils::fake_cluster::{FakeSubscription, target_pod, with_phase};

fn never_sleep(_duration: Duration) -> BoxFuture<'static, ()> {
    Box::pin(futures::future::pending())
}

fn instant_sleep(_duration: Duration) -> BoxFuture<'static, ()> {
    Box::pin(async {})
}

fn helper(phase: &str) -> k8s_openapi::api::core::v1::Pod {
    with_phase(target_pod("web-debug-abcde", Some("node-7"), &[("debug", "")], &[]), phase)
}

#[debugpod_test]
async fn running_within_deadline_succeeds() -> Result<(), Error> {
    let mut subscription = FakeSubscription::new(
        vec![
            Ok(PodEvent::Added(helper("Pending"))),
            Ok(PodEvent::Modified(helper("Pending"))),
            Ok(PodEvent::Modified(helper("Running"))),
        ],
        true,
    );
    let stops = subscription.stop_counter();
    let waiter = ReadinessWaiter::new(Duration::from_secs(900), never_sleep);

    let readiness = waiter.wait(&mut subscription, helper("Pending")).await?;
    assert_eq!(readiness.state, ReadinessState::Running);
    let pod = readiness.ensure_running()?;
    assert_eq!(pod.status.unwrap().phase.as_deref(), Some("Running"));
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    Ok(())
}

#[debugpod_test]
async fn pending_forever_times_out() -> Result<(), Error> {
    let mut subscription = FakeSubscription::new(Vec::new(), true);
    let stops = subscription.stop_counter();
    let waiter = ReadinessWaiter::new(Duration::from_secs(900), instant_sleep);

    let readiness = waiter.wait(&mut subscription, helper("Pending")).await?;
    assert_eq!(readiness.state, ReadinessState::TimedOut);
    assert_eq!(
        readiness.pod.status.as_ref().unwrap().phase.as_deref(),
        Some("Pending")
    );
    assert_eq!(stops.load(Ordering::SeqCst), 1);

    let err = readiness.ensure_running().unwrap_err();
    assert_eq!(err.code, Code::DeadlineExceeded);
    assert!(
        err.message_string()
            .contains("web-debug-abcde failed to reach state running")
    );
    Ok(())
}

#[debugpod_test]
async fn failed_pod_stops_waiting() -> Result<(), Error> {
    let mut subscription =
        FakeSubscription::new(vec![Ok(PodEvent::Modified(helper("Failed")))], true);
    let stops = subscription.stop_counter();
    let waiter = ReadinessWaiter::new(Duration::from_secs(900), never_sleep);

    let readiness = waiter.wait(&mut subscription, helper("Pending")).await?;
    assert_eq!(readiness.state, ReadinessState::Failed);
    assert_eq!(
        readiness.ensure_running().unwrap_err().code,
        Code::FailedPrecondition
    );
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    Ok(())
}

#[debugpod_test]
async fn deleted_pod_stops_waiting() -> Result<(), Error> {
    let mut subscription =
        FakeSubscription::new(vec![Ok(PodEvent::Deleted(helper("Pending")))], true);
    let waiter = ReadinessWaiter::new(Duration::from_secs(900), never_sleep);
    let readiness = waiter.wait(&mut subscription, helper("Pending")).await?;
    assert_eq!(readiness.state, ReadinessState::Failed);
    Ok(())
}

#[debugpod_test]
async fn undecodable_event_aborts_the_wait() {
    let mut subscription = FakeSubscription::new(
        vec![
            Ok(PodEvent::Modified(helper("Pending"))),
            Err(make_err!(Code::Internal, "unexpected object kind Status")),
        ],
        true,
    );
    let stops = subscription.stop_counter();
    let waiter = ReadinessWaiter::new(Duration::from_secs(900), never_sleep);

    let err = waiter
        .wait(&mut subscription, helper("Pending"))
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::Internal);
    assert!(err.message_string().contains("unexpected object kind"));
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[debugpod_test]
async fn ended_watch_is_an_error() {
    let mut subscription = FakeSubscription::new(Vec::new(), false);
    let stops = subscription.stop_counter();
    let waiter = ReadinessWaiter::new(Duration::from_secs(900), never_sleep);

    let err = waiter
        .wait(&mut subscription, helper("Pending"))
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::Internal);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}
