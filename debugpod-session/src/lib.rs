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

//! Debug-session orchestration for `kubectl-debugpod`.
//!
//! A session resolves one container of a running pod, provisions a
//! privileged helper pod on the same node, discovers the target's PID and
//! root filesystem through the node's container runtime, and attaches the
//! operator to a shell inside the target's namespaces. The helper pod is
//! deleted on every exit path.

pub mod cluster;
pub mod discovery;
pub mod exec;
pub mod locator;
pub mod manifest;
pub mod nsenter;
pub mod port_forward;
pub mod readiness;
pub mod runtime;
pub mod scan;
pub mod session;
pub mod terminal;
