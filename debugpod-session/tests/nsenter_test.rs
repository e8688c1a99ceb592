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

use debugpod_session::discovery::PidRoot;
use debugpod_session::nsenter::{ENTER_PAYLOAD, EntryCommand, PAYLOAD_NAME};
use pretty_assertions::assert_eq;

fn pid_root() -> PidRoot {
    PidRoot {
        pid: 4242,
        root: "/host/run/containerd/io.containerd.runtime.v2.task/k8s.io/abc/rootfs".to_string(),
    }
}

#[test]
fn entry_joins_every_namespace_but_mount() {
    let argv = EntryCommand::new(pid_root(), Vec::new()).argv();
    assert_eq!(
        argv[..9],
        [
            "nsenter", "--target", "4242", "--uts", "--ipc", "--net", "--pid", "--cgroup", "--",
        ]
    );
    assert!(!argv.iter().any(|arg| arg == "--mount"));
}

#[test]
fn entry_passes_pid_root_and_default_shell_to_payload() {
    let argv = EntryCommand::new(pid_root(), Vec::new()).argv();
    assert_eq!(
        argv[9..],
        [
            "/bin/sh".to_string(),
            "-c".to_string(),
            ENTER_PAYLOAD.to_string(),
            PAYLOAD_NAME.to_string(),
            "4242".to_string(),
            pid_root().root,
            "/bin/sh".to_string(),
        ]
    );
}

#[test]
fn entry_runs_user_command() {
    let command = vec!["ls".to_string(), "/proc/1/root".to_string()];
    let argv = EntryCommand::new(pid_root(), command).argv();
    assert_eq!(argv[argv.len() - 2..], ["ls", "/proc/1/root"]);
}

#[test]
fn payload_mounts_proc_best_effort() {
    assert!(ENTER_PAYLOAD.contains("mount -t proc proc /proc"));
    assert!(ENTER_PAYLOAD.contains("if ! mount"));
    assert!(ENTER_PAYLOAD.contains("exec \"$@\""));
}
