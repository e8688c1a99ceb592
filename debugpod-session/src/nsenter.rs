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

use crate::discovery::PidRoot;

/// Script run inside the target namespaces. It remounts `/proc` and execs
/// the operator's command.
pub const ENTER_PAYLOAD: &str = include_str!("../assets/enter.sh");

/// `$0` of the payload, shown in process listings.
pub const PAYLOAD_NAME: &str = "debugpod-enter";

pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Namespaces joined by [`EntryCommand`]. The mount namespace is left out so
/// the node filesystem stays visible under `/host`.
pub const JOINED_NAMESPACES: [&str; 5] = ["--uts", "--ipc", "--net", "--pid", "--cgroup"];

/// Command line that enters the namespaces of the target process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCommand {
    pid_root: PidRoot,
    command: Vec<String>,
}

impl EntryCommand {
    /// An empty `command` starts [`DEFAULT_SHELL`].
    pub fn new(pid_root: PidRoot, command: Vec<String>) -> Self {
        Self { pid_root, command }
    }

    pub fn argv(&self) -> Vec<String> {
        let pid = self.pid_root.pid.to_string();
        let mut argv = vec!["nsenter".to_string(), "--target".to_string(), pid.clone()];
        argv.extend(JOINED_NAMESPACES.map(str::to_string));
        argv.extend([
            "--".to_string(),
            DEFAULT_SHELL.to_string(),
            "-c".to_string(),
            ENTER_PAYLOAD.to_string(),
            PAYLOAD_NAME.to_string(),
            pid,
            self.pid_root.root.clone(),
        ]);
        if self.command.is_empty() {
            argv.push(DEFAULT_SHELL.to_string());
        } else {
            argv.extend(self.command.iter().cloned());
        }
        argv
    }
}
