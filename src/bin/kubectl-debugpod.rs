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


use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use debugpod_config::DebugpodConfig;
use debugpod_error::{Error, ResultExt};
use debugpod_session::cluster::KubeCluster;
use debugpod_session::locator::TargetReference;
use debugpod_session::port_forward::ForwardOptions;
use debugpod_session::session::{DebugSession, SessionOptions};
use debugpod_util::init_tracing;
use debugpod_util::signal::wait_for_termination;
use mimalloc::MiMalloc;
use tracing::debug;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const LONG_VERSION: &str = concat!(
    env!("DEBUGPOD_APP_VERSION"),
    " (",
    env!("DEBUGPOD_GIT_COMMIT_HASH"),
    ")"
);

/// Debug a running container by entering its namespaces from a privileged
/// pod on the same node.
#[derive(Parser, Debug)]
#[clap(name = "kubectl-debugpod", version, long_version = LONG_VERSION, about, long_about = None)]
struct Args {
    /// Pod holding the container to debug.
    #[clap(value_parser)]
    pod: String,

    /// Namespace of the pod. Defaults to the namespace of the kubeconfig context.
    #[clap(short = 'n', long)]
    namespace: Option<String>,

    /// Container to debug. May be omitted when the pod has only one.
    #[clap(short = 'c', long)]
    container: Option<String>,

    /// Select among the init containers of the pod.
    #[clap(long)]
    init_container: bool,

    /// Image of the debug pod. Overrides the configuration file.
    #[clap(long)]
    image: Option<String>,

    /// Keep stdin open on the remote command.
    #[clap(short = 'i', long)]
    stdin: bool,

    /// Allocate a TTY for the remote command.
    #[clap(short = 't', long)]
    tty: bool,

    /// Existing namespace for the debug pod. A temporary one is created otherwise.
    #[clap(long)]
    helper_namespace: Option<String>,

    /// Find the container runtime by probing its socket on the node.
    #[clap(long)]
    detect_runtime: bool,

    /// Forward `[LOCAL:]REMOTE` ports of the target pod while the session runs.
    #[clap(long = "forward-port", value_name = "PORTS")]
    forward_port: Vec<String>,

    /// Addresses to listen on for forwarded ports (default: localhost).
    #[clap(long = "forward-address", value_name = "ADDRESSES")]
    forward_address: Vec<String>,

    /// Configuration file. Looked up in $HOME and the working directory if unset.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Command to run in the container instead of a shell.
    #[clap(last = true)]
    command: Vec<String>,
}

fn load_config(path: Option<&PathBuf>) -> Result<DebugpodConfig, Error> {
    if let Some(path) = path {
        return DebugpodConfig::load(path);
    }
    Ok(match DebugpodConfig::discover()? {
        Some((path, config)) => {
            debug!(path = %path.display(), "Using configuration file");
            config
        }
        None => DebugpodConfig::default(),
    })
}

async fn inner_main(args: Args, image: String) -> Result<i32, Error> {
    let forward = ForwardOptions::parse(&args.forward_address, &args.forward_port)
        .err_tip(|| "Invalid port forwarding arguments")?;
    let cluster = KubeCluster::try_default().await?;
    let namespace = args
        .namespace
        .unwrap_or_else(|| cluster.default_namespace().to_string());

    let options = SessionOptions {
        target: TargetReference {
            pod: args.pod,
            namespace,
            container: args.container,
            init_container: args.init_container,
        },
        image,
        stdin: args.stdin,
        tty: args.tty,
        helper_namespace: args.helper_namespace,
        detect_runtime: args.detect_runtime,
        command: args.command,
        forward,
    };
    debug!(?options, "Starting session");
    DebugSession::new(Arc::new(cluster), options)
        .run(wait_for_termination())
        .await
}

fn run(args: Args) -> Result<i32, Error> {
    let config = load_config(args.config.as_ref())?;
    let image = config.resolve_image(args.image.as_deref());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .err_tip(|| "Could not start the async runtime")?;
    let result = runtime.block_on(inner_main(args, image));
    // Blocking stdin readers would otherwise keep the runtime from shutting down.
    runtime.shutdown_background();
    result
}

fn main() {
    let args = Args::parse();
    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize logging: {e:?}");
    }
    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            debug!(?e, "Debug session failed");
            eprintln!("Error: {}", e.message_string());
            1
        }
    };
    std::process::exit(code);
}
