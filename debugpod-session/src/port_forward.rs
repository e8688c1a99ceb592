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
use core::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use core::str::FromStr;
use std::sync::Arc;

use debugpod_error::{Code, Error, ResultExt, error_if, make_err};
use debugpod_util::task::JoinHandleDropGuard;
use debugpod_util::{background_spawn, spawn};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::cluster::ClusterApi;

/// Address that `localhost` expands to.
const LOCALHOST_ADDRESSES: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::LOCALHOST),
    IpAddr::V6(Ipv6Addr::LOCALHOST),
];

/// `LOCAL:REMOTE`. A local port of 0 picks a free port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub local: u16,
    pub remote: u16,
}

impl FromStr for PortMapping {
    type Err = Error;

    /// Accepts `PORT`, `LOCAL:REMOTE` and `:REMOTE`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (local, remote) = match value.split_once(':') {
            Some(("", remote)) => (0, remote.parse::<u16>()),
            Some((local, remote)) => (
                local
                    .parse::<u16>()
                    .err_tip(|| format!("Invalid local port in {value:?}"))?,
                remote.parse::<u16>(),
            ),
            None => {
                let port = value.parse::<u16>();
                (port.clone().unwrap_or_default(), port)
            }
        };
        let remote = remote.err_tip(|| format!("Invalid remote port in {value:?}"))?;
        error_if!(remote == 0, "Remote port must not be 0 in {value:?}");
        Ok(Self { local, remote })
    }
}

/// Where forwarded ports listen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenAddress {
    /// Both `127.0.0.1` and `::1`; succeeds if either binds.
    Localhost,
    Ip(IpAddr),
}

impl ListenAddress {
    fn candidates(self) -> Vec<IpAddr> {
        match self {
            Self::Localhost => LOCALHOST_ADDRESSES.to_vec(),
            Self::Ip(ip) => vec![ip],
        }
    }
}

impl FromStr for ListenAddress {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("localhost") {
            return Ok(Self::Localhost);
        }
        let ip = value
            .parse::<IpAddr>()
            .err_tip(|| format!("Invalid forward address {value:?}, expected an IP or localhost"))?;
        Ok(Self::Ip(ip))
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Localhost => f.write_str("localhost"),
            Self::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOptions {
    pub addresses: Vec<ListenAddress>,
    pub mappings: Vec<PortMapping>,
}

impl ForwardOptions {
    /// `None` when no port is forwarded. Entries may be comma separated.
    pub fn parse(addresses: &[String], ports: &[String]) -> Result<Option<Self>, Error> {
        let split = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .flat_map(|value| value.split(','))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect()
        };
        let mappings = split(ports)
            .iter()
            .map(|port| port.parse::<PortMapping>())
            .collect::<Result<Vec<_>, _>>()?;
        if mappings.is_empty() {
            return Ok(None);
        }
        let mut addresses = split(addresses)
            .iter()
            .map(|address| address.parse::<ListenAddress>())
            .collect::<Result<Vec<_>, _>>()?;
        if addresses.is_empty() {
            addresses.push(ListenAddress::Localhost);
        }
        Ok(Some(Self {
            addresses,
            mappings,
        }))
    }
}

/// Local listeners that tunnel connections to ports of a pod. Listening
/// stops when this is dropped.
#[derive(Debug)]
pub struct PortForwarder {
    local_addrs: Vec<SocketAddr>,
    _listeners: Vec<JoinHandleDropGuard<()>>,
}

impl PortForwarder {
    pub async fn start(
        cluster: Arc<dyn ClusterApi>,
        namespace: &str,
        pod: &str,
        options: &ForwardOptions,
    ) -> Result<Self, Error> {
        let mut local_addrs = Vec::new();
        let mut listeners = Vec::new();
        for mapping in &options.mappings {
            for address in &options.addresses {
                let mut bound = 0;
                let mut errors = Vec::new();
                for ip in address.candidates() {
                    let listener = match TcpListener::bind(SocketAddr::new(ip, mapping.local)).await
                    {
                        Ok(listener) => listener,
                        Err(e) => {
                            debug!(%ip, port = mapping.local, ?e, "Could not listen");
                            errors.push(format!("{ip}: {e}"));
                            continue;
                        }
                    };
                    let local = listener
                        .local_addr()
                        .err_tip(|| "Could not read the listener address")?;
                    info!(%local, remote = mapping.remote, %pod, "Forwarding port");
                    local_addrs.push(local);
                    listeners.push(spawn!(
                        "port_forward_listener",
                        serve(
                            listener,
                            cluster.clone(),
                            namespace.to_string(),
                            pod.to_string(),
                            mapping.remote,
                        ),
                        %local
                    ));
                    bound += 1;
                }
                if bound == 0 {
                    return Err(make_err!(
                        Code::Unavailable,
                        "Unable to listen on {address}:{}: {}",
                        mapping.local,
                        errors.join(", ")
                    ));
                }
            }
        }
        Ok(Self {
            local_addrs,
            _listeners: listeners,
        })
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }
}

async fn serve(
    listener: TcpListener,
    cluster: Arc<dyn ClusterApi>,
    namespace: String,
    pod: String,
    remote: u16,
) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(?e, "Port-forward listener failed");
                return;
            }
        };
        debug!(%peer, remote, "Accepted port-forward connection");
        background_spawn!(
            "port_forward_connection",
            tunnel(socket, cluster.clone(), namespace.clone(), pod.clone(), remote),
            %peer
        );
    }
}

async fn tunnel(
    mut socket: TcpStream,
    cluster: Arc<dyn ClusterApi>,
    namespace: String,
    pod: String,
    remote: u16,
) {
    let mut upstream = match cluster.port_forward(&namespace, &pod, remote).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(?e, %pod, remote, "Could not open port-forward stream");
            return;
        }
    };
    match tokio::io::copy_bidirectional(&mut socket, &mut upstream).await {
        Ok((sent, received)) => debug!(sent, received, remote, "Port-forward connection closed"),
        Err(e) => debug!(?e, remote, "Port-forward connection ended with an error"),
    }
}
