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

use core::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use debugpod_error::{Code, Error};
use debugpod_macro::debugpod_test;
use debugpod_session::cluster::ClusterApi;
use debugpod_session::port_forward::{ForwardOptions, ListenAddress, PortForwarder, PortMapping};
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::utils::fake_cluster::{Call, FakeCluster, ScriptedExec, output};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[test]
fn port_mapping_forms() {
    assert_eq!(
        "8080".parse::<PortMapping>().unwrap(),
        PortMapping {
            local: 8080,
            remote: 8080
        }
    );
    assert_eq!(
        "9000:80".parse::<PortMapping>().unwrap(),
        PortMapping {
            local: 9000,
            remote: 80
        }
    );
    assert_eq!(
        ":80".parse::<PortMapping>().unwrap(),
        PortMapping { local: 0, remote: 80 }
    );
}

#[test]
fn invalid_port_mappings_are_rejected() {
    for value in ["", "http", "70000", "80:", "a:80", "8080:0", "0"] {
        let err = value.parse::<PortMapping>().unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument, "{value:?}");
    }
}

#[test]
fn zero_remote_port_names_the_mapping() {
    let err = "8080:0".parse::<PortMapping>().unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    assert_eq!(
        err.messages,
        vec!["Remote port must not be 0 in \"8080:0\"".to_string()]
    );
}

#[test]
fn listen_addresses() {
    assert_eq!(
        "localhost".parse::<ListenAddress>().unwrap(),
        ListenAddress::Localhost
    );
    assert_eq!(
        "0.0.0.0".parse::<ListenAddress>().unwrap(),
        ListenAddress::Ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    );
    assert_eq!("::1".parse::<ListenAddress>().unwrap().to_string(), "::1");
    assert_eq!(
        "my-host".parse::<ListenAddress>().unwrap_err().code,
        Code::InvalidArgument
    );
}

#[test]
fn no_ports_means_no_forwarding() {
    assert_eq!(
        ForwardOptions::parse(&strings(&["0.0.0.0"]), &[]).unwrap(),
        None
    );
}

#[test]
fn comma_separated_values_are_split() {
    let options = ForwardOptions::parse(&strings(&["localhost,10.0.0.1"]), &strings(&["80, 9000:90"]))
        .unwrap()
        .unwrap();
    assert_eq!(
        options,
        ForwardOptions {
            addresses: vec![
                ListenAddress::Localhost,
                ListenAddress::Ip("10.0.0.1".parse().unwrap()),
            ],
            mappings: vec![
                PortMapping {
                    local: 80,
                    remote: 80
                },
                PortMapping {
                    local: 9000,
                    remote: 90
                },
            ],
        }
    );
}

#[test]
fn address_defaults_to_localhost() {
    let options = ForwardOptions::parse(&[], &strings(&["5432"])).unwrap().unwrap();
    assert_eq!(options.addresses, vec![ListenAddress::Localhost]);
}

#[debugpod_test]
async fn connections_are_tunneled_to_the_target_pod() -> Result<(), Error> {
    let cluster = Arc::new(FakeCluster::new(ScriptedExec::new(|_| output(0, ""))));
    let options = ForwardOptions {
        addresses: vec![ListenAddress::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST))],
        mappings: vec![PortMapping {
            local: 0,
            remote: 8080,
        }],
    };
    let forwarder = PortForwarder::start(
        cluster.clone() as Arc<dyn ClusterApi>,
        "default",
        "web",
        &options,
    )
    .await?;
    assert_eq!(forwarder.local_addrs().len(), 1);
    let local = forwarder.local_addrs()[0];
    assert_ne!(local.port(), 0);

    let mut client = TcpStream::connect(local).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"ping");

    assert_eq!(
        cluster.calls(),
        vec![Call::PortForward("web".to_string(), 8080)]
    );
    Ok(())
}

#[debugpod_test]
async fn busy_port_is_unavailable() -> Result<(), Error> {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let cluster = Arc::new(FakeCluster::new(ScriptedExec::new(|_| output(0, ""))));
    let options = ForwardOptions {
        addresses: vec![ListenAddress::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST))],
        mappings: vec![PortMapping {
            local: port,
            remote: 80,
        }],
    };
    let err = PortForwarder::start(cluster as Arc<dyn ClusterApi>, "default", "web", &options)
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::Unavailable);
    Ok(())
}
