// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::io::Write;

use flowsim_topology::paths::shortest_path;
use flowsim_topology::{HostRole, Topology, TopologyError};

const LINE: &str = "
switches: [[1], [2], []]
hosts: [2, 1, 1]
servers: [h2_0]
gateway: true
";

#[test]
fn layout_names_and_roles() {
    let topology = Topology::from_layout_str(LINE).unwrap();

    let names: Vec<&str> = topology.nodes().map(|n| n.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["s0", "s1", "s2", "h0_0", "h0_1", "h1_0", "h2_0", "nat0"]
    );
    assert_eq!(topology.links().len(), 2 + 4 + 1);
    assert_eq!(
        topology.node_by_name("h2_0").unwrap().role,
        HostRole::Server
    );
    assert_eq!(topology.gateway().unwrap().name, "nat0");
    assert_eq!(
        topology.hosts_with_role(HostRole::Client).count(),
        3,
        "every host not listed as a server is a client"
    );
}

#[test]
fn layout_paths_follow_the_switch_chain() {
    let topology = Topology::from_layout_str(LINE).unwrap();
    let id = |name: &str| topology.node_by_name(name).unwrap().id;

    let path = shortest_path(&topology, id("h0_0"), id("h2_0")).unwrap();
    let names: Vec<&str> = path.iter().map(|n| topology.name(*n)).collect();
    assert_eq!(names, vec!["h0_0", "s0", "s1", "s2", "h2_0"]);
}

#[test]
fn unknown_server_is_rejected() {
    let result = Topology::from_layout_str("switches: [[]]\nhosts: [1]\nservers: [h9_9]\n");
    assert!(matches!(result, Err(TopologyError::UnknownNode(name)) if name == "h9_9"));
}

#[test]
fn malformed_yaml_is_rejected() {
    assert!(Topology::from_layout_str("switches: nope").is_err());
    assert!(Topology::from_layout_str("hosts: [1]").is_err());
}

#[test]
fn format_follows_extension() {
    let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    yaml.write_all(LINE.as_bytes()).unwrap();
    let topology = Topology::from_file(yaml.path()).unwrap();
    assert_eq!(topology.switches().count(), 3);

    let mut dot = tempfile::Builder::new().suffix(".dot").tempfile().unwrap();
    dot.write_all(b"graph { h1 -- s1 -- h2 }").unwrap();
    let topology = Topology::from_file(dot.path()).unwrap();
    assert_eq!(topology.hosts().count(), 2);

    let mut other = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    other.write_all(b"graph { h1 -- s1 }").unwrap();
    assert!(matches!(
        Topology::from_file(other.path()),
        Err(TopologyError::Invalid(_))
    ));

    assert!(matches!(
        Topology::from_file(std::path::Path::new("/no/such/topology.dot")),
        Err(TopologyError::Io(_))
    ));
}
