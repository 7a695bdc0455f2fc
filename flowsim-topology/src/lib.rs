// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The network topology model.
//!
//! A [`Topology`] is an immutable graph of hosts and switches joined by
//! links that carry bandwidth and delay attributes. It is built once, either
//! from a [DOT graph](crate::dot) or from a [switch layout](crate::layout),
//! and then shared read-only by everything that needs it.
//!
//! # Example
//!
//! ```rust
//! use flowsim_topology::Topology;
//!
//! let topology = Topology::from_dot_str(
//!     r#"graph lab {
//!         s1 [type=switch];
//!         h1 -- s1 -- h2 [bw=100, delay="5ms"];
//!     }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(topology.hosts().count(), 2);
//! assert_eq!(topology.switches().count(), 1);
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

pub mod dot;
pub mod layout;
pub mod paths;
pub mod units;

/// Default link bandwidth in Mbit/s.
pub const DEFAULT_BANDWIDTH_MBPS: f64 = 40.0;

/// Default one-way link delay in milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 15;

/// Dense node index, assigned in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Port number on a node. Ports are numbered from 1 in link declaration
/// order.
pub type PortNo = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Host,
    Switch,
}

/// The part a host plays in generated traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostRole {
    /// Originates requests.
    Client,
    /// Serves local requests.
    Server,
    /// Stands in for everything outside the emulated network.
    Gateway,
}

/// Application services a host can offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Service {
    Http,
    Ftp,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Service::Http => write!(f, "http"),
            Service::Ftp => write!(f, "ftp"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkAttrs {
    pub bandwidth_mbps: f64,
    pub delay_ms: u64,
}

impl Default for LinkAttrs {
    fn default() -> Self {
        Self {
            bandwidth_mbps: DEFAULT_BANDWIDTH_MBPS,
            delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Only meaningful for hosts.
    pub role: HostRole,
    pub services: BTreeSet<Service>,
    /// Time a switch takes to complete its control-plane handshake.
    pub connect_delay_ms: u64,
}

impl Node {
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.kind == NodeKind::Host
    }

    #[must_use]
    pub fn is_switch(&self) -> bool {
        self.kind == NodeKind::Switch
    }

    #[must_use]
    pub fn offers(&self, service: Service) -> bool {
        self.services.contains(&service)
    }
}

#[derive(Clone, Debug)]
pub struct Link {
    pub a: NodeId,
    pub b: NodeId,
    pub port_a: PortNo,
    pub port_b: PortNo,
    pub attrs: LinkAttrs,
}

/// One port of a node and what is on the other end of it.
#[derive(Clone, Copy, Debug)]
pub struct Port {
    pub port: PortNo,
    pub peer: NodeId,
    pub peer_port: PortNo,
    pub link: usize,
}

#[derive(Debug)]
pub enum TopologyError {
    Io(String),
    Parse { line: usize, msg: String },
    DuplicateNode(String),
    UnknownNode(String),
    Invalid(String),
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TopologyError::Io(msg) => write!(f, "{msg}"),
            TopologyError::Parse { line, msg } => write!(f, "line {line}: {msg}"),
            TopologyError::DuplicateNode(name) => write!(f, "Duplicate node '{name}'"),
            TopologyError::UnknownNode(name) => write!(f, "Unknown node '{name}'"),
            TopologyError::Invalid(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TopologyError {}

/// The immutable network graph.
#[derive(Debug)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<Link>,
    ports: Vec<Vec<Port>>,
    name_to_id: HashMap<String, NodeId>,
}

impl Topology {
    /// Load a topology, choosing the format from the file extension:
    /// `.dot`/`.gv` for DOT graphs, `.yaml`/`.yml` for switch layouts.
    pub fn from_file(path: &Path) -> Result<Self, TopologyError> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| TopologyError::Io(format!("Unable to read {}: {e}", path.display())))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("dot" | "gv") => Self::from_dot_str(&s),
            Some("yaml" | "yml") => Self::from_layout_str(&s),
            _ => Err(TopologyError::Invalid(format!(
                "{}: unknown topology format (expected .dot, .gv, .yaml or .yml)",
                path.display()
            ))),
        }
    }

    pub fn from_dot_str(s: &str) -> Result<Self, TopologyError> {
        dot::parse(s)
    }

    pub fn from_layout_str(s: &str) -> Result<Self, TopologyError> {
        let layout: layout::SwitchLayout = serde_yaml::from_str(s)
            .map_err(|e| TopologyError::Invalid(format!("serde_yaml::from_str failed: {e}")))?;
        layout.build()
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    #[must_use]
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.name_to_id.get(name).map(|id| &self.nodes[id.0])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_host())
    }

    pub fn switches(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_switch())
    }

    pub fn hosts_with_role(&self, role: HostRole) -> impl Iterator<Item = &Node> {
        self.hosts().filter(move |n| n.role == role)
    }

    /// The first gateway host, if any.
    #[must_use]
    pub fn gateway(&self) -> Option<&Node> {
        self.hosts_with_role(HostRole::Gateway).next()
    }

    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// All ports of a node in port-number order.
    #[must_use]
    pub fn ports(&self, id: NodeId) -> &[Port] {
        &self.ports[id.0]
    }

    /// The port of `from` whose link leads directly to `to`.
    ///
    /// With parallel links the lowest numbered port is used.
    #[must_use]
    pub fn port_towards(&self, from: NodeId, to: NodeId) -> Option<PortNo> {
        self.ports[from.0]
            .iter()
            .find(|p| p.peer == to)
            .map(|p| p.port)
    }

    /// What is attached to the given port of a node.
    #[must_use]
    pub fn peer(&self, node: NodeId, port: PortNo) -> Option<&Port> {
        self.ports[node.0].iter().find(|p| p.port == port)
    }

    /// Neighbouring node ids in ascending order, without duplicates.
    #[must_use]
    pub fn neighbours(&self, id: NodeId) -> Vec<NodeId> {
        let mut neighbours: Vec<NodeId> = self.ports[id.0].iter().map(|p| p.peer).collect();
        neighbours.sort_unstable();
        neighbours.dedup();
        neighbours
    }

    /// Attributes of the link between two adjacent nodes.
    #[must_use]
    pub fn link_between(&self, a: NodeId, b: NodeId) -> Option<&LinkAttrs> {
        self.ports[a.0]
            .iter()
            .find(|p| p.peer == b)
            .map(|p| &self.links[p.link].attrs)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{} hosts, {} switches, {} links",
            self.hosts().count(),
            self.switches().count(),
            self.links.len()
        )?;
        for link in &self.links {
            writeln!(
                f,
                "  {}:{} -- {}:{} ({} Mbit/s, {} ms)",
                self.name(link.a),
                link.port_a,
                self.name(link.b),
                link.port_b,
                link.attrs.bandwidth_mbps,
                link.attrs.delay_ms
            )?;
        }
        Ok(())
    }
}

/// Incrementally builds a [`Topology`], validating as it goes.
#[derive(Default)]
pub struct TopologyBuilder {
    nodes: Vec<Node>,
    links: Vec<Link>,
    ports: Vec<Vec<Port>>,
    name_to_id: HashMap<String, NodeId>,
}

impl TopologyBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, name: &str, kind: NodeKind, role: HostRole) -> Result<NodeId, TopologyError> {
        if name.is_empty() {
            return Err(TopologyError::Invalid("Node names must not be empty".to_string()));
        }
        if self.name_to_id.contains_key(name) {
            return Err(TopologyError::DuplicateNode(name.to_string()));
        }

        let id = NodeId(self.nodes.len());
        let services = match (kind, role) {
            (NodeKind::Host, HostRole::Server | HostRole::Gateway) => {
                BTreeSet::from([Service::Http, Service::Ftp])
            }
            _ => BTreeSet::new(),
        };
        self.nodes.push(Node {
            id,
            name: name.to_string(),
            kind,
            role,
            services,
            connect_delay_ms: 0,
        });
        self.ports.push(Vec::new());
        self.name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add a host. Servers and gateways offer every service by default.
    pub fn add_host(&mut self, name: &str, role: HostRole) -> Result<NodeId, TopologyError> {
        self.add_node(name, NodeKind::Host, role)
    }

    pub fn add_switch(&mut self, name: &str) -> Result<NodeId, TopologyError> {
        self.add_node(name, NodeKind::Switch, HostRole::Client)
    }

    /// Replace the services offered by a host.
    pub fn set_services(
        &mut self,
        id: NodeId,
        services: impl IntoIterator<Item = Service>,
    ) -> Result<(), TopologyError> {
        let node = self.node_mut(id)?;
        if !node.is_host() {
            return Err(TopologyError::Invalid(format!(
                "Switch '{}' cannot offer services",
                node.name
            )));
        }
        node.services = services.into_iter().collect();
        Ok(())
    }

    pub fn set_connect_delay(&mut self, id: NodeId, delay_ms: u64) -> Result<(), TopologyError> {
        let node = self.node_mut(id)?;
        if !node.is_switch() {
            return Err(TopologyError::Invalid(format!(
                "Host '{}' does not connect to the controller",
                node.name
            )));
        }
        node.connect_delay_ms = delay_ms;
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TopologyError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| TopologyError::UnknownNode(id.to_string()))
    }

    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.name_to_id.get(name).copied()
    }

    pub fn add_link(&mut self, a: NodeId, b: NodeId, attrs: LinkAttrs) -> Result<(), TopologyError> {
        if a.0 >= self.nodes.len() {
            return Err(TopologyError::UnknownNode(a.to_string()));
        }
        if b.0 >= self.nodes.len() {
            return Err(TopologyError::UnknownNode(b.to_string()));
        }
        if a == b {
            return Err(TopologyError::Invalid(format!(
                "Self-loop on '{}'",
                self.nodes[a.0].name
            )));
        }
        if !(attrs.bandwidth_mbps > 0.0) {
            return Err(TopologyError::Invalid(format!(
                "Link {} -- {} must have a positive bandwidth",
                self.nodes[a.0].name, self.nodes[b.0].name
            )));
        }

        let link = self.links.len();
        let port_a = self.ports[a.0].len() as PortNo + 1;
        let port_b = self.ports[b.0].len() as PortNo + 1;
        self.ports[a.0].push(Port {
            port: port_a,
            peer: b,
            peer_port: port_b,
            link,
        });
        self.ports[b.0].push(Port {
            port: port_b,
            peer: a,
            peer_port: port_a,
            link,
        });
        self.links.push(Link {
            a,
            b,
            port_a,
            port_b,
            attrs,
        });
        Ok(())
    }

    pub fn build(self) -> Result<Topology, TopologyError> {
        if !self.nodes.iter().any(Node::is_host) {
            return Err(TopologyError::Invalid(
                "Topology must contain at least one host".to_string(),
            ));
        }
        Ok(Topology {
            nodes: self.nodes,
            links: self.links,
            ports: self.ports,
            name_to_id: self.name_to_id,
        })
    }
}
