// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Build a topology from a compact switch layout.
//!
//! ```yaml
//! switches: [[1], [2], []]   # adjacency list between switches
//! hosts: [2, 1, 1]           # number of hosts attached to each switch
//! servers: [h2_0]            # optional, hosts acting as servers
//! gateway: true              # optional, adds gateway host nat0 on s0
//! ```
//!
//! Switch `i` is named `s{i}` and the `h`-th host on it `h{i}_{h}`. Every
//! link gets the default bandwidth and delay. An adjacency listed in both
//! directions produces a single link.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{HostRole, LinkAttrs, NodeId, Topology, TopologyBuilder, TopologyError};

pub const GATEWAY_NAME: &str = "nat0";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SwitchLayout {
    pub switches: Option<Vec<Vec<usize>>>,
    pub hosts: Option<Vec<usize>>,
    pub servers: Option<Vec<String>>,
    pub gateway: Option<bool>,
}

impl SwitchLayout {
    pub fn build(&self) -> Result<Topology, TopologyError> {
        let switches = self.switches.clone().unwrap_or_default();
        let hosts = self.hosts.clone().unwrap_or_default();
        if switches.is_empty() {
            return Err(TopologyError::Invalid(
                "Switch layout must define at least one switch".to_string(),
            ));
        }
        if hosts.len() > switches.len() {
            return Err(TopologyError::Invalid(format!(
                "{} host counts given for {} switches",
                hosts.len(),
                switches.len()
            )));
        }

        let servers: BTreeSet<&str> = self
            .servers
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();

        let mut builder = TopologyBuilder::new();
        let mut switch_ids: Vec<NodeId> = Vec::with_capacity(switches.len());
        for i in 0..switches.len() {
            switch_ids.push(builder.add_switch(&format!("s{i}"))?);
        }

        let mut linked = BTreeSet::new();
        for (i, neighbours) in switches.iter().enumerate() {
            for &j in neighbours {
                if j >= switches.len() {
                    return Err(TopologyError::UnknownNode(format!("s{j}")));
                }
                if linked.insert((i.min(j), i.max(j))) {
                    builder.add_link(switch_ids[i], switch_ids[j], LinkAttrs::default())?;
                }
            }
        }

        let mut found_servers = BTreeSet::new();
        for (i, &count) in hosts.iter().enumerate() {
            for h in 0..count {
                let name = format!("h{i}_{h}");
                let role = if servers.contains(name.as_str()) {
                    found_servers.insert(name.clone());
                    HostRole::Server
                } else {
                    HostRole::Client
                };
                let host = builder.add_host(&name, role)?;
                builder.add_link(switch_ids[i], host, LinkAttrs::default())?;
            }
        }

        if let Some(missing) = servers.iter().find(|s| !found_servers.contains(**s)) {
            return Err(TopologyError::UnknownNode((*missing).to_string()));
        }

        if self.gateway.unwrap_or(false) {
            let gateway = builder.add_host(GATEWAY_NAME, HostRole::Gateway)?;
            builder.add_link(switch_ids[0], gateway, LinkAttrs::default())?;
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutual_adjacency_is_one_link() {
        let layout = SwitchLayout {
            switches: Some(vec![vec![1], vec![0]]),
            hosts: Some(vec![1, 1]),
            ..Default::default()
        };
        let topology = layout.build().unwrap();
        assert_eq!(topology.links().len(), 3);
    }

    #[test]
    fn unknown_switch_index() {
        let layout = SwitchLayout {
            switches: Some(vec![vec![3]]),
            hosts: Some(vec![1]),
            ..Default::default()
        };
        assert!(matches!(
            layout.build(),
            Err(TopologyError::UnknownNode(name)) if name == "s3"
        ));
    }
}
