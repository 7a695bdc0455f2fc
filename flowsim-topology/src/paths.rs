// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Shortest path search between hosts.
//!
//! Only switches forward traffic, so a path is a host, zero or more
//! switches and a host. Among the paths with the fewest hops the
//! lexicographically smallest sequence of node ids is chosen. Both
//! directions between a pair of hosts use the same links: the path is
//! always computed from the lower id endpoint and reversed when needed.

use std::collections::VecDeque;

use crate::{NodeId, Topology};

/// Hop distances to `dst` from every node able to reach it through
/// switches only. Unreachable nodes are `None`.
#[must_use]
pub fn hops_to(topology: &Topology, dst: NodeId) -> Vec<Option<usize>> {
    let mut dist = vec![None; topology.num_nodes()];
    dist[dst.0] = Some(0);

    let mut frontier = VecDeque::from([dst]);
    while let Some(node) = frontier.pop_front() {
        if node != dst && !topology.node(node).is_switch() {
            continue;
        }
        let next = dist[node.0].map_or(0, |d| d + 1);
        for neighbour in topology.neighbours(node) {
            if dist[neighbour.0].is_none() {
                dist[neighbour.0] = Some(next);
                frontier.push_back(neighbour);
            }
        }
    }
    dist
}

fn walk(topology: &Topology, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
    let dist = hops_to(topology, dst);
    let mut remaining = dist[src.0]?;

    let mut path = vec![src];
    let mut current = src;
    while remaining > 0 {
        remaining -= 1;
        // neighbours() is sorted so the first match has the lowest id.
        current = topology.neighbours(current).into_iter().find(|n| {
            dist[n.0] == Some(remaining) && (*n == dst || topology.node(*n).is_switch())
        })?;
        path.push(current);
    }
    Some(path)
}

/// The path from `src` to `dst`, including both endpoints.
///
/// Returns `None` when the two nodes are not connected through switches.
#[must_use]
pub fn shortest_path(topology: &Topology, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
    if src == dst {
        return Some(vec![src]);
    }
    if src < dst {
        walk(topology, src, dst)
    } else {
        let mut path = walk(topology, dst, src)?;
        path.reverse();
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostRole, LinkAttrs, TopologyBuilder};

    /// h0 connects to s1 and s2, both of which reach h3.
    fn diamond() -> Topology {
        let mut builder = TopologyBuilder::new();
        let h0 = builder.add_host("h0", HostRole::Client).unwrap();
        let s1 = builder.add_switch("s1").unwrap();
        let s2 = builder.add_switch("s2").unwrap();
        let h3 = builder.add_host("h3", HostRole::Server).unwrap();
        for (a, b) in [(h0, s2), (h0, s1), (s1, h3), (s2, h3)] {
            builder.add_link(a, b, LinkAttrs::default()).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn lowest_id_path_wins() {
        let topology = diamond();
        assert_eq!(
            shortest_path(&topology, NodeId(0), NodeId(3)),
            Some(vec![NodeId(0), NodeId(1), NodeId(3)])
        );
        assert_eq!(
            shortest_path(&topology, NodeId(3), NodeId(0)),
            Some(vec![NodeId(3), NodeId(1), NodeId(0)])
        );
    }

    #[test]
    fn hosts_do_not_forward() {
        let mut builder = TopologyBuilder::new();
        let a = builder.add_host("ha", HostRole::Client).unwrap();
        let b = builder.add_host("hb", HostRole::Client).unwrap();
        let c = builder.add_host("hc", HostRole::Client).unwrap();
        let s = builder.add_switch("s0").unwrap();
        builder.add_link(a, s, LinkAttrs::default()).unwrap();
        builder.add_link(b, s, LinkAttrs::default()).unwrap();
        builder.add_link(b, c, LinkAttrs::default()).unwrap();
        let topology = builder.build().unwrap();

        assert_eq!(shortest_path(&topology, a, b), Some(vec![a, s, b]));
        assert_eq!(shortest_path(&topology, a, c), None);
        // Directly connected hosts are one hop apart.
        assert_eq!(shortest_path(&topology, b, c), Some(vec![b, c]));
    }
}
