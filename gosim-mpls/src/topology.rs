//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

// Topology oracle consulted by the nodes to compute next hops.
pub trait Topology {
    // Returns the first hop of the shortest path from `src` to `dst`.
    fn next_hop(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<Ipv4Addr>;

    // Returns the first hop of the best alternate path from `src` to `dst`
    // that doesn't go through `avoid`.
    fn next_hop_avoiding(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        avoid: Ipv4Addr,
    ) -> Option<Ipv4Addr>;

    // Returns whether `node` is where traffic towards `dst` leaves the MPLS
    // domain.
    fn is_exit_point_for(&self, node: Ipv4Addr, dst: Ipv4Addr) -> bool;
}

// Role a node plays in path computation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum NodeRole {
    // Traffic endpoint, never used for transit.
    Endpoint,
    // Label edge router.
    Edge,
    // Label switch router.
    Core,
}

// Snapshot of the live topology with shortest-path queries.
#[derive(Debug, Default)]
pub struct RoutingTable {
    vertices: BTreeMap<Ipv4Addr, Vertex>,
}

#[derive(Debug)]
struct Vertex {
    role: NodeRole,
    // Buffer occupancy percentage.
    congestion: u8,
    edges: Vec<Edge>,
}

#[derive(Debug)]
struct Edge {
    peer: Ipv4Addr,
    delay_ns: u64,
    weight: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Metric {
    Delay,
    Weighted,
}

// ===== impl RoutingTable =====

impl RoutingTable {
    pub fn add_node(
        &mut self,
        addr: Ipv4Addr,
        role: NodeRole,
        congestion: u8,
    ) {
        self.vertices.insert(
            addr,
            Vertex {
                role,
                congestion,
                edges: Vec::new(),
            },
        );
    }

    // Adds a bidirectional adjacency. Both ends must have been added.
    pub fn add_link(
        &mut self,
        a: Ipv4Addr,
        b: Ipv4Addr,
        delay_ns: u64,
        weight: u64,
    ) {
        if !self.vertices.contains_key(&a) || !self.vertices.contains_key(&b)
        {
            return;
        }
        for (from, to) in [(a, b), (b, a)] {
            if let Some(vertex) = self.vertices.get_mut(&from) {
                vertex.edges.push(Edge {
                    peer: to,
                    delay_ns,
                    weight,
                });
            }
        }
    }

    pub fn role(&self, addr: &Ipv4Addr) -> Option<NodeRole> {
        self.vertices.get(addr).map(|vertex| vertex.role)
    }

    fn edge_cost(&self, edge: &Edge, metric: Metric) -> u64 {
        match metric {
            Metric::Delay => edge.delay_ns.max(1),
            Metric::Weighted => {
                let congestion = self
                    .vertices
                    .get(&edge.peer)
                    .map(|vertex| u64::from(vertex.congestion))
                    .unwrap_or_default();
                (edge.weight.max(1)).saturating_mul(100 + congestion) / 100
            }
        }
    }

    // Computes the shortest-path tree rooted at `src` until `dst` is reached
    // and returns the first hop towards it.
    fn compute_first_hop(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        metric: Metric,
        avoid: Option<Ipv4Addr>,
    ) -> Option<Ipv4Addr> {
        if src == dst || !self.vertices.contains_key(&src) {
            return None;
        }

        // Initialize SPT and candidate list.
        let mut spt: BTreeMap<Ipv4Addr, Option<Ipv4Addr>> = BTreeMap::new();
        let mut cand_list: BTreeMap<(u64, Ipv4Addr), Option<Ipv4Addr>> =
            BTreeMap::new();
        cand_list.insert((0, src), None);

        // Main SPF loop.
        while let Some(((distance, addr), first_hop)) = cand_list.pop_first() {
            spt.insert(addr, first_hop);
            if addr == dst {
                return first_hop;
            }

            let Some(vertex) = self.vertices.get(&addr) else {
                continue;
            };
            // Traffic endpoints are leaves.
            if addr != src && vertex.role == NodeRole::Endpoint {
                continue;
            }

            for edge in &vertex.edges {
                // Check if the vertex is already on the shortest-path tree.
                if spt.contains_key(&edge.peer) {
                    continue;
                }

                // Skip the avoided node. When it is the destination itself,
                // only the direct adjacency from the root is skipped.
                if let Some(avoid) = avoid
                    && edge.peer == avoid
                    && (avoid != dst || addr == src)
                {
                    continue;
                }

                let distance =
                    distance.saturating_add(self.edge_cost(edge, metric));
                let first_hop = first_hop.or(Some(edge.peer));

                // Check if this vertex is already present on the candidate
                // list.
                if let Some((cand_key, _)) = cand_list
                    .iter()
                    .find(|((_, cand_addr), _)| *cand_addr == edge.peer)
                {
                    let cand_key = *cand_key;
                    match distance.cmp(&cand_key.0) {
                        Ordering::Less => {
                            cand_list.remove(&cand_key);
                        }
                        Ordering::Equal | Ordering::Greater => continue,
                    }
                }
                cand_list.insert((distance, edge.peer), first_hop);
            }
        }

        None
    }
}

impl Topology for RoutingTable {
    fn next_hop(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<Ipv4Addr> {
        self.compute_first_hop(src, dst, Metric::Delay, None)
    }

    fn next_hop_avoiding(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        avoid: Ipv4Addr,
    ) -> Option<Ipv4Addr> {
        self.compute_first_hop(src, dst, Metric::Weighted, Some(avoid))
    }

    fn is_exit_point_for(&self, node: Ipv4Addr, dst: Ipv4Addr) -> bool {
        if self.role(&node) != Some(NodeRole::Edge) {
            return false;
        }
        self.next_hop(node, dst)
            .is_some_and(|hop| self.role(&hop) == Some(NodeRole::Endpoint))
    }
}
