//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use gosim_mpls::link::{LinkKind, LinkStats};
use gosim_mpls::node::host::ReceiverStats;
use gosim_mpls::node::{NodeKind, NodeStats};
use gosim_mpls::packet::PacketKind;
use gosim_mpls::scenario::Scenario;
use serde::Serialize;
use tracing::info;

// Final statistics of a simulation run.
#[derive(Debug, Serialize)]
pub(crate) struct Report<'a> {
    time_ns: u64,
    ticks: u64,
    nodes: Vec<NodeReport<'a>>,
    links: Vec<LinkReport<'a>>,
}

#[derive(Debug, Serialize)]
struct NodeReport<'a> {
    name: &'a str,
    kind: NodeKind,
    address: Ipv4Addr,
    entries: usize,
    labels_in_use: usize,
    buffer_occupancy: u64,
    stats: &'a NodeStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    received: Option<&'a ReceiverStats>,
}

#[derive(Debug, Serialize)]
struct LinkReport<'a> {
    ends: [Ipv4Addr; 2],
    kind: LinkKind,
    broken: bool,
    lsp_count: u32,
    backup_lsp_count: u32,
    stats: &'a LinkStats,
}

// ===== impl Report =====

impl<'a> Report<'a> {
    pub(crate) fn new(scenario: &'a Scenario, ticks: u64) -> Report<'a> {
        let nodes = scenario
            .nodes
            .iter()
            .map(|node| NodeReport {
                name: node.name(),
                kind: node.kind(),
                address: node.addr(),
                entries: node.mpls().map_or(0, |node| node.matrix.len()),
                labels_in_use: node
                    .mpls()
                    .map_or(0, |node| node.matrix.labels_in_use()),
                buffer_occupancy: node.core().ports.occupancy(),
                stats: &node.core().stats,
                received: node.as_receiver().map(|node| &node.stats),
            })
            .collect();
        let links = scenario
            .links
            .iter()
            .map(|link| LinkReport {
                ends: [link.ends[0].addr, link.ends[1].addr],
                kind: link.kind,
                broken: link.is_broken(),
                lsp_count: link.lsp_count(),
                backup_lsp_count: link.backup_lsp_count(),
                stats: &link.stats,
            })
            .collect();

        Report {
            time_ns: scenario.clock.current_ns(),
            ticks,
            nodes,
            links,
        }
    }

    // Logs a one-line summary per node.
    pub(crate) fn log(&self) {
        for node in &self.nodes {
            let discards = node.stats.total_discards();
            match node.received {
                Some(received) => info!(
                    name = %node.name,
                    packets = %received.packets,
                    octets = %received.octets,
                    gos_packets = %received.gos_packets,
                    duplicates = %received.duplicates,
                    "delivery summary"
                ),
                None => info!(
                    name = %node.name,
                    kind = %node.kind,
                    entries = %node.entries,
                    labels = %node.labels_in_use,
                    tldp_tx = %node.stats.tx_packets(PacketKind::Tldp),
                    tldp_rx = %node.stats.rx_packets(PacketKind::Tldp),
                    gpsrp_tx = %node.stats.tx_packets(PacketKind::Gpsrp),
                    gpsrp_rx = %node.stats.rx_packets(PacketKind::Gpsrp),
                    switched = %node.stats.switched,
                    retransmissions = %node.stats.retransmissions,
                    %discards,
                    "node summary"
                ),
            }
        }
    }
}
