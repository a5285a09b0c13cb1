//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::clock::TimerEvent;
use crate::collections::{LinkId, NodeIndex};
use crate::debug::Debug;
use crate::packet::Packet;
use crate::port::PortId;

// Point-to-point link between two node ports.
#[derive(Debug)]
pub struct Link {
    pub id: LinkId,
    pub kind: LinkKind,
    pub ends: [LinkEnd; 2],
    // Propagation delay in nanoseconds.
    pub delay_ns: u64,
    broken: bool,
    // Packets in transit, in insertion order.
    in_flight: VecDeque<InFlight>,
    // Packets that reached the far end and await collection.
    delivered: Vec<(usize, Packet)>,
    // Number of switching entries using this link for an LSP.
    lsp_count: u32,
    // Number of switching entries using this link for a backup LSP.
    backup_lsp_count: u32,
    pub stats: LinkStats,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    // Both ends are MPLS nodes.
    Internal,
    // One end is a traffic endpoint.
    External,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkEnd {
    pub node_idx: NodeIndex,
    pub addr: Ipv4Addr,
    pub port: PortId,
}

#[derive(Debug)]
pub struct InFlight {
    pub packet: Packet,
    pub remaining_ns: u64,
    // Index of the destination end.
    pub to: usize,
}

#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct LinkStats {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
}

// ===== impl Link =====

impl Link {
    pub fn new(
        id: LinkId,
        kind: LinkKind,
        ends: [LinkEnd; 2],
        delay_ns: u64,
    ) -> Link {
        Link {
            id,
            kind,
            ends,
            delay_ns,
            broken: false,
            in_flight: Default::default(),
            delivered: Default::default(),
            lsp_count: 0,
            backup_lsp_count: 0,
            stats: Default::default(),
        }
    }

    // Returns the ordered pair of endpoint addresses.
    pub(crate) fn ends_key(&self) -> (Ipv4Addr, Ipv4Addr) {
        let (a, b) = (self.ends[0].addr, self.ends[1].addr);
        (a.min(b), a.max(b))
    }

    // Returns the end opposite to the given address.
    pub fn peer_of(&self, addr: Ipv4Addr) -> Option<&LinkEnd> {
        self.end_index(addr).map(|idx| &self.ends[1 - idx])
    }

    fn end_index(&self, addr: Ipv4Addr) -> Option<usize> {
        self.ends.iter().position(|end| end.addr == addr)
    }

    // Puts a packet on the link towards the end opposite to `from`.
    //
    // The packet is handed back if the link is broken.
    pub fn send(
        &mut self,
        packet: Packet,
        from: Ipv4Addr,
    ) -> Result<(), Packet> {
        if self.broken {
            self.stats.lost += 1;
            return Err(packet);
        }
        let Some(idx) = self.end_index(from) else {
            return Err(packet);
        };

        self.stats.sent += 1;
        self.in_flight.push_back(InFlight {
            packet,
            remaining_ns: self.delay_ns,
            to: 1 - idx,
        });
        Ok(())
    }

    // Advances every in-flight packet by the tick duration.
    pub fn on_tick(&mut self, event: &TimerEvent) {
        if self.broken {
            return;
        }

        let mut in_transit = VecDeque::with_capacity(self.in_flight.len());
        for mut pkt in self.in_flight.drain(..) {
            pkt.remaining_ns =
                pkt.remaining_ns.saturating_sub(event.tick_duration_ns);
            if pkt.remaining_ns == 0 {
                self.delivered.push((pkt.to, pkt.packet));
            } else {
                in_transit.push_back(pkt);
            }
        }
        self.in_flight = in_transit;
    }

    // Hands over the packets that reached the far end of the link.
    pub(crate) fn take_delivered(&mut self) -> Vec<(LinkEnd, Packet)> {
        self.stats.delivered += self.delivered.len() as u64;
        let ends = self.ends;
        self.delivered
            .drain(..)
            .map(|(to, packet)| (ends[to], packet))
            .collect()
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &'_ InFlight> + '_ {
        self.in_flight.iter()
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    // Marks the link as broken, losing every packet in transit.
    pub fn break_link(&mut self) {
        if self.broken {
            return;
        }
        Debug::LinkBreak(self.id, &self.ends[0].addr, &self.ends[1].addr)
            .log();

        self.broken = true;
        self.stats.lost +=
            (self.in_flight.len() + self.delivered.len()) as u64;
        self.in_flight.clear();
        self.delivered.clear();
    }

    pub fn restore(&mut self) {
        if !self.broken {
            return;
        }
        Debug::LinkRestore(self.id, &self.ends[0].addr, &self.ends[1].addr)
            .log();

        self.broken = false;
    }

    pub fn lsp_count(&self) -> u32 {
        self.lsp_count
    }

    pub fn backup_lsp_count(&self) -> u32 {
        self.backup_lsp_count
    }

    pub(crate) fn link_lsp(&mut self) {
        self.lsp_count += 1;
    }

    pub(crate) fn unlink_lsp(&mut self) {
        self.lsp_count = self.lsp_count.saturating_sub(1);
    }

    pub(crate) fn link_backup_lsp(&mut self) {
        self.backup_lsp_count += 1;
    }

    pub(crate) fn unlink_backup_lsp(&mut self) {
        self.backup_lsp_count = self.backup_lsp_count.saturating_sub(1);
    }

    // Promotes one backup LSP into an LSP after a switchover.
    pub(crate) fn backup_lsp_to_lsp(&mut self) {
        self.unlink_backup_lsp();
        self.link_lsp();
    }

    // Routing weight of the link, growing with the number of LSPs it carries.
    pub fn routing_weight(&self) -> u64 {
        let load = u64::from(self.lsp_count) * 10
            + u64::from(self.backup_lsp_count) * 5;
        self.delay_ns + self.delay_ns.saturating_mul(load) / 100
    }
}

// ===== impl LinkKind =====

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkKind::Internal => write!(f, "internal"),
            LinkKind::External => write!(f, "external"),
        }
    }
}
