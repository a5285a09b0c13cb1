//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod active;
pub mod host;
pub mod ler;
pub mod lsr;

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::clock::TimerEvent;
use crate::collections::Links;
use crate::config::{NodeCfg, ProtocolCfg};
use crate::debug::Debug;
use crate::dmgp::Dmgp;
use crate::error::DiscardReason;
use crate::gpsrp::GpsrpRequests;
use crate::matrix::SwitchingMatrix;
use crate::node::host::{Receiver, Sender};
use crate::packet::{GpsrpMessageType, Packet, PacketKind, TldpMessageType};
use crate::port::{PortId, Ports};
use crate::topology::{NodeRole, Topology};

// Simulated node.
#[derive(Debug, EnumAsInner)]
pub enum Node {
    Sender(Sender),
    Receiver(Receiver),
    Ler(MplsNode),
    ActiveLer(MplsNode),
    Lsr(MplsNode),
    ActiveLsr(MplsNode),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Sender,
    Receiver,
    Ler,
    ActiveLer,
    Lsr,
    ActiveLsr,
}

// State shared by every node kind.
#[derive(Debug)]
pub struct NodeCore {
    pub name: String,
    pub addr: Ipv4Addr,
    pub ports: Ports,
    pub stats: NodeStats,
    // Processing cost of one octet.
    ns_per_octet: f64,
    // Processing time available in the current tick.
    available_ns: u64,
    // Consecutive ticks with queued work where nothing was switched.
    ticks_without_emitting: u64,
    // GoS packets dropped on arrival because the buffer was full.
    overflow: Vec<(PortId, Packet)>,
}

// Label switching node (LER, LSR and their active variants).
#[derive(Debug)]
pub struct MplsNode {
    pub core: NodeCore,
    pub matrix: SwitchingMatrix,
    pub protocol: ProtocolCfg,
    // Present on active nodes only.
    pub active: Option<ActiveState>,
}

// GoS state of active nodes.
#[derive(Debug)]
pub struct ActiveState {
    pub dmgp: Dmgp,
    pub gpsrp: GpsrpRequests,
}

// Per-tick execution context handed to the nodes.
pub struct NodeCtx<'a> {
    pub event: &'a TimerEvent,
    pub topology: &'a dyn Topology,
    pub links: &'a mut Links,
}

// What became of a dequeued packet.
#[derive(Debug)]
pub enum Disposition {
    // Forwarded to the next hop.
    Switched,
    // Processed locally.
    Consumed,
    // Waiting for a label; goes back to the head of its port.
    Requeue(Packet),
    Discard(DiscardReason),
}

// Node statistics.
#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct NodeStats {
    pub rx: BTreeMap<PacketKind, PacketCounters>,
    pub tx: BTreeMap<PacketKind, PacketCounters>,
    pub discards: BTreeMap<DiscardReason, u64>,
    pub tldp_rx: BTreeMap<TldpMessageType, u64>,
    pub tldp_tx: BTreeMap<TldpMessageType, u64>,
    pub gpsrp_rx: BTreeMap<GpsrpMessageType, u64>,
    pub gpsrp_tx: BTreeMap<GpsrpMessageType, u64>,
    pub switched: u64,
    pub retransmissions: u64,
    // Octets dequeued during the last tick and the budget it had.
    pub last_tick_octets: u64,
    pub last_tick_budget: u64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PacketCounters {
    pub packets: u64,
    pub octets: u64,
}

// Access to the common node state, used by the dequeue loop.
pub trait Processor {
    fn core(&mut self) -> &mut NodeCore;
}

// ===== impl Node =====

impl Node {
    // Builds a node from its configuration. Ports are attached later, when
    // the links are created.
    pub fn new(cfg: &NodeCfg, protocol: &ProtocolCfg) -> Node {
        let mpls = |active: bool| {
            let core = NodeCore::new(
                &cfg.name,
                cfg.address,
                cfg.rate_mbps,
                Ports::new(cfg.buffer_mb),
            );
            let active = active.then(|| ActiveState {
                dmgp: Dmgp::new(cfg.dmgp_kb),
                gpsrp: Default::default(),
            });
            MplsNode {
                core,
                matrix: SwitchingMatrix::new(cfg.address),
                protocol: protocol.clone(),
                active,
            }
        };

        match cfg.kind {
            NodeKind::Sender => Node::Sender(Sender::new(NodeCore::new(
                &cfg.name,
                cfg.address,
                cfg.rate_mbps,
                Ports::unbounded(),
            ))),
            NodeKind::Receiver => Node::Receiver(Receiver::new(NodeCore::new(
                &cfg.name,
                cfg.address,
                cfg.rate_mbps,
                Ports::unbounded(),
            ))),
            NodeKind::Ler => Node::Ler(mpls(false)),
            NodeKind::ActiveLer => Node::ActiveLer(mpls(true)),
            NodeKind::Lsr => Node::Lsr(mpls(false)),
            NodeKind::ActiveLsr => Node::ActiveLsr(mpls(true)),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Sender(_) => NodeKind::Sender,
            Node::Receiver(_) => NodeKind::Receiver,
            Node::Ler(_) => NodeKind::Ler,
            Node::ActiveLer(_) => NodeKind::ActiveLer,
            Node::Lsr(_) => NodeKind::Lsr,
            Node::ActiveLsr(_) => NodeKind::ActiveLsr,
        }
    }

    pub fn core(&self) -> &NodeCore {
        match self {
            Node::Sender(node) => &node.core,
            Node::Receiver(node) => &node.core,
            Node::Ler(node)
            | Node::ActiveLer(node)
            | Node::Lsr(node)
            | Node::ActiveLsr(node) => &node.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut NodeCore {
        match self {
            Node::Sender(node) => &mut node.core,
            Node::Receiver(node) => &mut node.core,
            Node::Ler(node)
            | Node::ActiveLer(node)
            | Node::Lsr(node)
            | Node::ActiveLsr(node) => &mut node.core,
        }
    }

    pub fn name(&self) -> &str {
        &self.core().name
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.core().addr
    }

    // Returns the label switching part of the node, if any.
    pub fn mpls(&self) -> Option<&MplsNode> {
        match self {
            Node::Sender(_) | Node::Receiver(_) => None,
            Node::Ler(node)
            | Node::ActiveLer(node)
            | Node::Lsr(node)
            | Node::ActiveLsr(node) => Some(node),
        }
    }

    pub fn mpls_mut(&mut self) -> Option<&mut MplsNode> {
        match self {
            Node::Sender(_) | Node::Receiver(_) => None,
            Node::Ler(node)
            | Node::ActiveLer(node)
            | Node::Lsr(node)
            | Node::ActiveLsr(node) => Some(node),
        }
    }

    pub fn role(&self) -> NodeRole {
        match self {
            Node::Sender(_) | Node::Receiver(_) => NodeRole::Endpoint,
            Node::Ler(_) | Node::ActiveLer(_) => NodeRole::Edge,
            Node::Lsr(_) | Node::ActiveLsr(_) => NodeRole::Core,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Node::ActiveLer(_) | Node::ActiveLsr(_))
    }

    // Congestion-based routing weight of the node.
    pub fn routing_weight(&self) -> u8 {
        self.core().ports.congestion_percent()
    }

    // Delivers a packet coming from a link into a port queue.
    pub fn receive(&mut self, port: PortId, packet: Packet) {
        let is_active = self.is_active();
        let core = self.core_mut();
        core.stats.rx_count(packet.kind(), packet.size());
        if let Err(packet) = core.ports.enqueue(port, packet) {
            core.discard(packet.kind(), DiscardReason::BufferOverflow);
            if is_active && packet.is_gos() {
                core.overflow.push((port, packet));
            }
        }
    }

    // Processes one clock tick.
    pub fn on_tick(&mut self, ctx: &mut NodeCtx<'_>) {
        match self {
            Node::Sender(node) => node.on_tick(ctx),
            Node::Receiver(node) => node.on_tick(ctx),
            Node::Ler(node) | Node::ActiveLer(node) => {
                node.on_tick(ctx, ler::process_packet)
            }
            Node::Lsr(node) | Node::ActiveLsr(node) => {
                node.on_tick(ctx, lsr::process_packet)
            }
        }
    }
}

// ===== impl NodeKind =====

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Sender => write!(f, "sender"),
            NodeKind::Receiver => write!(f, "receiver"),
            NodeKind::Ler => write!(f, "ler"),
            NodeKind::ActiveLer => write!(f, "active-ler"),
            NodeKind::Lsr => write!(f, "lsr"),
            NodeKind::ActiveLsr => write!(f, "active-lsr"),
        }
    }
}

// ===== impl NodeCore =====

impl NodeCore {
    pub fn new(
        name: &str,
        addr: Ipv4Addr,
        rate_mbps: u32,
        ports: Ports,
    ) -> NodeCore {
        // 1 Mbps moves one bit per microsecond.
        let ns_per_octet = 8_000.0 / f64::from(rate_mbps.max(1));
        NodeCore {
            name: name.to_owned(),
            addr,
            ports,
            stats: Default::default(),
            ns_per_octet,
            available_ns: 0,
            ticks_without_emitting: 0,
            overflow: Vec::new(),
        }
    }

    pub fn ns_per_octet(&self) -> f64 {
        self.ns_per_octet
    }

    pub fn available_ns(&self) -> u64 {
        self.available_ns
    }

    pub fn ticks_without_emitting(&self) -> u64 {
        self.ticks_without_emitting
    }

    // Grants the tick budget and returns how many octets it covers.
    //
    // Unspent time carries over only while there is queued work.
    pub(crate) fn start_tick(&mut self, event: &TimerEvent) -> u64 {
        if self.ports.has_queued() {
            self.available_ns =
                self.available_ns.saturating_add(event.tick_duration_ns);
        } else {
            self.available_ns = event.tick_duration_ns;
            self.ticks_without_emitting = 0;
        }
        (self.available_ns as f64 / self.ns_per_octet).floor() as u64
    }

    // Debits the processing cost of the octets consumed in this tick.
    pub(crate) fn end_tick(
        &mut self,
        used_octets: u64,
        max_octets: u64,
        switched: bool,
    ) {
        let cost = (used_octets as f64 * self.ns_per_octet).ceil() as u64;
        self.available_ns = self.available_ns.saturating_sub(cost);
        self.stats.last_tick_octets = used_octets;
        self.stats.last_tick_budget = max_octets;
        if switched {
            self.ticks_without_emitting = 0;
        } else if used_octets > 0 || self.ports.has_queued() {
            self.ticks_without_emitting += 1;
        }
    }

    // Sends a packet out the given port.
    pub(crate) fn send(
        &mut self,
        links: &mut Links,
        port_id: PortId,
        packet: Packet,
    ) -> bool {
        let kind = packet.kind();
        let size = packet.size();
        let Some(port) = self.ports.get(port_id) else {
            self.discard(kind, DiscardReason::NoRoute);
            return false;
        };

        match links[port.link_idx].send(packet, self.addr) {
            Ok(()) => {
                self.stats.tx_count(kind, size);
                true
            }
            Err(_) => {
                self.discard(kind, DiscardReason::LinkBroken);
                false
            }
        }
    }

    // Sends a packet through the next hop towards the given destination.
    pub(crate) fn send_towards(
        &mut self,
        ctx: &mut NodeCtx<'_>,
        destination: Ipv4Addr,
        packet: Packet,
    ) -> bool {
        match self.port_towards(ctx.topology, destination) {
            Some(port) => self.send(ctx.links, port, packet),
            None => {
                self.discard(packet.kind(), DiscardReason::NoRoute);
                false
            }
        }
    }

    // Returns the port leading to the next hop towards the destination.
    pub fn port_towards(
        &self,
        topology: &dyn Topology,
        destination: Ipv4Addr,
    ) -> Option<PortId> {
        topology
            .next_hop(self.addr, destination)
            .and_then(|hop| self.ports.port_towards(hop))
    }

    // Returns whether the link behind the given port is up.
    pub fn is_port_live(&self, links: &Links, port_id: PortId) -> bool {
        self.ports
            .get(port_id)
            .is_some_and(|port| !links[port.link_idx].is_broken())
    }

    pub(crate) fn discard(&mut self, kind: PacketKind, reason: DiscardReason) {
        Debug::PacketDiscard(&self.addr, &kind, &reason).log();
        *self.stats.discards.entry(reason).or_default() += 1;
    }

    pub(crate) fn take_overflow(&mut self) -> Vec<(PortId, Packet)> {
        std::mem::take(&mut self.overflow)
    }
}

// ===== impl MplsNode =====

impl MplsNode {
    pub fn addr(&self) -> Ipv4Addr {
        self.core.addr
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    // Sends a switched packet out the given port.
    pub(crate) fn transmit(
        &mut self,
        links: &mut Links,
        port: PortId,
        mut packet: Packet,
    ) -> Disposition {
        active::forward_gos(self, &mut packet);
        if self.core.send(links, port, packet) {
            Disposition::Switched
        } else {
            Disposition::Consumed
        }
    }

    fn on_tick<'a>(
        &mut self,
        ctx: &mut NodeCtx<'a>,
        process: fn(
            &mut MplsNode,
            &mut NodeCtx<'a>,
            PortId,
            Packet,
        ) -> Disposition,
    ) {
        // Ask for the retransmission of GoS packets lost to overflow.
        active::process_overflow(self, ctx);

        // Check the links behind every switching entry.
        crate::failover::connectivity_check(self, ctx);
        active::connectivity_check(self, ctx);

        // Retransmission timers.
        crate::tldp::process_timers(self, ctx);
        active::process_timers(self, ctx);

        // Process queued packets within the tick budget.
        dequeue_loop(self, ctx, process);
    }
}

impl Processor for MplsNode {
    fn core(&mut self) -> &mut NodeCore {
        &mut self.core
    }
}

// ===== impl NodeStats =====

impl NodeStats {
    pub(crate) fn rx_count(&mut self, kind: PacketKind, octets: u64) {
        let counters = self.rx.entry(kind).or_default();
        counters.packets += 1;
        counters.octets += octets;
    }

    pub(crate) fn tx_count(&mut self, kind: PacketKind, octets: u64) {
        let counters = self.tx.entry(kind).or_default();
        counters.packets += 1;
        counters.octets += octets;
    }

    pub fn discards(&self, reason: DiscardReason) -> u64 {
        self.discards.get(&reason).copied().unwrap_or_default()
    }

    pub fn total_discards(&self) -> u64 {
        self.discards.values().sum()
    }

    pub fn tx_packets(&self, kind: PacketKind) -> u64 {
        self.tx.get(&kind).map(|c| c.packets).unwrap_or_default()
    }

    pub fn rx_packets(&self, kind: PacketKind) -> u64 {
        self.rx.get(&kind).map(|c| c.packets).unwrap_or_default()
    }
}

// ===== global functions =====

// Drains the port queues in round-robin order within the tick budget.
//
// The loop stops at the first packet that doesn't fit in the remaining
// budget. A packet handed back for requeueing blocks its port until the next
// tick.
pub(crate) fn dequeue_loop<'a, N, F>(
    node: &mut N,
    ctx: &mut NodeCtx<'a>,
    mut process: F,
) where
    N: Processor,
    F: FnMut(&mut N, &mut NodeCtx<'a>, PortId, Packet) -> Disposition,
{
    let max_octets = node.core().start_tick(ctx.event);
    let mut used_octets = 0;
    let mut blocked = BTreeSet::new();
    let mut switched = false;

    while let Some((port, packet)) = node
        .core()
        .ports
        .dequeue_within(max_octets - used_octets, &blocked)
    {
        used_octets += packet.size();
        let kind = packet.kind();
        match process(node, ctx, port, packet) {
            Disposition::Switched => {
                switched = true;
                node.core().stats.switched += 1;
            }
            Disposition::Consumed => {}
            Disposition::Requeue(packet) => {
                node.core().ports.requeue(port, packet);
                blocked.insert(port);
            }
            Disposition::Discard(reason) => {
                node.core().discard(kind, reason);
            }
        }
    }

    node.core().end_tick(used_octets, max_octets, switched);
}
