//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};

use gosim_utils::id::IdGenerator;
use serde::{Deserialize, Serialize};

use crate::error::DiscardReason;
use crate::node::{Disposition, NodeCore, NodeCtx, Processor, dequeue_loop};
use crate::packet::Packet;
use crate::traffic::TrafficGenerator;

// Traffic source outside the MPLS domain.
#[derive(Debug)]
pub struct Sender {
    pub core: NodeCore,
    generators: Vec<TrafficGenerator>,
    // GoS packet identifiers, shared by every flow of this sender.
    ids: IdGenerator,
}

// Traffic sink outside the MPLS domain.
#[derive(Debug)]
pub struct Receiver {
    pub core: NodeCore,
    pub stats: ReceiverStats,
}

#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct ReceiverStats {
    pub packets: u64,
    pub octets: u64,
    pub gos_packets: u64,
    // GoS packets received more than once.
    pub duplicates: u64,
    pub per_flow: BTreeMap<u32, FlowStats>,
    #[serde(skip)]
    seen: BTreeSet<(u32, u32)>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct FlowStats {
    pub packets: u64,
    pub octets: u64,
}

// ===== impl Sender =====

impl Sender {
    pub fn new(core: NodeCore) -> Sender {
        Sender {
            core,
            generators: Vec::new(),
            ids: IdGenerator::new(),
        }
    }

    pub fn add_generator(&mut self, generator: TrafficGenerator) {
        self.generators.push(generator);
    }

    pub fn generators(&self) -> &[TrafficGenerator] {
        &self.generators
    }

    pub(crate) fn on_tick(&mut self, ctx: &mut NodeCtx<'_>) {
        // Anything sent back to a source is dropped.
        dequeue_loop(self, ctx, |_, _, _, _| {
            Disposition::Discard(DiscardReason::UnsupportedPacket)
        });

        let Some(port) = self.core.ports.iter().next().map(|port| port.id)
        else {
            return;
        };
        let origin = self.core.addr;
        for generator in &mut self.generators {
            for packet in generator.on_tick(ctx.event, origin, &mut self.ids) {
                self.core.send(ctx.links, port, packet.into());
            }
        }
    }
}

impl Processor for Sender {
    fn core(&mut self) -> &mut NodeCore {
        &mut self.core
    }
}

// ===== impl Receiver =====

impl Receiver {
    pub fn new(core: NodeCore) -> Receiver {
        Receiver {
            core,
            stats: Default::default(),
        }
    }

    pub(crate) fn on_tick(&mut self, ctx: &mut NodeCtx<'_>) {
        dequeue_loop(self, ctx, |node, _, _, packet| node.consume(&packet));
    }

    fn consume(&mut self, packet: &Packet) -> Disposition {
        let Packet::Ipv4(packet) = packet else {
            return Disposition::Discard(DiscardReason::UnsupportedPacket);
        };

        let flow_id = packet.header.flow_id();
        let octets = packet.size();
        self.stats.packets += 1;
        self.stats.octets += octets;
        let flow = self.stats.per_flow.entry(flow_id).or_default();
        flow.packets += 1;
        flow.octets += octets;
        if let Some(packet_id) = packet.header.packet_id() {
            self.stats.gos_packets += 1;
            if !self.stats.seen.insert((flow_id, packet_id)) {
                self.stats.duplicates += 1;
            }
        }
        Disposition::Consumed
    }
}

impl Processor for Receiver {
    fn core(&mut self) -> &mut NodeCore {
        &mut self.core
    }
}
