//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeSet, VecDeque};
use std::net::Ipv4Addr;

use crate::collections::LinkIndex;
use crate::packet::Packet;

pub type PortId = usize;

// Node port attached to one end of a link.
#[derive(Debug)]
pub struct Port {
    pub id: PortId,
    pub link_idx: LinkIndex,
    // Address of the node on the other end of the link.
    pub peer: Ipv4Addr,
    queue: VecDeque<Packet>,
}

// Set of ports of a node, sharing a single buffer.
#[derive(Debug)]
pub struct Ports {
    ports: Vec<Port>,
    // Buffer capacity in octets.
    capacity: u64,
    // Octets currently queued across all ports.
    occupancy: u64,
    // Next port to be visited by the round-robin scheduler.
    rr_next: PortId,
}

// ===== impl Ports =====

impl Ports {
    const OCTETS_PER_MB: u64 = 1024 * 1024;

    pub fn new(buffer_mb: u32) -> Ports {
        Ports::with_capacity(u64::from(buffer_mb) * Self::OCTETS_PER_MB)
    }

    // Port set without buffer limit, used by traffic endpoints.
    pub fn unbounded() -> Ports {
        Ports::with_capacity(u64::MAX)
    }

    fn with_capacity(capacity: u64) -> Ports {
        Ports {
            ports: Vec::new(),
            capacity,
            occupancy: 0,
            rr_next: 0,
        }
    }

    // Attaches a new port. Port IDs are assigned sequentially.
    pub(crate) fn add(
        &mut self,
        link_idx: LinkIndex,
        peer: Ipv4Addr,
    ) -> PortId {
        let id = self.ports.len();
        self.ports.push(Port {
            id,
            link_idx,
            peer,
            queue: Default::default(),
        });
        id
    }

    pub fn get(&self, port_id: PortId) -> Option<&Port> {
        self.ports.get(port_id)
    }

    // Returns the port connected to the given neighbor.
    pub fn port_towards(&self, peer: Ipv4Addr) -> Option<PortId> {
        self.ports
            .iter()
            .find(|port| port.peer == peer)
            .map(|port| port.id)
    }

    // Appends a packet to the tail of a port queue.
    //
    // The packet is handed back when the shared buffer can't hold it.
    pub fn enqueue(
        &mut self,
        port_id: PortId,
        packet: Packet,
    ) -> Result<(), Packet> {
        let size = packet.size();
        let Some(port) = self.ports.get_mut(port_id) else {
            return Err(packet);
        };
        if self.occupancy.saturating_add(size) > self.capacity {
            return Err(packet);
        }
        self.occupancy += size;
        port.queue.push_back(packet);
        Ok(())
    }

    // Puts a packet back at the head of a port queue, bypassing the buffer
    // limit since the packet was already accounted for.
    pub(crate) fn requeue(&mut self, port_id: PortId, packet: Packet) {
        if let Some(port) = self.ports.get_mut(port_id) {
            self.occupancy = self.occupancy.saturating_add(packet.size());
            port.queue.push_front(packet);
        }
    }

    // Dequeues the next packet in round-robin order, skipping the given
    // ports, as long as it fits within the given budget.
    pub(crate) fn dequeue_within(
        &mut self,
        budget: u64,
        blocked: &BTreeSet<PortId>,
    ) -> Option<(PortId, Packet)> {
        let nports = self.ports.len();
        let port_id = (0..nports)
            .map(|offset| (self.rr_next + offset) % nports)
            .find(|port_id| {
                !blocked.contains(port_id)
                    && !self.ports[*port_id].queue.is_empty()
            })?;

        let port = &mut self.ports[port_id];
        let size = port.queue.front()?.size();
        if size > budget {
            return None;
        }
        let packet = port.queue.pop_front()?;
        self.occupancy = self.occupancy.saturating_sub(size);
        self.rr_next = (port_id + 1) % nports;
        Some((port_id, packet))
    }

    pub fn iter(&self) -> impl Iterator<Item = &'_ Port> + '_ {
        self.ports.iter()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    // Returns whether any port holds a packet.
    pub fn has_queued(&self) -> bool {
        self.ports.iter().any(|port| !port.queue.is_empty())
    }

    pub fn queued_packets(&self) -> usize {
        self.ports.iter().map(|port| port.queue.len()).sum()
    }

    pub fn occupancy(&self) -> u64 {
        self.occupancy
    }

    // Buffer occupancy as a percentage of its capacity.
    pub fn congestion_percent(&self) -> u8 {
        if self.capacity == 0 || self.capacity == u64::MAX {
            return 0;
        }
        let percent = (self.occupancy as u128 * 100) / self.capacity as u128;
        percent.min(100) as u8
    }
}
