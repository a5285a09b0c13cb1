//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{HashMap, VecDeque};

use crate::packet::Packet;

// Retained-packet key: flow ID and packet ID.
pub type DmgpKey = (u32, u32);

// Dynamic Memory for GoS Packets.
//
// Bounded store of recently forwarded GoS packets used to answer local
// retransmission requests. Once full, the oldest packets are evicted first.
#[derive(Debug)]
pub struct Dmgp {
    // Capacity in octets.
    capacity: u64,
    occupancy: u64,
    // Retained keys, oldest first.
    fifo: VecDeque<DmgpKey>,
    packets: HashMap<DmgpKey, Packet>,
}

// ===== impl Dmgp =====

impl Dmgp {
    const OCTETS_PER_KB: u64 = 1024;

    pub fn new(size_kb: u32) -> Dmgp {
        Dmgp {
            capacity: u64::from(size_kb) * Self::OCTETS_PER_KB,
            occupancy: 0,
            fifo: Default::default(),
            packets: Default::default(),
        }
    }

    // Returns the retention key of a packet, if it carries GoS options.
    pub fn key(packet: &Packet) -> Option<DmgpKey> {
        let header = packet.header();
        header
            .packet_id()
            .map(|packet_id| (header.flow_id(), packet_id))
    }

    // Retains a copy of the given packet.
    //
    // Returns false if the packet isn't a GoS packet or can't fit in the
    // store even when empty.
    pub fn retain(&mut self, packet: Packet) -> bool {
        let Some(key) = Self::key(&packet) else {
            return false;
        };
        let size = packet.size();
        if size > self.capacity {
            return false;
        }

        // Replace any older copy of the same packet.
        self.remove(&key);

        // Evict the oldest packets until the new one fits.
        while self.occupancy + size > self.capacity {
            let Some(oldest) = self.fifo.pop_front() else {
                break;
            };
            if let Some(evicted) = self.packets.remove(&oldest) {
                self.occupancy -= evicted.size();
            }
        }

        self.occupancy += size;
        self.fifo.push_back(key);
        self.packets.insert(key, packet);
        true
    }

    pub fn get(&self, flow_id: u32, packet_id: u32) -> Option<&Packet> {
        self.packets.get(&(flow_id, packet_id))
    }

    fn remove(&mut self, key: &DmgpKey) -> Option<Packet> {
        let packet = self.packets.remove(key)?;
        self.occupancy -= packet.size();
        self.fifo.retain(|k| k != key);
        Some(packet)
    }

    pub fn clear(&mut self) {
        self.fifo.clear();
        self.packets.clear();
        self.occupancy = 0;
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn occupancy(&self) -> u64 {
        self.occupancy
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    // Retained keys, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &'_ DmgpKey> + '_ {
        self.fifo.iter()
    }
}
