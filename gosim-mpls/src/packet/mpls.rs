//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use gosim_utils::mpls::Label;
use serde::{Deserialize, Serialize};

use crate::packet::ipv4::{GosLevel, Ipv4Header, Ipv4Packet};

//
// MPLS label stack entry.
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                Label                  | Exp |S|       TTL     |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MplsLabel {
    pub label: Label,
    pub exp: u8,
    pub bos: bool,
    pub ttl: u8,
}

// Labeled IPv4 packet.
//
// The last element of the stack is the top label.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MplsPacket {
    pub ipv4: Ipv4Header,
    pub stack: Vec<MplsLabel>,
    pub payload_len: u64,
}

// ===== impl MplsLabel =====

impl MplsLabel {
    pub const LENGTH: u64 = 4;
    pub const EXP_MASK: u8 = 0x07;

    // Returns whether this is the GoS shim label carrying the packet's GoS
    // level in the EXP field.
    pub fn is_gos_shim(&self) -> bool {
        self.label.get() == Label::ROUTER_ALERT
    }

    pub fn gos_level(&self) -> GosLevel {
        GosLevel::from_exp(self.exp)
    }
}

// ===== impl MplsPacket =====

impl MplsPacket {
    pub fn from_ipv4(packet: Ipv4Packet) -> MplsPacket {
        MplsPacket {
            ipv4: packet.header,
            stack: Vec::new(),
            payload_len: packet.payload_len,
        }
    }

    pub fn size(&self) -> u64 {
        self.ipv4.size()
            + self.stack.len() as u64 * MplsLabel::LENGTH
            + self.payload_len
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top(&self) -> Option<&MplsLabel> {
        self.stack.last()
    }

    // Returns the TTL of the innermost visible header (top label or, with an
    // empty stack, the IPv4 header).
    pub fn ttl(&self) -> u8 {
        self.top().map(|top| top.ttl).unwrap_or(self.ipv4.ttl)
    }

    // Pushes a new top label. Its TTL is the previous top TTL minus one.
    pub fn push(&mut self, label: Label, exp: u8) {
        let ttl = self.ttl().saturating_sub(1);
        let bos = self.stack.is_empty();
        self.stack.push(MplsLabel {
            label,
            exp: exp & MplsLabel::EXP_MASK,
            bos,
            ttl,
        });
    }

    // Pushes the GoS shim label. The shim doesn't count as a hop, so it
    // inherits the current TTL.
    pub fn push_gos_shim(&mut self, gos_level: GosLevel) {
        let ttl = self.ttl();
        let bos = self.stack.is_empty();
        self.stack.push(MplsLabel {
            label: Label::new(Label::ROUTER_ALERT),
            exp: gos_level.exp(),
            bos,
            ttl,
        });
    }

    // Pops the top label, propagating its TTL to the newly exposed header.
    pub fn pop(&mut self) -> Option<MplsLabel> {
        let popped = self.stack.pop()?;
        match self.stack.last_mut() {
            Some(top) => top.ttl = popped.ttl,
            None => self.ipv4.ttl = popped.ttl,
        }
        Some(popped)
    }

    // Replaces the top label value and decrements its TTL.
    pub fn swap(&mut self, label: Label) -> bool {
        match self.stack.last_mut() {
            Some(top) => {
                top.label = label;
                top.ttl = top.ttl.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    // Returns the GoS shim label, if present anywhere in the stack.
    pub fn gos_shim(&self) -> Option<&MplsLabel> {
        self.stack.iter().find(|entry| entry.is_gos_shim())
    }

    // Returns whether the only label left is the GoS shim.
    pub fn only_gos_shim_left(&self) -> bool {
        self.stack.len() == 1 && self.stack[0].is_gos_shim()
    }

    pub fn into_ipv4(self) -> Ipv4Packet {
        Ipv4Packet::new(self.ipv4, self.payload_len)
    }
}
