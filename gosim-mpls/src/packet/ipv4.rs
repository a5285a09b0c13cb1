//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use gosim_utils::ip::Ipv4AddrExt;
use serde::{Deserialize, Serialize};

//
// IPv4 header as seen by the simulator.
//
// Accounted size:
//
// +-------------------------------+
// | Fixed header (20 octets)      |
// +-------------------------------+
// | GoS options (optional):       |
// |   GoS level + padding (4)     |
// |   Packet local id (4)         |
// |   Crossed active nodes (4xN)  |
// +-------------------------------+
//
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Ipv4Header {
    pub origin: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub ttl: u8,
    pub options: Option<GosOptions>,
}

// Guarantee of Service options.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GosOptions {
    pub gos_level: GosLevel,
    // Packet identifier, unique within the originating flow.
    pub packet_id: u32,
    // Trail of active nodes crossed so far, nearest last.
    pub crossed_active_nodes: Vec<Ipv4Addr>,
}

// GoS level as carried in the 3-bit EXP field.
//
// The two low-order bits carry the level (0-3) and the third bit signals that
// a backup LSP is required, so EXP values 4-7 are the reserved "backup LSP"
// codes.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct GosLevel {
    level: u8,
    backup_lsp: bool,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Ipv4Packet {
    pub header: Ipv4Header,
    pub payload_len: u64,
}

// ===== impl Ipv4Header =====

impl Ipv4Header {
    pub const FIXED_LEN: u64 = 20;
    pub const DFLT_TTL: u8 = 64;

    pub fn new(origin: Ipv4Addr, destination: Ipv4Addr) -> Ipv4Header {
        Ipv4Header {
            origin,
            destination,
            ttl: Self::DFLT_TTL,
            options: None,
        }
    }

    pub fn size(&self) -> u64 {
        Self::FIXED_LEN
            + self.options.as_ref().map(|o| o.size()).unwrap_or_default()
    }

    pub fn gos_level(&self) -> Option<GosLevel> {
        self.options.as_ref().map(|options| options.gos_level)
    }

    pub fn packet_id(&self) -> Option<u32> {
        self.options.as_ref().map(|options| options.packet_id)
    }

    pub fn flow_id(&self) -> u32 {
        self.origin.flow_id()
    }

    // Returns the nearest active node this packet has crossed.
    pub fn last_crossed_active_node(&self) -> Option<Ipv4Addr> {
        self.options
            .as_ref()
            .and_then(|options| options.crossed_active_nodes.last().copied())
    }

    // Records that the packet crossed the given active node, keeping at most
    // `max_trail` addresses.
    pub fn stamp_active_node(&mut self, addr: Ipv4Addr, max_trail: usize) {
        if let Some(options) = &mut self.options {
            let trail = &mut options.crossed_active_nodes;
            if trail.last() == Some(&addr) {
                return;
            }
            trail.push(addr);
            if trail.len() > max_trail {
                let excess = trail.len() - max_trail;
                trail.drain(..excess);
            }
        }
    }
}

// ===== impl GosOptions =====

impl GosOptions {
    pub fn new(gos_level: GosLevel, packet_id: u32) -> GosOptions {
        GosOptions {
            gos_level,
            packet_id,
            crossed_active_nodes: Vec::new(),
        }
    }

    pub fn size(&self) -> u64 {
        8 + 4 * self.crossed_active_nodes.len() as u64
    }
}

// ===== impl GosLevel =====

impl GosLevel {
    pub const MAX_LEVEL: u8 = 3;
    const BACKUP_LSP_BIT: u8 = 0x04;

    pub fn new(level: u8, backup_lsp: bool) -> Option<GosLevel> {
        (level <= Self::MAX_LEVEL).then_some(GosLevel { level, backup_lsp })
    }

    pub fn from_exp(exp: u8) -> GosLevel {
        GosLevel {
            level: exp & Self::MAX_LEVEL,
            backup_lsp: exp & Self::BACKUP_LSP_BIT != 0,
        }
    }

    pub fn exp(&self) -> u8 {
        let mut exp = self.level;
        if self.backup_lsp {
            exp |= Self::BACKUP_LSP_BIT;
        }
        exp
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn requires_backup_lsp(&self) -> bool {
        self.backup_lsp
    }
}

// ===== impl Ipv4Packet =====

impl Ipv4Packet {
    pub fn new(header: Ipv4Header, payload_len: u64) -> Ipv4Packet {
        Ipv4Packet {
            header,
            payload_len,
        }
    }

    pub fn size(&self) -> u64 {
        self.header.size() + self.payload_len
    }
}
