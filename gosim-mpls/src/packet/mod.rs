//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod gpsrp;
pub mod ipv4;
pub mod mpls;
pub mod tldp;

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

pub use crate::packet::gpsrp::{GpsrpMessageType, GpsrpMsg, GpsrpPacket};
pub use crate::packet::ipv4::{GosLevel, GosOptions, Ipv4Header, Ipv4Packet};
pub use crate::packet::mpls::{MplsLabel, MplsPacket};
pub use crate::packet::tldp::{
    Direction, LspType, TldpMessageType, TldpMsg, TldpPacket,
};

// Simulated packet.
//
// Packets are never serialized onto a wire: only their size in octets matters
// to the rate budget, port buffers and DMGP capacity.
#[derive(Clone, Debug, Deserialize, EnumAsInner, Eq, PartialEq, Serialize)]
pub enum Packet {
    Ipv4(Ipv4Packet),
    Mpls(MplsPacket),
    Tldp(TldpPacket),
    Gpsrp(GpsrpPacket),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKind {
    Ipv4,
    Mpls,
    Tldp,
    Gpsrp,
}

// ===== impl Packet =====

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Ipv4(_) => PacketKind::Ipv4,
            Packet::Mpls(_) => PacketKind::Mpls,
            Packet::Tldp(_) => PacketKind::Tldp,
            Packet::Gpsrp(_) => PacketKind::Gpsrp,
        }
    }

    // Returns the packet size in octets.
    pub fn size(&self) -> u64 {
        match self {
            Packet::Ipv4(packet) => packet.size(),
            Packet::Mpls(packet) => packet.size(),
            Packet::Tldp(packet) => packet.size(),
            Packet::Gpsrp(packet) => packet.size(),
        }
    }

    pub fn header(&self) -> &Ipv4Header {
        match self {
            Packet::Ipv4(packet) => &packet.header,
            Packet::Mpls(packet) => &packet.ipv4,
            Packet::Tldp(packet) => &packet.header,
            Packet::Gpsrp(packet) => &packet.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut Ipv4Header {
        match self {
            Packet::Ipv4(packet) => &mut packet.header,
            Packet::Mpls(packet) => &mut packet.ipv4,
            Packet::Tldp(packet) => &mut packet.header,
            Packet::Gpsrp(packet) => &mut packet.header,
        }
    }

    // Returns whether the packet carries GoS options.
    pub fn is_gos(&self) -> bool {
        self.header().options.is_some()
    }
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketKind::Ipv4 => write!(f, "ipv4"),
            PacketKind::Mpls => write!(f, "mpls"),
            PacketKind::Tldp => write!(f, "tldp"),
            PacketKind::Gpsrp => write!(f, "gpsrp"),
        }
    }
}

impl From<Ipv4Packet> for Packet {
    fn from(packet: Ipv4Packet) -> Packet {
        Packet::Ipv4(packet)
    }
}

impl From<MplsPacket> for Packet {
    fn from(packet: MplsPacket) -> Packet {
        Packet::Mpls(packet)
    }
}

impl From<TldpPacket> for Packet {
    fn from(packet: TldpPacket) -> Packet {
        Packet::Tldp(packet)
    }
}

impl From<GpsrpPacket> for Packet {
    fn from(packet: GpsrpPacket) -> Packet {
        Packet::Gpsrp(packet)
    }
}
