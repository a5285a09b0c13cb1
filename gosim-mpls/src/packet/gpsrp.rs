//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::packet::ipv4::Ipv4Header;

//
// GPSRP message.
//
// Accounted size:
//
// +-------------------------------+
// | IPv4 header (20 octets)       |
// +-------------------------------+
// | Type + padding                |  4 octets
// | Flow ID                       |  4 octets
// | Packet ID                     |  4 octets
// +-------------------------------+
//
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GpsrpMsg {
    pub msg_type: GpsrpMessageType,
    pub flow_id: u32,
    pub packet_id: u32,
}

// GPSRP packets are routed end-to-end using the IPv4 header destination.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GpsrpPacket {
    pub header: Ipv4Header,
    pub msg: GpsrpMsg,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum GpsrpMessageType {
    RetransmissionRequest,
    RetransmissionNotPossible,
    RetransmissionOk,
}

// ===== impl GpsrpMsg =====

impl GpsrpMsg {
    pub const LENGTH: u64 = 12;

    pub fn new(
        msg_type: GpsrpMessageType,
        flow_id: u32,
        packet_id: u32,
    ) -> GpsrpMsg {
        GpsrpMsg {
            msg_type,
            flow_id,
            packet_id,
        }
    }
}

// ===== impl GpsrpPacket =====

impl GpsrpPacket {
    pub fn new(
        origin: Ipv4Addr,
        destination: Ipv4Addr,
        msg: GpsrpMsg,
    ) -> GpsrpPacket {
        GpsrpPacket {
            header: Ipv4Header::new(origin, destination),
            msg,
        }
    }

    pub fn size(&self) -> u64 {
        self.header.size() + GpsrpMsg::LENGTH
    }
}

// ===== impl GpsrpMessageType =====

impl std::fmt::Display for GpsrpMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpsrpMessageType::RetransmissionRequest => {
                write!(f, "retransmission-request")
            }
            GpsrpMessageType::RetransmissionNotPossible => {
                write!(f, "retransmission-not-possible")
            }
            GpsrpMessageType::RetransmissionOk => {
                write!(f, "retransmission-ok")
            }
        }
    }
}
