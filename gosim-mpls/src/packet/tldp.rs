//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use gosim_utils::mpls::Label;
use serde::{Deserialize, Serialize};

use crate::packet::ipv4::Ipv4Header;

//
// TLDP message.
//
// Accounted size:
//
// +-------------------------------+
// | IPv4 header (20 octets)       |
// +-------------------------------+
// | Type | LSP type | Direction   |  4 octets
// | Session ID                    |  4 octets
// | Label                         |  4 octets
// | Target address                |  4 octets
// +-------------------------------+
//
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TldpMsg {
    pub msg_type: TldpMessageType,
    // Session ID of the upstream end of the hop this message belongs to.
    pub session_id: u32,
    pub label: Option<Label>,
    // Tail-end address of the LSP being signaled.
    pub target: Ipv4Addr,
    pub lsp_type: LspType,
    pub direction: Direction,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TldpPacket {
    pub header: Ipv4Header,
    pub msg: TldpMsg,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum TldpMessageType {
    LabelRequest,
    LabelRequestOk,
    LabelRequestDenied,
    LabelRemovalRequest,
    LabelRemovalRequestOk,
}

// Which leg of the upstream entry a message refers to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LspType {
    Primary,
    Backup,
}

// Direction a message travels along the LSP.
//
// Downstream messages flow from ingress towards egress (label requests,
// withdrawals initiated upstream) and upstream messages flow back towards
// the ingress (answers, withdrawals initiated downstream).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum Direction {
    Downstream,
    Upstream,
}

// ===== impl TldpMsg =====

impl TldpMsg {
    pub const LENGTH: u64 = 16;

    pub fn new(
        msg_type: TldpMessageType,
        session_id: u32,
        target: Ipv4Addr,
        lsp_type: LspType,
        direction: Direction,
    ) -> TldpMsg {
        TldpMsg {
            msg_type,
            session_id,
            label: None,
            target,
            lsp_type,
            direction,
        }
    }

    pub fn with_label(mut self, label: Label) -> TldpMsg {
        self.label = Some(label);
        self
    }
}

// ===== impl TldpPacket =====

impl TldpPacket {
    pub fn new(origin: Ipv4Addr, peer: Ipv4Addr, msg: TldpMsg) -> TldpPacket {
        TldpPacket {
            header: Ipv4Header::new(origin, peer),
            msg,
        }
    }

    pub fn size(&self) -> u64 {
        self.header.size() + TldpMsg::LENGTH
    }
}

// ===== impl TldpMessageType =====

impl std::fmt::Display for TldpMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TldpMessageType::LabelRequest => write!(f, "label-request"),
            TldpMessageType::LabelRequestOk => write!(f, "label-request-ok"),
            TldpMessageType::LabelRequestDenied => {
                write!(f, "label-request-denied")
            }
            TldpMessageType::LabelRemovalRequest => {
                write!(f, "label-removal-request")
            }
            TldpMessageType::LabelRemovalRequestOk => {
                write!(f, "label-removal-request-ok")
            }
        }
    }
}

// ===== impl LspType =====

impl std::fmt::Display for LspType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LspType::Primary => write!(f, "primary"),
            LspType::Backup => write!(f, "backup"),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Downstream => write!(f, "downstream"),
            Direction::Upstream => write!(f, "upstream"),
        }
    }
}
