//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{debug, debug_span};

use crate::clock::ClockState;
use crate::collections::LinkId;
use crate::error::DiscardReason;
use crate::gpsrp::{GpsrpOutcome, GpsrpRequest};
use crate::matrix::{Entry, LabelState};
use crate::packet::{GpsrpMsg, LspType, PacketKind, TldpMsg};
use crate::port::PortId;

// Simulator debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    ScenarioCreate(usize, usize),
    ClockStateChange(&'a u64, &'a ClockState, &'a ClockState),
    LinkBreak(LinkId, &'a Ipv4Addr, &'a Ipv4Addr),
    LinkRestore(LinkId, &'a Ipv4Addr, &'a Ipv4Addr),
    PacketDiscard(&'a Ipv4Addr, &'a PacketKind, &'a DiscardReason),
    EntryCreate(&'a Ipv4Addr, &'a Entry),
    EntryDelete(&'a Ipv4Addr, &'a Entry),
    LabelStateChange(
        &'a Ipv4Addr,
        u32,
        &'a LspType,
        &'a LabelState,
        &'a LabelState,
    ),
    BackupRequest(&'a Ipv4Addr, u32, PortId),
    BackupSwitchover(&'a Ipv4Addr, u32),
    BackupClear(&'a Ipv4Addr, u32),
    TldpMsgRx(&'a Ipv4Addr, PortId, &'a TldpMsg),
    TldpMsgTx(&'a Ipv4Addr, PortId, &'a TldpMsg),
    TldpRetransmit(&'a Ipv4Addr, u32, &'a LspType),
    TldpRetryExhausted(&'a Ipv4Addr, u32, &'a LspType),
    GpsrpMsgRx(&'a Ipv4Addr, PortId, &'a GpsrpMsg),
    GpsrpMsgTx(&'a Ipv4Addr, PortId, &'a GpsrpMsg),
    GpsrpRequestCreate(&'a Ipv4Addr, &'a GpsrpRequest),
    GpsrpRequestDelete(&'a Ipv4Addr, &'a GpsrpRequest, GpsrpOutcome),
    GpsrpRetransmit(&'a Ipv4Addr, u32, u32, PortId),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::ScenarioCreate(nodes, links) => {
                debug!(%nodes, %links, "{}", self);
            }
            Debug::ClockStateChange(time_ns, old_state, new_state) => {
                debug_span!("clock").in_scope(|| {
                    debug!(%time_ns, %old_state, %new_state, "{}", self);
                });
            }
            Debug::LinkBreak(id, a, b) | Debug::LinkRestore(id, a, b) => {
                debug_span!("link", %id).in_scope(|| {
                    debug!(%a, %b, "{}", self);
                });
            }
            Debug::PacketDiscard(addr, kind, reason) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug!(%kind, %reason, "{}", self);
                });
            }
            Debug::EntryCreate(addr, entry)
            | Debug::EntryDelete(addr, entry) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("matrix").in_scope(|| {
                        debug!(
                            session_id = %entry.local_session_id,
                            port = %entry.incoming_port,
                            key = %entry.label_or_fec,
                            tail_end = %entry.tail_end,
                            "{}", self
                        );
                    })
                });
            }
            Debug::LabelStateChange(
                addr,
                session_id,
                lsp_type,
                old_state,
                new_state,
            ) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("matrix").in_scope(|| {
                        debug!(
                            %session_id,
                            %lsp_type,
                            %old_state,
                            %new_state,
                            "{}", self
                        );
                    })
                });
            }
            Debug::BackupRequest(addr, session_id, port) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("matrix").in_scope(|| {
                        debug!(%session_id, %port, "{}", self);
                    })
                });
            }
            Debug::BackupSwitchover(addr, session_id)
            | Debug::BackupClear(addr, session_id) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("matrix").in_scope(|| {
                        debug!(%session_id, "{}", self);
                    })
                });
            }
            Debug::TldpMsgRx(addr, port, msg) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("tldp").in_scope(|| {
                        debug_span!("input").in_scope(|| {
                            let data = serde_json::to_string(&msg).unwrap();
                            debug!(
                                r#type = %msg.msg_type,
                                %port,
                                %data,
                                "{}", self
                            );
                        })
                    })
                });
            }
            Debug::TldpMsgTx(addr, port, msg) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("tldp").in_scope(|| {
                        debug_span!("output").in_scope(|| {
                            let data = serde_json::to_string(&msg).unwrap();
                            debug!(
                                r#type = %msg.msg_type,
                                %port,
                                %data,
                                "{}", self
                            );
                        })
                    })
                });
            }
            Debug::TldpRetransmit(addr, session_id, lsp_type)
            | Debug::TldpRetryExhausted(addr, session_id, lsp_type) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("tldp").in_scope(|| {
                        debug!(%session_id, %lsp_type, "{}", self);
                    })
                });
            }
            Debug::GpsrpMsgRx(addr, port, msg) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("gpsrp").in_scope(|| {
                        debug_span!("input").in_scope(|| {
                            let data = serde_json::to_string(&msg).unwrap();
                            debug!(
                                r#type = %msg.msg_type,
                                %port,
                                %data,
                                "{}", self
                            );
                        })
                    })
                });
            }
            Debug::GpsrpMsgTx(addr, port, msg) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("gpsrp").in_scope(|| {
                        debug_span!("output").in_scope(|| {
                            let data = serde_json::to_string(&msg).unwrap();
                            debug!(
                                r#type = %msg.msg_type,
                                %port,
                                %data,
                                "{}", self
                            );
                        })
                    })
                });
            }
            Debug::GpsrpRequestCreate(addr, request) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("gpsrp").in_scope(|| {
                        let data = serde_json::to_string(&request).unwrap();
                        debug!(%data, "{}", self);
                    })
                });
            }
            Debug::GpsrpRequestDelete(addr, request, outcome) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("gpsrp").in_scope(|| {
                        debug!(
                            flow_id = %request.flow_id,
                            packet_id = %request.packet_id,
                            %outcome,
                            "{}", self
                        );
                    })
                });
            }
            Debug::GpsrpRetransmit(addr, flow_id, packet_id, port) => {
                debug_span!("node", address = %addr).in_scope(|| {
                    debug_span!("gpsrp").in_scope(|| {
                        debug!(%flow_id, %packet_id, %port, "{}", self);
                    })
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::ScenarioCreate(..) => {
                write!(f, "scenario created")
            }
            Debug::ClockStateChange(..) => {
                write!(f, "clock state change")
            }
            Debug::LinkBreak(..) => {
                write!(f, "link broken")
            }
            Debug::LinkRestore(..) => {
                write!(f, "link restored")
            }
            Debug::PacketDiscard(..) => {
                write!(f, "packet discarded")
            }
            Debug::EntryCreate(..) => {
                write!(f, "switching entry created")
            }
            Debug::EntryDelete(..) => {
                write!(f, "switching entry deleted")
            }
            Debug::LabelStateChange(..) => {
                write!(f, "label state transition")
            }
            Debug::BackupRequest(..) => {
                write!(f, "requesting backup LSP")
            }
            Debug::BackupSwitchover(..) => {
                write!(f, "switching over to backup LSP")
            }
            Debug::BackupClear(..) => {
                write!(f, "backup LSP cleared")
            }
            Debug::TldpMsgRx(..) | Debug::TldpMsgTx(..) => {
                write!(f, "message")
            }
            Debug::TldpRetransmit(..) => {
                write!(f, "retransmitting message")
            }
            Debug::TldpRetryExhausted(..) => {
                write!(f, "retransmission attempts exhausted")
            }
            Debug::GpsrpMsgRx(..) | Debug::GpsrpMsgTx(..) => {
                write!(f, "message")
            }
            Debug::GpsrpRequestCreate(..) => {
                write!(f, "retransmission request created")
            }
            Debug::GpsrpRequestDelete(..) => {
                write!(f, "retransmission request deleted")
            }
            Debug::GpsrpRetransmit(..) => {
                write!(f, "retransmitting retained packet")
            }
        }
    }
}
