//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{error, warn, warn_span};

use gosim_utils::mpls::Label;

use crate::matrix::{LabelOrFec, LabelState};
use crate::packet::TldpMessageType;
use crate::port::PortId;

// Simulator errors.
#[derive(Debug)]
pub enum Error {
    // Scenario setup
    ScenarioLoad(String, LoadError),
    InvalidScenario(String),
    NodeNotFound(String),
    DuplicateNodeAddr(Ipv4Addr),
    LinkEndpointInvalid(String, String),
    // Identifier allocation
    LabelSpaceExhausted(Ipv4Addr),
    LabelInUse(Ipv4Addr, Label),
    SessionIdExhausted(Ipv4Addr),
    EntryKeyInUse(Ipv4Addr, PortId, LabelOrFec),
    // Protocol
    TldpUnexpectedMessage(Ipv4Addr, TldpMessageType, LabelState),
    TldpUnknownSession(Ipv4Addr, TldpMessageType, u32),
    GpsrpUnknownRequest(Ipv4Addr, u32, u32),
    NoRoute(Ipv4Addr, Ipv4Addr),
}

// Scenario load errors.
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Toml(toml::de::Error),
}

// Reason why a packet was discarded.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscardReason {
    NoRoute,
    NoEntry,
    LabelUnavailable,
    LabelWithdrawn,
    TtlExpired,
    BufferOverflow,
    LinkBroken,
    UnsupportedPacket,
    ProtocolViolation,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::ScenarioLoad(path, error) => {
                error!(%path, error = %with_source(error), "{}", self);
            }
            Error::InvalidScenario(reason) => {
                error!(%reason, "{}", self);
            }
            Error::NodeNotFound(name) => {
                error!(%name, "{}", self);
            }
            Error::DuplicateNodeAddr(addr) => {
                error!(address = %addr, "{}", self);
            }
            Error::LinkEndpointInvalid(a, b) => {
                error!(%a, %b, "{}", self);
            }
            Error::LabelSpaceExhausted(addr)
            | Error::SessionIdExhausted(addr) => {
                warn_span!("node", address = %addr).in_scope(|| {
                    warn!("{}", self);
                });
            }
            Error::LabelInUse(addr, label) => {
                warn_span!("node", address = %addr).in_scope(|| {
                    warn!(%label, "{}", self);
                });
            }
            Error::EntryKeyInUse(addr, port, key) => {
                warn_span!("node", address = %addr).in_scope(|| {
                    warn_span!("matrix").in_scope(|| {
                        warn!(%port, %key, "{}", self);
                    });
                });
            }
            Error::TldpUnexpectedMessage(addr, msg_type, state) => {
                warn_span!("node", address = %addr).in_scope(|| {
                    warn_span!("tldp").in_scope(|| {
                        warn!(r#type = %msg_type, %state, "{}", self);
                    });
                });
            }
            Error::TldpUnknownSession(addr, msg_type, session_id) => {
                warn_span!("node", address = %addr).in_scope(|| {
                    warn_span!("tldp").in_scope(|| {
                        warn!(r#type = %msg_type, %session_id, "{}", self);
                    });
                });
            }
            Error::GpsrpUnknownRequest(addr, flow_id, packet_id) => {
                warn_span!("node", address = %addr).in_scope(|| {
                    warn_span!("gpsrp").in_scope(|| {
                        warn!(%flow_id, %packet_id, "{}", self);
                    });
                });
            }
            Error::NoRoute(addr, destination) => {
                warn_span!("node", address = %addr).in_scope(|| {
                    warn!(%destination, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ScenarioLoad(..) => {
                write!(f, "failed to load scenario")
            }
            Error::InvalidScenario(..) => {
                write!(f, "invalid scenario")
            }
            Error::NodeNotFound(..) => {
                write!(f, "node not found")
            }
            Error::DuplicateNodeAddr(..) => {
                write!(f, "duplicate node address")
            }
            Error::LinkEndpointInvalid(..) => {
                write!(f, "invalid link endpoints")
            }
            Error::LabelSpaceExhausted(..) => {
                write!(f, "label space exhausted")
            }
            Error::LabelInUse(..) => {
                write!(f, "label already in use")
            }
            Error::SessionIdExhausted(..) => {
                write!(f, "TLDP session identifiers exhausted")
            }
            Error::EntryKeyInUse(..) => {
                write!(f, "switching entry key already in use")
            }
            Error::TldpUnexpectedMessage(..) => {
                write!(f, "unexpected TLDP message for the current label state")
            }
            Error::TldpUnknownSession(..) => {
                write!(f, "TLDP message for unknown session")
            }
            Error::GpsrpUnknownRequest(..) => {
                write!(f, "GPSRP message for unknown retransmission request")
            }
            Error::NoRoute(..) => {
                write!(f, "no route to destination")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ScenarioLoad(_, error) => Some(error),
            _ => None,
        }
    }
}

// ===== impl LoadError =====

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(..) => {
                write!(f, "failed to read scenario file")
            }
            LoadError::Toml(..) => {
                write!(f, "failed to parse scenario file")
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(error) => Some(error),
            LoadError::Toml(error) => Some(error),
        }
    }
}

// ===== impl DiscardReason =====

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscardReason::NoRoute => write!(f, "no route"),
            DiscardReason::NoEntry => write!(f, "no switching entry"),
            DiscardReason::LabelUnavailable => write!(f, "label unavailable"),
            DiscardReason::LabelWithdrawn => write!(f, "label withdrawn"),
            DiscardReason::TtlExpired => write!(f, "TTL expired"),
            DiscardReason::BufferOverflow => write!(f, "buffer overflow"),
            DiscardReason::LinkBroken => write!(f, "link broken"),
            DiscardReason::UnsupportedPacket => {
                write!(f, "unsupported packet kind")
            }
            DiscardReason::ProtocolViolation => {
                write!(f, "protocol violation")
            }
        }
    }
}

// ===== global functions =====

pub(crate) fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
