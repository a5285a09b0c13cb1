//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Error, LoadError};
use crate::node::NodeKind;

// Scenario description.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioCfg {
    pub clock: ClockCfg,
    pub protocol: ProtocolCfg,
    #[serde(rename = "node")]
    pub nodes: Vec<NodeCfg>,
    #[serde(rename = "link")]
    pub links: Vec<LinkCfg>,
    pub traffic: Vec<TrafficCfg>,
    #[serde(rename = "event")]
    pub events: Vec<EventCfg>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockCfg {
    pub tick_ns: u64,
    pub duration_ns: u64,
}

// Protocol timers and limits shared by every node.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolCfg {
    pub tldp_timeout_ns: u64,
    pub tldp_attempts: u32,
    pub gpsrp_timeout_ns: u64,
    pub gpsrp_attempts: u32,
    // Maximum number of crossed active nodes recorded in a GoS packet.
    pub max_crossed_active_nodes: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NodeCfg {
    pub name: String,
    pub kind: NodeKind,
    pub address: Ipv4Addr,
    #[serde(default = "NodeCfg::dflt_rate_mbps")]
    pub rate_mbps: u32,
    #[serde(default = "NodeCfg::dflt_buffer_mb")]
    pub buffer_mb: u32,
    #[serde(default = "NodeCfg::dflt_dmgp_kb")]
    pub dmgp_kb: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LinkCfg {
    pub a: String,
    pub b: String,
    #[serde(default = "LinkCfg::dflt_delay_ns")]
    pub delay_ns: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficCfg {
    pub sender: String,
    // Name of the receiving node.
    pub destination: String,
    pub rate_mbps: u32,
    #[serde(default = "TrafficCfg::dflt_packet_size")]
    pub packet_size: u64,
    #[serde(default)]
    pub gos_level: u8,
    #[serde(default)]
    pub backup_lsp: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EventCfg {
    pub at_ns: u64,
    pub link: [String; 2],
    pub action: LinkAction,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkAction {
    Break,
    Restore,
}

// ===== impl ScenarioCfg =====

impl ScenarioCfg {
    pub fn load(path: &str) -> Result<ScenarioCfg, Error> {
        let data = std::fs::read_to_string(path).map_err(|error| {
            Error::ScenarioLoad(path.to_owned(), LoadError::Io(error))
        })?;
        toml::from_str(&data).map_err(|error| {
            Error::ScenarioLoad(path.to_owned(), LoadError::Toml(error))
        })
    }

    pub fn from_toml(data: &str) -> Result<ScenarioCfg, Error> {
        toml::from_str(data).map_err(|error| {
            Error::ScenarioLoad("<inline>".to_owned(), LoadError::Toml(error))
        })
    }
}

impl Default for ScenarioCfg {
    fn default() -> ScenarioCfg {
        ScenarioCfg {
            clock: Default::default(),
            protocol: Default::default(),
            nodes: Default::default(),
            links: Default::default(),
            traffic: Default::default(),
            events: Default::default(),
        }
    }
}

// ===== impl ClockCfg =====

impl Default for ClockCfg {
    fn default() -> ClockCfg {
        ClockCfg {
            tick_ns: Clock::DFLT_TICK_NS,
            duration_ns: Clock::DFLT_DURATION_NS,
        }
    }
}

// ===== impl ProtocolCfg =====

impl Default for ProtocolCfg {
    fn default() -> ProtocolCfg {
        ProtocolCfg {
            tldp_timeout_ns: 50_000_000,
            tldp_attempts: 8,
            gpsrp_timeout_ns: 50_000_000,
            gpsrp_attempts: 8,
            max_crossed_active_nodes: 8,
        }
    }
}

// ===== impl NodeCfg =====

impl NodeCfg {
    fn dflt_rate_mbps() -> u32 {
        1000
    }

    fn dflt_buffer_mb() -> u32 {
        1
    }

    fn dflt_dmgp_kb() -> u32 {
        64
    }
}

// ===== impl LinkCfg =====

impl LinkCfg {
    fn dflt_delay_ns() -> u64 {
        1_000_000
    }
}

// ===== impl TrafficCfg =====

impl TrafficCfg {
    fn dflt_packet_size() -> u64 {
        1024
    }
}
