//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::port::PortId;

// Table of outstanding GPSRP retransmission requests, keyed by flow ID and
// packet ID.
#[derive(Debug, Default)]
pub struct GpsrpRequests {
    requests: BTreeMap<(u32, u32), GpsrpRequest>,
}

// Outstanding retransmission request.
#[derive(Clone, Debug, new)]
#[derive(Deserialize, Serialize)]
pub struct GpsrpRequest {
    pub flow_id: u32,
    pub packet_id: u32,
    // Port the request was sent through.
    pub port: PortId,
    // Active node currently asked for the retransmission.
    pub target: Ipv4Addr,
    // Active nodes left to ask, nearest last.
    pub trail: Vec<Ipv4Addr>,
    pub attempts: u32,
    pub timeout_ns: u64,
}

// How a retransmission request was terminated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GpsrpOutcome {
    // Explicit positive acknowledgement.
    Ok,
    // The retransmitted packet arrived.
    Retransmitted,
    // No active node on the trail could retransmit.
    NotPossible,
    // Retry attempts exhausted.
    Exhausted,
    // The outgoing link went down.
    LinkDown,
}

#[derive(Debug, Eq, PartialEq)]
pub enum GpsrpTimer {
    Waiting,
    Resend,
    Exhausted,
}

// ===== impl GpsrpRequests =====

impl GpsrpRequests {
    // Records a new request. Returns false if one is already outstanding for
    // the same packet.
    pub fn insert(&mut self, request: GpsrpRequest) -> bool {
        let key = (request.flow_id, request.packet_id);
        if self.requests.contains_key(&key) {
            return false;
        }
        self.requests.insert(key, request);
        true
    }

    pub fn get(&self, flow_id: u32, packet_id: u32) -> Option<&GpsrpRequest> {
        self.requests.get(&(flow_id, packet_id))
    }

    pub(crate) fn get_mut(
        &mut self,
        flow_id: u32,
        packet_id: u32,
    ) -> Option<&mut GpsrpRequest> {
        self.requests.get_mut(&(flow_id, packet_id))
    }

    pub fn remove(
        &mut self,
        flow_id: u32,
        packet_id: u32,
    ) -> Option<GpsrpRequest> {
        self.requests.remove(&(flow_id, packet_id))
    }

    pub fn contains(&self, flow_id: u32, packet_id: u32) -> bool {
        self.requests.contains_key(&(flow_id, packet_id))
    }

    // Returns the keys of every outstanding request, in ascending order.
    pub(crate) fn keys(&self) -> Vec<(u32, u32)> {
        self.requests.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'_ GpsrpRequest> + '_ {
        self.requests.values()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

// ===== impl GpsrpRequest =====

impl GpsrpRequest {
    // Advances the retransmission timer by the elapsed time.
    pub fn tick(
        &mut self,
        elapsed_ns: u64,
        timeout_ns: u64,
    ) -> GpsrpTimer {
        self.timeout_ns = self.timeout_ns.saturating_sub(elapsed_ns);
        if self.timeout_ns > 0 {
            return GpsrpTimer::Waiting;
        }
        if self.attempts == 0 {
            return GpsrpTimer::Exhausted;
        }
        self.attempts -= 1;
        self.timeout_ns = timeout_ns;
        GpsrpTimer::Resend
    }
}

// ===== impl GpsrpOutcome =====

impl std::fmt::Display for GpsrpOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpsrpOutcome::Ok => write!(f, "retransmission acknowledged"),
            GpsrpOutcome::Retransmitted => {
                write!(f, "retransmitted packet received")
            }
            GpsrpOutcome::NotPossible => {
                write!(f, "retransmission not possible")
            }
            GpsrpOutcome::Exhausted => write!(f, "attempts exhausted"),
            GpsrpOutcome::LinkDown => write!(f, "outgoing link down"),
        }
    }
}
