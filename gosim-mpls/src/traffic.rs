//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use gosim_utils::id::IdGenerator;
use serde::{Deserialize, Serialize};

use crate::clock::TimerEvent;
use crate::config::TrafficCfg;
use crate::error::Error;
use crate::packet::{GosLevel, GosOptions, Ipv4Header, Ipv4Packet};

// Constant bit rate traffic source.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct TrafficGenerator {
    pub destination: Ipv4Addr,
    pub rate_mbps: u32,
    // Payload octets per packet.
    pub packet_size: u64,
    // GoS marking, if the flow is GoS-enabled.
    pub gos: Option<GosLevel>,
    // Transmission credit carried over between ticks, in thousandths of a
    // bit.
    credit: u64,
    pub generated: u64,
}

// ===== impl TrafficGenerator =====

impl TrafficGenerator {
    pub fn new(
        destination: Ipv4Addr,
        cfg: &TrafficCfg,
    ) -> Result<TrafficGenerator, Error> {
        let gos = GosLevel::new(cfg.gos_level, cfg.backup_lsp).ok_or_else(
            || {
                Error::InvalidScenario(format!(
                    "invalid GoS level: {}",
                    cfg.gos_level
                ))
            },
        )?;
        let gos = (gos.level() > 0 || gos.requires_backup_lsp()).then_some(gos);

        Ok(TrafficGenerator {
            destination,
            rate_mbps: cfg.rate_mbps,
            packet_size: cfg.packet_size,
            gos,
            credit: 0,
            generated: 0,
        })
    }

    // Emits the packets that fit in the credit accumulated so far.
    //
    // GoS packets stop being generated once the packet ID space runs out.
    pub fn on_tick(
        &mut self,
        event: &TimerEvent,
        origin: Ipv4Addr,
        ids: &mut IdGenerator,
    ) -> Vec<Ipv4Packet> {
        // 1 Mbps moves one thousandth of a bit per nanosecond.
        self.credit = self.credit.saturating_add(
            u64::from(self.rate_mbps).saturating_mul(event.tick_duration_ns),
        );

        let mut packets = vec![];
        loop {
            let mut header = Ipv4Header::new(origin, self.destination);
            header.options =
                self.gos.map(|gos_level| GosOptions::new(gos_level, 0));
            let mut packet = Ipv4Packet::new(header, self.packet_size);
            let cost = packet.size() * 8 * 1_000;
            if cost == 0 || self.credit < cost {
                break;
            }

            if let Some(options) = &mut packet.header.options {
                let Ok(packet_id) = ids.next_id() else {
                    break;
                };
                options.packet_id = packet_id;
            }
            self.credit -= cost;
            self.generated += 1;
            packets.push(packet);
        }
        packets
    }
}
