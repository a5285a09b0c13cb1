//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use gosim_utils::ip::Ipv4AddrExt;

use crate::collections::EntryIndex;
use crate::error::DiscardReason;
use crate::matrix::{LabelOrFec, LabelStackOp, LabelState};
use crate::node::{Disposition, MplsNode, NodeCtx, active, lsr};
use crate::packet::{Ipv4Packet, LspType, MplsPacket, Packet};
use crate::port::PortId;
use crate::tldp;

// ===== global functions =====

// Label edge router packet processing.
pub(crate) fn process_packet(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    packet: Packet,
) -> Disposition {
    match packet {
        Packet::Tldp(packet) => tldp::process_packet(node, ctx, port, packet),
        Packet::Gpsrp(packet) => {
            active::process_packet(node, ctx, port, packet)
        }
        Packet::Mpls(packet) => lsr::process_mpls(node, ctx, port, packet),
        Packet::Ipv4(packet) => process_ipv4(node, ctx, port, packet),
    }
}

// Classifies an unlabeled packet entering the MPLS domain.
fn process_ipv4(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    packet: Ipv4Packet,
) -> Disposition {
    active::resolve_pending(node, &packet.header);

    let destination = packet.header.destination;
    let fec = packet.header.origin.fec_hash(&destination);

    // Lookup or create the FEC entry.
    let entry_idx = match node.matrix.get_by_key(port, LabelOrFec::Fec(fec))
    {
        Some((entry_idx, _)) => entry_idx,
        None => match node.matrix.create_fec_entry(port, fec, destination) {
            Ok(entry_idx) => {
                tldp::resolve_outgoing(node, ctx, entry_idx);
                entry_idx
            }
            Err(error) => {
                error.log();
                return Disposition::Discard(DiscardReason::NoEntry);
            }
        },
    };

    let entry = &node.matrix[entry_idx];
    let state = entry.outgoing.label;
    let no_route = entry.outgoing.port.is_none();
    match state {
        LabelState::Undefined => {
            tldp::send_label_request(node, ctx, entry_idx, LspType::Primary);
            Disposition::Requeue(packet.into())
        }
        LabelState::Requested => Disposition::Requeue(packet.into()),
        LabelState::Unavailable if no_route => {
            Disposition::Discard(DiscardReason::NoRoute)
        }
        LabelState::Unavailable => {
            Disposition::Discard(DiscardReason::LabelUnavailable)
        }
        LabelState::Removing | LabelState::Withdrawn => {
            Disposition::Discard(DiscardReason::LabelWithdrawn)
        }
        LabelState::Assigned | LabelState::Label(_) => {
            forward(node, ctx, entry_idx, packet)
        }
    }
}

fn forward(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
    packet: Ipv4Packet,
) -> Disposition {
    let entry = &node.matrix[entry_idx];
    let Some(out_port) = entry.outgoing.port else {
        return Disposition::Discard(DiscardReason::NoRoute);
    };

    let packet = match entry.label_stack_op {
        LabelStackOp::Push => {
            let Some(label) = entry.outgoing.label.label() else {
                return Disposition::Discard(DiscardReason::LabelUnavailable);
            };
            let mut mpls = MplsPacket::from_ipv4(packet);

            // Active edges carry the GoS level in a shim label under the
            // LSP label.
            if node.is_active()
                && let Some(gos_level) = mpls.ipv4.gos_level()
            {
                mpls.push_gos_shim(gos_level);
            }
            mpls.push(label, 0);
            Packet::Mpls(mpls)
        }
        LabelStackOp::Noop => Packet::Ipv4(packet),
        LabelStackOp::Pop | LabelStackOp::Swap | LabelStackOp::Undefined => {
            return Disposition::Discard(DiscardReason::UnsupportedPacket);
        }
    };

    node.transmit(ctx.links, out_port, packet)
}
