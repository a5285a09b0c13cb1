//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use crate::collections::EntryIndex;
use crate::debug::Debug;
use crate::error::DiscardReason;
use crate::matrix::{EntryFlags, LabelOrFec, LabelStackOp, LabelState};
use crate::node::{Disposition, MplsNode, NodeCtx, active};
use crate::packet::{LspType, MplsPacket, Packet};
use crate::port::PortId;
use crate::tldp;

// ===== global functions =====

// Label switch router packet processing.
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
        Packet::Mpls(packet) => process_mpls(node, ctx, port, packet),
        // Core routers only switch labeled traffic.
        Packet::Ipv4(_) => {
            Disposition::Discard(DiscardReason::UnsupportedPacket)
        }
    }
}

// Switches a labeled packet according to its top label.
pub(crate) fn process_mpls(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    packet: MplsPacket,
) -> Disposition {
    active::resolve_pending(node, &packet.ipv4);

    let Some(top) = packet.top().copied() else {
        return Disposition::Discard(DiscardReason::UnsupportedPacket);
    };
    if top.ttl == 0 {
        return Disposition::Discard(DiscardReason::TtlExpired);
    }

    // Lookup or create the ILM entry.
    let key = LabelOrFec::Label(top.label);
    let entry_idx = match node.matrix.get_by_key(port, key) {
        Some((entry_idx, _)) => entry_idx,
        None => {
            match node.matrix.create_ilm_entry(
                port,
                top.label,
                packet.ipv4.destination,
            ) {
                Ok(entry_idx) => {
                    tldp::resolve_outgoing(node, ctx, entry_idx);
                    entry_idx
                }
                Err(error) => {
                    error.log();
                    return Disposition::Discard(DiscardReason::NoEntry);
                }
            }
        }
    };

    let entry = &node.matrix[entry_idx];
    let state = entry.outgoing.label;
    let no_route = entry.outgoing.port.is_none();
    let signaled = entry.upstream_session_id.is_some();
    match state {
        LabelState::Undefined => {
            tldp::send_label_request(node, ctx, entry_idx, LspType::Primary);
            Disposition::Requeue(packet.into())
        }
        LabelState::Requested => Disposition::Requeue(packet.into()),
        LabelState::Unavailable => {
            // Unresolved ILM entries only live as long as their packets.
            if !signaled {
                tldp::force_remove(node, ctx.links, entry_idx);
            }
            if no_route {
                Disposition::Discard(DiscardReason::NoRoute)
            } else {
                Disposition::Discard(DiscardReason::LabelUnavailable)
            }
        }
        LabelState::Removing | LabelState::Withdrawn => {
            Disposition::Discard(DiscardReason::LabelWithdrawn)
        }
        LabelState::Assigned | LabelState::Label(_) => {
            switch(node, ctx, entry_idx, packet)
        }
    }
}

fn switch(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
    mut packet: MplsPacket,
) -> Disposition {
    if node.is_active() {
        backup_trigger(node, ctx, entry_idx, &packet);
    }

    let entry = &node.matrix[entry_idx];
    let Some(out_port) = entry.outgoing.port else {
        return Disposition::Discard(DiscardReason::NoRoute);
    };

    let packet = match entry.label_stack_op {
        LabelStackOp::Swap => {
            let Some(label) = entry.outgoing.label.label() else {
                return Disposition::Discard(DiscardReason::LabelUnavailable);
            };
            packet.swap(label);
            if packet.ttl() == 0 {
                return Disposition::Discard(DiscardReason::TtlExpired);
            }
            Packet::Mpls(packet)
        }
        LabelStackOp::Pop => {
            packet.pop();
            // The GoS shim never leaves the MPLS domain.
            if packet.only_gos_shim_left() {
                packet.pop();
            }
            if packet.depth() > 0 {
                Packet::Mpls(packet)
            } else if packet.ipv4.ttl == 0 {
                return Disposition::Discard(DiscardReason::TtlExpired);
            } else {
                Packet::Ipv4(packet.into_ipv4())
            }
        }
        LabelStackOp::Push => {
            let Some(label) = entry.outgoing.label.label() else {
                return Disposition::Discard(DiscardReason::LabelUnavailable);
            };
            packet.push(label, 0);
            Packet::Mpls(packet)
        }
        LabelStackOp::Noop => Packet::Mpls(packet),
        LabelStackOp::Undefined => {
            return Disposition::Discard(DiscardReason::UnsupportedPacket);
        }
    };

    node.transmit(ctx.links, out_port, packet)
}

// Requests a backup LSP for GoS traffic that asks for one.
//
// The backup leaves through the best port that avoids the primary next hop,
// and is requested at most once per entry.
fn backup_trigger(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
    packet: &MplsPacket,
) {
    let requires_backup = packet
        .gos_shim()
        .is_some_and(|shim| shim.gos_level().requires_backup_lsp());
    if !requires_backup {
        return;
    }

    let entry = &node.matrix[entry_idx];
    if entry.label_stack_op != LabelStackOp::Swap
        || entry.backup.label != LabelState::Undefined
        || entry.flags.intersects(
            EntryFlags::BACKUP_REQUESTED | EntryFlags::FOR_BACKUP_LSP,
        )
    {
        return;
    }

    let addr = node.core.addr;
    let Some(primary_port) = entry.outgoing.port else {
        return;
    };
    let Some(primary_peer) =
        node.core.ports.get(primary_port).map(|port| port.peer)
    else {
        return;
    };
    let Some(port) = ctx
        .topology
        .next_hop_avoiding(addr, entry.tail_end, primary_peer)
        .and_then(|hop| node.core.ports.port_towards(hop))
    else {
        return;
    };
    if port == primary_port
        || port == entry.incoming_port
        || !node.core.is_port_live(ctx.links, port)
        || !tldp::is_internal(node, ctx.links, port)
    {
        return;
    }

    let entry = &mut node.matrix[entry_idx];
    entry.flags.insert(EntryFlags::BACKUP_REQUESTED);
    entry.backup.port = Some(port);
    Debug::BackupRequest(&addr, entry.local_session_id, port).log();
    tldp::send_label_request(node, ctx, entry_idx, LspType::Backup);
}
