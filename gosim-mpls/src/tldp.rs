//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use gosim_utils::mpls::Label;

use crate::collections::{EntryIndex, Links};
use crate::debug::Debug;
use crate::error::{DiscardReason, Error};
use crate::link::LinkKind;
use crate::matrix::{
    EntryFlags, EntryType, LabelState, LabelStackOp, PendingOp, RetryOutcome,
};
use crate::node::{Disposition, MplsNode, NodeCtx};
use crate::packet::{Direction, LspType, TldpMessageType, TldpMsg, TldpPacket};
use crate::port::PortId;

// ===== TLDP message receipt =====

pub(crate) fn process_packet(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    packet: TldpPacket,
) -> Disposition {
    let msg = packet.msg;
    Debug::TldpMsgRx(&node.core.addr, port, &msg).log();
    *node.core.stats.tldp_rx.entry(msg.msg_type).or_default() += 1;

    let result = match (msg.msg_type, msg.direction) {
        (TldpMessageType::LabelRequest, _) => {
            process_label_request(node, ctx, port, &msg)
        }
        (TldpMessageType::LabelRequestOk, _) => {
            process_label_request_ok(node, ctx, port, &msg)
        }
        (TldpMessageType::LabelRequestDenied, _) => {
            process_label_request_denied(node, ctx, port, &msg)
        }
        (TldpMessageType::LabelRemovalRequest, Direction::Downstream) => {
            process_removal_from_upstream(node, ctx, port, &msg)
        }
        (TldpMessageType::LabelRemovalRequest, Direction::Upstream) => {
            process_removal_from_downstream(node, ctx, port, &msg)
        }
        (TldpMessageType::LabelRemovalRequestOk, Direction::Downstream) => {
            process_removal_ok_from_upstream(node, ctx, port, &msg)
        }
        (TldpMessageType::LabelRemovalRequestOk, Direction::Upstream) => {
            process_removal_ok_from_downstream(node, ctx, port, &msg)
        }
    };

    match result {
        Ok(()) => Disposition::Consumed,
        Err(error) => {
            error.log();
            Disposition::Discard(DiscardReason::ProtocolViolation)
        }
    }
}

fn process_label_request(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    msg: &TldpMsg,
) -> Result<(), Error> {
    // Lookup or create the transit entry.
    let entry_idx =
        match node.matrix.get_by_upstream_session(port, msg.session_id) {
            Some((entry_idx, _)) => entry_idx,
            None => {
                let entry_idx = node.matrix.create_label_entry(
                    port,
                    msg.session_id,
                    msg.target,
                    msg.lsp_type == LspType::Backup,
                )?;
                resolve_outgoing(node, ctx, entry_idx);
                entry_idx
            }
        };

    // Act according to the state of the primary leg.
    let state = node.matrix[entry_idx].outgoing.label;
    match state {
        LabelState::Undefined => {
            send_label_request(node, ctx, entry_idx, LspType::Primary);
        }
        LabelState::Removing => {
            send_upstream(
                node,
                ctx,
                entry_idx,
                TldpMessageType::LabelRemovalRequest,
                None,
            );
        }
        LabelState::Assigned | LabelState::Label(_) => {
            match node.matrix.assign_local_label(entry_idx) {
                Ok(Some(label)) => send_upstream(
                    node,
                    ctx,
                    entry_idx,
                    TldpMessageType::LabelRequestOk,
                    Some(label),
                ),
                Ok(None) => {
                    return Err(Error::TldpUnexpectedMessage(
                        node.core.addr,
                        msg.msg_type,
                        state,
                    ));
                }
                Err(error) => {
                    error.log();
                    send_upstream(
                        node,
                        ctx,
                        entry_idx,
                        TldpMessageType::LabelRequestDenied,
                        None,
                    );
                }
            }
        }
        LabelState::Unavailable => {
            send_upstream(
                node,
                ctx,
                entry_idx,
                TldpMessageType::LabelRequestDenied,
                None,
            );
        }
        state @ (LabelState::Requested | LabelState::Withdrawn) => {
            return Err(Error::TldpUnexpectedMessage(
                node.core.addr,
                msg.msg_type,
                state,
            ));
        }
    }

    Ok(())
}

fn process_label_request_ok(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    msg: &TldpMsg,
) -> Result<(), Error> {
    let addr = node.core.addr;

    // Lookup the entry that sent the request.
    let Some((entry_idx, entry)) =
        node.matrix.get_by_local_session(msg.session_id)
    else {
        return Err(Error::TldpUnknownSession(
            addr,
            msg.msg_type,
            msg.session_id,
        ));
    };
    let Some(lsp_type) = entry.leg_by_port(port) else {
        return Err(Error::TldpUnexpectedMessage(
            addr,
            msg.msg_type,
            entry.outgoing.label,
        ));
    };
    let leg = entry.leg(lsp_type);
    if leg.label != LabelState::Requested {
        return Err(Error::TldpUnexpectedMessage(
            addr,
            msg.msg_type,
            leg.label,
        ));
    }
    let Some(label) = msg.label.filter(|label| !label.is_reserved()) else {
        return Err(Error::TldpUnexpectedMessage(
            addr,
            msg.msg_type,
            leg.label,
        ));
    };

    // A transit entry needs its own label before answering upstream.
    if lsp_type == LspType::Primary
        && let Err(error) = node.matrix.assign_local_label(entry_idx)
    {
        error.log();
        node.matrix.set_label_state(
            entry_idx,
            lsp_type,
            LabelState::Unavailable,
        );
        send_upstream(
            node,
            ctx,
            entry_idx,
            TldpMessageType::LabelRequestDenied,
            None,
        );
        return Ok(());
    }

    node.matrix
        .set_label_state(entry_idx, lsp_type, LabelState::Label(label));
    count_link(node, ctx.links, entry_idx, lsp_type);

    match lsp_type {
        LspType::Primary => {
            let entry = &node.matrix[entry_idx];
            if !entry.flags.contains(EntryFlags::UPSTREAM_WITHDRAWN)
                && let Some(local_label) = entry.local_label()
            {
                send_upstream(
                    node,
                    ctx,
                    entry_idx,
                    TldpMessageType::LabelRequestOk,
                    Some(local_label),
                );
            }
        }
        LspType::Backup => {
            node.matrix[entry_idx]
                .flags
                .insert(EntryFlags::BACKUP_ESTABLISHED);
        }
    }

    Ok(())
}

fn process_label_request_denied(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    msg: &TldpMsg,
) -> Result<(), Error> {
    let addr = node.core.addr;

    let Some((entry_idx, entry)) =
        node.matrix.get_by_local_session(msg.session_id)
    else {
        return Err(Error::TldpUnknownSession(
            addr,
            msg.msg_type,
            msg.session_id,
        ));
    };
    let Some(lsp_type) = entry.leg_by_port(port) else {
        return Err(Error::TldpUnexpectedMessage(
            addr,
            msg.msg_type,
            entry.outgoing.label,
        ));
    };
    let leg = entry.leg(lsp_type);
    if leg.label != LabelState::Requested {
        return Err(Error::TldpUnexpectedMessage(
            addr,
            msg.msg_type,
            leg.label,
        ));
    }

    node.matrix
        .set_label_state(entry_idx, lsp_type, LabelState::Unavailable);
    if lsp_type == LspType::Primary {
        send_upstream(
            node,
            ctx,
            entry_idx,
            TldpMessageType::LabelRequestDenied,
            None,
        );
    }

    Ok(())
}

fn process_removal_from_upstream(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    msg: &TldpMsg,
) -> Result<(), Error> {
    // Always acknowledge, even for sessions that are already gone.
    let ack = TldpMsg::new(
        TldpMessageType::LabelRemovalRequestOk,
        msg.session_id,
        msg.target,
        msg.lsp_type,
        Direction::Upstream,
    );
    send_msg(node, ctx, port, ack);

    let Some((entry_idx, _)) =
        node.matrix.get_by_upstream_session(port, msg.session_id)
    else {
        return Ok(());
    };

    let entry = &mut node.matrix[entry_idx];
    entry.flags.insert(EntryFlags::UPSTREAM_WITHDRAWN);

    // A withdrawal we sent upstream crossed this one.
    if entry.outgoing.label == LabelState::Removing
        && entry.outgoing.retry.pending
            == Some(PendingOp::Removal(Direction::Upstream))
    {
        finalize_leg(node, ctx.links, entry_idx, LspType::Primary);
    }

    withdraw_downstream(node, ctx, entry_idx);
    node.matrix.remove_check(entry_idx);

    Ok(())
}

fn process_removal_from_downstream(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    msg: &TldpMsg,
) -> Result<(), Error> {
    let ack = TldpMsg::new(
        TldpMessageType::LabelRemovalRequestOk,
        msg.session_id,
        msg.target,
        msg.lsp_type,
        Direction::Downstream,
    );
    send_msg(node, ctx, port, ack);

    let Some((entry_idx, entry)) =
        node.matrix.get_by_local_session(msg.session_id)
    else {
        return Ok(());
    };
    let Some(lsp_type) = entry.leg_by_port(port) else {
        return Ok(());
    };

    match lsp_type {
        LspType::Backup => {
            finalize_leg(node, ctx.links, entry_idx, LspType::Backup);
            node.matrix[entry_idx]
                .flags
                .remove(EntryFlags::BACKUP_ESTABLISHED);
        }
        LspType::Primary => {
            let entry = &node.matrix[entry_idx];
            let links = &*ctx.links;
            let backup_live = entry
                .backup
                .port
                .is_some_and(|port| node.core.is_port_live(links, port));
            let backup_ready = backup_live
                && entry.flags.contains(EntryFlags::BACKUP_ESTABLISHED);
            if backup_ready {
                switch_to_backup(node, ctx.links, entry_idx);
            } else if entry.outgoing.label == LabelState::Removing {
                finalize_leg(node, ctx.links, entry_idx, LspType::Primary);
            } else {
                withdraw_upstream(node, ctx, entry_idx);
            }
        }
    }
    node.matrix.remove_check(entry_idx);

    Ok(())
}

fn process_removal_ok_from_upstream(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    msg: &TldpMsg,
) -> Result<(), Error> {
    let addr = node.core.addr;

    let Some((entry_idx, entry)) =
        node.matrix.get_by_upstream_session(port, msg.session_id)
    else {
        return Err(Error::TldpUnknownSession(
            addr,
            msg.msg_type,
            msg.session_id,
        ));
    };
    if entry.outgoing.label != LabelState::Removing
        || entry.outgoing.retry.pending
            != Some(PendingOp::Removal(Direction::Upstream))
    {
        return Err(Error::TldpUnexpectedMessage(
            addr,
            msg.msg_type,
            entry.outgoing.label,
        ));
    }

    node.matrix[entry_idx]
        .flags
        .insert(EntryFlags::UPSTREAM_WITHDRAWN);
    finalize_leg(node, ctx.links, entry_idx, LspType::Primary);
    node.matrix.remove_check(entry_idx);

    Ok(())
}

fn process_removal_ok_from_downstream(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    msg: &TldpMsg,
) -> Result<(), Error> {
    let addr = node.core.addr;

    let Some((entry_idx, entry)) =
        node.matrix.get_by_local_session(msg.session_id)
    else {
        return Err(Error::TldpUnknownSession(
            addr,
            msg.msg_type,
            msg.session_id,
        ));
    };
    let Some(lsp_type) = entry.leg_by_port(port) else {
        return Err(Error::TldpUnexpectedMessage(
            addr,
            msg.msg_type,
            entry.outgoing.label,
        ));
    };
    let leg = entry.leg(lsp_type);
    if leg.label != LabelState::Removing {
        return Err(Error::TldpUnexpectedMessage(
            addr,
            msg.msg_type,
            leg.label,
        ));
    }

    finalize_leg(node, ctx.links, entry_idx, lsp_type);
    node.matrix.remove_check(entry_idx);

    Ok(())
}

// ===== TLDP retransmission timers =====

pub(crate) fn process_timers(node: &mut MplsNode, ctx: &mut NodeCtx<'_>) {
    let elapsed_ns = ctx.event.tick_duration_ns;
    let timeout_ns = node.protocol.tldp_timeout_ns;

    for entry_idx in node.matrix.entries.indexes() {
        for lsp_type in [LspType::Primary, LspType::Backup] {
            // The entry might have been removed by the previous leg.
            let Some(entry) = node.matrix.entries.get_mut(entry_idx) else {
                break;
            };
            let local_session_id = entry.local_session_id;
            let outcome =
                entry.leg_mut(lsp_type).retry.tick(elapsed_ns, timeout_ns);

            match outcome {
                RetryOutcome::Idle | RetryOutcome::Waiting => {}
                RetryOutcome::Resend(op) => {
                    Debug::TldpRetransmit(
                        &node.core.addr,
                        local_session_id,
                        &lsp_type,
                    )
                    .log();
                    resend(node, ctx, entry_idx, lsp_type, op);
                }
                RetryOutcome::Exhausted(op) => {
                    Debug::TldpRetryExhausted(
                        &node.core.addr,
                        local_session_id,
                        &lsp_type,
                    )
                    .log();
                    retry_exhausted(node, ctx, entry_idx, lsp_type, op);
                }
            }
        }
    }
}

fn resend(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
    lsp_type: LspType,
    op: PendingOp,
) {
    let entry = &node.matrix[entry_idx];
    match op {
        PendingOp::LabelRequest | PendingOp::Removal(Direction::Downstream) => {
            let Some(port) = entry.leg(lsp_type).port else {
                return;
            };
            let msg_type = match op {
                PendingOp::LabelRequest => TldpMessageType::LabelRequest,
                _ => TldpMessageType::LabelRemovalRequest,
            };
            let msg = TldpMsg::new(
                msg_type,
                entry.local_session_id,
                entry.tail_end,
                lsp_type,
                Direction::Downstream,
            );
            send_msg(node, ctx, port, msg);
        }
        PendingOp::Removal(Direction::Upstream) => {
            send_upstream(
                node,
                ctx,
                entry_idx,
                TldpMessageType::LabelRemovalRequest,
                None,
            );
        }
    }
}

fn retry_exhausted(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
    lsp_type: LspType,
    op: PendingOp,
) {
    match (op, lsp_type) {
        // ILM entries are removed along with the packets waiting on them.
        (PendingOp::LabelRequest, LspType::Primary)
            if node.matrix[entry_idx].upstream_session_id.is_none()
                && node.matrix[entry_idx].entry_type() == EntryType::Label =>
        {
            node.matrix.set_label_state(
                entry_idx,
                LspType::Primary,
                LabelState::Unavailable,
            );
        }
        (PendingOp::LabelRequest, LspType::Primary) => {
            send_upstream(
                node,
                ctx,
                entry_idx,
                TldpMessageType::LabelRequestDenied,
                None,
            );
            force_remove(node, ctx.links, entry_idx);
        }
        (PendingOp::LabelRequest, LspType::Backup) => {
            node.matrix.set_label_state(
                entry_idx,
                LspType::Backup,
                LabelState::Unavailable,
            );
        }
        (PendingOp::Removal(_), _) => {
            force_remove(node, ctx.links, entry_idx);
        }
    }
}

// ===== LSP setup and teardown =====

// Decides how a freshly created entry reaches its tail end.
//
// An exit point pops (or forwards unlabeled) towards the endpoint. Other
// nodes need an internal next hop distinct from the incoming port, else the
// entry is left unavailable.
pub(crate) fn resolve_outgoing(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
) {
    let addr = node.core.addr;
    let entry = &node.matrix[entry_idx];
    let tail_end = entry.tail_end;
    let incoming_port = entry.incoming_port;
    let entry_type = entry.entry_type();
    let out_port = node.core.port_towards(ctx.topology, tail_end);

    if ctx.topology.is_exit_point_for(addr, tail_end) {
        if let Err(error) = node.matrix.assign_local_label(entry_idx) {
            error.log();
            node.matrix.set_label_state(
                entry_idx,
                LspType::Primary,
                LabelState::Unavailable,
            );
            return;
        }
        let entry = &mut node.matrix[entry_idx];
        entry.label_stack_op = match entry_type {
            EntryType::Fec => LabelStackOp::Noop,
            EntryType::Label => LabelStackOp::Pop,
        };
        entry.outgoing.port = out_port;
        node.matrix.set_label_state(
            entry_idx,
            LspType::Primary,
            LabelState::Assigned,
        );
        return;
    }

    match out_port.filter(|port| {
        *port != incoming_port && is_internal(node, ctx.links, *port)
    }) {
        Some(port) => {
            let entry = &mut node.matrix[entry_idx];
            entry.label_stack_op = match entry_type {
                EntryType::Fec => LabelStackOp::Push,
                EntryType::Label => LabelStackOp::Swap,
            };
            entry.outgoing.port = Some(port);
        }
        None => {
            Error::NoRoute(addr, tail_end).log();
            node.matrix.set_label_state(
                entry_idx,
                LspType::Primary,
                LabelState::Unavailable,
            );
        }
    }
}

// Asks the downstream neighbor of the given leg for a label.
pub(crate) fn send_label_request(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
    lsp_type: LspType,
) {
    if !node
        .matrix
        .set_label_state(entry_idx, lsp_type, LabelState::Requested)
    {
        return;
    }

    let timeout_ns = node.protocol.tldp_timeout_ns;
    let attempts = node.protocol.tldp_attempts;
    let entry = &mut node.matrix[entry_idx];
    entry.leg_mut(lsp_type).retry.arm(
        PendingOp::LabelRequest,
        timeout_ns,
        attempts,
    );
    let Some(port) = entry.leg(lsp_type).port else {
        return;
    };
    let msg = TldpMsg::new(
        TldpMessageType::LabelRequest,
        entry.local_session_id,
        entry.tail_end,
        lsp_type,
        Direction::Downstream,
    );
    send_msg(node, ctx, port, msg);
}

// Tears down both outgoing legs of an entry whose upstream side is gone.
pub(crate) fn withdraw_downstream(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
) {
    withdraw_leg(node, ctx, entry_idx, LspType::Primary);
    withdraw_leg(node, ctx, entry_idx, LspType::Backup);
}

fn withdraw_leg(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
    lsp_type: LspType,
) {
    let leg = node.matrix[entry_idx].leg(lsp_type).clone();
    match leg.label {
        LabelState::Undefined => {
            if lsp_type == LspType::Primary {
                finalize_leg(node, ctx.links, entry_idx, lsp_type);
            }
        }
        LabelState::Removing | LabelState::Withdrawn => {}
        LabelState::Unavailable | LabelState::Assigned => {
            finalize_leg(node, ctx.links, entry_idx, lsp_type);
        }
        LabelState::Requested | LabelState::Label(_) => {
            let signaled = leg.port.is_some_and(|port| {
                is_internal(node, ctx.links, port)
                    && node.core.is_port_live(ctx.links, port)
            });
            if signaled {
                send_removal_downstream(node, ctx, entry_idx, lsp_type);
            } else {
                finalize_leg(node, ctx.links, entry_idx, lsp_type);
            }
        }
    }
}

fn send_removal_downstream(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
    lsp_type: LspType,
) {
    if !node
        .matrix
        .set_label_state(entry_idx, lsp_type, LabelState::Removing)
    {
        return;
    }

    let timeout_ns = node.protocol.tldp_timeout_ns;
    let attempts = node.protocol.tldp_attempts;
    let entry = &mut node.matrix[entry_idx];
    entry.leg_mut(lsp_type).retry.arm(
        PendingOp::Removal(Direction::Downstream),
        timeout_ns,
        attempts,
    );
    let Some(port) = entry.leg(lsp_type).port else {
        return;
    };
    let msg = TldpMsg::new(
        TldpMessageType::LabelRemovalRequest,
        entry.local_session_id,
        entry.tail_end,
        lsp_type,
        Direction::Downstream,
    );
    send_msg(node, ctx, port, msg);
}

// Tears down the primary leg of an entry whose downstream side is gone,
// propagating the withdrawal towards the ingress.
pub(crate) fn withdraw_upstream(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
) {
    uncount_link(node, ctx.links, entry_idx, LspType::Primary);
    withdraw_leg(node, ctx, entry_idx, LspType::Backup);

    let entry = &node.matrix[entry_idx];
    let signaled = entry.upstream_session_id.is_some()
        && !entry.flags.contains(EntryFlags::UPSTREAM_WITHDRAWN)
        && is_internal(node, ctx.links, entry.incoming_port)
        && node.core.is_port_live(ctx.links, entry.incoming_port);
    if !signaled
        || !node.matrix.set_label_state(
            entry_idx,
            LspType::Primary,
            LabelState::Removing,
        )
    {
        finalize_leg(node, ctx.links, entry_idx, LspType::Primary);
        return;
    }

    let timeout_ns = node.protocol.tldp_timeout_ns;
    let attempts = node.protocol.tldp_attempts;
    node.matrix[entry_idx].outgoing.retry.arm(
        PendingOp::Removal(Direction::Upstream),
        timeout_ns,
        attempts,
    );
    send_upstream(
        node,
        ctx,
        entry_idx,
        TldpMessageType::LabelRemovalRequest,
        None,
    );
}

// Marks a leg as withdrawn and releases its link accounting.
pub(crate) fn finalize_leg(
    node: &mut MplsNode,
    links: &mut Links,
    entry_idx: EntryIndex,
    lsp_type: LspType,
) {
    uncount_link(node, links, entry_idx, lsp_type);
    node.matrix
        .set_label_state(entry_idx, lsp_type, LabelState::Withdrawn);
}

// Removes an entry regardless of its state.
pub(crate) fn force_remove(
    node: &mut MplsNode,
    links: &mut Links,
    entry_idx: EntryIndex,
) {
    uncount_link(node, links, entry_idx, LspType::Primary);
    uncount_link(node, links, entry_idx, LspType::Backup);
    node.matrix.remove(entry_idx);
}

// Promotes the established backup leg to primary.
pub(crate) fn switch_to_backup(
    node: &mut MplsNode,
    links: &mut Links,
    entry_idx: EntryIndex,
) {
    uncount_link(node, links, entry_idx, LspType::Primary);
    node.matrix.switch_to_backup(entry_idx);

    let entry = &node.matrix[entry_idx];
    if entry.flags.contains(EntryFlags::PRIMARY_LINK_COUNTED)
        && let Some(port) = entry.outgoing.port
        && let Some(port) = node.core.ports.get(port)
    {
        links[port.link_idx].backup_lsp_to_lsp();
    }
}

// ===== link accounting =====

pub(crate) fn count_link(
    node: &mut MplsNode,
    links: &mut Links,
    entry_idx: EntryIndex,
    lsp_type: LspType,
) {
    let entry = &mut node.matrix[entry_idx];
    let flag = counted_flag(lsp_type);
    if entry.flags.contains(flag) {
        return;
    }
    let Some(port) = entry
        .leg(lsp_type)
        .port
        .and_then(|port| node.core.ports.get(port))
    else {
        return;
    };

    entry.flags.insert(flag);
    let link = &mut links[port.link_idx];
    match lsp_type {
        LspType::Primary => link.link_lsp(),
        LspType::Backup => link.link_backup_lsp(),
    }
}

pub(crate) fn uncount_link(
    node: &mut MplsNode,
    links: &mut Links,
    entry_idx: EntryIndex,
    lsp_type: LspType,
) {
    let entry = &mut node.matrix[entry_idx];
    let flag = counted_flag(lsp_type);
    if !entry.flags.contains(flag) {
        return;
    }

    entry.flags.remove(flag);
    let Some(port) = entry
        .leg(lsp_type)
        .port
        .and_then(|port| node.core.ports.get(port))
    else {
        return;
    };
    let link = &mut links[port.link_idx];
    match lsp_type {
        LspType::Primary => link.unlink_lsp(),
        LspType::Backup => link.unlink_backup_lsp(),
    }
}

fn counted_flag(lsp_type: LspType) -> EntryFlags {
    match lsp_type {
        LspType::Primary => EntryFlags::PRIMARY_LINK_COUNTED,
        LspType::Backup => EntryFlags::BACKUP_LINK_COUNTED,
    }
}

// ===== helper functions =====

pub(crate) fn is_internal(
    node: &MplsNode,
    links: &Links,
    port_id: PortId,
) -> bool {
    node.core
        .ports
        .get(port_id)
        .is_some_and(|port| links[port.link_idx].kind == LinkKind::Internal)
}

fn send_upstream(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
    msg_type: TldpMessageType,
    label: Option<Label>,
) {
    let entry = &node.matrix[entry_idx];
    let Some(session_id) = entry.upstream_session_id else {
        return;
    };

    let mut msg = TldpMsg::new(
        msg_type,
        session_id,
        entry.tail_end,
        entry.upstream_lsp_type(),
        Direction::Upstream,
    );
    msg.label = label;
    let port = entry.incoming_port;
    send_msg(node, ctx, port, msg);
}

fn send_msg(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    msg: TldpMsg,
) {
    let Some(peer) = node.core.ports.get(port).map(|port| port.peer) else {
        return;
    };

    Debug::TldpMsgTx(&node.core.addr, port, &msg).log();
    *node.core.stats.tldp_tx.entry(msg.msg_type).or_default() += 1;
    let packet = TldpPacket::new(node.core.addr, peer, msg);
    node.core.send(ctx.links, port, packet.into());
}
