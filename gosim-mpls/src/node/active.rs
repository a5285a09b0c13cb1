//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use crate::debug::Debug;
use crate::error::{DiscardReason, Error};
use crate::gpsrp::{GpsrpOutcome, GpsrpRequest, GpsrpTimer};
use crate::node::{Disposition, MplsNode, NodeCtx};
use crate::packet::{
    GpsrpMessageType, GpsrpMsg, GpsrpPacket, Ipv4Header, Packet,
};
use crate::port::PortId;

// ===== GoS packet handling =====

// Asks for the retransmission of GoS packets that were dropped because the
// input buffer was full.
//
// The request goes to the nearest active node the packet crossed. The
// farther ones are kept as fallbacks.
pub(crate) fn process_overflow(node: &mut MplsNode, ctx: &mut NodeCtx<'_>) {
    let overflow = node.core.take_overflow();
    let addr = node.core.addr;
    let timeout_ns = node.protocol.gpsrp_timeout_ns;
    let attempts = node.protocol.gpsrp_attempts;

    for (_, packet) in overflow {
        let Some(active) = &mut node.active else {
            return;
        };
        let header = packet.header();
        let Some(options) = &header.options else {
            continue;
        };
        let flow_id = header.flow_id();
        let packet_id = options.packet_id;
        if active.gpsrp.contains(flow_id, packet_id) {
            continue;
        }

        let mut trail = options.crossed_active_nodes.clone();
        trail.retain(|hop| *hop != addr);
        let Some(target) = trail.pop() else {
            continue;
        };
        let Some(port) = node.core.port_towards(ctx.topology, target) else {
            Error::NoRoute(addr, target).log();
            continue;
        };

        let request = GpsrpRequest::new(
            flow_id, packet_id, port, target, trail, attempts, timeout_ns,
        );
        Debug::GpsrpRequestCreate(&addr, &request).log();
        active.gpsrp.insert(request);

        let msg = GpsrpMsg::new(
            GpsrpMessageType::RetransmissionRequest,
            flow_id,
            packet_id,
        );
        send_msg(node, ctx, port, target, msg);
    }
}

// Stamps a GoS packet with this node's address and retains a copy of it for
// later retransmission.
pub(crate) fn forward_gos(node: &mut MplsNode, packet: &mut Packet) {
    let Some(active) = &mut node.active else {
        return;
    };
    if !packet.is_gos() {
        return;
    }

    packet.header_mut().stamp_active_node(
        node.core.addr,
        node.protocol.max_crossed_active_nodes,
    );
    active.dmgp.retain(packet.clone());
}

// Completes an outstanding request when the retransmitted packet shows up.
pub(crate) fn resolve_pending(node: &mut MplsNode, header: &Ipv4Header) {
    let Some(packet_id) = header.packet_id() else {
        return;
    };
    delete_request(
        node,
        header.flow_id(),
        packet_id,
        GpsrpOutcome::Retransmitted,
    );
}

// ===== GPSRP message receipt =====

pub(crate) fn process_packet(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    packet: GpsrpPacket,
) -> Disposition {
    let addr = node.core.addr;

    // Relay messages addressed to other nodes.
    if packet.header.destination != addr {
        let destination = packet.header.destination;
        if node.core.send_towards(ctx, destination, packet.into()) {
            return Disposition::Switched;
        }
        return Disposition::Consumed;
    }

    let origin = packet.header.origin;
    let msg = packet.msg;
    Debug::GpsrpMsgRx(&addr, port, &msg).log();
    *node.core.stats.gpsrp_rx.entry(msg.msg_type).or_default() += 1;

    if node.active.is_none() {
        return Disposition::Discard(DiscardReason::UnsupportedPacket);
    }

    let result = match msg.msg_type {
        GpsrpMessageType::RetransmissionRequest => {
            process_request(node, ctx, port, origin, &msg);
            Ok(())
        }
        GpsrpMessageType::RetransmissionNotPossible => {
            process_not_possible(node, ctx, &msg)
        }
        GpsrpMessageType::RetransmissionOk => process_ok(node, &msg),
    };

    match result {
        Ok(()) => Disposition::Consumed,
        Err(error) => {
            error.log();
            Disposition::Discard(DiscardReason::ProtocolViolation)
        }
    }
}

fn process_request(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    origin: Ipv4Addr,
    msg: &GpsrpMsg,
) {
    let Some(active) = &node.active else {
        return;
    };

    let retained = active.dmgp.get(msg.flow_id, msg.packet_id).cloned();
    match retained {
        Some(packet) => {
            Debug::GpsrpRetransmit(
                &node.core.addr,
                msg.flow_id,
                msg.packet_id,
                port,
            )
            .log();
            node.core.stats.retransmissions += 1;
            node.core.send(ctx.links, port, packet);
        }
        None => {
            let msg = GpsrpMsg::new(
                GpsrpMessageType::RetransmissionNotPossible,
                msg.flow_id,
                msg.packet_id,
            );
            send_msg(node, ctx, port, origin, msg);
        }
    }
}

fn process_not_possible(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    msg: &GpsrpMsg,
) -> Result<(), Error> {
    let addr = node.core.addr;
    let Some(request) = node
        .active
        .as_mut()
        .and_then(|active| active.gpsrp.get_mut(msg.flow_id, msg.packet_id))
    else {
        return Err(Error::GpsrpUnknownRequest(
            addr,
            msg.flow_id,
            msg.packet_id,
        ));
    };

    // Retarget the request to the next active node on the trail.
    let next = request.trail.pop().and_then(|target| {
        node.core
            .port_towards(ctx.topology, target)
            .map(|port| (target, port))
    });
    let Some((target, port)) = next else {
        delete_request(
            node,
            msg.flow_id,
            msg.packet_id,
            GpsrpOutcome::NotPossible,
        );
        return Ok(());
    };
    request.target = target;
    request.port = port;
    request.attempts = node.protocol.gpsrp_attempts;
    request.timeout_ns = node.protocol.gpsrp_timeout_ns;

    let msg = GpsrpMsg::new(
        GpsrpMessageType::RetransmissionRequest,
        msg.flow_id,
        msg.packet_id,
    );
    send_msg(node, ctx, port, target, msg);

    Ok(())
}

fn process_ok(node: &mut MplsNode, msg: &GpsrpMsg) -> Result<(), Error> {
    if !delete_request(node, msg.flow_id, msg.packet_id, GpsrpOutcome::Ok) {
        return Err(Error::GpsrpUnknownRequest(
            node.core.addr,
            msg.flow_id,
            msg.packet_id,
        ));
    }

    Ok(())
}

// ===== GPSRP timers and connectivity =====

pub(crate) fn process_timers(node: &mut MplsNode, ctx: &mut NodeCtx<'_>) {
    let Some(active) = &node.active else {
        return;
    };
    let elapsed_ns = ctx.event.tick_duration_ns;
    let timeout_ns = node.protocol.gpsrp_timeout_ns;

    for (flow_id, packet_id) in active.gpsrp.keys() {
        let Some(request) = node
            .active
            .as_mut()
            .and_then(|active| active.gpsrp.get_mut(flow_id, packet_id))
        else {
            continue;
        };

        match request.tick(elapsed_ns, timeout_ns) {
            GpsrpTimer::Waiting => {}
            GpsrpTimer::Resend => {
                let port = request.port;
                let target = request.target;
                let msg = GpsrpMsg::new(
                    GpsrpMessageType::RetransmissionRequest,
                    flow_id,
                    packet_id,
                );
                send_msg(node, ctx, port, target, msg);
            }
            GpsrpTimer::Exhausted => {
                delete_request(
                    node,
                    flow_id,
                    packet_id,
                    GpsrpOutcome::Exhausted,
                );
            }
        }
    }
}

// Drops requests whose outgoing link went down.
pub(crate) fn connectivity_check(node: &mut MplsNode, ctx: &mut NodeCtx<'_>) {
    let Some(active) = &node.active else {
        return;
    };

    let dead = active
        .gpsrp
        .iter()
        .filter(|request| !node.core.is_port_live(ctx.links, request.port))
        .map(|request| (request.flow_id, request.packet_id))
        .collect::<Vec<_>>();
    for (flow_id, packet_id) in dead {
        delete_request(node, flow_id, packet_id, GpsrpOutcome::LinkDown);
    }
}

// ===== helper functions =====

fn delete_request(
    node: &mut MplsNode,
    flow_id: u32,
    packet_id: u32,
    outcome: GpsrpOutcome,
) -> bool {
    let Some(request) = node
        .active
        .as_mut()
        .and_then(|active| active.gpsrp.remove(flow_id, packet_id))
    else {
        return false;
    };

    Debug::GpsrpRequestDelete(&node.core.addr, &request, outcome).log();
    true
}

fn send_msg(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    port: PortId,
    destination: Ipv4Addr,
    msg: GpsrpMsg,
) {
    Debug::GpsrpMsgTx(&node.core.addr, port, &msg).log();
    *node.core.stats.gpsrp_tx.entry(msg.msg_type).or_default() += 1;
    let packet = GpsrpPacket::new(node.core.addr, destination, msg);
    node.core.send(ctx.links, port, packet.into());
}
