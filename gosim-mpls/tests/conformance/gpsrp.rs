//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use gosim_mpls::error::DiscardReason;
use gosim_mpls::gpsrp::GpsrpRequest;
use gosim_mpls::packet::{
    GpsrpMessageType, GpsrpMsg, GpsrpPacket, MplsPacket, Packet,
};
use gosim_mpls::scenario::Scenario;

use crate::common::{
    addr, fill_buffer, gos_packet, gpsrp_rx, gpsrp_tx, in_flight, scenario,
    stats,
};

const FLOW_ID: u32 = 5;

// Two adjacent nodes, with a fast Y so that its input buffer drains in a
// few ticks.
fn pair(x_kind: &str, extra: &str) -> Scenario {
    scenario(&format!(
        r#"
[[node]]
name = "X"
kind = "{x_kind}"
address = "10.0.0.1"

[[node]]
name = "Y"
kind = "active-lsr"
address = "10.0.0.2"
rate_mbps = 10000

[[link]]
a = "X"
b = "Y"

{extra}
"#
    ))
}

// Labeled GoS packet of flow 5 that crossed the given active nodes.
fn lost_packet(
    scenario: &Scenario,
    packet_id: u32,
    trail: &[&str],
) -> MplsPacket {
    let trail = trail.iter().map(|name| addr(scenario, name)).collect();
    gos_packet(Ipv4Addr::from(FLOW_ID), addr(scenario, "X"), packet_id, trail)
}

// Makes Y drop the given packet because its input buffer is full.
fn overflow(scenario: &mut Scenario, packet: MplsPacket) {
    fill_buffer(scenario, "Y", 0);
    scenario.inject("Y", 0, packet.into()).unwrap();
    let y_stats = stats(scenario, "Y");
    assert_eq!(y_stats.discards(DiscardReason::BufferOverflow), 1);
}

fn retain(scenario: &mut Scenario, name: &str, packet: MplsPacket) {
    let node = scenario.node_mut(name).unwrap().mpls_mut().unwrap();
    assert!(node.active.as_mut().unwrap().dmgp.retain(packet.into()));
}

fn pending_request<'a>(
    scenario: &'a Scenario,
    name: &str,
    packet_id: u32,
) -> Option<&'a GpsrpRequest> {
    let node = scenario.mpls_node(name).unwrap();
    node.active.as_ref().unwrap().gpsrp.get(FLOW_ID, packet_id)
}

fn star() -> Scenario {
    scenario(
        r#"
[[node]]
name = "L1"
kind = "ler"
address = "10.0.0.1"

[[node]]
name = "L2"
kind = "ler"
address = "10.0.0.2"

[[node]]
name = "L3"
kind = "ler"
address = "10.0.0.3"

[[node]]
name = "X"
kind = "active-lsr"
address = "10.0.0.4"

[[link]]
a = "X"
b = "L1"

[[link]]
a = "X"
b = "L2"

[[link]]
a = "X"
b = "L3"
"#,
    )
}

fn request_from_l3(scenario: &mut Scenario, packet_id: u32) {
    let msg = GpsrpMsg::new(
        GpsrpMessageType::RetransmissionRequest,
        FLOW_ID,
        packet_id,
    );
    let packet =
        GpsrpPacket::new(addr(scenario, "L3"), addr(scenario, "X"), msg);
    let port = scenario.port_towards("X", "L3").unwrap();
    assert_eq!(port, 2);
    scenario.inject("X", port, packet.into()).unwrap();
}

//
// Test description:
//
// An active node asked for a packet it retained sends the packet back
// through the port the request came from.
//
#[test]
fn request_dmgp_hit() {
    let mut scenario = star();
    let x = addr(&scenario, "X");
    let l1 = addr(&scenario, "L1");
    let packet = gos_packet(Ipv4Addr::from(FLOW_ID), l1, 9001, vec![x]);
    retain(&mut scenario, "X", packet.clone());

    request_from_l3(&mut scenario, 9001);
    scenario.step();

    assert_eq!(in_flight(&scenario, "X", "L3"), [&Packet::Mpls(packet)]);
    assert!(in_flight(&scenario, "X", "L1").is_empty());
    let x_stats = stats(&scenario, "X");
    assert_eq!(x_stats.retransmissions, 1);
    assert!(x_stats.gpsrp_tx.is_empty());
    assert_eq!(
        gpsrp_rx(&scenario, "X", GpsrpMessageType::RetransmissionRequest),
        1
    );
}

//
// Test description:
//
// An active node asked for a packet it doesn't have answers that the
// retransmission isn't possible.
//
#[test]
fn request_dmgp_miss() {
    let mut scenario = star();
    let x = addr(&scenario, "X");
    let l1 = addr(&scenario, "L1");
    let packet = gos_packet(Ipv4Addr::from(FLOW_ID), l1, 9001, vec![x]);
    retain(&mut scenario, "X", packet);

    request_from_l3(&mut scenario, 9002);
    scenario.step();

    let in_flight = in_flight(&scenario, "X", "L3");
    assert_eq!(in_flight.len(), 1);
    let answer = in_flight[0].as_gpsrp().unwrap();
    assert_eq!(answer.header.destination, addr(&scenario, "L3"));
    assert_eq!(
        answer.msg,
        GpsrpMsg::new(
            GpsrpMessageType::RetransmissionNotPossible,
            FLOW_ID,
            9002
        )
    );
    assert_eq!(stats(&scenario, "X").retransmissions, 0);
}

//
// Test description:
//
// A GoS packet dropped by a full buffer is requested once from the nearest
// active node it crossed. The retransmitted copy resolves the request.
//
#[test]
fn overflow_requests_retransmission_once() {
    let mut scenario = pair("active-lsr", "");
    let packet = lost_packet(&scenario, 7, &["X"]);
    retain(&mut scenario, "X", packet.clone());
    overflow(&mut scenario, packet);

    scenario.step();
    let request = pending_request(&scenario, "Y", 7).unwrap();
    assert_eq!(request.target, addr(&scenario, "X"));
    assert!(request.trail.is_empty());
    assert_eq!(
        gpsrp_tx(&scenario, "Y", GpsrpMessageType::RetransmissionRequest),
        1
    );

    // Request and retransmission each cross the link once.
    scenario.run_ticks(250);
    assert!(pending_request(&scenario, "Y", 7).is_none());
    assert_eq!(stats(&scenario, "X").retransmissions, 1);

    scenario.run_ticks(1000);
    assert_eq!(stats(&scenario, "X").retransmissions, 1);
    assert_eq!(
        gpsrp_tx(&scenario, "Y", GpsrpMessageType::RetransmissionRequest),
        1
    );
    let y_stats = stats(&scenario, "Y");
    assert_eq!(y_stats.discards(DiscardReason::BufferOverflow), 1);
}

//
// Test description:
//
// When the nearest active node can't retransmit, the request moves on to
// the next active node of the trail, crossing the first one.
//
#[test]
fn not_possible_retargets_request() {
    let mut scenario = scenario(
        r#"
[[node]]
name = "W"
kind = "active-lsr"
address = "10.0.0.1"

[[node]]
name = "X"
kind = "active-lsr"
address = "10.0.0.2"

[[node]]
name = "Y"
kind = "active-lsr"
address = "10.0.0.3"
rate_mbps = 10000

[[link]]
a = "W"
b = "X"

[[link]]
a = "X"
b = "Y"
"#,
    );
    let packet = lost_packet(&scenario, 7, &["W", "X"]);
    retain(&mut scenario, "W", packet.clone());
    overflow(&mut scenario, packet);

    scenario.step();
    let request = pending_request(&scenario, "Y", 7).unwrap();
    assert_eq!(request.target, addr(&scenario, "X"));
    assert_eq!(request.trail, [addr(&scenario, "W")]);

    // Y -> X, X -> Y (not possible), Y -> X -> W.
    scenario.run_ticks(450);
    let request = pending_request(&scenario, "Y", 7).unwrap();
    assert_eq!(request.target, addr(&scenario, "W"));
    assert!(request.trail.is_empty());
    assert_eq!(
        gpsrp_tx(&scenario, "Y", GpsrpMessageType::RetransmissionRequest),
        2
    );
    assert_eq!(
        gpsrp_tx(&scenario, "X", GpsrpMessageType::RetransmissionNotPossible),
        1
    );
    assert_eq!(
        gpsrp_rx(&scenario, "X", GpsrpMessageType::RetransmissionRequest),
        1
    );
    assert_eq!(stats(&scenario, "X").switched, 1);
    assert_eq!(stats(&scenario, "W").retransmissions, 1);
}

//
// Test description:
//
// Unanswered requests are resent until the attempts run out, then dropped.
//
#[test]
fn request_attempts_exhausted() {
    let mut scenario = pair(
        "lsr",
        r#"
[protocol]
gpsrp_timeout_ns = 1000000
gpsrp_attempts = 2
"#,
    );
    let packet = lost_packet(&scenario, 7, &["X"]);
    overflow(&mut scenario, packet);

    scenario.run_ticks(299);
    assert!(pending_request(&scenario, "Y", 7).is_some());
    assert_eq!(
        gpsrp_tx(&scenario, "Y", GpsrpMessageType::RetransmissionRequest),
        3
    );

    scenario.step();
    assert!(pending_request(&scenario, "Y", 7).is_none());
    assert_eq!(
        gpsrp_rx(&scenario, "X", GpsrpMessageType::RetransmissionRequest),
        3
    );
    let x_stats = stats(&scenario, "X");
    assert_eq!(x_stats.discards(DiscardReason::UnsupportedPacket), 3);
}

//
// Test description:
//
// Requests leaving through a failed link are dropped.
//
#[test]
fn request_link_down() {
    let mut scenario = pair("active-lsr", "");
    let packet = lost_packet(&scenario, 7, &["X"]);
    overflow(&mut scenario, packet);

    scenario.step();
    assert!(pending_request(&scenario, "Y", 7).is_some());

    scenario.break_link("X", "Y").unwrap();
    scenario.step();
    assert!(pending_request(&scenario, "Y", 7).is_none());
}
