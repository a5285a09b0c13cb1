//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use const_addrs::ip4;
use gosim_mpls::error::DiscardReason;
use gosim_mpls::matrix::{LabelOrFec, LabelStackOp, LabelState};
use gosim_mpls::packet::{
    Direction, GosLevel, LspType, MplsPacket, TldpMessageType, TldpMsg,
    TldpPacket,
};
use gosim_utils::mpls::Label;
use maplit::btreemap;

use crate::common::{
    addr, in_flight, ipv4_packet, link, linear, only_entry, receiver_stats,
    scenario, stats, tldp_tx,
};

const CBR_TRAFFIC: &str = r#"
[clock]
tick_ns = 10000
duration_ns = 20000000

[[traffic]]
sender = "S"
destination = "R"
rate_mbps = 10
packet_size = 100
"#;

//
// Test description:
//
// Constant bit rate traffic from S to R sets up an LSP A -> B -> C on
// demand. Every packet is delivered once the LSP is up, and no node ever
// processes more octets per tick than its rate allows.
//
#[test]
fn lsp_setup_end_to_end() {
    let mut scenario = linear("ler", "lsr", CBR_TRAFFIC);

    while scenario.tick() {
        for node in scenario.nodes.iter() {
            let stats = &node.core().stats;
            assert!(stats.last_tick_octets <= stats.last_tick_budget);
        }
    }

    // Ingress: push the label allocated by B.
    let entry = only_entry(&scenario, "A");
    assert_eq!(entry.label_stack_op, LabelStackOp::Push);
    assert_eq!(entry.outgoing.label, LabelState::Label(Label::new(16)));

    // Transit: swap the local label for the one allocated by C.
    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.label_stack_op, LabelStackOp::Swap);
    assert_eq!(entry.local_label(), Some(Label::new(16)));
    assert_eq!(entry.outgoing.label, LabelState::Label(Label::new(16)));

    // Egress: pop towards the receiver.
    let entry = only_entry(&scenario, "C");
    assert_eq!(entry.label_stack_op, LabelStackOp::Pop);
    assert_eq!(entry.local_label(), Some(Label::new(16)));
    assert_eq!(entry.outgoing.label, LabelState::Assigned);
    assert_eq!(entry.outgoing.port, scenario.port_towards("C", "R").ok());

    assert_eq!(link(&scenario, "A", "B").lsp_count(), 1);
    assert_eq!(link(&scenario, "B", "C").lsp_count(), 1);
    assert_eq!(
        stats(&scenario, "A").tldp_tx,
        btreemap! { TldpMessageType::LabelRequest => 1 }
    );
    assert_eq!(
        stats(&scenario, "B").tldp_tx,
        btreemap! {
            TldpMessageType::LabelRequest => 1,
            TldpMessageType::LabelRequestOk => 1,
        }
    );
    assert_eq!(
        stats(&scenario, "C").tldp_tx,
        btreemap! { TldpMessageType::LabelRequestOk => 1 }
    );

    for name in ["A", "B", "C"] {
        assert_eq!(stats(&scenario, name).total_discards(), 0);
    }
    let generated = scenario
        .node("S")
        .unwrap()
        .as_sender()
        .unwrap()
        .generators()[0]
        .generated;
    let received = receiver_stats(&scenario, "R");
    assert!(received.packets > 100);
    assert!(received.packets <= generated);
    assert_eq!(received.duplicates, 0);
    assert_eq!(received.gos_packets, 0);
    let flow = received.per_flow[&u32::from(addr(&scenario, "S"))];
    assert_eq!(flow.packets, received.packets);
    assert_eq!(flow.octets, received.packets * 120);
}

//
// Test description:
//
// An active LER carries the GoS level of the packet in a shim label below
// the LSP label, stamps itself on the packet and keeps a copy in its DMGP.
//
#[test]
fn active_ingress_pushes_gos_shim() {
    let mut scenario = linear(
        "active-ler",
        "lsr",
        r#"
[[traffic]]
sender = "S"
destination = "R"
rate_mbps = 10
packet_size = 100
gos_level = 2
backup_lsp = true
"#,
    );

    // Run until the first labeled packet leaves A.
    let mut labeled = None;
    for _ in 0..1000 {
        scenario.step();
        labeled = in_flight(&scenario, "A", "B")
            .into_iter()
            .find_map(|packet| packet.as_mpls().cloned());
        if labeled.is_some() {
            break;
        }
    }
    let packet = labeled.unwrap();
    let a = addr(&scenario, "A");

    assert_eq!(packet.depth(), 2);
    let shim = &packet.stack[0];
    assert!(shim.is_gos_shim());
    assert_eq!(shim.gos_level(), GosLevel::new(2, true).unwrap());
    // Entering the domain costs a single hop.
    assert_eq!(shim.ttl, packet.ipv4.ttl);
    assert_eq!(packet.ttl(), packet.ipv4.ttl - 1);
    assert_eq!(packet.ipv4.last_crossed_active_node(), Some(a));

    let flow_id = packet.ipv4.flow_id();
    let packet_id = packet.ipv4.packet_id().unwrap();
    let active = scenario.mpls_node("A").unwrap().active.as_ref().unwrap();
    let retained = active.dmgp.get(flow_id, packet_id).unwrap();
    assert_eq!(retained.as_mpls(), Some(&packet));
}

//
// Test description:
//
// Labeled packets without a matching entry create one on the fly and wait
// for the downstream label, while packets with an exhausted TTL are dropped.
//
#[test]
fn transit_ilm_entries() {
    let mut scenario = linear("ler", "lsr", "");
    let (s, r) = (addr(&scenario, "S"), addr(&scenario, "R"));

    let mut packet = MplsPacket::from_ipv4(ipv4_packet(s, r, 100));
    packet.push(Label::new(100), 0);
    scenario.inject("B", 0, packet.clone().into()).unwrap();
    scenario.step();

    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.label_or_fec, LabelOrFec::Label(Label::new(100)));
    assert_eq!(entry.upstream_session_id, None);
    assert_eq!(entry.label_stack_op, LabelStackOp::Swap);
    assert_eq!(entry.outgoing.label, LabelState::Requested);
    assert_eq!(tldp_tx(&scenario, "B", TldpMessageType::LabelRequest), 1);
    assert_eq!(scenario.node("B").unwrap().core().ports.queued_packets(), 1);

    // The waiting packet blocks port 0, so use the other port. TTL expiry
    // is checked before the lookup.
    packet.stack[0].ttl = 0;
    scenario.inject("B", 1, packet.into()).unwrap();
    // Core routers only switch labeled traffic.
    scenario
        .inject("B", 1, ipv4_packet(s, r, 100).into())
        .unwrap();
    scenario.run_ticks(2);
    let b_stats = stats(&scenario, "B");
    assert_eq!(b_stats.discards(DiscardReason::TtlExpired), 1);
    assert_eq!(b_stats.discards(DiscardReason::UnsupportedPacket), 1);
    assert_eq!(scenario.mpls_node("B").unwrap().matrix.len(), 1);
}

//
// Test description:
//
// ILM entries that can't be resolved are removed once their packets are
// dropped, returning the incoming label to the label space.
//
#[test]
fn unresolved_ilm_entries_removed() {
    let mut scenario = linear("ler", "lsr", "");
    let (b, c, s, r) = (
        addr(&scenario, "B"),
        addr(&scenario, "C"),
        addr(&scenario, "S"),
        addr(&scenario, "R"),
    );

    // No route towards the destination.
    let mut packet =
        MplsPacket::from_ipv4(ipv4_packet(s, ip4!("10.9.9.9"), 100));
    packet.push(Label::new(100), 0);
    scenario.inject("B", 0, packet.into()).unwrap();
    scenario.step();
    let matrix = &scenario.mpls_node("B").unwrap().matrix;
    assert!(matrix.is_empty());
    assert_eq!(matrix.labels_in_use(), 0);
    assert_eq!(stats(&scenario, "B").discards(DiscardReason::NoRoute), 1);

    // The downstream node refuses to provide a label.
    let mut packet = MplsPacket::from_ipv4(ipv4_packet(s, r, 100));
    packet.push(Label::new(100), 0);
    scenario.inject("B", 0, packet.into()).unwrap();
    scenario.step();
    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.outgoing.label, LabelState::Requested);
    assert_eq!(
        scenario.mpls_node("B").unwrap().matrix.labels_in_use(),
        1
    );

    let denied = TldpPacket::new(
        c,
        b,
        TldpMsg::new(
            TldpMessageType::LabelRequestDenied,
            entry.local_session_id,
            r,
            LspType::Primary,
            Direction::Upstream,
        ),
    );
    scenario.inject("B", 1, denied.into()).unwrap();
    scenario.run_ticks(2);

    let matrix = &scenario.mpls_node("B").unwrap().matrix;
    assert!(matrix.is_empty());
    assert_eq!(matrix.labels_in_use(), 0);
    assert_eq!(
        stats(&scenario, "B").discards(DiscardReason::LabelUnavailable),
        1
    );
    // Nobody upstream to tell.
    assert_eq!(
        tldp_tx(&scenario, "B", TldpMessageType::LabelRequestDenied),
        0
    );
    assert!(in_flight(&scenario, "A", "B").is_empty());
}

//
// Test description:
//
// A labeled packet arrives with a label that B hasn't allocated yet. The
// label is taken out of the label space, so the LSP set up afterwards for
// regular traffic gets a different local label and both entries keep
// switching their own packets.
//
#[test]
fn stray_label_kept_out_of_label_space() {
    let mut scenario = linear("ler", "lsr", CBR_TRAFFIC);
    let (s, r) = (addr(&scenario, "S"), addr(&scenario, "R"));

    let mut packet = MplsPacket::from_ipv4(ipv4_packet(s, r, 100));
    packet.push(Label::new(16), 0);
    scenario.inject("B", 0, packet.into()).unwrap();
    scenario.run();

    let matrix = &scenario.mpls_node("B").unwrap().matrix;
    assert_eq!(matrix.len(), 2);
    assert_eq!(matrix.labels_in_use(), 2);
    let keys = matrix
        .iter()
        .map(|entry| (entry.incoming_port, entry.label_or_fec))
        .collect::<BTreeSet<_>>();
    assert_eq!(keys.len(), 2);

    let stray = matrix
        .iter()
        .find(|entry| entry.upstream_session_id.is_none())
        .unwrap();
    assert_eq!(stray.label_or_fec, LabelOrFec::Label(Label::new(16)));
    assert_eq!(stray.outgoing.label, LabelState::Label(Label::new(16)));
    let transit = matrix
        .iter()
        .find(|entry| entry.upstream_session_id.is_some())
        .unwrap();
    assert_eq!(transit.local_label(), Some(Label::new(17)));
    assert_eq!(transit.outgoing.label, LabelState::Label(Label::new(17)));

    let entry = only_entry(&scenario, "A");
    assert_eq!(entry.outgoing.label, LabelState::Label(Label::new(17)));

    let received = receiver_stats(&scenario, "R");
    assert!(received.packets > 100);
    assert_eq!(received.duplicates, 0);
    assert_eq!(stats(&scenario, "B").total_discards(), 0);
}

//
// Test description:
//
// Traffic towards an unknown destination can't be routed by the ingress.
//
#[test]
fn ingress_without_route() {
    let mut scenario = linear("ler", "lsr", "");
    let s = addr(&scenario, "S");

    scenario
        .inject("A", 0, ipv4_packet(s, ip4!("10.9.9.9"), 100).into())
        .unwrap();
    scenario.step();

    let entry = only_entry(&scenario, "A");
    assert_eq!(entry.outgoing.label, LabelState::Unavailable);
    assert_eq!(entry.outgoing.port, None);
    assert_eq!(stats(&scenario, "A").discards(DiscardReason::NoRoute), 1);
    assert_eq!(tldp_tx(&scenario, "A", TldpMessageType::LabelRequest), 0);
}

//
// Test description:
//
// A 1 Mbps LER needs 96 ticks of 10 us to afford a 120-octet packet. Unspent
// time accumulates while the packet waits, and the whole budget is spent
// once it is processed.
//
#[test]
fn processing_budget_carry_over() {
    let mut scenario = scenario(
        r#"
[[node]]
name = "S"
kind = "sender"
address = "10.0.0.1"

[[node]]
name = "A"
kind = "ler"
address = "10.0.0.2"
rate_mbps = 1

[[link]]
a = "S"
b = "A"
"#,
    );
    let s = addr(&scenario, "S");

    scenario
        .inject("A", 0, ipv4_packet(s, ip4!("10.9.9.9"), 100).into())
        .unwrap();

    scenario.run_ticks(95);
    let a = scenario.node("A").unwrap().core();
    assert_eq!(a.ports.queued_packets(), 1);
    assert_eq!(a.stats.last_tick_budget, 118);
    assert_eq!(a.ticks_without_emitting(), 95);

    scenario.step();
    let a = scenario.node("A").unwrap().core();
    assert_eq!(a.ports.queued_packets(), 0);
    assert_eq!(a.stats.last_tick_octets, 120);
    assert_eq!(a.stats.last_tick_budget, 120);
    assert_eq!(a.available_ns(), 0);
    assert_eq!(a.stats.discards(DiscardReason::NoRoute), 1);

    // Without queued work, the budget no longer accumulates.
    scenario.step();
    let a = scenario.node("A").unwrap().core();
    assert_eq!(a.stats.last_tick_budget, 1);
    assert_eq!(a.ticks_without_emitting(), 0);
}
