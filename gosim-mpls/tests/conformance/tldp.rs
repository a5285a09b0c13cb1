//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use const_addrs::ip4;
use gosim_mpls::error::DiscardReason;
use gosim_mpls::matrix::{LabelOrFec, LabelStackOp, LabelState, PendingOp};
use gosim_mpls::packet::{
    Direction, LspType, MplsPacket, Packet, TldpMessageType, TldpMsg,
    TldpPacket,
};
use gosim_mpls::scenario::Scenario;
use gosim_utils::mpls::Label;

use crate::common::{
    LINK_TICKS, addr, in_flight, ipv4_packet, linear, only_entry, scenario,
    stats, tldp_rx, tldp_tx,
};

// Returns the TLDP messages in flight between two nodes.
fn tldp_in_flight(
    scenario: &Scenario,
    a: &str,
    b: &str,
) -> Vec<TldpMsg> {
    in_flight(scenario, a, b)
        .into_iter()
        .filter_map(|packet| packet.as_tldp())
        .map(|packet| packet.msg.clone())
        .collect()
}

//
// Test description:
//
// An IPv4 packet reaches the ingress LER A with no LSP towards R. A creates
// the FEC entry, asks B for a label and holds the packet. Once B answers with
// label 37, the held packet leaves A labeled with 37.
//
#[test]
fn ingress_label_request_ok() {
    let mut scenario = linear("ler", "lsr", "");
    let (s, a, b, r) = (
        addr(&scenario, "S"),
        addr(&scenario, "A"),
        addr(&scenario, "B"),
        addr(&scenario, "R"),
    );

    scenario
        .inject("A", 0, ipv4_packet(s, r, 100).into())
        .unwrap();
    scenario.step();

    let entry = only_entry(&scenario, "A");
    assert_eq!(entry.outgoing.label, LabelState::Requested);
    assert_eq!(entry.label_stack_op, LabelStackOp::Push);
    assert_eq!(entry.outgoing.port, Some(1));
    assert_eq!(entry.local_session_id, 1);
    let session_id = entry.local_session_id;

    let msgs = tldp_in_flight(&scenario, "A", "B");
    assert_eq!(
        msgs,
        vec![TldpMsg::new(
            TldpMessageType::LabelRequest,
            session_id,
            r,
            LspType::Primary,
            Direction::Downstream,
        )]
    );
    // The packet waits for the label.
    assert_eq!(stats(&scenario, "A").total_discards(), 0);

    let answer = TldpPacket::new(
        b,
        a,
        TldpMsg::new(
            TldpMessageType::LabelRequestOk,
            session_id,
            r,
            LspType::Primary,
            Direction::Upstream,
        )
        .with_label(Label::new(37)),
    );
    scenario.inject("A", 1, answer.into()).unwrap();
    scenario.run_ticks(3);

    let entry = only_entry(&scenario, "A");
    assert_eq!(entry.outgoing.label, LabelState::Label(Label::new(37)));
    assert_eq!(scenario.link_between("A", "B").unwrap().lsp_count(), 1);

    let labeled = in_flight(&scenario, "A", "B")
        .into_iter()
        .filter_map(|packet| packet.as_mpls())
        .collect::<Vec<_>>();
    assert_eq!(labeled.len(), 1);
    assert_eq!(labeled[0].depth(), 1);
    assert_eq!(labeled[0].top().unwrap().label, Label::new(37));
    assert_eq!(labeled[0].ipv4.destination, r);
}

//
// Test description:
//
// B refuses to provide a label. The ingress entry becomes unavailable and
// the held packet is dropped, as is any later packet of the same FEC.
//
#[test]
fn ingress_label_request_denied() {
    let mut scenario = linear("ler", "lsr", "");
    let (s, a, b, r) = (
        addr(&scenario, "S"),
        addr(&scenario, "A"),
        addr(&scenario, "B"),
        addr(&scenario, "R"),
    );

    scenario
        .inject("A", 0, ipv4_packet(s, r, 100).into())
        .unwrap();
    scenario.step();

    let denied = TldpPacket::new(
        b,
        a,
        TldpMsg::new(
            TldpMessageType::LabelRequestDenied,
            1,
            r,
            LspType::Primary,
            Direction::Upstream,
        ),
    );
    scenario.inject("A", 1, denied.into()).unwrap();
    scenario.run_ticks(2);

    let entry = only_entry(&scenario, "A");
    assert_eq!(entry.outgoing.label, LabelState::Unavailable);
    assert!(entry.outgoing.retry.pending.is_none());
    assert_eq!(
        stats(&scenario, "A").discards(DiscardReason::LabelUnavailable),
        1
    );

    // The entry stays unavailable.
    scenario
        .inject("A", 0, ipv4_packet(s, r, 100).into())
        .unwrap();
    scenario.step();
    assert_eq!(
        stats(&scenario, "A").discards(DiscardReason::LabelUnavailable),
        2
    );
    assert_eq!(tldp_tx(&scenario, "A", TldpMessageType::LabelRequest), 1);
}

//
// Test description:
//
// A label request for an unreachable tail end reaches the LSR B. B answers
// with a denial on the port the request came from. A has no session matching
// the denial and discards it.
//
#[test]
fn transit_denies_unroutable_request() {
    let mut scenario = linear("ler", "lsr", "");
    let (a, b) = (addr(&scenario, "A"), addr(&scenario, "B"));

    let request = TldpPacket::new(
        a,
        b,
        TldpMsg::new(
            TldpMessageType::LabelRequest,
            7,
            ip4!("10.9.9.9"),
            LspType::Primary,
            Direction::Downstream,
        ),
    );
    scenario.inject("B", 0, request.into()).unwrap();
    scenario.step();

    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.outgoing.label, LabelState::Unavailable);
    assert_eq!(entry.upstream_session_id, Some(7));
    assert_eq!(entry.label_or_fec, LabelOrFec::Pending);

    let msgs = tldp_in_flight(&scenario, "A", "B");
    assert_eq!(
        msgs,
        vec![TldpMsg::new(
            TldpMessageType::LabelRequestDenied,
            7,
            ip4!("10.9.9.9"),
            LspType::Primary,
            Direction::Upstream,
        )]
    );

    scenario.run_ticks(LINK_TICKS);
    assert_eq!(
        tldp_rx(&scenario, "A", TldpMessageType::LabelRequestDenied),
        1
    );
    assert_eq!(
        stats(&scenario, "A").discards(DiscardReason::ProtocolViolation),
        1
    );
}

//
// Test description:
//
// B drops everything it receives. A retransmits its label request until the
// attempts run out, then removes the entry. The packet still held by A
// starts a new LSP setup with a fresh session.
//
#[test]
fn label_request_retransmission() {
    let mut scenario = scenario(
        r#"
[protocol]
tldp_timeout_ns = 1000000
tldp_attempts = 2

[[node]]
name = "S"
kind = "sender"
address = "10.0.0.1"

[[node]]
name = "A"
kind = "ler"
address = "10.0.0.2"

[[node]]
name = "B"
kind = "lsr"
address = "10.0.0.3"
buffer_mb = 0

[[node]]
name = "C"
kind = "ler"
address = "10.0.0.4"

[[node]]
name = "R"
kind = "receiver"
address = "10.0.0.5"

[[link]]
a = "S"
b = "A"

[[link]]
a = "A"
b = "B"

[[link]]
a = "B"
b = "C"

[[link]]
a = "C"
b = "R"
"#,
    );
    let (s, r) = (addr(&scenario, "S"), addr(&scenario, "R"));

    scenario
        .inject("A", 0, ipv4_packet(s, r, 100).into())
        .unwrap();

    // First attempt plus two retransmissions, 1 ms apart.
    scenario.run_ticks(3 * LINK_TICKS);
    assert_eq!(tldp_tx(&scenario, "A", TldpMessageType::LabelRequest), 3);
    let entry = only_entry(&scenario, "A");
    assert_eq!(entry.local_session_id, 1);
    assert_eq!(entry.outgoing.label, LabelState::Requested);

    scenario.step();
    assert_eq!(
        stats(&scenario, "B").discards(DiscardReason::BufferOverflow),
        3
    );
    assert_eq!(tldp_tx(&scenario, "A", TldpMessageType::LabelRequest), 4);
    let entry = only_entry(&scenario, "A");
    assert_eq!(entry.local_session_id, 2);
    assert_eq!(entry.outgoing.label, LabelState::Requested);
    assert!(matches!(
        in_flight(&scenario, "A", "B").last(),
        Some(Packet::Tldp(packet)) if packet.msg.session_id == 2
    ));
}

//
// Test description:
//
// C drops everything it receives. B retransmits the label request of an ILM
// entry until the attempts run out. The entry then goes away along with the
// packet waiting on it, and no new setup is started.
//
#[test]
fn ilm_label_request_retransmission() {
    let mut scenario = scenario(
        r#"
[protocol]
tldp_timeout_ns = 1000000
tldp_attempts = 2

[[node]]
name = "A"
kind = "ler"
address = "10.0.0.2"

[[node]]
name = "B"
kind = "lsr"
address = "10.0.0.3"

[[node]]
name = "C"
kind = "ler"
address = "10.0.0.4"
buffer_mb = 0

[[node]]
name = "R"
kind = "receiver"
address = "10.0.0.5"

[[link]]
a = "A"
b = "B"

[[link]]
a = "B"
b = "C"

[[link]]
a = "C"
b = "R"
"#,
    );
    let (a, r) = (addr(&scenario, "A"), addr(&scenario, "R"));

    let mut packet = MplsPacket::from_ipv4(ipv4_packet(a, r, 100));
    packet.push(Label::new(100), 0);
    scenario.inject("B", 0, packet.into()).unwrap();

    scenario.run_ticks(3 * LINK_TICKS);
    assert_eq!(tldp_tx(&scenario, "B", TldpMessageType::LabelRequest), 3);
    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.label_or_fec, LabelOrFec::Label(Label::new(100)));
    assert_eq!(entry.outgoing.label, LabelState::Requested);

    scenario.step();
    let matrix = &scenario.mpls_node("B").unwrap().matrix;
    assert!(matrix.is_empty());
    assert_eq!(matrix.labels_in_use(), 0);
    assert_eq!(
        stats(&scenario, "B").discards(DiscardReason::LabelUnavailable),
        1
    );
    assert_eq!(tldp_tx(&scenario, "B", TldpMessageType::LabelRequest), 3);
    assert_eq!(
        stats(&scenario, "C").discards(DiscardReason::BufferOverflow),
        3
    );
}

//
// A -- B -- C -- R
//
// A drops everything it receives. B holds a transit entry for session 7 of
// A, already resolved with label 16 from C.
//
fn transit_lsp() -> Scenario {
    let mut scenario = scenario(
        r#"
[protocol]
tldp_timeout_ns = 1000000
tldp_attempts = 2

[[node]]
name = "A"
kind = "ler"
address = "10.0.0.2"
buffer_mb = 0

[[node]]
name = "B"
kind = "lsr"
address = "10.0.0.3"

[[node]]
name = "C"
kind = "ler"
address = "10.0.0.4"

[[node]]
name = "R"
kind = "receiver"
address = "10.0.0.5"

[[link]]
a = "A"
b = "B"

[[link]]
a = "B"
b = "C"

[[link]]
a = "C"
b = "R"
"#,
    );
    let (a, b, r) = (
        addr(&scenario, "A"),
        addr(&scenario, "B"),
        addr(&scenario, "R"),
    );

    let request = TldpPacket::new(
        a,
        b,
        TldpMsg::new(
            TldpMessageType::LabelRequest,
            7,
            r,
            LspType::Primary,
            Direction::Downstream,
        ),
    );
    scenario.inject("B", 0, request.into()).unwrap();
    scenario.run_ticks(2 * LINK_TICKS + 50);

    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.upstream_session_id, Some(7));
    assert_eq!(entry.local_label(), Some(Label::new(16)));
    assert_eq!(entry.outgoing.label, LabelState::Label(Label::new(16)));
    assert_eq!(scenario.link_between("B", "C").unwrap().lsp_count(), 1);
    scenario
}

// Removal request sent by the given neighbor of B for one of its sessions.
fn removal_request(
    scenario: &Scenario,
    from: &str,
    session_id: u32,
    direction: Direction,
) -> Packet {
    let msg = TldpMsg::new(
        TldpMessageType::LabelRemovalRequest,
        session_id,
        addr(scenario, "R"),
        LspType::Primary,
        direction,
    );
    TldpPacket::new(addr(scenario, from), addr(scenario, "B"), msg).into()
}

// C withdraws its label, so B starts withdrawing towards A.
fn withdraw_from_downstream(scenario: &mut Scenario) {
    let session_id = only_entry(scenario, "B").local_session_id;
    let packet =
        removal_request(scenario, "C", session_id, Direction::Upstream);
    scenario.inject("B", 1, packet).unwrap();
    scenario.step();

    let entry = only_entry(scenario, "B");
    assert_eq!(entry.outgoing.label, LabelState::Removing);
    assert_eq!(
        entry.outgoing.retry.pending,
        Some(PendingOp::Removal(Direction::Upstream))
    );
    assert_eq!(scenario.link_between("B", "C").unwrap().lsp_count(), 0);
    assert_eq!(
        tldp_tx(scenario, "B", TldpMessageType::LabelRemovalRequest),
        1
    );
}

//
// Test description:
//
// B withdraws its label towards A, but A never acknowledges. B retransmits
// the withdrawal until the attempts run out, then removes the entry anyway.
//
#[test]
fn removal_request_retransmission() {
    let mut scenario = transit_lsp();
    withdraw_from_downstream(&mut scenario);

    scenario.run_ticks(2 * LINK_TICKS);
    assert_eq!(
        tldp_tx(&scenario, "B", TldpMessageType::LabelRemovalRequest),
        3
    );
    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.outgoing.label, LabelState::Removing);

    scenario.run_ticks(LINK_TICKS);
    let matrix = &scenario.mpls_node("B").unwrap().matrix;
    assert!(matrix.is_empty());
    assert_eq!(matrix.labels_in_use(), 0);
    assert_eq!(
        tldp_tx(&scenario, "B", TldpMessageType::LabelRemovalRequest),
        3
    );
    assert!(
        stats(&scenario, "A").discards(DiscardReason::BufferOverflow) >= 3
    );
}

//
// Test description:
//
// A label request for an LSP that B is already withdrawing is answered with
// another withdrawal instead of a label.
//
#[test]
fn label_request_while_removing() {
    let mut scenario = transit_lsp();
    withdraw_from_downstream(&mut scenario);
    let r = addr(&scenario, "R");

    let request = TldpPacket::new(
        addr(&scenario, "A"),
        addr(&scenario, "B"),
        TldpMsg::new(
            TldpMessageType::LabelRequest,
            7,
            r,
            LspType::Primary,
            Direction::Downstream,
        ),
    );
    scenario.inject("B", 0, request.into()).unwrap();
    scenario.step();

    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.outgoing.label, LabelState::Removing);
    assert_eq!(
        tldp_tx(&scenario, "B", TldpMessageType::LabelRemovalRequest),
        2
    );
    assert_eq!(tldp_tx(&scenario, "B", TldpMessageType::LabelRequestOk), 1);
    let withdrawal = TldpMsg::new(
        TldpMessageType::LabelRemovalRequest,
        7,
        r,
        LspType::Primary,
        Direction::Upstream,
    );
    let msgs = tldp_in_flight(&scenario, "A", "B");
    assert_eq!(msgs.iter().filter(|msg| **msg == withdrawal).count(), 2);
}

//
// Test description:
//
// A and B withdraw the same LSP towards each other at the same time. B
// takes A's withdrawal as the answer to its own and removes the entry right
// away, without waiting for the acknowledgement.
//
#[test]
fn crossing_removal_requests() {
    let mut scenario = transit_lsp();
    withdraw_from_downstream(&mut scenario);

    let packet = removal_request(&scenario, "A", 7, Direction::Downstream);
    scenario.inject("B", 0, packet).unwrap();
    scenario.step();

    let matrix = &scenario.mpls_node("B").unwrap().matrix;
    assert!(matrix.is_empty());
    assert_eq!(matrix.labels_in_use(), 0);
    assert_eq!(
        tldp_tx(&scenario, "B", TldpMessageType::LabelRemovalRequestOk),
        2
    );

    // Nothing left to retransmit.
    scenario.run_ticks(3 * LINK_TICKS);
    assert_eq!(
        tldp_tx(&scenario, "B", TldpMessageType::LabelRemovalRequest),
        1
    );
}
