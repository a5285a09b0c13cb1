//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use gosim_mpls::error::DiscardReason;
use gosim_mpls::matrix::{EntryFlags, LabelState};
use gosim_mpls::packet::TldpMessageType;
use gosim_mpls::scenario::Scenario;

use crate::common::{
    link, linear, only_entry, receiver_stats, scenario, stats, tldp_rx,
    tldp_tx,
};

//
//            +-- C --+
//            |       |
// S -- A -- B         D -- R
//            |       |
//            +-- E --+
//
// A and B are active nodes. The primary LSP goes through C, and the path
// through E is twice as slow.
//
fn diamond() -> Scenario {
    scenario(
        r#"
[clock]
duration_ns = 40000000

[[node]]
name = "S"
kind = "sender"
address = "10.0.0.1"

[[node]]
name = "A"
kind = "active-ler"
address = "10.0.0.2"

[[node]]
name = "B"
kind = "active-lsr"
address = "10.0.0.3"

[[node]]
name = "C"
kind = "lsr"
address = "10.0.0.4"

[[node]]
name = "D"
kind = "ler"
address = "10.0.0.5"

[[node]]
name = "E"
kind = "lsr"
address = "10.0.0.6"

[[node]]
name = "R"
kind = "receiver"
address = "10.0.0.7"

[[link]]
a = "S"
b = "A"
delay_ns = 100000

[[link]]
a = "A"
b = "B"

[[link]]
a = "B"
b = "C"

[[link]]
a = "C"
b = "D"

[[link]]
a = "B"
b = "E"
delay_ns = 2000000

[[link]]
a = "E"
b = "D"
delay_ns = 2000000

[[link]]
a = "D"
b = "R"
delay_ns = 100000

[[traffic]]
sender = "S"
destination = "R"
rate_mbps = 10
packet_size = 100
gos_level = 1
backup_lsp = true

[[event]]
at_ns = 25000000
link = ["B", "C"]
action = "break"
"#,
    )
}

//
// Test description:
//
// A link failure in the middle of an LSP without backup tears the LSP down
// on both sides of the failure. The ingress keeps dropping traffic while the
// destination is unreachable.
//
#[test]
fn link_failure_without_backup() {
    let mut scenario = linear(
        "ler",
        "lsr",
        r#"
[clock]
duration_ns = 20000000

[[traffic]]
sender = "S"
destination = "R"
rate_mbps = 10
packet_size = 100

[[event]]
at_ns = 10000000
link = ["B", "C"]
action = "break"
"#,
    );
    scenario.run_ticks(990);
    assert_eq!(link(&scenario, "A", "B").lsp_count(), 1);
    assert_eq!(link(&scenario, "B", "C").lsp_count(), 1);

    scenario.run();

    // The egress lost its upstream side.
    assert!(scenario.mpls_node("C").unwrap().matrix.is_empty());

    // The transit node signaled the withdrawal towards the ingress.
    let matrix = &scenario.mpls_node("B").unwrap().matrix;
    assert!(matrix.iter().all(|entry| !entry.outgoing.label.is_resolved()));
    assert!(
        matrix
            .iter()
            .all(|entry| entry.upstream_session_id.is_none())
    );
    assert_eq!(
        tldp_tx(&scenario, "B", TldpMessageType::LabelRemovalRequest),
        1
    );
    assert_eq!(
        tldp_tx(&scenario, "A", TldpMessageType::LabelRemovalRequestOk),
        1
    );

    // New traffic can't be routed anymore.
    let entry = only_entry(&scenario, "A");
    assert_eq!(entry.outgoing.label, LabelState::Unavailable);
    assert_eq!(entry.outgoing.port, None);
    assert!(stats(&scenario, "A").discards(DiscardReason::NoRoute) > 0);

    assert_eq!(link(&scenario, "A", "B").lsp_count(), 0);
    assert_eq!(link(&scenario, "B", "C").lsp_count(), 0);
    assert!(link(&scenario, "B", "C").stats.lost > 0);
}

//
// Test description:
//
// GoS traffic that asks for a backup LSP makes the active transit node set
// one up through the alternate path. When the primary link fails, traffic
// moves to the backup without involving the ingress, and the link LSP
// counters follow the switchover exactly once.
//
#[test]
fn link_failure_with_backup() {
    let mut scenario = diamond();

    // Backup established well before the failure.
    scenario.run_ticks(2000);
    let entry = only_entry(&scenario, "B");
    assert!(entry.flags.contains(EntryFlags::BACKUP_ESTABLISHED));
    assert!(matches!(entry.backup.label, LabelState::Label(_)));
    assert_eq!(entry.backup.port, scenario.port_towards("B", "E").ok());
    assert_eq!(link(&scenario, "B", "C").lsp_count(), 1);
    assert_eq!(link(&scenario, "B", "E").lsp_count(), 0);
    assert_eq!(link(&scenario, "B", "E").backup_lsp_count(), 1);
    assert_eq!(link(&scenario, "E", "D").lsp_count(), 1);
    assert_eq!(tldp_tx(&scenario, "A", TldpMessageType::LabelRequest), 1);

    // Switchover once the failure is detected.
    scenario.run_ticks(700);
    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.outgoing.port, scenario.port_towards("B", "E").ok());
    assert!(matches!(entry.outgoing.label, LabelState::Label(_)));
    assert!(entry.flags.contains(EntryFlags::PRIMARY_LINK_COUNTED));
    assert!(!entry.flags.contains(EntryFlags::BACKUP_ESTABLISHED));
    assert_eq!(entry.backup.label, LabelState::Undefined);
    assert_eq!(link(&scenario, "B", "C").lsp_count(), 0);
    assert_eq!(link(&scenario, "B", "E").lsp_count(), 1);
    assert_eq!(link(&scenario, "B", "E").backup_lsp_count(), 0);
    let received = receiver_stats(&scenario, "R").packets;

    scenario.run();

    // Traffic keeps flowing through the backup path.
    let stats = receiver_stats(&scenario, "R");
    assert!(stats.packets > received);
    assert_eq!(stats.duplicates, 0);

    // The orphaned part of the primary LSP is gone.
    assert!(scenario.mpls_node("C").unwrap().matrix.is_empty());
    assert_eq!(scenario.mpls_node("D").unwrap().matrix.len(), 1);
    assert_eq!(link(&scenario, "C", "D").lsp_count(), 0);

    // Repeated connectivity checks left the counters alone.
    assert_eq!(link(&scenario, "B", "C").lsp_count(), 0);
    assert_eq!(link(&scenario, "B", "E").lsp_count(), 1);
    assert_eq!(link(&scenario, "B", "E").backup_lsp_count(), 0);
    assert_eq!(link(&scenario, "A", "B").lsp_count(), 1);
    assert_eq!(tldp_tx(&scenario, "A", TldpMessageType::LabelRequest), 1);
}

//
// Test description:
//
// After the switchover, the node past the active transit node on the
// promoted path still signals with the backup LSP type. When the link behind
// it fails too, its withdrawal applies to the leg that now carries the
// traffic, and the teardown reaches the ingress.
//
#[test]
fn link_failure_after_switchover() {
    let mut scenario = diamond();
    scenario.run_ticks(2700);
    let entry = only_entry(&scenario, "B");
    assert_eq!(entry.outgoing.port, scenario.port_towards("B", "E").ok());
    assert!(entry.flags.contains(EntryFlags::PRIMARY_LINK_COUNTED));
    assert_eq!(link(&scenario, "B", "E").lsp_count(), 1);

    scenario.break_link("E", "D").unwrap();
    scenario.run_ticks(1000);

    // The withdrawal went all the way up to the ingress.
    assert_eq!(
        tldp_tx(&scenario, "E", TldpMessageType::LabelRemovalRequest),
        1
    );
    assert_eq!(
        tldp_rx(&scenario, "B", TldpMessageType::LabelRemovalRequest),
        1
    );
    assert_eq!(
        tldp_rx(&scenario, "A", TldpMessageType::LabelRemovalRequest),
        1
    );
    assert!(scenario.mpls_node("E").unwrap().matrix.is_empty());
    assert!(scenario.mpls_node("D").unwrap().matrix.is_empty());
    for name in ["A", "B"] {
        let matrix = &scenario.mpls_node(name).unwrap().matrix;
        assert!(matrix.iter().all(|entry| !entry.outgoing.label.is_resolved()));
    }

    assert_eq!(link(&scenario, "A", "B").lsp_count(), 0);
    assert_eq!(link(&scenario, "B", "E").lsp_count(), 0);
    assert_eq!(link(&scenario, "B", "E").backup_lsp_count(), 0);
    assert_eq!(link(&scenario, "E", "D").lsp_count(), 0);
    assert!(stats(&scenario, "A").discards(DiscardReason::NoRoute) > 0);
}

//
// Test description:
//
// The link towards the ingress fails while the active transit node holds
// both a primary and a backup leg. Both legs are withdrawn downstream, and
// every node along both paths ends up without the LSP.
//
#[test]
fn incoming_link_failure() {
    let mut scenario = diamond();
    scenario.run_ticks(2000);
    let entry = only_entry(&scenario, "B");
    assert!(entry.flags.contains(EntryFlags::BACKUP_ESTABLISHED));

    scenario.break_link("A", "B").unwrap();
    scenario.step();
    let entry = only_entry(&scenario, "B");
    assert!(entry.flags.contains(EntryFlags::UPSTREAM_WITHDRAWN));
    assert_eq!(entry.outgoing.label, LabelState::Removing);
    assert_eq!(entry.backup.label, LabelState::Removing);
    assert_eq!(
        tldp_tx(&scenario, "B", TldpMessageType::LabelRemovalRequest),
        2
    );

    scenario.run_ticks(700);
    assert_eq!(
        tldp_rx(&scenario, "C", TldpMessageType::LabelRemovalRequest),
        1
    );
    assert_eq!(
        tldp_rx(&scenario, "E", TldpMessageType::LabelRemovalRequest),
        1
    );
    assert_eq!(
        tldp_rx(&scenario, "B", TldpMessageType::LabelRemovalRequestOk),
        2
    );
    let matrix = &scenario.mpls_node("A").unwrap().matrix;
    assert!(matrix.iter().all(|entry| !entry.outgoing.label.is_resolved()));
    for name in ["B", "C", "D", "E"] {
        assert!(scenario.mpls_node(name).unwrap().matrix.is_empty());
    }

    assert_eq!(link(&scenario, "B", "C").lsp_count(), 0);
    assert_eq!(link(&scenario, "B", "E").backup_lsp_count(), 0);
    assert_eq!(link(&scenario, "C", "D").lsp_count(), 0);
    assert_eq!(link(&scenario, "E", "D").lsp_count(), 0);
    assert_eq!(tldp_tx(&scenario, "A", TldpMessageType::LabelRequest), 1);
}
