//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use gosim_mpls::matrix::{LabelState, PendingOp, Retry, RetryOutcome};
use gosim_mpls::packet::Direction;
use gosim_utils::mpls::Label;

#[test]
fn label_state_moves_forward_only() {
    let label = LabelState::Label(Label::new(16));
    assert!(LabelState::Undefined.can_transition_to(LabelState::Requested));
    assert!(LabelState::Requested.can_transition_to(label));
    assert!(LabelState::Requested.can_transition_to(LabelState::Unavailable));
    assert!(label.can_transition_to(LabelState::Removing));
    assert!(LabelState::Removing.can_transition_to(LabelState::Withdrawn));

    assert!(!label.can_transition_to(LabelState::Requested));
    assert!(!LabelState::Assigned.can_transition_to(label));
    assert!(!LabelState::Withdrawn.can_transition_to(LabelState::Undefined));
    assert!(!LabelState::Removing.can_transition_to(LabelState::Removing));
}

#[test]
fn label_state_raw_encoding() {
    assert_eq!(LabelState::from_raw(-1), Some(LabelState::Undefined));
    assert_eq!(LabelState::from_raw(3), Some(LabelState::Assigned));
    assert_eq!(
        LabelState::from_raw(16),
        Some(LabelState::Label(Label::new(16)))
    );
    // Values up to 15 are reserved for state codes.
    assert_eq!(LabelState::from_raw(15), None);
    assert_eq!(LabelState::from_raw(0), None);
    assert_eq!(LabelState::from_raw(1 << 20), None);

    assert_eq!(LabelState::Removing.to_raw(), LabelState::RAW_REMOVING);
    assert_eq!(LabelState::Label(Label::new(37)).to_raw(), 37);
    assert!(LabelState::Assigned.is_resolved());
    assert!(!LabelState::Requested.is_resolved());
    assert_eq!(LabelState::Assigned.label(), None);
}

#[test]
fn retry_resends_then_gives_up() {
    let mut retry = Retry::default();
    assert_eq!(retry.tick(10, 30), RetryOutcome::Idle);

    let op = PendingOp::Removal(Direction::Upstream);
    retry.arm(op, 30, 1);
    assert_eq!(retry.tick(10, 30), RetryOutcome::Waiting);
    assert_eq!(retry.tick(20, 30), RetryOutcome::Resend(op));
    assert_eq!(retry.tick(30, 30), RetryOutcome::Exhausted(op));
    assert_eq!(retry.tick(30, 30), RetryOutcome::Idle);
}
