//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// MPLS label.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Label(u32);

// Per-node allocator of unreserved MPLS labels.
//
// Released labels are recycled lowest-first before the allocator advances
// into fresh label space. Labels reserved out of order are skipped.
#[derive(Debug)]
pub struct LabelAllocator {
    next: u32,
    released: BTreeSet<u32>,
    // Labels at or above `next` that are already taken.
    reserved: BTreeSet<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LabelError {
    // All unreserved label values are in use.
    Exhausted,
    // The label is already in use or can't be allocated.
    Unavailable,
}

// ===== impl Label =====

impl Label {
    pub const VALUE_MASK: u32 = 0x000FFFFF;

    // Well-known MPLS labels.
    pub const IPV4_EXPLICIT_NULL: u32 = 0;
    pub const ROUTER_ALERT: u32 = 1;
    pub const IPV6_EXPLICIT_NULL: u32 = 2;
    pub const IMPLICIT_NULL: u32 = 3;
    pub const ELI: u32 = 7;
    pub const GAL: u32 = 13;
    pub const OAM_ALERT: u32 = 14;
    pub const EXTENSION: u32 = 15;

    // MPLS label ranges.
    pub const RESERVED_RANGE: std::ops::RangeInclusive<u32> = 0..=15;
    pub const UNRESERVED_RANGE: std::ops::RangeInclusive<u32> = 16..=1048575;

    pub fn new(label: u32) -> Label {
        if label > *Self::UNRESERVED_RANGE.end() {
            panic!("invalid label value: {}", label);
        }
        Label(label)
    }

    // Fallible constructor for label values coming from untrusted input.
    pub fn try_new(label: u32) -> Option<Label> {
        (label <= *Self::UNRESERVED_RANGE.end()).then_some(Label(label))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_reserved(&self) -> bool {
        Self::RESERVED_RANGE.contains(&self.0)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Label::IPV4_EXPLICIT_NULL => write!(f, "ipv4-explicit-null"),
            Label::ROUTER_ALERT => write!(f, "router-alert"),
            Label::IPV6_EXPLICIT_NULL => write!(f, "ipv6-explicit-null"),
            Label::IMPLICIT_NULL => write!(f, "implicit-null"),
            Label::ELI => write!(f, "entropy-label-indicator"),
            Label::GAL => write!(f, "generic-associated-channel"),
            Label::OAM_ALERT => write!(f, "oam-alert"),
            Label::EXTENSION => write!(f, "extension"),
            _ => write!(f, "{}", self.0),
        }
    }
}

// ===== impl LabelAllocator =====

impl LabelAllocator {
    pub fn allocate(&mut self) -> Result<Label, LabelError> {
        if let Some(label) = self.released.pop_first() {
            return Ok(Label(label));
        }

        while self.reserved.remove(&self.next) {
            self.next += 1;
        }
        if self.next > *Label::UNRESERVED_RANGE.end() {
            return Err(LabelError::Exhausted);
        }
        let label = Label(self.next);
        self.next += 1;
        Ok(label)
    }

    // Takes a specific label out of the free label space.
    pub fn reserve(&mut self, label: Label) -> Result<(), LabelError> {
        if label.is_reserved() {
            return Err(LabelError::Unavailable);
        }

        let taken = if label.0 < self.next {
            !self.released.remove(&label.0)
        } else {
            !self.reserved.insert(label.0)
        };
        if taken {
            return Err(LabelError::Unavailable);
        }
        Ok(())
    }

    pub fn release(&mut self, label: Label) {
        if label.is_reserved() {
            return;
        }
        if label.0 >= self.next {
            self.reserved.remove(&label.0);
        } else {
            self.released.insert(label.0);
        }
    }

    // Returns the number of labels currently handed out.
    pub fn in_use(&self) -> usize {
        (self.next - *Label::UNRESERVED_RANGE.start()) as usize
            - self.released.len()
            + self.reserved.len()
    }
}

impl Default for LabelAllocator {
    fn default() -> LabelAllocator {
        LabelAllocator {
            next: *Label::UNRESERVED_RANGE.start(),
            released: Default::default(),
            reserved: Default::default(),
        }
    }
}

// ===== impl LabelError =====

impl std::fmt::Display for LabelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelError::Exhausted => write!(f, "label space exhausted"),
            LabelError::Unavailable => write!(f, "label unavailable"),
        }
    }
}

impl std::error::Error for LabelError {}
