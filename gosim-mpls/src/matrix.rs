//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bitflags::bitflags;
use gosim_utils::id::IdGenerator;
use gosim_utils::mpls::{Label, LabelAllocator};
use serde::{Deserialize, Serialize};

use crate::collections::{Entries, EntryIndex};
use crate::debug::Debug;
use crate::error::Error;
use crate::packet::{Direction, LspType};
use crate::port::PortId;

// Per-node switching matrix.
#[derive(Debug)]
pub struct SwitchingMatrix {
    // Address of the owning node.
    addr: Ipv4Addr,
    // Switching entries.
    pub entries: Entries,
    // Local label space.
    labels: LabelAllocator,
    // Local TLDP session identifiers.
    sessions: IdGenerator,
}

// Switching matrix entry.
#[derive(Debug)]
pub struct Entry {
    pub incoming_port: PortId,
    pub label_or_fec: LabelOrFec,
    pub label_stack_op: LabelStackOp,
    // Primary outgoing leg.
    pub outgoing: Leg,
    // Backup outgoing leg.
    pub backup: Leg,
    pub local_session_id: u32,
    pub upstream_session_id: Option<u32>,
    pub tail_end: Ipv4Addr,
    pub flags: EntryFlags,
}

// One outgoing side of an entry.
#[derive(Clone, Debug, Default)]
pub struct Leg {
    pub port: Option<PortId>,
    pub label: LabelState,
    pub retry: Retry,
}

// Retransmission bookkeeping for an outstanding TLDP operation.
#[derive(Clone, Debug, Default)]
pub struct Retry {
    pub pending: Option<PendingOp>,
    pub timeout_ns: u64,
    pub attempts: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PendingOp {
    LabelRequest,
    Removal(Direction),
}

#[derive(Debug, Eq, PartialEq)]
pub enum RetryOutcome {
    Idle,
    Waiting,
    Resend(PendingOp),
    Exhausted(PendingOp),
}

//
// Outgoing label state machine.
//
// UNDEFINED -> REQUESTED -> {ASSIGNED | label | UNAVAILABLE} -> REMOVING
//   -> WITHDRAWN
//
// Transitions only move forward. Raw values 0-15 are reserved for the state
// codes while values above 15 are concrete labels.
//
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LabelState {
    #[default]
    Undefined,
    Requested,
    Unavailable,
    Assigned,
    Removing,
    Withdrawn,
    Label(Label),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum EntryType {
    Fec,
    Label,
}

// Lookup key of an entry on its incoming port.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LabelOrFec {
    Fec(u32),
    Label(Label),
    // Label entry whose local label hasn't been allocated yet.
    Pending,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LabelStackOp {
    Noop,
    Push,
    Pop,
    Swap,
    #[default]
    Undefined,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct EntryFlags: u8 {
        // Entry created to hold a backup LSP.
        const FOR_BACKUP_LSP = 0x01;
        const BACKUP_REQUESTED = 0x02;
        const BACKUP_ESTABLISHED = 0x04;
        // The outgoing link accounts for this entry.
        const PRIMARY_LINK_COUNTED = 0x08;
        const BACKUP_LINK_COUNTED = 0x10;
        // The upstream side has been torn down.
        const UPSTREAM_WITHDRAWN = 0x20;
        // The primary leg was withdrawn because of a link failure.
        const PRIMARY_FAILED = 0x40;
    }
}

// ===== impl SwitchingMatrix =====

impl SwitchingMatrix {
    pub fn new(addr: Ipv4Addr) -> SwitchingMatrix {
        SwitchingMatrix {
            addr,
            entries: Default::default(),
            labels: Default::default(),
            sessions: IdGenerator::new(),
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    // Creates an ingress entry for the given FEC.
    pub(crate) fn create_fec_entry(
        &mut self,
        incoming_port: PortId,
        fec: u32,
        tail_end: Ipv4Addr,
    ) -> Result<EntryIndex, Error> {
        let local_session_id = self
            .sessions
            .next_id()
            .map_err(|_| Error::SessionIdExhausted(self.addr))?;
        let entry = Entry::new(
            incoming_port,
            LabelOrFec::Fec(fec),
            local_session_id,
            None,
            tail_end,
        );
        self.insert(entry)
    }

    // Creates a transit entry in answer to an upstream label request.
    pub(crate) fn create_label_entry(
        &mut self,
        incoming_port: PortId,
        upstream_session_id: u32,
        tail_end: Ipv4Addr,
        for_backup: bool,
    ) -> Result<EntryIndex, Error> {
        let local_session_id = self
            .sessions
            .next_id()
            .map_err(|_| Error::SessionIdExhausted(self.addr))?;
        let mut entry = Entry::new(
            incoming_port,
            LabelOrFec::Pending,
            local_session_id,
            Some(upstream_session_id),
            tail_end,
        );
        if for_backup {
            entry.flags.insert(EntryFlags::FOR_BACKUP_LSP);
        }
        self.insert(entry)
    }

    // Creates a transit entry for a labeled packet with no matching entry.
    pub(crate) fn create_ilm_entry(
        &mut self,
        incoming_port: PortId,
        label: Label,
        tail_end: Ipv4Addr,
    ) -> Result<EntryIndex, Error> {
        let local_session_id = self
            .sessions
            .next_id()
            .map_err(|_| Error::SessionIdExhausted(self.addr))?;
        // The label becomes part of the local label space, so it can't be
        // handed out to anyone else.
        self.labels
            .reserve(label)
            .map_err(|_| Error::LabelInUse(self.addr, label))?;
        let entry = Entry::new(
            incoming_port,
            LabelOrFec::Label(label),
            local_session_id,
            None,
            tail_end,
        );
        match self.insert(entry) {
            Ok(entry_idx) => Ok(entry_idx),
            Err(error) => {
                self.labels.release(label);
                Err(error)
            }
        }
    }

    fn insert(&mut self, entry: Entry) -> Result<EntryIndex, Error> {
        match self.entries.insert(entry) {
            Ok((entry_idx, entry)) => {
                Debug::EntryCreate(&self.addr, entry).log();
                Ok(entry_idx)
            }
            Err(entry) => Err(Error::EntryKeyInUse(
                self.addr,
                entry.incoming_port,
                entry.label_or_fec,
            )),
        }
    }

    // Allocates the local label of a label entry, if it doesn't have one yet.
    pub(crate) fn assign_local_label(
        &mut self,
        entry_idx: EntryIndex,
    ) -> Result<Option<Label>, Error> {
        let label_or_fec = self.entries[entry_idx].label_or_fec;
        match label_or_fec {
            LabelOrFec::Pending => {
                let label = self
                    .labels
                    .allocate()
                    .map_err(|_| Error::LabelSpaceExhausted(self.addr))?;
                let key = LabelOrFec::Label(label);
                if !self.entries.update_label_or_fec(entry_idx, key) {
                    self.labels.release(label);
                    let port = self.entries[entry_idx].incoming_port;
                    return Err(Error::EntryKeyInUse(self.addr, port, key));
                }
                Ok(Some(label))
            }
            LabelOrFec::Label(label) => Ok(Some(label)),
            LabelOrFec::Fec(_) => Ok(None),
        }
    }

    // Moves the label state of the given leg forward.
    //
    // Returns false when the requested transition would move the state
    // machine backwards, in which case nothing changes.
    pub(crate) fn set_label_state(
        &mut self,
        entry_idx: EntryIndex,
        lsp_type: LspType,
        new_state: LabelState,
    ) -> bool {
        let entry = &mut self.entries[entry_idx];
        let leg = entry.leg_mut(lsp_type);
        let old_state = leg.label;
        if !old_state.can_transition_to(new_state) {
            return false;
        }

        Debug::LabelStateChange(
            &self.addr,
            entry.local_session_id,
            &lsp_type,
            &old_state,
            &new_state,
        )
        .log();
        let leg = entry.leg_mut(lsp_type);
        leg.label = new_state;
        if matches!(
            new_state,
            LabelState::Unavailable
                | LabelState::Assigned
                | LabelState::Label(_)
                | LabelState::Withdrawn
        ) {
            leg.retry.clear();
        }
        true
    }

    // Replaces the primary leg with the established backup leg.
    //
    // This is a leg replacement rather than a label state transition.
    pub(crate) fn switch_to_backup(&mut self, entry_idx: EntryIndex) {
        let entry = &mut self.entries[entry_idx];
        Debug::BackupSwitchover(&self.addr, entry.local_session_id).log();

        entry.outgoing = std::mem::take(&mut entry.backup);
        entry.outgoing.retry.clear();
        let counted = entry.flags.contains(EntryFlags::BACKUP_LINK_COUNTED);
        entry.flags.remove(
            EntryFlags::BACKUP_REQUESTED
                | EntryFlags::BACKUP_ESTABLISHED
                | EntryFlags::BACKUP_LINK_COUNTED
                | EntryFlags::PRIMARY_LINK_COUNTED,
        );
        if counted {
            entry.flags.insert(EntryFlags::PRIMARY_LINK_COUNTED);
        }
    }

    // Forgets the backup leg of an entry.
    pub(crate) fn clear_backup(&mut self, entry_idx: EntryIndex) {
        let entry = &mut self.entries[entry_idx];
        Debug::BackupClear(&self.addr, entry.local_session_id).log();

        entry.backup = Leg::default();
        entry.flags.remove(
            EntryFlags::BACKUP_REQUESTED
                | EntryFlags::BACKUP_ESTABLISHED
                | EntryFlags::BACKUP_LINK_COUNTED,
        );
    }

    // Removes an entry, releasing its local label.
    pub(crate) fn remove(&mut self, entry_idx: EntryIndex) -> Option<Entry> {
        let entry = self.entries.delete(entry_idx)?;
        Debug::EntryDelete(&self.addr, &entry).log();
        if let LabelOrFec::Label(label) = entry.label_or_fec {
            self.labels.release(label);
        }
        Some(entry)
    }

    // Removes the entry if both outgoing legs are withdrawn.
    pub(crate) fn remove_check(&mut self, entry_idx: EntryIndex) -> bool {
        let removable = self
            .entries
            .get(entry_idx)
            .is_some_and(|entry| entry.is_removable());
        if removable {
            self.remove(entry_idx);
        }
        removable
    }

    pub fn get_by_key(
        &self,
        port: PortId,
        key: LabelOrFec,
    ) -> Option<(EntryIndex, &Entry)> {
        self.entries.get_by_key(port, key)
    }

    pub fn get_by_local_session(
        &self,
        session_id: u32,
    ) -> Option<(EntryIndex, &Entry)> {
        self.entries.get_by_local_session(session_id)
    }

    pub fn get_by_upstream_session(
        &self,
        port: PortId,
        session_id: u32,
    ) -> Option<(EntryIndex, &Entry)> {
        self.entries.get_by_upstream_session(port, session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'_ Entry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    pub fn labels_in_use(&self) -> usize {
        self.labels.in_use()
    }
}

impl std::ops::Index<EntryIndex> for SwitchingMatrix {
    type Output = Entry;

    fn index(&self, index: EntryIndex) -> &Self::Output {
        &self.entries[index]
    }
}

impl std::ops::IndexMut<EntryIndex> for SwitchingMatrix {
    fn index_mut(&mut self, index: EntryIndex) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

// ===== impl Entry =====

impl Entry {
    fn new(
        incoming_port: PortId,
        label_or_fec: LabelOrFec,
        local_session_id: u32,
        upstream_session_id: Option<u32>,
        tail_end: Ipv4Addr,
    ) -> Entry {
        Entry {
            incoming_port,
            label_or_fec,
            label_stack_op: LabelStackOp::Undefined,
            outgoing: Leg::default(),
            backup: Leg::default(),
            local_session_id,
            upstream_session_id,
            tail_end,
            flags: EntryFlags::empty(),
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self.label_or_fec {
            LabelOrFec::Fec(_) => EntryType::Fec,
            LabelOrFec::Label(_) | LabelOrFec::Pending => EntryType::Label,
        }
    }

    pub fn leg(&self, lsp_type: LspType) -> &Leg {
        match lsp_type {
            LspType::Primary => &self.outgoing,
            LspType::Backup => &self.backup,
        }
    }

    pub fn leg_mut(&mut self, lsp_type: LspType) -> &mut Leg {
        match lsp_type {
            LspType::Primary => &mut self.outgoing,
            LspType::Backup => &mut self.backup,
        }
    }

    // Returns the leg that leaves through the given port, if any.
    //
    // After a switchover the promoted backup leg is the primary one, so
    // messages from downstream are matched by port rather than by the LSP
    // type they carry.
    pub fn leg_by_port(&self, port: PortId) -> Option<LspType> {
        if self.outgoing.port == Some(port) {
            Some(LspType::Primary)
        } else if self.backup.port == Some(port) {
            Some(LspType::Backup)
        } else {
            None
        }
    }

    // LSP type used when talking to the upstream node.
    pub fn upstream_lsp_type(&self) -> LspType {
        if self.flags.contains(EntryFlags::FOR_BACKUP_LSP) {
            LspType::Backup
        } else {
            LspType::Primary
        }
    }

    pub fn local_label(&self) -> Option<Label> {
        match self.label_or_fec {
            LabelOrFec::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn is_removable(&self) -> bool {
        self.outgoing.label == LabelState::Withdrawn
            && matches!(
                self.backup.label,
                LabelState::Undefined | LabelState::Withdrawn
            )
    }
}

// ===== impl Retry =====

impl Retry {
    pub fn arm(
        &mut self,
        op: PendingOp,
        timeout_ns: u64,
        attempts: u32,
    ) {
        self.pending = Some(op);
        self.timeout_ns = timeout_ns;
        self.attempts = attempts;
    }

    pub fn clear(&mut self) {
        *self = Retry::default();
    }

    // Advances the retransmission timer by the elapsed time.
    pub fn tick(
        &mut self,
        elapsed_ns: u64,
        timeout_ns: u64,
    ) -> RetryOutcome {
        let Some(op) = self.pending else {
            return RetryOutcome::Idle;
        };

        self.timeout_ns = self.timeout_ns.saturating_sub(elapsed_ns);
        if self.timeout_ns > 0 {
            return RetryOutcome::Waiting;
        }
        if self.attempts == 0 {
            self.clear();
            return RetryOutcome::Exhausted(op);
        }
        self.attempts -= 1;
        self.timeout_ns = timeout_ns;
        RetryOutcome::Resend(op)
    }
}

// ===== impl LabelState =====

impl LabelState {
    pub const RAW_UNDEFINED: i64 = -1;
    pub const RAW_REQUESTED: i64 = 1;
    pub const RAW_UNAVAILABLE: i64 = 2;
    pub const RAW_ASSIGNED: i64 = 3;
    pub const RAW_REMOVING: i64 = 4;
    pub const RAW_WITHDRAWN: i64 = 5;

    // Decodes the flat numeric representation used by scenario files, where
    // values above 15 are concrete labels.
    pub fn from_raw(raw: i64) -> Option<LabelState> {
        match raw {
            Self::RAW_UNDEFINED => Some(LabelState::Undefined),
            Self::RAW_REQUESTED => Some(LabelState::Requested),
            Self::RAW_UNAVAILABLE => Some(LabelState::Unavailable),
            Self::RAW_ASSIGNED => Some(LabelState::Assigned),
            Self::RAW_REMOVING => Some(LabelState::Removing),
            Self::RAW_WITHDRAWN => Some(LabelState::Withdrawn),
            raw if raw > i64::from(*Label::RESERVED_RANGE.end()) => {
                u32::try_from(raw)
                    .ok()
                    .and_then(Label::try_new)
                    .map(LabelState::Label)
            }
            _ => None,
        }
    }

    pub fn to_raw(&self) -> i64 {
        match self {
            LabelState::Undefined => Self::RAW_UNDEFINED,
            LabelState::Requested => Self::RAW_REQUESTED,
            LabelState::Unavailable => Self::RAW_UNAVAILABLE,
            LabelState::Assigned => Self::RAW_ASSIGNED,
            LabelState::Removing => Self::RAW_REMOVING,
            LabelState::Withdrawn => Self::RAW_WITHDRAWN,
            LabelState::Label(label) => i64::from(label.get()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            LabelState::Undefined => 0,
            LabelState::Requested => 1,
            LabelState::Unavailable
            | LabelState::Assigned
            | LabelState::Label(_) => 2,
            LabelState::Removing => 3,
            LabelState::Withdrawn => 4,
        }
    }

    pub fn can_transition_to(&self, new_state: LabelState) -> bool {
        new_state.rank() > self.rank()
    }

    // Returns whether the leg can forward traffic.
    pub fn is_resolved(&self) -> bool {
        matches!(self, LabelState::Assigned | LabelState::Label(_))
    }

    pub fn label(&self) -> Option<Label> {
        match self {
            LabelState::Label(label) => Some(*label),
            _ => None,
        }
    }
}

impl std::fmt::Display for LabelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelState::Undefined => write!(f, "undefined"),
            LabelState::Requested => write!(f, "label-requested"),
            LabelState::Unavailable => write!(f, "label-unavailable"),
            LabelState::Assigned => write!(f, "label-assigned"),
            LabelState::Removing => write!(f, "removing-label"),
            LabelState::Withdrawn => write!(f, "label-withdrawn"),
            LabelState::Label(label) => write!(f, "{}", label),
        }
    }
}

// ===== impl LabelOrFec =====

impl std::fmt::Display for LabelOrFec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelOrFec::Fec(fec) => write!(f, "fec {:#010x}", fec),
            LabelOrFec::Label(label) => write!(f, "label {}", label),
            LabelOrFec::Pending => write!(f, "label pending"),
        }
    }
}
