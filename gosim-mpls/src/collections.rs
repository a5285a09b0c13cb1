//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use generational_arena::{Arena, Index};
use itertools::Itertools;

use crate::error::Error;
use crate::link::Link;
use crate::matrix::{Entry, LabelOrFec};
use crate::node::Node;
use crate::port::PortId;

pub type EntryIndex = Index;
pub type NodeIndex = Index;
pub type LinkId = u32;
pub type LinkIndex = Index;

#[derive(Debug, Default)]
pub struct Entries {
    // Entry arena.
    arena: Arena<Entry>,
    // Entry binary tree keyed by incoming port and label or FEC (1:1).
    key_tree: BTreeMap<(PortId, LabelOrFec), EntryIndex>,
    // Entry hash table keyed by local TLDP session ID (1:1).
    session_tree: HashMap<u32, EntryIndex>,
    // Entry binary tree keyed by incoming port and upstream TLDP session ID
    // (1:1).
    upstream_tree: BTreeMap<(PortId, u32), EntryIndex>,
}

#[derive(Debug, Default)]
pub struct Nodes {
    // Node arena.
    arena: Arena<Node>,
    // Node binary tree keyed by name (1:1).
    name_tree: BTreeMap<String, NodeIndex>,
    // Node binary tree keyed by address (1:1).
    addr_tree: BTreeMap<Ipv4Addr, NodeIndex>,
}

#[derive(Debug, Default)]
pub struct Links {
    // Link arena.
    arena: Arena<Link>,
    // Link hash table keyed by ID (1:1).
    id_tree: HashMap<LinkId, LinkIndex>,
    // Link binary tree keyed by the (ordered) endpoint addresses (1:1).
    ends_tree: BTreeMap<(Ipv4Addr, Ipv4Addr), LinkIndex>,
    // Next available ID.
    next_id: LinkId,
}

// ===== impl Entries =====

impl Entries {
    // Inserts a new entry.
    //
    // The entry is handed back if one of its keys is already taken.
    pub(crate) fn insert(
        &mut self,
        entry: Entry,
    ) -> Result<(EntryIndex, &mut Entry), Entry> {
        let key_taken = entry.label_or_fec != LabelOrFec::Pending
            && self
                .key_tree
                .contains_key(&(entry.incoming_port, entry.label_or_fec));
        let upstream_taken =
            entry.upstream_session_id.is_some_and(|session_id| {
                self.upstream_tree
                    .contains_key(&(entry.incoming_port, session_id))
            });
        if key_taken
            || upstream_taken
            || self.session_tree.contains_key(&entry.local_session_id)
        {
            return Err(entry);
        }

        let entry_idx = self.arena.insert(entry);

        // Link entry to different collections.
        let entry = &mut self.arena[entry_idx];
        if entry.label_or_fec != LabelOrFec::Pending {
            self.key_tree
                .insert((entry.incoming_port, entry.label_or_fec), entry_idx);
        }
        self.session_tree.insert(entry.local_session_id, entry_idx);
        if let Some(upstream_session_id) = entry.upstream_session_id {
            self.upstream_tree
                .insert((entry.incoming_port, upstream_session_id), entry_idx);
        }

        Ok((entry_idx, entry))
    }

    pub(crate) fn delete(&mut self, entry_idx: EntryIndex) -> Option<Entry> {
        let entry = self.arena.get(entry_idx)?;

        // Unlink entry from different collections.
        if entry.label_or_fec != LabelOrFec::Pending {
            self.key_tree
                .remove(&(entry.incoming_port, entry.label_or_fec));
        }
        self.session_tree.remove(&entry.local_session_id);
        if let Some(upstream_session_id) = entry.upstream_session_id {
            self.upstream_tree
                .remove(&(entry.incoming_port, upstream_session_id));
        }

        // Remove entry from the arena.
        self.arena.remove(entry_idx)
    }

    // Changes the lookup key of an entry.
    //
    // Returns false when another entry already uses the new key, in which
    // case nothing changes.
    pub(crate) fn update_label_or_fec(
        &mut self,
        entry_idx: EntryIndex,
        label_or_fec: LabelOrFec,
    ) -> bool {
        let entry = &mut self.arena[entry_idx];
        if label_or_fec != LabelOrFec::Pending
            && self
                .key_tree
                .get(&(entry.incoming_port, label_or_fec))
                .is_some_and(|other_idx| *other_idx != entry_idx)
        {
            return false;
        }

        if entry.label_or_fec != LabelOrFec::Pending {
            self.key_tree
                .remove(&(entry.incoming_port, entry.label_or_fec));
        }
        entry.label_or_fec = label_or_fec;
        if label_or_fec != LabelOrFec::Pending {
            self.key_tree
                .insert((entry.incoming_port, label_or_fec), entry_idx);
        }
        true
    }

    pub(crate) fn get(&self, entry_idx: EntryIndex) -> Option<&Entry> {
        self.arena.get(entry_idx)
    }

    pub(crate) fn get_mut(
        &mut self,
        entry_idx: EntryIndex,
    ) -> Option<&mut Entry> {
        self.arena.get_mut(entry_idx)
    }

    // Returns a reference to the entry corresponding to the given incoming
    // port and label or FEC.
    pub fn get_by_key(
        &self,
        port: PortId,
        key: LabelOrFec,
    ) -> Option<(EntryIndex, &Entry)> {
        self.key_tree
            .get(&(port, key))
            .copied()
            .map(|entry_idx| (entry_idx, &self.arena[entry_idx]))
    }

    // Returns a reference to the entry corresponding to the given local TLDP
    // session ID.
    pub fn get_by_local_session(
        &self,
        session_id: u32,
    ) -> Option<(EntryIndex, &Entry)> {
        self.session_tree
            .get(&session_id)
            .copied()
            .map(|entry_idx| (entry_idx, &self.arena[entry_idx]))
    }

    // Returns a reference to the entry corresponding to the given incoming
    // port and upstream TLDP session ID.
    pub fn get_by_upstream_session(
        &self,
        port: PortId,
        session_id: u32,
    ) -> Option<(EntryIndex, &Entry)> {
        self.upstream_tree
            .get(&(port, session_id))
            .copied()
            .map(|entry_idx| (entry_idx, &self.arena[entry_idx]))
    }

    // Returns an iterator visiting all entries.
    //
    // Order of iteration is not defined.
    pub fn iter(&self) -> impl Iterator<Item = &'_ Entry> + '_ {
        self.arena.iter().map(|(_, entry)| entry)
    }

    // Returns an iterator over all entry indexes.
    //
    // Entries are ordered by their local session IDs so that scans are
    // deterministic.
    pub(crate) fn indexes(&self) -> Vec<EntryIndex> {
        let mut indexes = self
            .arena
            .iter()
            .map(|(entry_idx, entry)| (entry.local_session_id, entry_idx))
            .collect::<Vec<_>>();
        indexes.sort_by_key(|(session_id, _)| *session_id);
        indexes
            .into_iter()
            .map(|(_, entry_idx)| entry_idx)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }
}

impl std::ops::Index<EntryIndex> for Entries {
    type Output = Entry;

    fn index(&self, index: EntryIndex) -> &Self::Output {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<EntryIndex> for Entries {
    fn index_mut(&mut self, index: EntryIndex) -> &mut Self::Output {
        &mut self.arena[index]
    }
}

// ===== impl Nodes =====

impl Nodes {
    pub(crate) fn insert(
        &mut self,
        node: Node,
    ) -> Result<(NodeIndex, &mut Node), Error> {
        let name = node.name().to_owned();
        let addr = node.addr();
        if self.addr_tree.contains_key(&addr) {
            return Err(Error::DuplicateNodeAddr(addr));
        }
        if self.name_tree.contains_key(&name) {
            return Err(Error::InvalidScenario(format!(
                "duplicate node name: {}",
                name
            )));
        }

        // Create and insert node into the arena.
        let node_idx = self.arena.insert(node);

        // Link node to different collections.
        self.name_tree.insert(name, node_idx);
        self.addr_tree.insert(addr, node_idx);

        Ok((node_idx, &mut self.arena[node_idx]))
    }

    // Returns a reference to the node corresponding to the given name.
    pub fn get_by_name(&self, name: &str) -> Result<(NodeIndex, &Node), Error> {
        self.name_tree
            .get(name)
            .copied()
            .map(|node_idx| (node_idx, &self.arena[node_idx]))
            .ok_or_else(|| Error::NodeNotFound(name.to_owned()))
    }

    // Returns a mutable reference to the node corresponding to the given name.
    pub fn get_mut_by_name(
        &mut self,
        name: &str,
    ) -> Result<(NodeIndex, &mut Node), Error> {
        self.name_tree
            .get(name)
            .copied()
            .map(move |node_idx| (node_idx, &mut self.arena[node_idx]))
            .ok_or_else(|| Error::NodeNotFound(name.to_owned()))
    }

    // Returns a reference to the node corresponding to the given address.
    pub fn get_by_addr(&self, addr: &Ipv4Addr) -> Option<(NodeIndex, &Node)> {
        self.addr_tree
            .get(addr)
            .copied()
            .map(|node_idx| (node_idx, &self.arena[node_idx]))
    }

    // Returns an iterator visiting all nodes.
    //
    // Nodes are ordered by their addresses.
    pub fn iter(&self) -> impl Iterator<Item = &'_ Node> + '_ {
        self.addr_tree
            .values()
            .map(|node_idx| &self.arena[*node_idx])
    }

    // Returns an iterator over all node indexes.
    //
    // Nodes are ordered by their addresses.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.addr_tree.values().copied()
    }
}

impl std::ops::Index<NodeIndex> for Nodes {
    type Output = Node;

    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<NodeIndex> for Nodes {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Self::Output {
        &mut self.arena[index]
    }
}

// ===== impl Links =====

impl Links {
    pub(crate) fn insert(
        &mut self,
        build: impl FnOnce(LinkId) -> Link,
    ) -> Result<(LinkIndex, &mut Link), Error> {
        let id = self.next_id();
        let link = build(id);
        let key = link.ends_key();
        if self.ends_tree.contains_key(&key) {
            return Err(Error::LinkEndpointInvalid(
                key.0.to_string(),
                key.1.to_string(),
            ));
        }

        // Create and insert link into the arena.
        let link_idx = self.arena.insert(link);

        // Link link to different collections.
        self.id_tree.insert(id, link_idx);
        self.ends_tree.insert(key, link_idx);

        Ok((link_idx, &mut self.arena[link_idx]))
    }

    // Returns a reference to the link corresponding to the given ID.
    pub fn get_by_id(&self, id: LinkId) -> Option<(LinkIndex, &Link)> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|link_idx| (link_idx, &self.arena[link_idx]))
    }

    // Returns a reference to the link connecting the given addresses.
    pub fn get_by_ends(
        &self,
        a: Ipv4Addr,
        b: Ipv4Addr,
    ) -> Option<(LinkIndex, &Link)> {
        self.ends_tree
            .get(&(a.min(b), a.max(b)))
            .copied()
            .map(|link_idx| (link_idx, &self.arena[link_idx]))
    }

    // Returns a mutable reference to the link connecting the given addresses.
    pub fn get_mut_by_ends(
        &mut self,
        a: Ipv4Addr,
        b: Ipv4Addr,
    ) -> Option<(LinkIndex, &mut Link)> {
        self.ends_tree
            .get(&(a.min(b), a.max(b)))
            .copied()
            .map(move |link_idx| (link_idx, &mut self.arena[link_idx]))
    }

    // Returns an iterator visiting all links.
    //
    // Links are ordered by their IDs.
    pub fn iter(&self) -> impl Iterator<Item = &'_ Link> + '_ {
        self.id_tree
            .iter()
            .sorted_by_key(|(id, _)| **id)
            .map(|(_, link_idx)| &self.arena[*link_idx])
    }

    // Returns an iterator visiting all links with mutable references.
    //
    // Order of iteration is not defined.
    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = &'_ mut Link> + '_ {
        self.arena.iter_mut().map(|(_, link)| link)
    }

    // Returns an iterator over all link indexes.
    //
    // Links are ordered by their endpoint addresses.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = LinkIndex> + '_ {
        self.ends_tree.values().copied()
    }

    // Get next link ID.
    fn next_id(&mut self) -> LinkId {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }
}

impl std::ops::Index<LinkIndex> for Links {
    type Output = Link;

    fn index(&self, index: LinkIndex) -> &Self::Output {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<LinkIndex> for Links {
    fn index_mut(&mut self, index: LinkIndex) -> &mut Self::Output {
        &mut self.arena[index]
    }
}
