//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use crate::collections::{EntryIndex, Links};
use crate::link::LinkKind;
use crate::matrix::{EntryFlags, LabelState};
use crate::node::{MplsNode, NodeCtx};
use crate::packet::LspType;
use crate::port::PortId;
use crate::tldp;

// State of the link behind a port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PortLink {
    Missing,
    External,
    Broken,
    Live,
}

// ===== global functions =====

// Reacts to link failures affecting the switching entries.
//
// Running it again without further link changes has no effect.
pub(crate) fn connectivity_check(node: &mut MplsNode, ctx: &mut NodeCtx<'_>) {
    for entry_idx in node.matrix.entries.indexes() {
        check_entry(node, ctx, entry_idx);
    }
}

fn check_entry(
    node: &mut MplsNode,
    ctx: &mut NodeCtx<'_>,
    entry_idx: EntryIndex,
) {
    let links = &*ctx.links;
    let entry = &node.matrix[entry_idx];
    let incoming = port_link(node, links, Some(entry.incoming_port));
    let primary = port_link(node, links, entry.outgoing.port);
    let backup = port_link(node, links, entry.backup.port);

    // The backup path went down: forget it.
    if backup == PortLink::Broken
        && entry.backup.port.is_some()
        && !matches!(
            entry.backup.label,
            LabelState::Undefined | LabelState::Withdrawn
        )
    {
        tldp::uncount_link(node, ctx.links, entry_idx, LspType::Backup);
        node.matrix.clear_backup(entry_idx);
    }

    // The primary path went down but a backup is ready to take over.
    let entry = &node.matrix[entry_idx];
    if primary == PortLink::Broken
        && entry.flags.contains(EntryFlags::BACKUP_ESTABLISHED)
        && port_link(node, ctx.links, entry.backup.port) == PortLink::Live
    {
        tldp::switch_to_backup(node, ctx.links, entry_idx);
        return;
    }

    // Nothing left to switch between.
    let disconnected = match (incoming, primary) {
        (PortLink::Broken, PortLink::Broken) => true,
        (PortLink::Broken, PortLink::External | PortLink::Missing) => true,
        (PortLink::External, PortLink::Broken) => true,
        _ => false,
    };
    if disconnected {
        tldp::force_remove(node, ctx.links, entry_idx);
        return;
    }

    // The upstream side went down.
    let entry = &mut node.matrix[entry_idx];
    if incoming == PortLink::Broken
        && !entry.flags.contains(EntryFlags::UPSTREAM_WITHDRAWN)
    {
        entry.flags.insert(EntryFlags::UPSTREAM_WITHDRAWN);
        tldp::withdraw_downstream(node, ctx, entry_idx);
    }

    // The downstream side went down with no backup to fall back on.
    let entry = &mut node.matrix[entry_idx];
    if primary == PortLink::Broken
        && !entry.flags.contains(EntryFlags::PRIMARY_FAILED)
    {
        entry.flags.insert(EntryFlags::PRIMARY_FAILED);
        tldp::withdraw_upstream(node, ctx, entry_idx);
    }

    node.matrix.remove_check(entry_idx);
}

fn port_link(
    node: &MplsNode,
    links: &Links,
    port_id: Option<PortId>,
) -> PortLink {
    let Some(port) = port_id.and_then(|port| node.core.ports.get(port)) else {
        return PortLink::Missing;
    };
    let link = &links[port.link_idx];
    if link.is_broken() {
        PortLink::Broken
    } else if link.kind == LinkKind::External {
        PortLink::External
    } else {
        PortLink::Live
    }
}
