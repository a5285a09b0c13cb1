//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use gosim_utils::ip::Ipv4AddrExt;

use crate::clock::{Clock, TimerEvent};
use crate::collections::{Links, Nodes};
use crate::config::{LinkAction, ScenarioCfg};
use crate::debug::Debug;
use crate::error::Error;
use crate::link::{Link, LinkEnd, LinkKind};
use crate::node::{MplsNode, Node, NodeCtx};
use crate::packet::Packet;
use crate::port::PortId;
use crate::topology::{NodeRole, RoutingTable};
use crate::traffic::TrafficGenerator;

// Simulated network driven by a discrete clock.
//
// Every tick runs the scheduled link events, lets every node process its
// queues and then moves packets along the links, delivering the arrivals
// for the next tick.
#[derive(Debug)]
pub struct Scenario {
    pub clock: Clock,
    pub nodes: Nodes,
    pub links: Links,
    // Link events ordered by time.
    events: Vec<ScheduledEvent>,
    next_event: usize,
    cfg: ScenarioCfg,
}

#[derive(Clone, Copy, Debug)]
struct ScheduledEvent {
    at_ns: u64,
    ends: (Ipv4Addr, Ipv4Addr),
    action: LinkAction,
}

// ===== impl Scenario =====

impl Scenario {
    pub fn from_config(cfg: ScenarioCfg) -> Result<Scenario, Error> {
        // Create nodes.
        let mut nodes = Nodes::default();
        for node_cfg in &cfg.nodes {
            if !node_cfg.address.is_usable() {
                return Err(Error::InvalidScenario(format!(
                    "unusable address {} for node {}",
                    node_cfg.address, node_cfg.name
                )));
            }
            nodes.insert(Node::new(node_cfg, &cfg.protocol))?;
        }

        // Create links and attach a port at each end.
        let mut links = Links::default();
        for link_cfg in &cfg.links {
            let (a_idx, a) = nodes.get_by_name(&link_cfg.a)?;
            let (b_idx, b) = nodes.get_by_name(&link_cfg.b)?;
            let a_host = a.role() == NodeRole::Endpoint;
            let b_host = b.role() == NodeRole::Endpoint;
            if a_idx == b_idx || (a_host && b_host) {
                return Err(Error::LinkEndpointInvalid(
                    link_cfg.a.clone(),
                    link_cfg.b.clone(),
                ));
            }

            let kind = if a_host || b_host {
                LinkKind::External
            } else {
                LinkKind::Internal
            };
            let ends = [
                LinkEnd {
                    node_idx: a_idx,
                    addr: a.addr(),
                    port: a.core().ports.len(),
                },
                LinkEnd {
                    node_idx: b_idx,
                    addr: b.addr(),
                    port: b.core().ports.len(),
                },
            ];
            let (link_idx, _) = links
                .insert(|id| Link::new(id, kind, ends, link_cfg.delay_ns))?;
            nodes[a_idx].core_mut().ports.add(link_idx, ends[1].addr);
            nodes[b_idx].core_mut().ports.add(link_idx, ends[0].addr);
        }

        // Attach traffic generators to their senders.
        for traffic_cfg in &cfg.traffic {
            let (_, destination) = nodes.get_by_name(&traffic_cfg.destination)?;
            let generator =
                TrafficGenerator::new(destination.addr(), traffic_cfg)?;
            let (_, sender) = nodes.get_mut_by_name(&traffic_cfg.sender)?;
            let Node::Sender(sender) = sender else {
                return Err(Error::InvalidScenario(format!(
                    "traffic source {} is not a sender",
                    traffic_cfg.sender
                )));
            };
            sender.add_generator(generator);
        }

        // Resolve link events.
        let mut events = vec![];
        for event_cfg in &cfg.events {
            let [a, b] = &event_cfg.link;
            let (_, a_node) = nodes.get_by_name(a)?;
            let (_, b_node) = nodes.get_by_name(b)?;
            let ends = (a_node.addr(), b_node.addr());
            if links.get_by_ends(ends.0, ends.1).is_none() {
                return Err(Error::LinkEndpointInvalid(a.clone(), b.clone()));
            }
            events.push(ScheduledEvent {
                at_ns: event_cfg.at_ns,
                ends,
                action: event_cfg.action,
            });
        }
        events.sort_by_key(|event| event.at_ns);

        Debug::ScenarioCreate(nodes.iter().count(), links.iter().count())
            .log();

        Ok(Scenario {
            clock: Clock::new(cfg.clock.tick_ns, cfg.clock.duration_ns),
            nodes,
            links,
            events,
            next_event: 0,
            cfg,
        })
    }

    pub fn from_toml(data: &str) -> Result<Scenario, Error> {
        Scenario::from_config(ScenarioCfg::from_toml(data)?)
    }

    pub fn load(path: &str) -> Result<Scenario, Error> {
        Scenario::from_config(ScenarioCfg::load(path)?)
    }

    pub fn config(&self) -> &ScenarioCfg {
        &self.cfg
    }

    // Runs the next tick if the clock is running.
    //
    // Returns false once the clock is paused or finished.
    pub fn tick(&mut self) -> bool {
        match self.clock.next_tick() {
            Some(event) => {
                self.run_tick(event);
                true
            }
            None => false,
        }
    }

    // Runs a single tick, even while paused.
    pub fn step(&mut self) -> bool {
        match self.clock.step() {
            Some(event) => {
                self.run_tick(event);
                true
            }
            None => false,
        }
    }

    // Runs up to `count` ticks, returning how many were run.
    pub fn run_ticks(&mut self, count: usize) -> usize {
        (0..count).take_while(|_| self.step()).count()
    }

    // Runs until the clock is paused or finished.
    pub fn run(&mut self) {
        while self.tick() {}
    }

    // Rebuilds the scenario from its configuration.
    pub fn reset(&mut self) -> Result<(), Error> {
        *self = Scenario::from_config(self.cfg.clone())?;
        Ok(())
    }

    fn run_tick(&mut self, event: TimerEvent) {
        // Apply the link events that fall within this tick.
        while let Some(scheduled) = self.events.get(self.next_event).copied()
            && scheduled.at_ns < event.upper_limit_timestamp
        {
            self.next_event += 1;
            let (a, b) = scheduled.ends;
            if let Some((_, link)) = self.links.get_mut_by_ends(a, b) {
                match scheduled.action {
                    LinkAction::Break => link.break_link(),
                    LinkAction::Restore => link.restore(),
                }
            }
        }

        // Topology as seen by every node during this tick.
        let topology = self.routing_table();

        // Let every node process its queues.
        let node_idxs = self.nodes.indexes().collect::<Vec<_>>();
        let mut ctx = NodeCtx {
            event: &event,
            topology: &topology,
            links: &mut self.links,
        };
        for node_idx in node_idxs {
            self.nodes[node_idx].on_tick(&mut ctx);
        }

        // Move packets along the links. Arrivals wait in the port queues
        // until the next tick.
        for link in self.links.iter_mut() {
            link.on_tick(&event);
        }
        let link_idxs = self.links.indexes().collect::<Vec<_>>();
        for link_idx in link_idxs {
            for (end, packet) in self.links[link_idx].take_delivered() {
                self.nodes[end.node_idx].receive(end.port, packet);
            }
        }
    }

    // Builds the routing view of the live topology.
    pub fn routing_table(&self) -> RoutingTable {
        let mut table = RoutingTable::default();
        for node in self.nodes.iter() {
            table.add_node(node.addr(), node.role(), node.routing_weight());
        }
        for link in self.links.iter().filter(|link| !link.is_broken()) {
            table.add_link(
                link.ends[0].addr,
                link.ends[1].addr,
                link.delay_ns,
                link.routing_weight(),
            );
        }
        table
    }

    pub fn node(&self, name: &str) -> Result<&Node, Error> {
        self.nodes.get_by_name(name).map(|(_, node)| node)
    }

    pub fn node_mut(&mut self, name: &str) -> Result<&mut Node, Error> {
        self.nodes.get_mut_by_name(name).map(|(_, node)| node)
    }

    // Returns the label switching part of the given node.
    pub fn mpls_node(&self, name: &str) -> Result<&MplsNode, Error> {
        self.node(name)?.mpls().ok_or_else(|| {
            Error::InvalidScenario(format!("{} is not an MPLS node", name))
        })
    }

    pub fn link_between(&self, a: &str, b: &str) -> Result<&Link, Error> {
        let a_addr = self.node(a)?.addr();
        let b_addr = self.node(b)?.addr();
        self.links
            .get_by_ends(a_addr, b_addr)
            .map(|(_, link)| link)
            .ok_or_else(|| {
                Error::LinkEndpointInvalid(a.to_owned(), b.to_owned())
            })
    }

    // Returns the port of node `a` that faces node `b`.
    pub fn port_towards(&self, a: &str, b: &str) -> Result<PortId, Error> {
        let b_addr = self.node(b)?.addr();
        self.node(a)?
            .core()
            .ports
            .port_towards(b_addr)
            .ok_or_else(|| {
                Error::LinkEndpointInvalid(a.to_owned(), b.to_owned())
            })
    }

    // Places a packet in a port queue of the given node, as if it had just
    // arrived from the link.
    pub fn inject(
        &mut self,
        name: &str,
        port: PortId,
        packet: Packet,
    ) -> Result<(), Error> {
        self.node_mut(name)?.receive(port, packet);
        Ok(())
    }

    pub fn break_link(&mut self, a: &str, b: &str) -> Result<(), Error> {
        self.link_mut(a, b)?.break_link();
        Ok(())
    }

    pub fn restore_link(&mut self, a: &str, b: &str) -> Result<(), Error> {
        self.link_mut(a, b)?.restore();
        Ok(())
    }

    fn link_mut(&mut self, a: &str, b: &str) -> Result<&mut Link, Error> {
        let a_addr = self.node(a)?.addr();
        let b_addr = self.node(b)?.addr();
        self.links
            .get_mut_by_ends(a_addr, b_addr)
            .map(|(_, link)| link)
            .ok_or_else(|| {
                Error::LinkEndpointInvalid(a.to_owned(), b.to_owned())
            })
    }
}
