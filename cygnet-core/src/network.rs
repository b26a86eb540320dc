//! The simulation engine: the arena of nodes and links, the tick driver,
//! and the frame pump.
//!
//! [`Network`] owns every node and link and hands out index-based ids; the
//! rest of the crate refers to topology through those ids rather than shared
//! pointers. Stepping is synchronous and single-threaded. Each tick resets
//! the per-tick bandwidth accounting, advances every node's power and
//! software machines in creation order, and then drains the transmit queue to
//! exhaustion, so any frame sent during a tick, including frames sent in
//! reaction to other frames, is delivered or dropped within that same tick.

use crate::acl::{AclAction, FlowKey};
use crate::address::Ipv4Address;
use crate::frame::{
    AppHeader, ArpPayload, DropReason, Frame, FrameBody, IcmpHeader, IcmpKind, IpProtocol,
    Ipv4Header, LinkHeader, Mac, MacAllocator, Precedence, TcpFlags, TrafficOrigin,
    TransportHeader,
};
use crate::hardware::{
    AirSpace, Attachment, Frequency, InterfaceConfig, Link, LinkConfig, Medium,
};
use crate::id::{LinkId, NodeId, PortNumber, Tick};
use crate::logging;
use crate::message::Message;
use crate::node::{ArpEntry, Node, NodeConfig, NodeError, NodeEventKind, NodeRole};
use crate::session::{Endpoint, SessionKey};
use crate::software::{SoftwareAction, SoftwareConfig, SoftwareError, SoftwareRegistry};
use crate::switch::SwitchDecision;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use thiserror::Error as ThisError;

/// A frame queued for transmission out of a node's interface.
struct Outbound {
    from: NodeId,
    port: PortNumber,
    frame: Frame,
}

/// A frame waiting for its next hop's hardware address. Flushed when the
/// reply arrives; abandoned at the end of the tick otherwise.
struct Parked {
    node: NodeId,
    port: PortNumber,
    next_hop: Ipv4Address,
    frame: Frame,
}

/// The arena that owns the whole simulated network.
pub struct Network {
    nodes: Vec<Node>,
    links: Vec<Link>,
    airspace: AirSpace,
    macs: MacAllocator,
    names: FxHashMap<String, NodeId>,
    tick: Tick,
    queue: VecDeque<Outbound>,
    parked: Vec<Parked>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
            airspace: AirSpace::new(),
            macs: MacAllocator::new(),
            names: FxHashMap::default(),
            tick: 0,
            queue: VecDeque::new(),
            parked: Vec::new(),
        }
    }

    /// The current tick. Zero before the first [`step`](Self::step).
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Adds a node to the arena. Names must be unique within the network.
    pub fn add_node(&mut self, config: NodeConfig, role: NodeRole) -> Result<NodeId, NetworkError> {
        if self.names.contains_key(&config.name) {
            return Err(NetworkError::DuplicateNodeName(config.name));
        }
        let id = NodeId::new(self.nodes.len());
        self.names.insert(config.name.clone(), id);
        self.nodes.push(Node::new(id, config, role));
        Ok(id)
    }

    /// Adds an interface to a node, allocating its hardware address. Wireless
    /// interfaces are registered with the shared airspace here.
    pub fn add_interface(
        &mut self,
        node: NodeId,
        port: PortNumber,
        config: InterfaceConfig,
    ) -> Result<Mac, NetworkError> {
        let mac = self.macs.allocate();
        self.nodes[node.index()].add_interface(port, mac, &config)?;
        if let Some(frequency) = config.frequency {
            self.airspace.register(frequency, node, port);
        }
        Ok(mac)
    }

    /// Connects two wired interfaces with a link.
    pub fn connect(
        &mut self,
        a: Attachment,
        b: Attachment,
        config: LinkConfig,
    ) -> Result<LinkId, NetworkError> {
        for end in [a, b] {
            let node = &self.nodes[end.node.index()];
            let interface = node
                .interface(end.port)
                .ok_or(NetworkError::UnknownPort {
                    node: node.name().to_string(),
                    port: end.port,
                })?;
            match interface.medium() {
                Medium::Wired { link: None } => {}
                Medium::Wired { link: Some(_) } => {
                    return Err(NetworkError::PortAttached {
                        node: node.name().to_string(),
                        port: end.port,
                    })
                }
                Medium::Wireless { .. } => {
                    return Err(NetworkError::PortNotWired {
                        node: node.name().to_string(),
                        port: end.port,
                    })
                }
            }
        }
        let id = LinkId::new(self.links.len());
        self.links.push(Link::new(a, b, config));
        for end in [a, b] {
            if let Some(interface) = self.nodes[end.node.index()].interface_mut(end.port) {
                interface.attach_link(id);
            }
        }
        Ok(id)
    }

    /// The node with the given id. Ids originate from
    /// [`add_node`](Self::add_node) on this network and never dangle.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.index()]
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn airspace(&self) -> &AirSpace {
        &self.airspace
    }

    pub fn airspace_mut(&mut self) -> &mut AirSpace {
        &mut self.airspace
    }

    /// Installs software on a node through the registry.
    pub fn install_software(
        &mut self,
        node: NodeId,
        registry: &SoftwareRegistry,
        config: SoftwareConfig,
    ) -> Result<(), SoftwareError> {
        let node = &mut self.nodes[node.index()];
        let name = node.name().to_string();
        node.software.install(&name, registry, config)
    }

    /// Advances the simulation one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        let tick = self.tick;
        for link in &mut self.links {
            link.reset_load();
        }
        self.airspace.reset_load();
        for index in 0..self.nodes.len() {
            let id = NodeId::new(index);
            self.nodes[index].advance_power(tick);
            if self.nodes[index].is_on() {
                let node = &mut self.nodes[index];
                let name = node.name().to_string();
                let actions = node.software.apply_timestep(&name, tick);
                self.apply_actions(id, actions);
            }
        }
        self.pump();
        // Anything still waiting on address resolution had no answer this
        // tick; the destination is unreachable.
        for parked in std::mem::take(&mut self.parked) {
            self.nodes[parked.node.index()].record_drop(tick, DropReason::NoRoute);
        }
    }

    /// Sends a transport payload from a node, as if local software with the
    /// given source port had queued it.
    pub fn send_transport(
        &mut self,
        from: NodeId,
        protocol: IpProtocol,
        dst: Ipv4Address,
        dst_port: u16,
        src_port: u16,
        payload: Message,
        origin: TrafficOrigin,
    ) {
        self.originate_transport(from, protocol, dst, dst_port, src_port, payload, origin);
    }

    /// Sends an echo request from a node toward a destination address. The
    /// reply, if any, lands in the sender's event log.
    pub fn ping(&mut self, from: NodeId, dst: Ipv4Address, sequence: u16) {
        let tick = self.tick;
        self.nodes[from.index()].record(
            tick,
            NodeEventKind::EchoRequestSent { to: dst, sequence },
        );
        let header = IcmpHeader {
            kind: IcmpKind::EchoRequest,
            code: 0,
            sequence,
        };
        self.originate_icmp(from, dst, header);
    }

    /// Chooses the egress interface and next hop for traffic a node
    /// originates. Hosts deliver on-subnet traffic directly and everything
    /// else through their gateway; routers and firewalls consult their route
    /// table.
    fn resolve_egress(
        &self,
        from: NodeId,
        dst: Ipv4Address,
    ) -> Result<(PortNumber, Ipv4Address), DropReason> {
        let node = &self.nodes[from.index()];
        for (port, interface) in node.interfaces() {
            if !interface.is_enabled() {
                continue;
            }
            if let Some(subnet) = interface.subnet() {
                if subnet.contains(dst) || dst == Ipv4Address::BROADCAST {
                    return Ok((port, dst));
                }
            }
        }
        if let Some(router) = node.role.router() {
            let (_, entry) = router.table.lookup(dst).ok_or(DropReason::NoRoute)?;
            let next_hop = if entry.is_connected() { dst } else { entry.next_hop };
            let port = self
                .port_toward(from, next_hop)
                .ok_or(DropReason::NoRoute)?;
            return Ok((port, next_hop));
        }
        let gateway = node.config().default_gateway.ok_or(DropReason::NoGateway)?;
        let port = self
            .port_toward(from, gateway)
            .ok_or(DropReason::NoGateway)?;
        Ok((port, gateway))
    }

    /// The enabled interface whose subnet contains the given next hop.
    fn port_toward(&self, node: NodeId, next_hop: Ipv4Address) -> Option<PortNumber> {
        self.nodes[node.index()]
            .interfaces()
            .find(|(_, interface)| {
                interface.is_enabled()
                    && interface
                        .subnet()
                        .is_some_and(|subnet| subnet.contains(next_hop))
            })
            .map(|(port, _)| port)
    }

    fn originate_transport(
        &mut self,
        from: NodeId,
        protocol: IpProtocol,
        dst: Ipv4Address,
        dst_port: u16,
        src_port: u16,
        payload: Message,
        origin: TrafficOrigin,
    ) {
        let tick = self.tick;
        let (port, next_hop) = match self.resolve_egress(from, dst) {
            Ok(egress) => egress,
            Err(reason) => {
                self.nodes[from.index()].record_drop(tick, reason);
                return;
            }
        };
        let node = &mut self.nodes[from.index()];
        let Some(interface) = node.interface(port) else {
            return;
        };
        let Some(src) = interface.address() else {
            node.record_drop(tick, DropReason::NotConnected);
            return;
        };
        let mac = interface.mac();
        node.sessions.note_exchange(
            SessionKey::new(
                protocol,
                Endpoint::new(src, src_port),
                Endpoint::new(dst, dst_port),
            ),
            tick,
        );
        let frame = Frame::transport(
            LinkHeader {
                src: mac,
                dst: Mac::BROADCAST,
            },
            Ipv4Header {
                src,
                dst,
                protocol,
                ttl: Ipv4Header::DEFAULT_TTL,
                precedence: Precedence::Routine,
            },
            AppHeader {
                origin,
                integrity: Default::default(),
            },
            TransportHeader {
                src_port,
                dst_port,
                flags: TcpFlags::NONE,
            },
            payload,
        );
        match frame {
            Ok(frame) => self.dispatch_out(from, port, next_hop, frame),
            // Unreachable for TCP and UDP; ICMP has its own path.
            Err(_) => {}
        }
    }

    fn originate_icmp(&mut self, from: NodeId, dst: Ipv4Address, header: IcmpHeader) {
        let tick = self.tick;
        let (port, next_hop) = match self.resolve_egress(from, dst) {
            Ok(egress) => egress,
            Err(reason) => {
                self.nodes[from.index()].record_drop(tick, reason);
                return;
            }
        };
        let node = &self.nodes[from.index()];
        let Some(interface) = node.interface(port) else {
            return;
        };
        let Some(src) = interface.address() else {
            self.nodes[from.index()].record_drop(tick, DropReason::NotConnected);
            return;
        };
        let frame = Frame::icmp(
            LinkHeader {
                src: interface.mac(),
                dst: Mac::BROADCAST,
            },
            Ipv4Header {
                src,
                dst,
                protocol: IpProtocol::Icmp,
                ttl: Ipv4Header::DEFAULT_TTL,
                precedence: Precedence::Routine,
            },
            header,
        );
        self.dispatch_out(from, port, next_hop, frame);
    }

    /// Resolves the next hop's hardware address and queues the frame, or
    /// parks it behind a broadcast ARP request when the address is unknown.
    fn dispatch_out(
        &mut self,
        from: NodeId,
        port: PortNumber,
        next_hop: Ipv4Address,
        mut frame: Frame,
    ) {
        let tick = self.tick;
        let node = &mut self.nodes[from.index()];
        let Some(interface) = node.interface(port) else {
            return;
        };
        let mac = interface.mac();
        let src_address = interface.address().unwrap_or(Ipv4Address::UNSPECIFIED);
        frame.link.src = mac;
        if frame.net.dst == Ipv4Address::BROADCAST {
            frame.link.dst = Mac::BROADCAST;
            self.queue.push_back(Outbound { from, port, frame });
            return;
        }
        match node.arp.lookup(next_hop) {
            Some(entry) => {
                frame.link.dst = entry.mac;
                self.queue.push_back(Outbound { from, port, frame });
            }
            None => {
                let name = node.name().to_string();
                node.record(tick, NodeEventKind::ArpRequestSent { target: next_hop });
                logging::arp_event(tick, &name, &format!("request for {}", next_hop));
                self.parked.push(Parked {
                    node: from,
                    port,
                    next_hop,
                    frame,
                });
                let request = Frame::arp(
                    LinkHeader {
                        src: mac,
                        dst: Mac::BROADCAST,
                    },
                    src_address,
                    next_hop,
                    ArpPayload::Request { target: next_hop },
                );
                self.queue.push_back(Outbound {
                    from,
                    port,
                    frame: request,
                });
            }
        }
    }

    /// Drains the transmit queue to exhaustion. Every transmission may queue
    /// further frames; the loop ends when nothing in the network has more to
    /// say this tick.
    fn pump(&mut self) {
        while let Some(outbound) = self.queue.pop_front() {
            self.transmit(outbound);
        }
    }

    fn transmit(&mut self, outbound: Outbound) {
        let Outbound { from, port, frame } = outbound;
        let tick = self.tick;
        enum Path {
            Blocked(DropReason),
            Wired(LinkId),
            Wireless(Frequency),
        }
        let path = {
            let node = &mut self.nodes[from.index()];
            if !node.is_on() {
                Path::Blocked(DropReason::PoweredOff)
            } else {
                match node.interfaces.get_mut(&port) {
                    None => return,
                    Some(interface) if !interface.is_enabled() => {
                        interface.counters.dropped += 1;
                        Path::Blocked(DropReason::InterfaceDisabled)
                    }
                    Some(interface) => match interface.medium() {
                        Medium::Wired { link: Some(id) } => Path::Wired(id),
                        Medium::Wired { link: None } => {
                            interface.counters.dropped += 1;
                            Path::Blocked(DropReason::NotConnected)
                        }
                        Medium::Wireless { frequency } => Path::Wireless(frequency),
                    },
                }
            }
        };
        match path {
            Path::Blocked(reason) => {
                self.nodes[from.index()].record_drop(tick, reason);
            }
            Path::Wired(id) => {
                if !self.links[id.index()].reserve(frame.size()) {
                    self.links[id.index()].dropped += 1;
                    let node = &mut self.nodes[from.index()];
                    if let Some(interface) = node.interfaces.get_mut(&port) {
                        interface.counters.dropped += 1;
                    }
                    node.record_drop(tick, DropReason::BandwidthExceeded);
                    return;
                }
                if let Some(interface) = self.nodes[from.index()].interfaces.get_mut(&port) {
                    interface.counters.sent += 1;
                }
                let to = self.links[id.index()].other_endpoint(Attachment { node: from, port });
                self.receive(to.node, to.port, frame);
            }
            Path::Wireless(frequency) => {
                if !self.airspace.reserve(frequency, frame.size()) {
                    let node = &mut self.nodes[from.index()];
                    if let Some(interface) = node.interfaces.get_mut(&port) {
                        interface.counters.dropped += 1;
                    }
                    node.record_drop(tick, DropReason::BandwidthExceeded);
                    return;
                }
                if let Some(interface) = self.nodes[from.index()].interfaces.get_mut(&port) {
                    interface.counters.sent += 1;
                }
                for (receiver, receiver_port) in self.airspace.receivers(frequency, (from, port)) {
                    self.receive(receiver, receiver_port, frame.clone());
                }
            }
        }
    }

    fn receive(&mut self, at: NodeId, port: PortNumber, mut frame: Frame) {
        let tick = self.tick;
        {
            let node = &mut self.nodes[at.index()];
            if !node.is_on() {
                node.record_drop(tick, DropReason::PoweredOff);
                return;
            }
            let Some(interface) = node.interfaces.get_mut(&port) else {
                return;
            };
            if !interface.is_enabled() {
                interface.counters.dropped += 1;
                node.record_drop(tick, DropReason::InterfaceDisabled);
                return;
            }
            interface.counters.received += 1;
        }
        // Switches relay at the link layer: no address filter, no TTL.
        if let NodeRole::Switch(_) = self.nodes[at.index()].role {
            self.switch_relay(at, port, frame);
            return;
        }
        {
            let node = &mut self.nodes[at.index()];
            let mac = match node.interface(port) {
                Some(interface) => interface.mac(),
                None => return,
            };
            if !frame.link.dst.is_broadcast() && frame.link.dst != mac {
                node.record_drop(tick, DropReason::NotAddressed);
                return;
            }
        }
        if frame.is_arp() {
            self.handle_arp(at, port, frame);
            return;
        }
        // Any addressed frame teaches its sender's mapping passively, so a
        // reply never needs a redundant resolution exchange.
        if frame.net.src != Ipv4Address::UNSPECIFIED {
            self.nodes[at.index()].arp.learn_if_absent(
                frame.net.src,
                ArpEntry {
                    mac: frame.link.src,
                    port,
                },
            );
        }
        frame.net.ttl = frame.net.ttl.saturating_sub(1);
        if frame.net.ttl == 0 {
            self.nodes[at.index()].record_drop(tick, DropReason::TtlExpired);
            return;
        }
        let local = self.nodes[at.index()].owns_address(frame.net.dst)
            || frame.net.dst == Ipv4Address::BROADCAST;
        if local {
            self.deliver_local(at, frame);
        } else if self.nodes[at.index()].role.router().is_some() {
            self.forward(at, port, frame);
        } else {
            self.nodes[at.index()].record_drop(tick, DropReason::NotAddressed);
        }
    }

    fn switch_relay(&mut self, at: NodeId, ingress: PortNumber, frame: Frame) {
        let decision = {
            let node = &mut self.nodes[at.index()];
            match &mut node.role {
                NodeRole::Switch(switch) => {
                    switch.process(ingress, frame.link.src, frame.link.dst)
                }
                _ => return,
            }
        };
        match decision {
            SwitchDecision::Unicast(egress) => {
                self.queue.push_back(Outbound {
                    from: at,
                    port: egress,
                    frame,
                });
            }
            SwitchDecision::Flood => {
                // Disabled ports are silent, not spurious egress drops.
                let ports: Vec<PortNumber> = self.nodes[at.index()]
                    .interfaces()
                    .filter(|(port, interface)| *port != ingress && interface.is_enabled())
                    .map(|(port, _)| port)
                    .collect();
                for port in ports {
                    self.queue.push_back(Outbound {
                        from: at,
                        port,
                        frame: frame.clone(),
                    });
                }
            }
            SwitchDecision::Drop => {}
        }
    }

    fn handle_arp(&mut self, at: NodeId, port: PortNumber, frame: Frame) {
        let FrameBody::Arp(payload) = frame.body else {
            return;
        };
        let tick = self.tick;
        match payload {
            ArpPayload::Request { target } => {
                let node = &mut self.nodes[at.index()];
                node.record(tick, NodeEventKind::ArpRequestReceived { from: frame.net.src });
                if frame.net.src != Ipv4Address::UNSPECIFIED {
                    node.arp.learn_if_absent(
                        frame.net.src,
                        ArpEntry {
                            mac: frame.link.src,
                            port,
                        },
                    );
                }
                if !node.owns_address(target) {
                    return;
                }
                let Some(interface) = node.interface(port) else {
                    return;
                };
                let mac = interface.mac();
                let name = node.name().to_string();
                node.record(tick, NodeEventKind::ArpReplySent { to: frame.net.src });
                logging::arp_event(tick, &name, &format!("reply for {}", target));
                let reply = Frame::arp(
                    LinkHeader {
                        src: mac,
                        dst: frame.link.src,
                    },
                    target,
                    frame.net.src,
                    ArpPayload::Reply { target, mac },
                );
                self.queue.push_back(Outbound {
                    from: at,
                    port,
                    frame: reply,
                });
            }
            ArpPayload::Reply { target, mac } => {
                {
                    let node = &mut self.nodes[at.index()];
                    node.record(tick, NodeEventKind::ArpReplyReceived { from: frame.net.src });
                    node.arp.learn(target, ArpEntry { mac, port });
                }
                // Flush any frames parked on this answer.
                let mut flushed = Vec::new();
                self.parked.retain_mut(|parked| {
                    if parked.node == at && parked.next_hop == target {
                        let mut frame = parked.frame.clone();
                        frame.link.dst = mac;
                        flushed.push(Outbound {
                            from: at,
                            port: parked.port,
                            frame,
                        });
                        false
                    } else {
                        true
                    }
                });
                for outbound in flushed {
                    self.queue.push_back(outbound);
                }
            }
        }
    }

    fn deliver_local(&mut self, at: NodeId, frame: Frame) {
        let tick = self.tick;
        match frame.body {
            FrameBody::Icmp(header) => match header.kind {
                IcmpKind::EchoRequest => {
                    self.nodes[at.index()].record(
                        tick,
                        NodeEventKind::echo(IcmpKind::EchoRequest, false, frame.net.src, header.sequence),
                    );
                    self.nodes[at.index()].record(
                        tick,
                        NodeEventKind::echo(IcmpKind::EchoReply, true, frame.net.src, header.sequence),
                    );
                    let reply = IcmpHeader {
                        kind: IcmpKind::EchoReply,
                        code: 0,
                        sequence: header.sequence,
                    };
                    self.originate_icmp(at, frame.net.src, reply);
                }
                IcmpKind::EchoReply => {
                    self.nodes[at.index()].record(
                        tick,
                        NodeEventKind::echo(IcmpKind::EchoReply, false, frame.net.src, header.sequence),
                    );
                }
            },
            FrameBody::Transport { header, payload } => {
                let node = &mut self.nodes[at.index()];
                let name = node.name().to_string();
                let key = SessionKey::new(
                    frame.net.protocol,
                    Endpoint::new(frame.net.dst, header.dst_port),
                    Endpoint::new(frame.net.src, header.src_port),
                );
                let session = node.sessions.note_exchange(key, tick);
                let bytes = payload.len();
                match node.software.dispatch(
                    &name,
                    tick,
                    frame.net.protocol,
                    header.dst_port,
                    session,
                    payload,
                ) {
                    Some(actions) => {
                        node.record(
                            tick,
                            NodeEventKind::MessageDelivered {
                                port: header.dst_port,
                                bytes,
                            },
                        );
                        self.apply_actions(at, actions);
                    }
                    None => node.record_drop(tick, DropReason::ClosedPort),
                }
            }
            FrameBody::Arp(_) => {}
        }
    }

    /// Forwards a frame through a router or firewall node.
    ///
    /// A plain router runs list, TTL, table, in that order. A firewall has to
    /// resolve the route first because zone selection needs the egress port,
    /// but its zone lists still run ahead of the TTL step, so a doomed frame
    /// that policy rejects is counted as a deny, not a TTL expiry.
    fn forward(&mut self, at: NodeId, ingress: PortNumber, mut frame: Frame) {
        let tick = self.tick;
        let flow = FlowKey::of(&frame);
        let is_firewall = matches!(self.nodes[at.index()].role, NodeRole::Firewall(_));

        if !is_firewall {
            let node = &mut self.nodes[at.index()];
            if let NodeRole::Router(router) = &mut node.role {
                let verdict = router.acl.evaluate(&flow);
                if verdict.action == AclAction::Deny {
                    let name = node.name().to_string();
                    logging::acl_deny_event(tick, &name, verdict.rule_position);
                    node.record_drop(tick, DropReason::AclDenied);
                    return;
                }
            }
            // The forwarding hop costs a second TTL decrement.
            frame.net.ttl = frame.net.ttl.saturating_sub(1);
            if frame.net.ttl == 0 {
                self.nodes[at.index()].record_drop(tick, DropReason::TtlExpired);
                return;
            }
        }

        let (egress, next_hop) = {
            let node = &self.nodes[at.index()];
            let Some(router) = node.role.router() else {
                return;
            };
            let Some((_, entry)) = router.table.lookup(frame.net.dst) else {
                self.nodes[at.index()].record_drop(tick, DropReason::NoRoute);
                return;
            };
            let next_hop = if entry.is_connected() {
                frame.net.dst
            } else {
                entry.next_hop
            };
            match self.port_toward(at, next_hop) {
                Some(port) => (port, next_hop),
                None => {
                    self.nodes[at.index()].record_drop(tick, DropReason::NoRoute);
                    return;
                }
            }
        };

        if is_firewall {
            {
                let node = &mut self.nodes[at.index()];
                if let NodeRole::Firewall(firewall) = &mut node.role {
                    let from = firewall.zone_of(ingress);
                    let to = firewall.zone_of(egress);
                    let (_, verdict) = firewall.evaluate(from, to, &flow);
                    if verdict.action == AclAction::Deny {
                        let name = node.name().to_string();
                        logging::acl_deny_event(tick, &name, verdict.rule_position);
                        node.record_drop(tick, DropReason::AclDenied);
                        return;
                    }
                }
            }
            frame.net.ttl = frame.net.ttl.saturating_sub(1);
            if frame.net.ttl == 0 {
                self.nodes[at.index()].record_drop(tick, DropReason::TtlExpired);
                return;
            }
        }

        self.dispatch_out(at, egress, next_hop, frame);
    }

    fn apply_actions(&mut self, at: NodeId, actions: Vec<SoftwareAction>) {
        for action in actions {
            match action {
                SoftwareAction::Send {
                    protocol,
                    dst,
                    dst_port,
                    src_port,
                    payload,
                    origin,
                } => {
                    self.originate_transport(at, protocol, dst, dst_port, src_port, payload, origin);
                }
                SoftwareAction::Reply { session, payload } => {
                    let node = &self.nodes[at.index()];
                    let Some(session) = node.sessions.get(session) else {
                        continue;
                    };
                    let key = session.key;
                    let origin = node
                        .software
                        .iter()
                        .find(|software| {
                            software.config().port == key.local.port
                                && software.config().protocol == key.protocol
                        })
                        .map(|software| software.config().origin)
                        .unwrap_or_default();
                    self.originate_transport(
                        at,
                        key.protocol,
                        key.remote.address,
                        key.remote.port,
                        key.local.port,
                        payload,
                        origin,
                    );
                }
                SoftwareAction::Teardown { session } => {
                    self.nodes[at.index()].sessions.teardown(session);
                }
            }
        }
    }
}

#[derive(Debug, ThisError)]
pub enum NetworkError {
    #[error("a node named {0:?} already exists")]
    DuplicateNodeName(String),
    #[error("node {node:?} has no interface on port {port}")]
    UnknownPort { node: String, port: PortNumber },
    #[error("interface {node:?}:{port} is wireless, not wired")]
    PortNotWired { node: String, port: PortNumber },
    #[error("interface {node:?}:{port} already has a link attached")]
    PortAttached { node: String, port: PortNumber },
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Software(#[from] SoftwareError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeEventKind;
    use crate::switch::Switch;

    fn host(network: &mut Network, name: &str, ip: &str) -> NodeId {
        let id = network
            .add_node(NodeConfig::new(name), NodeRole::Host)
            .unwrap();
        network
            .add_interface(id, 1, InterfaceConfig::wired(Some(ip.parse().unwrap())))
            .unwrap();
        id
    }

    fn wire(network: &mut Network, a: NodeId, a_port: PortNumber, b: NodeId, b_port: PortNumber) {
        network
            .connect(
                Attachment { node: a, port: a_port },
                Attachment { node: b, port: b_port },
                LinkConfig::default(),
            )
            .unwrap();
    }

    #[test]
    fn ping_over_a_direct_link_resolves_arp_and_echoes() {
        let mut network = Network::new();
        let a = host(&mut network, "client_1", "10.0.0.1/24");
        let b = host(&mut network, "client_2", "10.0.0.2/24");
        wire(&mut network, a, 1, b, 1);
        let target: Ipv4Address = "10.0.0.2".parse().unwrap();
        network.ping(a, target, 1);
        network.step();
        // The whole exchange, ARP included, completes within one tick.
        assert!(network.node(b).saw_event(|kind| matches!(
            kind,
            NodeEventKind::ArpRequestReceived { .. }
        )));
        assert!(network.node(b).saw_event(|kind| matches!(
            kind,
            NodeEventKind::EchoRequestReceived { sequence: 1, .. }
        )));
        assert!(network.node(a).saw_event(|kind| matches!(
            kind,
            NodeEventKind::EchoReplyReceived { sequence: 1, .. }
        )));
        // Both sides learned each other.
        assert!(network.node(a).arp.lookup(target).is_some());
        assert!(network
            .node(b)
            .arp
            .lookup("10.0.0.1".parse().unwrap())
            .is_some());
    }

    #[test]
    fn switch_learns_and_stops_flooding() {
        let mut network = Network::new();
        let a = host(&mut network, "client_1", "10.0.0.1/24");
        let b = host(&mut network, "client_2", "10.0.0.2/24");
        let c = host(&mut network, "client_3", "10.0.0.3/24");
        let switch = network
            .add_node(NodeConfig::new("switch_1"), NodeRole::Switch(Switch::new()))
            .unwrap();
        for port in 1..=3 {
            network
                .add_interface(switch, port, InterfaceConfig::wired(None))
                .unwrap();
        }
        wire(&mut network, a, 1, switch, 1);
        wire(&mut network, b, 1, switch, 2);
        wire(&mut network, c, 1, switch, 3);
        network.ping(a, "10.0.0.2".parse().unwrap(), 7);
        network.step();
        assert!(network.node(a).saw_event(|kind| matches!(
            kind,
            NodeEventKind::EchoReplyReceived { sequence: 7, .. }
        )));
        // The bystander saw the ARP broadcast but never an echo.
        assert!(network.node(c).saw_event(|kind| matches!(
            kind,
            NodeEventKind::ArpRequestReceived { .. }
        )));
        assert!(!network.node(c).saw_event(|kind| matches!(
            kind,
            NodeEventKind::EchoRequestReceived { .. }
        )));
        // Both talkers are in the address table now.
        let table = match network.node(switch).role.switch() {
            Some(switch) => switch,
            None => unreachable!(),
        };
        assert_eq!(table.table_len(), 2);
    }

    #[test]
    fn bandwidth_is_enforced_per_tick() {
        let mut network = Network::new();
        let a = host(&mut network, "client_1", "10.0.0.1/24");
        let b = host(&mut network, "client_2", "10.0.0.2/24");
        network
            .connect(
                Attachment { node: a, port: 1 },
                Attachment { node: b, port: 1 },
                LinkConfig { bandwidth: 100 },
            )
            .unwrap();
        let target: Ipv4Address = "10.0.0.2".parse().unwrap();
        // Pre-resolve so the payload frames are not competing with ARP.
        network.ping(a, target, 1);
        network.step();
        // Each frame is 14 + 20 + 8 + 18 = 60 bytes; two cannot fit in 100.
        let payload = Message::new("email body padding");
        for _ in 0..2 {
            network.send_transport(
                a,
                IpProtocol::Udp,
                target,
                25,
                1025,
                payload.clone(),
                TrafficOrigin::Green,
            );
        }
        network.step();
        assert!(network.node(a).saw_event(|kind| matches!(
            kind,
            NodeEventKind::FrameDropped(DropReason::BandwidthExceeded)
        )));
        let link = network.links().next().unwrap();
        assert_eq!(link.current_load(), 60);
    }

    #[test]
    fn frames_to_a_powered_off_node_are_dropped() {
        let mut network = Network::new();
        let a = host(&mut network, "client_1", "10.0.0.1/24");
        let b = host(&mut network, "client_2", "10.0.0.2/24");
        wire(&mut network, a, 1, b, 1);
        // Resolve ARP first, then kill the receiver.
        let target: Ipv4Address = "10.0.0.2".parse().unwrap();
        network.ping(a, target, 1);
        network.step();
        let tick = network.tick();
        network.node_mut(b).power_off(tick).unwrap();
        network.step();
        network.step();
        network.step();
        assert!(!network.node(b).is_on());
        network.ping(a, target, 2);
        network.step();
        assert!(!network.node(a).saw_event(|kind| matches!(
            kind,
            NodeEventKind::EchoReplyReceived { sequence: 2, .. }
        )));
    }

    #[test]
    fn an_unanswered_arp_abandons_the_frame() {
        let mut network = Network::new();
        let a = host(&mut network, "client_1", "10.0.0.1/24");
        let b = host(&mut network, "client_2", "10.0.0.2/24");
        wire(&mut network, a, 1, b, 1);
        // Nobody owns .99, so the request goes unanswered.
        network.ping(a, "10.0.0.99".parse().unwrap(), 1);
        network.step();
        assert!(network.node(a).saw_event(|kind| matches!(
            kind,
            NodeEventKind::FrameDropped(DropReason::NoRoute)
        )));
    }

    #[test]
    fn wireless_peers_on_one_frequency_reach_each_other() {
        let mut network = Network::new();
        let radio = |network: &mut Network, name: &str, ip: &str| {
            let id = network
                .add_node(NodeConfig::new(name), NodeRole::Host)
                .unwrap();
            network
                .add_interface(
                    id,
                    1,
                    InterfaceConfig::wireless(Some(ip.parse().unwrap()), Frequency::Wifi2_4),
                )
                .unwrap();
            id
        };
        let a = radio(&mut network, "laptop_1", "10.0.0.1/24");
        let b = radio(&mut network, "laptop_2", "10.0.0.2/24");
        let c = radio(&mut network, "laptop_3", "10.0.0.3/24");
        network.ping(a, "10.0.0.2".parse().unwrap(), 1);
        network.step();
        assert!(network.node(a).saw_event(|kind| matches!(
            kind,
            NodeEventKind::EchoReplyReceived { sequence: 1, .. }
        )));
        // The bystander heard the broadcast request but not the unicast echo.
        assert!(network.node(c).saw_event(|kind| matches!(
            kind,
            NodeEventKind::ArpRequestReceived { .. }
        )));
        assert!(!network.node(c).saw_event(|kind| matches!(
            kind,
            NodeEventKind::EchoRequestReceived { .. }
        )));
        assert_eq!(network.node(b).interface(1).unwrap().counters().received, 2);
    }

    #[test]
    fn duplicate_node_names_are_rejected() {
        let mut network = Network::new();
        host(&mut network, "client_1", "10.0.0.1/24");
        let result = network.add_node(NodeConfig::new("client_1"), NodeRole::Host);
        assert!(matches!(result, Err(NetworkError::DuplicateNodeName(_))));
    }

    #[test]
    fn addressed_traffic_teaches_the_receiver_passively() {
        let mut network = Network::new();
        let a = host(&mut network, "client_1", "10.0.0.1/24");
        let b = host(&mut network, "client_2", "10.0.0.2/24");
        wire(&mut network, a, 1, b, 1);
        let src: Ipv4Address = "10.0.0.1".parse().unwrap();
        let target: Ipv4Address = "10.0.0.2".parse().unwrap();
        // Warm the sender's cache by hand so no resolution exchange fires.
        let mac_b = network.node(b).interface(1).unwrap().mac();
        network
            .node_mut(a)
            .arp
            .learn(target, ArpEntry { mac: mac_b, port: 1 });
        network.send_transport(
            a,
            IpProtocol::Udp,
            target,
            25,
            1025,
            Message::new("status report"),
            TrafficOrigin::Green,
        );
        network.step();
        assert!(!network.node(b).saw_event(|kind| matches!(
            kind,
            NodeEventKind::ArpRequestReceived { .. }
        )));
        // The receiver learned the sender from the frame itself, so its
        // reply path is already resolved.
        let mac_a = network.node(a).interface(1).unwrap().mac();
        assert_eq!(
            network.node(b).arp.lookup(src).map(|entry| entry.mac),
            Some(mac_a)
        );
    }

    #[test]
    fn floods_skip_disabled_switch_ports() {
        let mut network = Network::new();
        let a = host(&mut network, "client_1", "10.0.0.1/24");
        let b = host(&mut network, "client_2", "10.0.0.2/24");
        let switch = network
            .add_node(NodeConfig::new("switch_1"), NodeRole::Switch(Switch::new()))
            .unwrap();
        for port in 1..=3 {
            network
                .add_interface(switch, port, InterfaceConfig::wired(None))
                .unwrap();
        }
        wire(&mut network, a, 1, switch, 1);
        wire(&mut network, b, 1, switch, 2);
        network
            .node_mut(switch)
            .interface_mut(3)
            .unwrap()
            .disable("switch_1", 3);
        network.ping(a, "10.0.0.2".parse().unwrap(), 1);
        network.step();
        // The broadcast still reaches its target.
        assert!(network.node(a).saw_event(|kind| matches!(
            kind,
            NodeEventKind::EchoReplyReceived { sequence: 1, .. }
        )));
        // The disabled port never entered the flood list, so the switch
        // recorded no egress drop for it.
        assert!(!network.node(switch).saw_event(|kind| matches!(
            kind,
            NodeEventKind::FrameDropped(DropReason::InterfaceDisabled)
        )));
        assert_eq!(
            network.node(switch).interface(3).unwrap().counters().dropped,
            0
        );
    }

    #[test]
    fn firewall_deny_outranks_ttl_expiry() {
        use crate::acl::{AclRule, AddressFilter};
        use crate::firewall::{Firewall, Zone, ZoneAcl};
        use crate::router::RouteEntry;

        let mut network = Network::new();
        let client = host(&mut network, "client_1", "10.0.1.2/24");
        let mut firewall = Firewall::new();
        firewall.router.table.add("10.0.1.0/24".parse().unwrap(), RouteEntry::connected());
        firewall.router.table.add("10.0.2.0/24".parse().unwrap(), RouteEntry::connected());
        firewall.set_zone(1, Zone::Internal);
        firewall.set_zone(2, Zone::Internal);
        firewall.acl_mut(ZoneAcl::InternalInbound).add_rule(
            0,
            AclRule::new(AclAction::Deny)
                .protocol(IpProtocol::Udp)
                .src(AddressFilter::host("10.0.1.2".parse().unwrap())),
        );
        let fw = network
            .add_node(NodeConfig::new("firewall_1"), NodeRole::Firewall(firewall))
            .unwrap();
        network
            .add_interface(fw, 1, InterfaceConfig::wired(Some("10.0.1.1/24".parse().unwrap())))
            .unwrap();
        network
            .add_interface(fw, 2, InterfaceConfig::wired(Some("10.0.2.1/24".parse().unwrap())))
            .unwrap();
        // A frame arriving with TTL 2 has exactly 1 left after intake; the
        // zone verdict must still land before the forwarding decrement.
        let frame = Frame::transport(
            LinkHeader {
                src: network.node(client).interface(1).unwrap().mac(),
                dst: network.node(fw).interface(1).unwrap().mac(),
            },
            Ipv4Header {
                src: "10.0.1.2".parse().unwrap(),
                dst: "10.0.2.9".parse().unwrap(),
                protocol: IpProtocol::Udp,
                ttl: 2,
                precedence: Precedence::Routine,
            },
            AppHeader::default(),
            TransportHeader {
                src_port: 1025,
                dst_port: 25,
                flags: TcpFlags::default(),
            },
            Message::new("doomed either way"),
        )
        .unwrap();
        network.receive(fw, 1, frame);
        assert!(network.node(fw).saw_event(|kind| matches!(
            kind,
            NodeEventKind::FrameDropped(DropReason::AclDenied)
        )));
        assert!(!network.node(fw).saw_event(|kind| matches!(
            kind,
            NodeEventKind::FrameDropped(DropReason::TtlExpired)
        )));
        let denied = match &network.node(fw).role {
            NodeRole::Firewall(firewall) => firewall.acl(ZoneAcl::InternalInbound).rules()[0].match_count,
            _ => unreachable!(),
        };
        assert_eq!(denied, 1);
    }
}
