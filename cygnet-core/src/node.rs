//! Nodes: the networked machines of the simulation.
//!
//! A node owns its interfaces, an ARP cache, a [`SessionManager`], a
//! [`SoftwareManager`], and a power-state machine. Specialized behavior
//! (switching, routing, zone filtering) hangs off the node as a
//! [`NodeRole`]. Frame intake and forwarding live in the engine, which owns
//! the graph the node is part of; everything node-local lives here.

use crate::address::Ipv4Address;
use crate::firewall::Firewall;
use crate::frame::{DropReason, IcmpKind, Mac};
use crate::hardware::interface::{InterfaceConfig, NetworkInterface};
use crate::id::{NodeId, PortNumber, Tick};
use crate::logging;
use crate::router::Router;
use crate::session::SessionManager;
use crate::software::SoftwareManager;
use crate::switch::Switch;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// The power state machine:
/// `Off → Booting → On → ShuttingDown → Off`, with the two intermediate
/// states lasting a configurable number of ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    Off,
    Booting,
    On,
    ShuttingDown,
}

impl Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Off => "off",
            Self::Booting => "booting",
            Self::On => "on",
            Self::ShuttingDown => "shutting down",
        };
        write!(f, "{}", text)
    }
}

/// Configuration for one node, validated at network build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The hostname, unique within a network.
    pub name: String,
    /// Ticks spent booting before reaching `On`.
    pub boot_ticks: u32,
    /// Ticks spent shutting down before reaching `Off`.
    pub shutdown_ticks: u32,
    /// Where off-subnet traffic is sent. Hosts without a gateway drop such
    /// traffic.
    pub default_gateway: Option<Ipv4Address>,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            boot_ticks: 3,
            shutdown_ticks: 3,
            default_gateway: None,
        }
    }

    pub fn with_boot_ticks(mut self, ticks: u32) -> Self {
        self.boot_ticks = ticks;
        self
    }

    pub fn with_shutdown_ticks(mut self, ticks: u32) -> Self {
        self.shutdown_ticks = ticks;
        self
    }

    pub fn with_gateway(mut self, gateway: Ipv4Address) -> Self {
        self.default_gateway = Some(gateway);
        self
    }
}

/// A node's specialization.
#[derive(Debug, Default)]
pub enum NodeRole {
    #[default]
    Host,
    Switch(Switch),
    Router(Router),
    Firewall(Firewall),
}

impl NodeRole {
    /// The routing state, for routers and firewalls alike.
    pub fn router(&self) -> Option<&Router> {
        match self {
            Self::Router(router) => Some(router),
            Self::Firewall(firewall) => Some(&firewall.router),
            _ => None,
        }
    }

    pub fn router_mut(&mut self) -> Option<&mut Router> {
        match self {
            Self::Router(router) => Some(router),
            Self::Firewall(firewall) => Some(&mut firewall.router),
            _ => None,
        }
    }

    pub fn switch(&self) -> Option<&Switch> {
        match self {
            Self::Switch(switch) => Some(switch),
            _ => None,
        }
    }

    pub fn firewall_mut(&mut self) -> Option<&mut Firewall> {
        match self {
            Self::Firewall(firewall) => Some(firewall),
            _ => None,
        }
    }
}

/// One learned address mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub mac: Mac,
    /// The interface the mapping was learned through.
    pub port: PortNumber,
}

/// The node's logical-to-hardware address cache.
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: FxHashMap<Ipv4Address, ArpEntry>,
}

impl ArpCache {
    pub fn lookup(&self, address: Ipv4Address) -> Option<ArpEntry> {
        self.entries.get(&address).copied()
    }

    /// Adds a mapping unless one already exists; passive learning from
    /// observed traffic never displaces an entry.
    pub fn learn_if_absent(&mut self, address: Ipv4Address, entry: ArpEntry) {
        self.entries.entry(address).or_insert(entry);
    }

    /// Adds or replaces a mapping; used for authoritative replies.
    pub fn learn(&mut self, address: Ipv4Address, entry: ArpEntry) {
        self.entries.insert(address, entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Ipv4Address, ArpEntry)> + '_ {
        self.entries.iter().map(|(address, entry)| (*address, *entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Something observable that happened at a node. Events feed the snapshot
/// interface and let tests assert on traffic traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub tick: Tick,
    pub kind: NodeEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEventKind {
    PowerChanged(PowerState),
    ArpRequestSent { target: Ipv4Address },
    ArpRequestReceived { from: Ipv4Address },
    ArpReplySent { to: Ipv4Address },
    ArpReplyReceived { from: Ipv4Address },
    EchoRequestSent { to: Ipv4Address, sequence: u16 },
    EchoRequestReceived { from: Ipv4Address, sequence: u16 },
    EchoReplySent { to: Ipv4Address, sequence: u16 },
    EchoReplyReceived { from: Ipv4Address, sequence: u16 },
    MessageDelivered { port: u16, bytes: usize },
    FrameDropped(DropReason),
}

impl NodeEventKind {
    pub(crate) fn echo(kind: IcmpKind, sent: bool, peer: Ipv4Address, sequence: u16) -> Self {
        match (kind, sent) {
            (IcmpKind::EchoRequest, true) => Self::EchoRequestSent { to: peer, sequence },
            (IcmpKind::EchoRequest, false) => Self::EchoRequestReceived { from: peer, sequence },
            (IcmpKind::EchoReply, true) => Self::EchoReplySent { to: peer, sequence },
            (IcmpKind::EchoReply, false) => Self::EchoReplyReceived { from: peer, sequence },
        }
    }
}

/// A networked machine in the simulation.
pub struct Node {
    id: NodeId,
    config: NodeConfig,
    power: PowerState,
    /// Ticks left in `Booting` or `ShuttingDown`.
    power_countdown: u32,
    pub(crate) interfaces: BTreeMap<PortNumber, NetworkInterface>,
    pub arp: ArpCache,
    pub sessions: SessionManager,
    pub software: SoftwareManager,
    pub role: NodeRole,
    events: Vec<NodeEvent>,
}

impl Node {
    /// Creates a node, powered on with no interfaces yet.
    pub(crate) fn new(id: NodeId, config: NodeConfig, role: NodeRole) -> Self {
        Self {
            id,
            config,
            power: PowerState::On,
            power_countdown: 0,
            interfaces: BTreeMap::new(),
            arp: ArpCache::default(),
            sessions: SessionManager::new(),
            software: SoftwareManager::new(),
            role,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn power(&self) -> PowerState {
        self.power
    }

    pub fn is_on(&self) -> bool {
        self.power == PowerState::On
    }

    pub fn interface(&self, port: PortNumber) -> Option<&NetworkInterface> {
        self.interfaces.get(&port)
    }

    pub fn interface_mut(&mut self, port: PortNumber) -> Option<&mut NetworkInterface> {
        self.interfaces.get_mut(&port)
    }

    /// Interfaces in port order.
    pub fn interfaces(&self) -> impl Iterator<Item = (PortNumber, &NetworkInterface)> {
        self.interfaces.iter().map(|(port, iface)| (*port, iface))
    }

    /// The node's interface holding the given logical address.
    pub fn interface_with_address(&self, address: Ipv4Address) -> Option<PortNumber> {
        self.interfaces
            .iter()
            .find(|(_, iface)| iface.address() == Some(address))
            .map(|(port, _)| *port)
    }

    /// Whether any interface owns the address.
    pub fn owns_address(&self, address: Ipv4Address) -> bool {
        self.interface_with_address(address).is_some()
    }

    pub(crate) fn add_interface(
        &mut self,
        port: PortNumber,
        mac: Mac,
        config: &InterfaceConfig,
    ) -> Result<(), NodeError> {
        if self.interfaces.contains_key(&port) {
            return Err(NodeError::DuplicatePort {
                node: self.config.name.clone(),
                port,
            });
        }
        let mut interface = NetworkInterface::new(mac, config);
        if self.is_on() {
            interface.enable(&self.config.name, port);
        }
        self.interfaces.insert(port, interface);
        Ok(())
    }

    /// Requests a power-on. Valid only from `Off`; a zero boot duration
    /// completes immediately.
    pub fn power_on(&mut self, tick: Tick) -> Result<(), NodeError> {
        if self.power != PowerState::Off {
            return Err(NodeError::InvalidPowerRequest {
                node: self.config.name.clone(),
                state: self.power,
            });
        }
        self.set_power(tick, PowerState::Booting);
        self.power_countdown = self.config.boot_ticks;
        if self.power_countdown == 0 {
            self.finish_boot(tick);
        }
        Ok(())
    }

    /// Requests a power-off. Valid only from `On`.
    pub fn power_off(&mut self, tick: Tick) -> Result<(), NodeError> {
        if self.power != PowerState::On {
            return Err(NodeError::InvalidPowerRequest {
                node: self.config.name.clone(),
                state: self.power,
            });
        }
        self.set_power(tick, PowerState::ShuttingDown);
        self.power_countdown = self.config.shutdown_ticks;
        if self.power_countdown == 0 {
            self.finish_shutdown(tick);
        }
        Ok(())
    }

    /// Advances the power machine one tick. Software timestep work is driven
    /// separately by the engine because software actions feed back into the
    /// network.
    pub(crate) fn advance_power(&mut self, tick: Tick) {
        match self.power {
            PowerState::Booting => {
                self.power_countdown -= 1;
                if self.power_countdown == 0 {
                    self.finish_boot(tick);
                }
            }
            PowerState::ShuttingDown => {
                self.power_countdown -= 1;
                if self.power_countdown == 0 {
                    self.finish_shutdown(tick);
                }
            }
            _ => {}
        }
    }

    fn finish_boot(&mut self, tick: Tick) {
        self.set_power(tick, PowerState::On);
        let name = self.config.name.clone();
        for (port, interface) in self.interfaces.iter_mut() {
            interface.enable(&name, *port);
        }
        self.software.resume_all(&name);
    }

    fn finish_shutdown(&mut self, tick: Tick) {
        self.set_power(tick, PowerState::Off);
        let name = self.config.name.clone();
        for (port, interface) in self.interfaces.iter_mut() {
            interface.disable(&name, *port);
        }
        self.software.stop_all(&name);
        self.arp.clear();
        self.sessions.clear();
    }

    fn set_power(&mut self, tick: Tick, state: PowerState) {
        self.power = state;
        logging::power_event(tick, &self.config.name, &state.to_string());
        self.record(tick, NodeEventKind::PowerChanged(state));
    }

    pub(crate) fn record(&mut self, tick: Tick, kind: NodeEventKind) {
        self.events.push(NodeEvent { tick, kind });
    }

    pub(crate) fn record_drop(&mut self, tick: Tick, reason: DropReason) {
        logging::drop_event(tick, &self.config.name, reason);
        self.record(tick, NodeEventKind::FrameDropped(reason));
    }

    pub fn events(&self) -> &[NodeEvent] {
        &self.events
    }

    /// Whether any recorded event matches the predicate.
    pub fn saw_event(&self, predicate: impl Fn(&NodeEventKind) -> bool) -> bool {
        self.events.iter().any(|event| predicate(&event.kind))
    }
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("node {node:?} already has an interface on port {port}")]
    DuplicatePort { node: String, port: PortNumber },
    #[error("node {node:?} cannot change power while {state}")]
    InvalidPowerRequest { node: String, state: PowerState },
}
