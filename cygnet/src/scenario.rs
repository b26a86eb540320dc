//! Scenario records and the builder that turns them into a live network.
//!
//! Upstream loaders hand the builder plain typed records with stable integer
//! identifiers; everything is validated while the network is constructed,
//! and any problem fails the whole build with no partial network left
//! behind. Information-exchange records become scheduled traffic driven by
//! the [`Scenario`] as it steps.

use crate::applications;
use cygnet_core::acl::{Acl, AclAction, AclRule, AddressFilter};
use cygnet_core::firewall::{Firewall, Zone, ZoneAcl};
use cygnet_core::hardware::{Attachment, Frequency, InterfaceConfig, LinkConfig};
use cygnet_core::network::NetworkError;
use cygnet_core::router::{RouteEntry, Router};
use cygnet_core::software::SoftwareError;
use cygnet_core::switch::Switch;
use cygnet_core::{
    Cidr, IpConfig, IpProtocol, Ipv4Address, Message, Network, NodeConfig, NodeId, NodeRole,
    PortNumber, SoftwareConfig, SoftwareRegistry, Tick, TrafficOrigin,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// One interface on a node record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub port: PortNumber,
    pub ip: Option<IpConfig>,
    pub frequency: Option<Frequency>,
}

impl PortRecord {
    pub fn wired(port: PortNumber, ip: Option<IpConfig>) -> Self {
        Self {
            port,
            ip,
            frequency: None,
        }
    }

    pub fn wireless(port: PortNumber, ip: Option<IpConfig>, frequency: Frequency) -> Self {
        Self {
            port,
            ip,
            frequency: Some(frequency),
        }
    }
}

/// One route on a router or firewall record. An unspecified next hop marks a
/// directly connected network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub destination: Cidr,
    pub next_hop: Ipv4Address,
    pub metric: u32,
}

impl RouteRecord {
    fn entry(&self) -> RouteEntry {
        if self.next_hop == Ipv4Address::UNSPECIFIED {
            RouteEntry::connected()
        } else {
            RouteEntry::via(self.next_hop, self.metric)
        }
    }
}

/// One access-control rule on a record, positional like the live list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRuleRecord {
    pub position: usize,
    pub action: AclAction,
    pub protocol: Option<IpProtocol>,
    pub src: Option<Ipv4Address>,
    pub src_port: Option<u16>,
    pub dst: Option<Ipv4Address>,
    pub dst_port: Option<u16>,
}

impl AclRuleRecord {
    pub fn new(position: usize, action: AclAction) -> Self {
        Self {
            position,
            action,
            protocol: None,
            src: None,
            src_port: None,
            dst: None,
            dst_port: None,
        }
    }

    fn rule(&self) -> AclRule {
        let mut rule = AclRule::new(self.action);
        if let Some(protocol) = self.protocol {
            rule = rule.protocol(protocol);
        }
        if let Some(src) = self.src {
            rule = rule.src(AddressFilter::host(src));
        }
        if let Some(port) = self.src_port {
            rule = rule.src_port(port);
        }
        if let Some(dst) = self.dst {
            rule = rule.dst(AddressFilter::host(dst));
        }
        if let Some(port) = self.dst_port {
            rule = rule.dst_port(port);
        }
        rule
    }
}

/// The specialization of a node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoleRecord {
    Host,
    Switch,
    Router {
        default_action: AclAction,
        routes: Vec<RouteRecord>,
        acl: Vec<AclRuleRecord>,
    },
    Firewall {
        routes: Vec<RouteRecord>,
        zones: Vec<(PortNumber, Zone)>,
        rules: Vec<(ZoneAcl, AclRuleRecord)>,
    },
}

/// One machine in the scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u32,
    pub name: String,
    pub role: RoleRecord,
    pub ports: Vec<PortRecord>,
    pub software: Vec<SoftwareConfig>,
    pub boot_ticks: u32,
    pub shutdown_ticks: u32,
    pub gateway: Option<Ipv4Address>,
}

impl NodeRecord {
    pub fn new(id: u32, name: impl Into<String>, role: RoleRecord) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            ports: Vec::new(),
            software: Vec::new(),
            boot_ticks: 3,
            shutdown_ticks: 3,
            gateway: None,
        }
    }

    pub fn with_port(mut self, port: PortRecord) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_software(mut self, config: SoftwareConfig) -> Self {
        self.software.push(config);
        self
    }

    pub fn with_gateway(mut self, gateway: Ipv4Address) -> Self {
        self.gateway = Some(gateway);
        self
    }
}

/// One link in the scenario, joining two node records by id and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: u32,
    pub a: (u32, PortNumber),
    pub b: (u32, PortNumber),
    pub bandwidth: u32,
}

/// When and how often an information exchange fires. Jitter adds a random
/// 0..=jitter tick delay to each period, drawn from the scenario's seeded
/// generator so runs stay reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternOfLifeRecord {
    pub start: Tick,
    /// Ticks between sends; zero means a single send.
    pub period: u64,
    pub jitter: u64,
}

impl PatternOfLifeRecord {
    pub fn once(start: Tick) -> Self {
        Self {
            start,
            period: 0,
            jitter: 0,
        }
    }

    pub fn every(start: Tick, period: u64) -> Self {
        Self {
            start,
            period,
            jitter: 0,
        }
    }

    pub fn with_jitter(mut self, jitter: u64) -> Self {
        self.jitter = jitter;
        self
    }
}

/// A green or red information-exchange requirement: traffic a node must send
/// on a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoExchangeRecord {
    pub id: u32,
    pub node: u32,
    pub protocol: IpProtocol,
    pub dst: Ipv4Address,
    pub dst_port: u16,
    pub src_port: u16,
    pub payload: String,
    pub origin: TrafficOrigin,
    pub schedule: PatternOfLifeRecord,
}

#[derive(Debug, ThisError)]
pub enum ScenarioError {
    #[error("duplicate node record id {0}")]
    DuplicateNodeId(u32),
    #[error("duplicate link record id {0}")]
    DuplicateLinkId(u32),
    #[error("duplicate exchange record id {0}")]
    DuplicateExchangeId(u32),
    #[error("record references unknown node id {0}")]
    UnknownNodeId(u32),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Software(#[from] SoftwareError),
}

/// Builds a [`Scenario`] from records, validating as it goes.
#[derive(Debug, Default)]
pub struct ScenarioBuilder {
    nodes: Vec<NodeRecord>,
    links: Vec<LinkRecord>,
    exchanges: Vec<InfoExchangeRecord>,
    seed: u64,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn node(mut self, record: NodeRecord) -> Self {
        self.nodes.push(record);
        self
    }

    pub fn link(mut self, record: LinkRecord) -> Self {
        self.links.push(record);
        self
    }

    pub fn exchange(mut self, record: InfoExchangeRecord) -> Self {
        self.exchanges.push(record);
        self
    }

    /// Constructs the network and traffic schedule. Any invalid record fails
    /// the whole build; nothing partial survives the error.
    pub fn build(self, registry: &SoftwareRegistry) -> Result<Scenario, ScenarioError> {
        let mut network = Network::new();
        let mut ids: FxHashMap<u32, NodeId> = FxHashMap::default();

        for record in &self.nodes {
            if ids.contains_key(&record.id) {
                return Err(ScenarioError::DuplicateNodeId(record.id));
            }
            let mut config = NodeConfig::new(record.name.clone())
                .with_boot_ticks(record.boot_ticks)
                .with_shutdown_ticks(record.shutdown_ticks);
            if let Some(gateway) = record.gateway {
                config = config.with_gateway(gateway);
            }
            let role = match &record.role {
                RoleRecord::Host => NodeRole::Host,
                RoleRecord::Switch => NodeRole::Switch(Switch::new()),
                RoleRecord::Router {
                    default_action,
                    routes,
                    acl,
                } => {
                    let mut router = Router::new(Acl::new(*default_action));
                    for route in routes {
                        router.table.add(route.destination, route.entry());
                    }
                    for rule in acl {
                        router.acl.add_rule(rule.position, rule.rule());
                    }
                    NodeRole::Router(router)
                }
                RoleRecord::Firewall {
                    routes,
                    zones,
                    rules,
                } => {
                    let mut firewall = Firewall::new();
                    for route in routes {
                        firewall.router.table.add(route.destination, route.entry());
                    }
                    for (port, zone) in zones {
                        firewall.set_zone(*port, *zone);
                    }
                    for (which, rule) in rules {
                        firewall.acl_mut(*which).add_rule(rule.position, rule.rule());
                    }
                    NodeRole::Firewall(firewall)
                }
            };
            let id = network.add_node(config, role)?;
            ids.insert(record.id, id);
            for port in &record.ports {
                let config = InterfaceConfig {
                    ip: port.ip,
                    frequency: port.frequency,
                };
                network.add_interface(id, port.port, config)?;
            }
            for software in &record.software {
                network.install_software(id, registry, software.clone())?;
            }
        }

        let mut link_ids = Vec::new();
        for record in &self.links {
            if link_ids.contains(&record.id) {
                return Err(ScenarioError::DuplicateLinkId(record.id));
            }
            link_ids.push(record.id);
            let a = *ids
                .get(&record.a.0)
                .ok_or(ScenarioError::UnknownNodeId(record.a.0))?;
            let b = *ids
                .get(&record.b.0)
                .ok_or(ScenarioError::UnknownNodeId(record.b.0))?;
            network.connect(
                Attachment {
                    node: a,
                    port: record.a.1,
                },
                Attachment {
                    node: b,
                    port: record.b.1,
                },
                LinkConfig {
                    bandwidth: record.bandwidth,
                },
            )?;
        }

        let mut entries = Vec::new();
        let mut exchange_ids = Vec::new();
        for record in &self.exchanges {
            if exchange_ids.contains(&record.id) {
                return Err(ScenarioError::DuplicateExchangeId(record.id));
            }
            exchange_ids.push(record.id);
            let node = *ids
                .get(&record.node)
                .ok_or(ScenarioError::UnknownNodeId(record.node))?;
            entries.push(ScheduledExchange {
                node,
                protocol: record.protocol,
                dst: record.dst,
                dst_port: record.dst_port,
                src_port: record.src_port,
                payload: Message::new(record.payload.clone()),
                origin: record.origin,
                period: record.schedule.period,
                jitter: record.schedule.jitter,
                next: Some(record.schedule.start),
            });
        }

        Ok(Scenario {
            network,
            traffic: TrafficSchedule {
                entries,
                rng: SmallRng::seed_from_u64(self.seed),
            },
        })
    }
}

/// One live scheduled traffic flow.
#[derive(Debug)]
struct ScheduledExchange {
    node: NodeId,
    protocol: IpProtocol,
    dst: Ipv4Address,
    dst_port: u16,
    src_port: u16,
    payload: Message,
    origin: TrafficOrigin,
    period: u64,
    jitter: u64,
    /// The next tick this exchange fires, or `None` when it is done.
    next: Option<Tick>,
}

/// Drives information exchanges as ticks pass.
#[derive(Debug)]
pub struct TrafficSchedule {
    entries: Vec<ScheduledExchange>,
    rng: SmallRng,
}

impl TrafficSchedule {
    /// Queues every exchange due at the upcoming tick.
    fn apply(&mut self, network: &mut Network, upcoming: Tick) {
        for entry in &mut self.entries {
            let Some(next) = entry.next else {
                continue;
            };
            if upcoming < next {
                continue;
            }
            network.send_transport(
                entry.node,
                entry.protocol,
                entry.dst,
                entry.dst_port,
                entry.src_port,
                entry.payload.clone(),
                entry.origin,
            );
            entry.next = if entry.period == 0 {
                None
            } else {
                let jitter = if entry.jitter == 0 {
                    0
                } else {
                    self.rng.gen_range(0..=entry.jitter)
                };
                Some(upcoming + entry.period + jitter)
            };
        }
    }
}

/// A built scenario: the network plus its scheduled traffic.
pub struct Scenario {
    pub network: Network,
    traffic: TrafficSchedule,
}

impl Scenario {
    /// Advances one tick, sending any traffic due at it first.
    pub fn step(&mut self) {
        let upcoming = self.network.tick() + 1;
        self.traffic.apply(&mut self.network, upcoming);
        self.network.step();
    }

    /// Steps until the network reaches the given tick.
    pub fn run_until(&mut self, tick: Tick) {
        while self.network.tick() < tick {
            self.step();
        }
    }
}

/// Builds a scenario with the standard application registry.
pub fn build_standard(builder: ScenarioBuilder) -> Result<Scenario, ScenarioError> {
    let registry = applications::standard_registry()?;
    builder.build(&registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applications::MessageSink;

    fn two_hosts() -> ScenarioBuilder {
        ScenarioBuilder::new()
            .node(
                NodeRecord::new(1, "client_1", RoleRecord::Host)
                    .with_port(PortRecord::wired(1, Some("10.0.0.1/24".parse().unwrap()))),
            )
            .node(
                NodeRecord::new(2, "server_1", RoleRecord::Host)
                    .with_port(PortRecord::wired(1, Some("10.0.0.2/24".parse().unwrap())))
                    .with_software(
                        SoftwareConfig::service("sink", "message_sink")
                            .with_endpoint(IpProtocol::Udp, 25),
                    ),
            )
            .link(LinkRecord {
                id: 1,
                a: (1, 1),
                b: (2, 1),
                bandwidth: 1500,
            })
    }

    #[test]
    fn scheduled_traffic_reaches_the_sink() -> anyhow::Result<()> {
        let mut scenario = build_standard(two_hosts().exchange(InfoExchangeRecord {
            id: 1,
            node: 1,
            protocol: IpProtocol::Udp,
            dst: "10.0.0.2".parse().unwrap(),
            dst_port: 25,
            src_port: 1025,
            payload: "status report".to_string(),
            origin: TrafficOrigin::Green,
            schedule: PatternOfLifeRecord::every(2, 3),
        }))?;
        scenario.run_until(8);
        let server = scenario.network.node_id("server_1").unwrap();
        let sink = scenario
            .network
            .node(server)
            .software
            .find("sink")
            .unwrap()
            .behavior()
            .as_any()
            .downcast_ref::<MessageSink>()
            .unwrap();
        // Fired at ticks 2, 5, and 8.
        assert_eq!(sink.received().len(), 3);
        assert_eq!(sink.last().unwrap().to_vec(), b"status report");
        Ok(())
    }

    #[test]
    fn duplicate_node_ids_fail_the_build() {
        let builder = two_hosts().node(NodeRecord::new(1, "imposter", RoleRecord::Host));
        assert!(matches!(
            build_standard(builder),
            Err(ScenarioError::DuplicateNodeId(1))
        ));
    }

    #[test]
    fn links_to_unknown_nodes_fail_the_build() {
        let builder = two_hosts().link(LinkRecord {
            id: 2,
            a: (1, 2),
            b: (9, 1),
            bandwidth: 1500,
        });
        assert!(matches!(
            build_standard(builder),
            Err(ScenarioError::UnknownNodeId(9))
        ));
    }

    #[test]
    fn duplicate_hostnames_fail_the_build() {
        let builder = two_hosts().node(
            NodeRecord::new(3, "client_1", RoleRecord::Host)
                .with_port(PortRecord::wired(1, None)),
        );
        assert!(matches!(
            build_standard(builder),
            Err(ScenarioError::Network(NetworkError::DuplicateNodeName(_)))
        ));
    }

    #[test]
    fn jittered_schedules_are_reproducible() {
        let record = InfoExchangeRecord {
            id: 1,
            node: 1,
            protocol: IpProtocol::Udp,
            dst: "10.0.0.2".parse().unwrap(),
            dst_port: 25,
            src_port: 1025,
            payload: "x".to_string(),
            origin: TrafficOrigin::Green,
            schedule: PatternOfLifeRecord::every(1, 2).with_jitter(3),
        };
        let mut first = build_standard(two_hosts().with_seed(7).exchange(record.clone())).unwrap();
        let mut second = build_standard(two_hosts().with_seed(7).exchange(record)).unwrap();
        first.run_until(20);
        second.run_until(20);
        let count = |scenario: &Scenario| {
            let server = scenario.network.node_id("server_1").unwrap();
            scenario
                .network
                .node(server)
                .software
                .find("sink")
                .unwrap()
                .behavior()
                .as_any()
                .downcast_ref::<MessageSink>()
                .unwrap()
                .received()
                .len()
        };
        assert_eq!(count(&first), count(&second));
    }
}
