//! The read-only state snapshot.
//!
//! [`Network::snapshot`] flattens the whole simulation into plain
//! serializable structures. Observation builders upstream work from this
//! rather than holding references into the arena, so they can never mutate
//! the simulation or observe it mid-step.

use crate::acl::{Acl, AclAction, AclRule};
use crate::address::{Cidr, Ipv4Address};
use crate::firewall::{Zone, ZoneAcl};
use crate::frame::IpProtocol;
use crate::hardware::interface::InterfaceCounters;
use crate::id::{PortNumber, Tick};
use crate::network::Network;
use crate::node::{Node, NodeRole, PowerState};
use crate::router::RouteEntry;
use crate::software::SoftwareState;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub tick: Tick,
    pub nodes: Vec<NodeSnapshot>,
    pub links: Vec<LinkSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub power: PowerState,
    pub interfaces: Vec<InterfaceSnapshot>,
    pub arp: Vec<ArpSnapshot>,
    pub software: Vec<SoftwareSnapshot>,
    pub sessions: usize,
    pub role: RoleSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceSnapshot {
    pub port: PortNumber,
    pub mac: String,
    pub address: Option<Ipv4Address>,
    pub enabled: bool,
    pub counters: InterfaceCounters,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArpSnapshot {
    pub address: Ipv4Address,
    pub mac: String,
    pub port: PortNumber,
}

#[derive(Debug, Clone, Serialize)]
pub struct SoftwareSnapshot {
    pub name: String,
    pub software_type: String,
    pub state: SoftwareState,
    pub protocol: IpProtocol,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub enum RoleSnapshot {
    Host,
    Switch { mac_table: Vec<MacTableSnapshot> },
    Router { routes: Vec<RouteSnapshot>, acl: AclSnapshot },
    Firewall {
        routes: Vec<RouteSnapshot>,
        zones: Vec<(PortNumber, Zone)>,
        acls: Vec<(ZoneAcl, AclSnapshot)>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MacTableSnapshot {
    pub mac: String,
    pub port: PortNumber,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub destination: Cidr,
    pub entry: RouteEntry,
}

/// An access list with its per-rule and implicit-default match counters.
#[derive(Debug, Clone, Serialize)]
pub struct AclSnapshot {
    pub default_action: AclAction,
    pub default_match_count: u64,
    pub rules: Vec<AclRule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkSnapshot {
    pub bandwidth: u32,
    pub current_load: u32,
    pub dropped: u64,
}

fn snapshot_acl(acl: &Acl) -> AclSnapshot {
    AclSnapshot {
        default_action: acl.default_action(),
        default_match_count: acl.default_match_count(),
        rules: acl.rules().to_vec(),
    }
}

fn snapshot_node(node: &Node) -> NodeSnapshot {
    let interfaces = node
        .interfaces()
        .map(|(port, interface)| InterfaceSnapshot {
            port,
            mac: interface.mac().to_string(),
            address: interface.address(),
            enabled: interface.is_enabled(),
            counters: interface.counters(),
        })
        .collect();
    let mut arp: Vec<ArpSnapshot> = node
        .arp
        .iter()
        .map(|(address, entry)| ArpSnapshot {
            address,
            mac: entry.mac.to_string(),
            port: entry.port,
        })
        .collect();
    arp.sort_by_key(|entry| entry.address);
    let software = node
        .software
        .iter()
        .map(|software| SoftwareSnapshot {
            name: software.config().name.clone(),
            software_type: software.config().software_type.clone(),
            state: software.state(),
            protocol: software.config().protocol,
            port: software.config().port,
        })
        .collect();
    let role = match &node.role {
        NodeRole::Host => RoleSnapshot::Host,
        NodeRole::Switch(switch) => {
            let mut mac_table: Vec<MacTableSnapshot> = switch
                .mac_table()
                .map(|(mac, port)| MacTableSnapshot {
                    mac: mac.to_string(),
                    port,
                })
                .collect();
            mac_table.sort_by(|a, b| a.mac.cmp(&b.mac));
            RoleSnapshot::Switch { mac_table }
        }
        NodeRole::Router(router) => RoleSnapshot::Router {
            routes: router
                .table
                .iter()
                .map(|(destination, entry)| RouteSnapshot { destination, entry })
                .collect(),
            acl: snapshot_acl(&router.acl),
        },
        NodeRole::Firewall(firewall) => {
            let zones = node
                .interfaces()
                .map(|(port, _)| (port, firewall.zone_of(port)))
                .collect();
            let acls = [
                ZoneAcl::InternalInbound,
                ZoneAcl::InternalOutbound,
                ZoneAcl::DmzInbound,
                ZoneAcl::DmzOutbound,
                ZoneAcl::ExternalInbound,
                ZoneAcl::ExternalOutbound,
            ]
            .into_iter()
            .map(|which| (which, snapshot_acl(firewall.acl(which))))
            .collect();
            RoleSnapshot::Firewall {
                routes: firewall
                    .router
                    .table
                    .iter()
                    .map(|(destination, entry)| RouteSnapshot { destination, entry })
                    .collect(),
                zones,
                acls,
            }
        }
    };
    NodeSnapshot {
        name: node.name().to_string(),
        power: node.power(),
        interfaces,
        arp,
        software,
        sessions: node.sessions.len(),
        role,
    }
}

impl Network {
    /// Captures the observable state of the whole network.
    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            tick: self.tick(),
            nodes: self.nodes().map(snapshot_node).collect(),
            links: self
                .links()
                .map(|link| LinkSnapshot {
                    bandwidth: link.bandwidth(),
                    current_load: link.current_load(),
                    dropped: link.dropped(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{Attachment, InterfaceConfig, LinkConfig};
    use crate::node::NodeConfig;
    use crate::router::Router;

    #[test]
    fn snapshot_reflects_topology_and_state() {
        let mut network = Network::new();
        let a = network
            .add_node(NodeConfig::new("client_1"), NodeRole::Host)
            .unwrap();
        network
            .add_interface(
                a,
                1,
                InterfaceConfig::wired(Some("10.0.0.1/24".parse().unwrap())),
            )
            .unwrap();
        let b = network
            .add_node(NodeConfig::new("client_2"), NodeRole::Host)
            .unwrap();
        network
            .add_interface(
                b,
                1,
                InterfaceConfig::wired(Some("10.0.0.2/24".parse().unwrap())),
            )
            .unwrap();
        network
            .connect(
                Attachment { node: a, port: 1 },
                Attachment { node: b, port: 1 },
                LinkConfig::default(),
            )
            .unwrap();
        network.ping(a, "10.0.0.2".parse().unwrap(), 1);
        network.step();

        let snapshot = network.snapshot();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.links.len(), 1);
        let client = &snapshot.nodes[0];
        assert_eq!(client.name, "client_1");
        assert_eq!(client.power, PowerState::On);
        assert!(client.interfaces[0].enabled);
        // The ping resolved ARP, so the peer shows up in the cache.
        assert_eq!(client.arp.len(), 1);
        assert!(client.interfaces[0].counters.sent > 0);
    }

    #[test]
    fn router_snapshot_carries_acl_counters() {
        let mut network = Network::new();
        let id = network
            .add_node(NodeConfig::new("router_1"), NodeRole::Router(Router::default()))
            .unwrap();
        network
            .add_interface(
                id,
                1,
                InterfaceConfig::wired(Some("10.0.0.254/24".parse().unwrap())),
            )
            .unwrap();
        let snapshot = network.snapshot();
        match &snapshot.nodes[0].role {
            RoleSnapshot::Router { acl, routes } => {
                assert_eq!(acl.default_action, AclAction::Permit);
                assert_eq!(acl.default_match_count, 0);
                assert!(routes.is_empty());
            }
            other => panic!("expected a router role, got {:?}", other),
        }
    }
}
