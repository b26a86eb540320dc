//! The ordered-token request interface.
//!
//! External collaborators, agent harnesses above all, drive the simulation
//! through token lists rather than calling engine methods directly:
//! `["node", "client_1", "power", "off"]`. Parsing produces a typed
//! [`Request`]; applying one always yields a [`RequestResponse`], so a
//! malformed or impossible action becomes a structured failure instead of a
//! panic or a halted step loop.

use crate::acl::{AclAction, AclRule, AddressFilter};
use crate::address::{Cidr, Ipv4Address};
use crate::frame::{IpProtocol, TrafficOrigin};
use crate::id::PortNumber;
use crate::message::Message;
use crate::network::Network;
use crate::node::NodeRole;
use crate::router::RouteEntry;
use crate::software::{SoftwareCategory, SoftwareConfig, SoftwareRegistry};
use thiserror::Error as ThisError;

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    PowerOn { node: String },
    PowerOff { node: String },
    InterfaceEnable { node: String, port: PortNumber },
    InterfaceDisable { node: String, port: PortNumber },
    Install { node: String, config: SoftwareConfig },
    Uninstall { node: String, software: String },
    Fix { node: String, software: String },
    Compromise { node: String, software: String },
    Overwhelm { node: String, software: String },
    Ping { node: String, dst: Ipv4Address, sequence: u16 },
    Send {
        node: String,
        protocol: IpProtocol,
        dst: Ipv4Address,
        dst_port: u16,
        src_port: u16,
        payload: String,
    },
    RouteAdd {
        node: String,
        destination: Cidr,
        next_hop: Ipv4Address,
        metric: u32,
    },
    RouteRemove { node: String, destination: Cidr },
    AclAdd {
        node: String,
        position: usize,
        rule: AclRule,
    },
    AclRemove { node: String, position: usize },
}

/// Whether a request took effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Failure(String),
}

/// The outcome handed back to the caller. `data` carries request-specific
/// detail, such as what a removal removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestResponse {
    pub status: RequestStatus,
    pub data: Option<String>,
}

impl RequestResponse {
    pub fn success() -> Self {
        Self {
            status: RequestStatus::Success,
            data: None,
        }
    }

    pub fn success_with(data: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::Success,
            data: Some(data.into()),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::Failure(reason.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RequestStatus::Success
    }
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("request is missing tokens after {0:?}")]
    Truncated(String),
    #[error("unknown request verb {0:?}")]
    UnknownVerb(String),
    #[error("malformed token {token:?}: expected {expected}")]
    Malformed { token: String, expected: &'static str },
}

/// A cursor over the token list.
struct Tokens<'a> {
    tokens: &'a [&'a str],
    index: usize,
}

impl<'a> Tokens<'a> {
    fn new(tokens: &'a [&'a str]) -> Self {
        Self { tokens, index: 0 }
    }

    fn next(&mut self) -> Result<&'a str, RequestError> {
        let token = self.tokens.get(self.index).copied().ok_or_else(|| {
            let last = self.tokens.last().copied().unwrap_or("");
            RequestError::Truncated(last.to_string())
        })?;
        self.index += 1;
        Ok(token)
    }

    fn parse<T: std::str::FromStr>(&mut self, expected: &'static str) -> Result<T, RequestError> {
        let token = self.next()?;
        token.parse().map_err(|_| RequestError::Malformed {
            token: token.to_string(),
            expected,
        })
    }

    fn done(&self) -> Result<(), RequestError> {
        match self.tokens.get(self.index) {
            Some(extra) => Err(RequestError::UnknownVerb((*extra).to_string())),
            None => Ok(()),
        }
    }
}

fn parse_protocol(token: &str) -> Result<IpProtocol, RequestError> {
    match token {
        "tcp" => Ok(IpProtocol::Tcp),
        "udp" => Ok(IpProtocol::Udp),
        "icmp" => Ok(IpProtocol::Icmp),
        _ => Err(RequestError::Malformed {
            token: token.to_string(),
            expected: "tcp, udp, or icmp",
        }),
    }
}

fn parse_rule(tokens: &mut Tokens) -> Result<AclRule, RequestError> {
    let action = match tokens.next()? {
        "permit" => AclAction::Permit,
        "deny" => AclAction::Deny,
        other => {
            return Err(RequestError::Malformed {
                token: other.to_string(),
                expected: "permit or deny",
            })
        }
    };
    let mut rule = AclRule::new(action);
    let protocol = tokens.next()?;
    if protocol != "any" {
        rule = rule.protocol(parse_protocol(protocol)?);
    }
    let src = tokens.next()?;
    if src != "any" {
        rule = rule.src(AddressFilter::host(src.parse().map_err(|_| {
            RequestError::Malformed {
                token: src.to_string(),
                expected: "an address or any",
            }
        })?));
    }
    let src_port = tokens.next()?;
    if src_port != "any" {
        rule = rule.src_port(src_port.parse().map_err(|_| RequestError::Malformed {
            token: src_port.to_string(),
            expected: "a port or any",
        })?);
    }
    let dst = tokens.next()?;
    if dst != "any" {
        rule = rule.dst(AddressFilter::host(dst.parse().map_err(|_| {
            RequestError::Malformed {
                token: dst.to_string(),
                expected: "an address or any",
            }
        })?));
    }
    let dst_port = tokens.next()?;
    if dst_port != "any" {
        rule = rule.dst_port(dst_port.parse().map_err(|_| RequestError::Malformed {
            token: dst_port.to_string(),
            expected: "a port or any",
        })?);
    }
    Ok(rule)
}

impl Request {
    /// Parses an ordered token list into a typed request.
    pub fn parse(tokens: &[&str]) -> Result<Self, RequestError> {
        let mut tokens = Tokens::new(tokens);
        match tokens.next()? {
            "node" => {}
            other => return Err(RequestError::UnknownVerb(other.to_string())),
        }
        let node = tokens.next()?.to_string();
        let request = match tokens.next()? {
            "power" => match tokens.next()? {
                "on" => Self::PowerOn { node },
                "off" => Self::PowerOff { node },
                other => return Err(RequestError::UnknownVerb(other.to_string())),
            },
            "interface" => {
                let port = tokens.parse("a port number")?;
                match tokens.next()? {
                    "enable" => Self::InterfaceEnable { node, port },
                    "disable" => Self::InterfaceDisable { node, port },
                    other => return Err(RequestError::UnknownVerb(other.to_string())),
                }
            }
            "install" => {
                let name = tokens.next()?.to_string();
                let software_type = tokens.next()?.to_string();
                let category = match tokens.next()? {
                    "service" => SoftwareCategory::Service,
                    "application" => SoftwareCategory::Application,
                    other => {
                        return Err(RequestError::Malformed {
                            token: other.to_string(),
                            expected: "service or application",
                        })
                    }
                };
                let protocol = parse_protocol(tokens.next()?)?;
                let port = tokens.parse("a port number")?;
                let mut config = SoftwareConfig::service(name, software_type)
                    .with_endpoint(protocol, port);
                config.category = category;
                Self::Install { node, config }
            }
            "software" => {
                let software = tokens.next()?.to_string();
                match tokens.next()? {
                    "uninstall" => Self::Uninstall { node, software },
                    "fix" => Self::Fix { node, software },
                    "compromise" => Self::Compromise { node, software },
                    "overwhelm" => Self::Overwhelm { node, software },
                    other => return Err(RequestError::UnknownVerb(other.to_string())),
                }
            }
            "ping" => {
                let dst = tokens.parse("an address")?;
                let sequence = tokens.parse("a sequence number")?;
                Self::Ping { node, dst, sequence }
            }
            "send" => {
                let protocol = parse_protocol(tokens.next()?)?;
                let dst = tokens.parse("an address")?;
                let dst_port = tokens.parse("a port number")?;
                let src_port = tokens.parse("a port number")?;
                let payload = tokens.next()?.to_string();
                Self::Send {
                    node,
                    protocol,
                    dst,
                    dst_port,
                    src_port,
                    payload,
                }
            }
            "route" => match tokens.next()? {
                "add" => {
                    let destination = tokens.parse("a network in CIDR form")?;
                    let next_hop = tokens.parse("an address")?;
                    let metric = tokens.parse("a metric")?;
                    Self::RouteAdd {
                        node,
                        destination,
                        next_hop,
                        metric,
                    }
                }
                "remove" => Self::RouteRemove {
                    node,
                    destination: tokens.parse("a network in CIDR form")?,
                },
                other => return Err(RequestError::UnknownVerb(other.to_string())),
            },
            "acl" => match tokens.next()? {
                "add" => {
                    let position = tokens.parse("a rule position")?;
                    let rule = parse_rule(&mut tokens)?;
                    Self::AclAdd {
                        node,
                        position,
                        rule,
                    }
                }
                "remove" => Self::AclRemove {
                    node,
                    position: tokens.parse("a rule position")?,
                },
                other => return Err(RequestError::UnknownVerb(other.to_string())),
            },
            other => return Err(RequestError::UnknownVerb(other.to_string())),
        };
        tokens.done()?;
        Ok(request)
    }
}

impl Network {
    /// Parses and applies a token-list request in one call. Parse errors
    /// come back as failure responses, like every other request problem.
    pub fn apply_request(
        &mut self,
        registry: &SoftwareRegistry,
        tokens: &[&str],
    ) -> RequestResponse {
        match Request::parse(tokens) {
            Ok(request) => self.apply(registry, request),
            Err(error) => RequestResponse::failure(error.to_string()),
        }
    }

    /// Applies a typed request to the network.
    pub fn apply(&mut self, registry: &SoftwareRegistry, request: Request) -> RequestResponse {
        let tick = self.tick();
        let node_name = match &request {
            Request::PowerOn { node }
            | Request::PowerOff { node }
            | Request::InterfaceEnable { node, .. }
            | Request::InterfaceDisable { node, .. }
            | Request::Install { node, .. }
            | Request::Uninstall { node, .. }
            | Request::Fix { node, .. }
            | Request::Compromise { node, .. }
            | Request::Overwhelm { node, .. }
            | Request::Ping { node, .. }
            | Request::Send { node, .. }
            | Request::RouteAdd { node, .. }
            | Request::RouteRemove { node, .. }
            | Request::AclAdd { node, .. }
            | Request::AclRemove { node, .. } => node.clone(),
        };
        let Some(id) = self.node_id(&node_name) else {
            return RequestResponse::failure(format!("no node named {:?}", node_name));
        };

        // Everything except a power-on presumes a powered-on node.
        if !matches!(request, Request::PowerOn { .. }) && !self.node(id).is_on() {
            return RequestResponse::failure(format!(
                "node {:?} is {}",
                node_name,
                self.node(id).power()
            ));
        }

        match request {
            Request::PowerOn { .. } => match self.node_mut(id).power_on(tick) {
                Ok(()) => RequestResponse::success(),
                Err(error) => RequestResponse::failure(error.to_string()),
            },
            Request::PowerOff { .. } => match self.node_mut(id).power_off(tick) {
                Ok(()) => RequestResponse::success(),
                Err(error) => RequestResponse::failure(error.to_string()),
            },
            Request::InterfaceEnable { port, .. } => {
                let node = self.node_mut(id);
                let name = node.name().to_string();
                match node.interface_mut(port) {
                    Some(interface) => {
                        interface.enable(&name, port);
                        RequestResponse::success()
                    }
                    None => RequestResponse::failure(format!(
                        "node {:?} has no interface on port {}",
                        name, port
                    )),
                }
            }
            Request::InterfaceDisable { port, .. } => {
                let node = self.node_mut(id);
                let name = node.name().to_string();
                match node.interface_mut(port) {
                    Some(interface) => {
                        interface.disable(&name, port);
                        RequestResponse::success()
                    }
                    None => RequestResponse::failure(format!(
                        "node {:?} has no interface on port {}",
                        name, port
                    )),
                }
            }
            Request::Install { config, .. } => {
                match self.install_software(id, registry, config) {
                    Ok(()) => RequestResponse::success(),
                    Err(error) => RequestResponse::failure(error.to_string()),
                }
            }
            Request::Uninstall { software, .. } => {
                let node = self.node_mut(id);
                let name = node.name().to_string();
                match node.software.uninstall(&name, &software) {
                    Ok(()) => RequestResponse::success(),
                    Err(error) => RequestResponse::failure(error.to_string()),
                }
            }
            Request::Fix { software, .. } => {
                let node = self.node_mut(id);
                let name = node.name().to_string();
                match node.software.fix(&name, &software) {
                    Ok(()) => RequestResponse::success(),
                    Err(error) => RequestResponse::failure(error.to_string()),
                }
            }
            Request::Compromise { software, .. } => {
                let node = self.node_mut(id);
                let name = node.name().to_string();
                match node.software.compromise(&name, &software) {
                    Ok(()) => RequestResponse::success(),
                    Err(error) => RequestResponse::failure(error.to_string()),
                }
            }
            Request::Overwhelm { software, .. } => {
                let node = self.node_mut(id);
                let name = node.name().to_string();
                match node.software.overwhelm(&name, &software) {
                    Ok(()) => RequestResponse::success(),
                    Err(error) => RequestResponse::failure(error.to_string()),
                }
            }
            Request::Ping { dst, sequence, .. } => {
                self.ping(id, dst, sequence);
                RequestResponse::success()
            }
            Request::Send {
                protocol,
                dst,
                dst_port,
                src_port,
                payload,
                ..
            } => {
                self.send_transport(
                    id,
                    protocol,
                    dst,
                    dst_port,
                    src_port,
                    Message::new(payload),
                    TrafficOrigin::Unknown,
                );
                RequestResponse::success()
            }
            Request::RouteAdd {
                destination,
                next_hop,
                metric,
                ..
            } => match self.node_mut(id).role.router_mut() {
                Some(router) => {
                    router.table.add(destination, RouteEntry::via(next_hop, metric));
                    RequestResponse::success()
                }
                None => RequestResponse::failure(format!("node {:?} does not route", node_name)),
            },
            Request::RouteRemove { destination, .. } => {
                match self.node_mut(id).role.router_mut() {
                    Some(router) => match router.table.remove(destination) {
                        Some(removed) => RequestResponse::success_with(format!(
                            "{} via {}",
                            destination, removed.next_hop
                        )),
                        None => {
                            RequestResponse::failure(format!("no route for {}", destination))
                        }
                    },
                    None => {
                        RequestResponse::failure(format!("node {:?} does not route", node_name))
                    }
                }
            }
            // Firewalls filter with their zone lists; editing the inner
            // routing list would never be consulted, so refuse rather than
            // pretend the rule took effect.
            Request::AclAdd { position, rule, .. } => {
                let node = self.node_mut(id);
                if matches!(node.role, NodeRole::Firewall(_)) {
                    RequestResponse::failure(format!(
                        "node {:?} filters with zone lists, not a single ACL",
                        node_name
                    ))
                } else {
                    match node.role.router_mut() {
                        Some(router) => {
                            router.acl.add_rule(position, rule);
                            RequestResponse::success()
                        }
                        None => {
                            RequestResponse::failure(format!("node {:?} has no ACL", node_name))
                        }
                    }
                }
            }
            Request::AclRemove { position, .. } => {
                let node = self.node_mut(id);
                if matches!(node.role, NodeRole::Firewall(_)) {
                    RequestResponse::failure(format!(
                        "node {:?} filters with zone lists, not a single ACL",
                        node_name
                    ))
                } else {
                    match node.role.router_mut() {
                        Some(router) => match router.acl.remove_rule(position) {
                            Some(removed) => {
                                RequestResponse::success_with(format!("removed {:?}", removed))
                            }
                            None => {
                                RequestResponse::failure(format!("no rule at position {}", position))
                            }
                        },
                        None => {
                            RequestResponse::failure(format!("node {:?} has no ACL", node_name))
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::Firewall;
    use crate::hardware::InterfaceConfig;
    use crate::node::NodeConfig;
    use crate::router::Router;

    fn network() -> Network {
        let mut network = Network::new();
        let host = network
            .add_node(NodeConfig::new("client_1"), NodeRole::Host)
            .unwrap();
        network
            .add_interface(
                host,
                1,
                InterfaceConfig::wired(Some("10.0.0.1/24".parse().unwrap())),
            )
            .unwrap();
        network
            .add_node(NodeConfig::new("router_1"), NodeRole::Router(Router::default()))
            .unwrap();
        network
    }

    #[test]
    fn parse_round_trips_typed_verbs() -> anyhow::Result<()> {
        let request = Request::parse(&["node", "client_1", "power", "off"])?;
        assert_eq!(
            request,
            Request::PowerOff {
                node: "client_1".to_string()
            }
        );
        let request =
            Request::parse(&["node", "router_1", "route", "add", "10.0.0.0/24", "192.168.1.1", "1"])?;
        assert!(matches!(request, Request::RouteAdd { metric: 1, .. }));
        Ok(())
    }

    #[test]
    fn malformed_tokens_are_parse_errors() {
        assert!(Request::parse(&["node", "client_1", "power"]).is_err());
        assert!(Request::parse(&["node", "client_1", "dance"]).is_err());
        assert!(Request::parse(&["node", "client_1", "ping", "not-an-address", "1"]).is_err());
        // Trailing garbage is rejected too.
        assert!(Request::parse(&["node", "client_1", "power", "on", "extra"]).is_err());
    }

    #[test]
    fn unknown_node_is_a_failure_response() {
        let mut network = network();
        let registry = SoftwareRegistry::new();
        let response = network.apply_request(&registry, &["node", "ghost", "power", "off"]);
        assert!(!response.is_success());
    }

    #[test]
    fn actions_against_a_powered_off_node_fail() {
        let mut network = network();
        let registry = SoftwareRegistry::new();
        let id = network.node_id("client_1").unwrap();
        network.node_mut(id).power_off(0).unwrap();
        let response =
            network.apply_request(&registry, &["node", "client_1", "ping", "10.0.0.2", "1"]);
        assert!(matches!(response.status, RequestStatus::Failure(_)));
        // Power-on is the one verb valid while not on.
        for _ in 0..4 {
            network.step();
        }
        let response = network.apply_request(&registry, &["node", "client_1", "power", "on"]);
        assert!(response.is_success());
    }

    #[test]
    fn route_requests_need_a_routing_node() {
        let mut network = network();
        let registry = SoftwareRegistry::new();
        let denied = network.apply_request(
            &registry,
            &["node", "client_1", "route", "add", "0.0.0.0/0", "10.0.0.254", "1"],
        );
        assert!(!denied.is_success());
        let allowed = network.apply_request(
            &registry,
            &["node", "router_1", "route", "add", "0.0.0.0/0", "10.0.0.254", "1"],
        );
        assert!(allowed.is_success());
    }

    #[test]
    fn acl_rules_are_added_and_removed_by_position() {
        let mut network = network();
        let registry = SoftwareRegistry::new();
        let added = network.apply_request(
            &registry,
            &["node", "router_1", "acl", "add", "0", "deny", "tcp", "10.0.0.5", "any", "any", "80"],
        );
        assert!(added.is_success());
        let removed = network.apply_request(&registry, &["node", "router_1", "acl", "remove", "0"]);
        assert!(removed.is_success());
        assert!(removed.data.is_some());
        let missing = network.apply_request(&registry, &["node", "router_1", "acl", "remove", "5"]);
        assert!(!missing.is_success());
    }

    #[test]
    fn acl_requests_against_a_firewall_fail() {
        let mut network = network();
        let registry = SoftwareRegistry::new();
        network
            .add_node(
                NodeConfig::new("firewall_1"),
                NodeRole::Firewall(Firewall::new()),
            )
            .unwrap();
        let added = network.apply_request(
            &registry,
            &[
                "node", "firewall_1", "acl", "add", "0", "deny", "udp", "10.0.1.2", "any", "any",
                "any",
            ],
        );
        assert!(matches!(added.status, RequestStatus::Failure(_)));
        // The inner routing list stays untouched: a rule there would never be
        // consulted, so accepting the edit would be a silent no-op.
        let firewall = network.node_id("firewall_1").unwrap();
        assert!(network
            .node(firewall)
            .role
            .router()
            .unwrap()
            .acl
            .rules()
            .is_empty());
        let removed =
            network.apply_request(&registry, &["node", "firewall_1", "acl", "remove", "0"]);
        assert!(matches!(removed.status, RequestStatus::Failure(_)));
    }
}
