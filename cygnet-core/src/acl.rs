//! Ordered access control lists.
//!
//! Rules are evaluated top to bottom and the first match governs. Every list
//! ends with an implicit rule whose action is configurable, so an empty ACL
//! is just its default action. Match counters exist for observability only;
//! they are reported through the snapshot interface and never consulted by
//! the engine.

use crate::address::Ipv4Address;
use crate::frame::{Frame, FrameBody, IpProtocol};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclAction {
    Permit,
    Deny,
}

impl Display for AclAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permit => write!(f, "permit"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// Filters traffic by network-layer protocol tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolFilter {
    Any,
    Only(IpProtocol),
}

impl ProtocolFilter {
    fn matches(self, protocol: IpProtocol) -> bool {
        match self {
            Self::Any => true,
            Self::Only(only) => only == protocol,
        }
    }
}

/// Filters traffic by logical address, Cisco-style: wildcard bits set to one
/// are ignored during comparison, so `10.0.0.0` with wildcard `0.0.0.255`
/// matches the whole /24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFilter {
    Any,
    Match {
        address: Ipv4Address,
        wildcard: Ipv4Address,
    },
}

impl AddressFilter {
    /// Matches exactly one host.
    pub fn host(address: Ipv4Address) -> Self {
        Self::Match {
            address,
            wildcard: Ipv4Address::UNSPECIFIED,
        }
    }

    fn matches(self, candidate: Ipv4Address) -> bool {
        match self {
            Self::Any => true,
            Self::Match { address, wildcard } => {
                (candidate.to_u32() ^ address.to_u32()) & !wildcard.to_u32() == 0
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortFilter {
    Any,
    Eq(u16),
}

impl PortFilter {
    fn matches(self, candidate: Option<u16>) -> bool {
        match self {
            Self::Any => true,
            // A port rule cannot match portless traffic such as ICMP.
            Self::Eq(port) => candidate == Some(port),
        }
    }
}

/// One ACL rule. Position in the owning list is its priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    pub action: AclAction,
    pub protocol: ProtocolFilter,
    pub src: AddressFilter,
    pub dst: AddressFilter,
    pub src_port: PortFilter,
    pub dst_port: PortFilter,
    /// How many frames this rule has governed. Observability only.
    #[serde(default)]
    pub match_count: u64,
}

impl AclRule {
    pub fn new(action: AclAction) -> Self {
        Self {
            action,
            protocol: ProtocolFilter::Any,
            src: AddressFilter::Any,
            dst: AddressFilter::Any,
            src_port: PortFilter::Any,
            dst_port: PortFilter::Any,
            match_count: 0,
        }
    }

    pub fn protocol(mut self, protocol: IpProtocol) -> Self {
        self.protocol = ProtocolFilter::Only(protocol);
        self
    }

    pub fn src(mut self, filter: AddressFilter) -> Self {
        self.src = filter;
        self
    }

    pub fn dst(mut self, filter: AddressFilter) -> Self {
        self.dst = filter;
        self
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = PortFilter::Eq(port);
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = PortFilter::Eq(port);
        self
    }

    fn matches(&self, flow: &FlowKey) -> bool {
        self.protocol.matches(flow.protocol)
            && self.src.matches(flow.src)
            && self.dst.matches(flow.dst)
            && self.src_port.matches(flow.src_port)
            && self.dst_port.matches(flow.dst_port)
    }
}

/// The attributes of a frame that ACL rules match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowKey {
    pub protocol: IpProtocol,
    pub src: Ipv4Address,
    pub dst: Ipv4Address,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

impl FlowKey {
    /// Extracts the matchable attributes of a frame.
    pub fn of(frame: &Frame) -> Self {
        let (src_port, dst_port) = match &frame.body {
            FrameBody::Transport { header, .. } => (Some(header.src_port), Some(header.dst_port)),
            _ => (None, None),
        };
        Self {
            protocol: frame.net.protocol,
            src: frame.net.src,
            dst: frame.net.dst,
            src_port,
            dst_port,
        }
    }
}

/// The result of evaluating an ACL against a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclVerdict {
    pub action: AclAction,
    /// The index of the matching rule, or `None` for the implicit default.
    pub rule_position: Option<usize>,
}

/// An ordered list of rules with an implicit trailing default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    rules: Vec<AclRule>,
    default_action: AclAction,
    #[serde(default)]
    default_match_count: u64,
}

impl Acl {
    pub fn new(default_action: AclAction) -> Self {
        Self {
            rules: Vec::new(),
            default_action,
            default_match_count: 0,
        }
    }

    /// A list that permits everything it is not told to deny.
    pub fn default_permit() -> Self {
        Self::new(AclAction::Permit)
    }

    /// A list that denies everything it is not told to permit.
    pub fn default_deny() -> Self {
        Self::new(AclAction::Deny)
    }

    /// Inserts a rule at the given position, shifting later rules down.
    /// Positions past the end append.
    pub fn add_rule(&mut self, position: usize, rule: AclRule) {
        let position = position.min(self.rules.len());
        self.rules.insert(position, rule);
    }

    /// Removes the rule at the given position, if it exists.
    pub fn remove_rule(&mut self, position: usize) -> Option<AclRule> {
        if position < self.rules.len() {
            Some(self.rules.remove(position))
        } else {
            None
        }
    }

    pub fn rules(&self) -> &[AclRule] {
        &self.rules
    }

    pub fn default_action(&self) -> AclAction {
        self.default_action
    }

    pub fn default_match_count(&self) -> u64 {
        self.default_match_count
    }

    /// Evaluates the list top to bottom; the first matching rule governs and
    /// its counter increments. No match falls through to the implicit
    /// default.
    pub fn evaluate(&mut self, flow: &FlowKey) -> AclVerdict {
        for (position, rule) in self.rules.iter_mut().enumerate() {
            if rule.matches(flow) {
                rule.match_count += 1;
                return AclVerdict {
                    action: rule.action,
                    rule_position: Some(position),
                };
            }
        }
        self.default_match_count += 1;
        AclVerdict {
            action: self.default_action,
            rule_position: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(src: [u8; 4], dst: [u8; 4]) -> FlowKey {
        FlowKey {
            protocol: IpProtocol::Udp,
            src: Ipv4Address::new(src),
            dst: Ipv4Address::new(dst),
            src_port: Some(1024),
            dst_port: Some(80),
        }
    }

    #[test]
    fn first_match_wins() {
        let mut acl = Acl::default_deny();
        acl.add_rule(0, AclRule::new(AclAction::Permit).src(AddressFilter::host(
            Ipv4Address::new([10, 0, 0, 5]),
        )));
        acl.add_rule(1, AclRule::new(AclAction::Deny).src(AddressFilter::host(
            Ipv4Address::new([10, 0, 0, 5]),
        )));
        let verdict = acl.evaluate(&flow([10, 0, 0, 5], [10, 0, 1, 1]));
        assert_eq!(verdict.action, AclAction::Permit);
        assert_eq!(verdict.rule_position, Some(0));
        assert_eq!(acl.rules()[0].match_count, 1);
        assert_eq!(acl.rules()[1].match_count, 0);
    }

    #[test]
    fn no_match_falls_through_to_default() {
        let mut acl = Acl::default_permit();
        acl.add_rule(0, AclRule::new(AclAction::Deny).src(AddressFilter::host(
            Ipv4Address::new([10, 0, 0, 5]),
        )));
        let verdict = acl.evaluate(&flow([10, 0, 0, 9], [10, 0, 1, 1]));
        assert_eq!(verdict.action, AclAction::Permit);
        assert_eq!(verdict.rule_position, None);
        assert_eq!(acl.default_match_count(), 1);
    }

    #[test]
    fn wildcard_mask_matches_a_block() {
        let rule = AclRule::new(AclAction::Deny).src(AddressFilter::Match {
            address: Ipv4Address::new([10, 0, 0, 0]),
            wildcard: Ipv4Address::new([0, 0, 0, 255]),
        });
        assert!(rule.matches(&flow([10, 0, 0, 200], [1, 1, 1, 1])));
        assert!(!rule.matches(&flow([10, 0, 1, 200], [1, 1, 1, 1])));
    }

    #[test]
    fn port_filter_does_not_match_portless_traffic() {
        let rule = AclRule::new(AclAction::Deny).dst_port(80);
        let mut icmp = flow([10, 0, 0, 1], [10, 0, 1, 1]);
        icmp.protocol = IpProtocol::Icmp;
        icmp.src_port = None;
        icmp.dst_port = None;
        assert!(!rule.matches(&icmp));
    }

    #[test]
    fn rule_positions_shift_on_insert() {
        let mut acl = Acl::default_deny();
        acl.add_rule(0, AclRule::new(AclAction::Deny).dst_port(22));
        acl.add_rule(0, AclRule::new(AclAction::Permit).dst_port(22));
        let verdict = acl.evaluate(&FlowKey {
            protocol: IpProtocol::Tcp,
            src: Ipv4Address::new([1, 1, 1, 1]),
            dst: Ipv4Address::new([2, 2, 2, 2]),
            src_port: Some(9000),
            dst_port: Some(22),
        });
        assert_eq!(verdict.action, AclAction::Permit);
    }
}
