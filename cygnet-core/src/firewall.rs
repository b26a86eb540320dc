//! Zone-based filtering: a router with six ACLs.

use crate::acl::{Acl, AclAction, AclVerdict, FlowKey};
use crate::id::PortNumber;
use crate::router::Router;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A firewall network segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    Internal,
    Dmz,
    External,
}

impl Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::Dmz => write!(f, "dmz"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Which of the six zone ACLs a frame is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneAcl {
    InternalInbound,
    InternalOutbound,
    DmzInbound,
    DmzOutbound,
    ExternalInbound,
    ExternalOutbound,
}

impl Display for ZoneAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InternalInbound => "internal-inbound",
            Self::InternalOutbound => "internal-outbound",
            Self::DmzInbound => "dmz-inbound",
            Self::DmzOutbound => "dmz-outbound",
            Self::ExternalInbound => "external-inbound",
            Self::ExternalOutbound => "external-outbound",
        };
        write!(f, "{}", text)
    }
}

/// A firewall: a router whose forwarding consults zone-scoped ACLs instead
/// of the router's single list.
///
/// ACL selection follows the frame's ingress and egress zones. When both
/// interfaces sit in the same non-external zone, that zone's inbound list
/// alone governs. Cross-zone traffic passes the egress checks of the zone it
/// leaves and the ingress checks of the zone it enters, in that order, and
/// the first deny wins; the external lists participate only when one side of
/// the flow is the external zone.
#[derive(Debug)]
pub struct Firewall {
    pub router: Router,
    zones: FxHashMap<PortNumber, Zone>,
    internal_inbound: Acl,
    internal_outbound: Acl,
    dmz_inbound: Acl,
    dmz_outbound: Acl,
    external_inbound: Acl,
    external_outbound: Acl,
}

impl Firewall {
    /// Creates a firewall with a cautious default posture: traffic arriving
    /// from the external zone is denied unless permitted, everything else is
    /// permitted unless denied.
    pub fn new() -> Self {
        Self {
            router: Router::default(),
            zones: FxHashMap::default(),
            internal_inbound: Acl::default_permit(),
            internal_outbound: Acl::default_permit(),
            dmz_inbound: Acl::default_permit(),
            dmz_outbound: Acl::default_permit(),
            external_inbound: Acl::default_deny(),
            external_outbound: Acl::default_permit(),
        }
    }

    /// Assigns an interface to a zone. Unassigned interfaces are treated as
    /// external.
    pub fn set_zone(&mut self, port: PortNumber, zone: Zone) {
        self.zones.insert(port, zone);
    }

    pub fn zone_of(&self, port: PortNumber) -> Zone {
        self.zones.get(&port).copied().unwrap_or(Zone::External)
    }

    pub fn acl(&self, which: ZoneAcl) -> &Acl {
        match which {
            ZoneAcl::InternalInbound => &self.internal_inbound,
            ZoneAcl::InternalOutbound => &self.internal_outbound,
            ZoneAcl::DmzInbound => &self.dmz_inbound,
            ZoneAcl::DmzOutbound => &self.dmz_outbound,
            ZoneAcl::ExternalInbound => &self.external_inbound,
            ZoneAcl::ExternalOutbound => &self.external_outbound,
        }
    }

    pub fn acl_mut(&mut self, which: ZoneAcl) -> &mut Acl {
        match which {
            ZoneAcl::InternalInbound => &mut self.internal_inbound,
            ZoneAcl::InternalOutbound => &mut self.internal_outbound,
            ZoneAcl::DmzInbound => &mut self.dmz_inbound,
            ZoneAcl::DmzOutbound => &mut self.dmz_outbound,
            ZoneAcl::ExternalInbound => &mut self.external_inbound,
            ZoneAcl::ExternalOutbound => &mut self.external_outbound,
        }
    }

    /// The lists applicable to traffic from one zone to another, in
    /// evaluation order.
    fn applicable(from: Zone, to: Zone) -> Vec<ZoneAcl> {
        use Zone::*;
        use ZoneAcl::*;
        match (from, to) {
            (Internal, Internal) => vec![InternalInbound],
            (Dmz, Dmz) => vec![DmzInbound],
            (External, External) => vec![ExternalInbound],
            (Internal, Dmz) => vec![InternalOutbound, DmzInbound],
            (Dmz, Internal) => vec![DmzOutbound, InternalInbound],
            (External, Internal) => vec![ExternalInbound, InternalInbound],
            (External, Dmz) => vec![ExternalInbound, DmzInbound],
            (Internal, External) => vec![InternalOutbound, ExternalOutbound],
            (Dmz, External) => vec![DmzOutbound, ExternalOutbound],
        }
    }

    /// Evaluates the flow against every applicable list. The first deny
    /// governs; a flow that clears every list is permitted.
    pub fn evaluate(&mut self, from: Zone, to: Zone, flow: &FlowKey) -> (ZoneAcl, AclVerdict) {
        let lists = Self::applicable(from, to);
        let mut last = None;
        for which in lists {
            let verdict = self.acl_mut(which).evaluate(flow);
            if verdict.action == AclAction::Deny {
                return (which, verdict);
            }
            last = Some((which, verdict));
        }
        last.expect("at least one list applies to every zone pair")
    }
}

impl Default for Firewall {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{AclRule, AddressFilter};
    use crate::address::Ipv4Address;
    use crate::frame::IpProtocol;

    fn flow() -> FlowKey {
        FlowKey {
            protocol: IpProtocol::Tcp,
            src: Ipv4Address::new([203, 0, 113, 9]),
            dst: Ipv4Address::new([192, 168, 1, 10]),
            src_port: Some(4000),
            dst_port: Some(80),
        }
    }

    #[test]
    fn external_traffic_is_denied_by_default() {
        let mut firewall = Firewall::new();
        let (which, verdict) = firewall.evaluate(Zone::External, Zone::Internal, &flow());
        assert_eq!(which, ZoneAcl::ExternalInbound);
        assert_eq!(verdict.action, AclAction::Deny);
    }

    #[test]
    fn permitting_external_still_checks_the_inner_zone() {
        let mut firewall = Firewall::new();
        firewall
            .acl_mut(ZoneAcl::ExternalInbound)
            .add_rule(0, AclRule::new(AclAction::Permit).dst_port(80));
        firewall.acl_mut(ZoneAcl::InternalInbound).add_rule(
            0,
            AclRule::new(AclAction::Deny).dst(AddressFilter::host(Ipv4Address::new(
                [192, 168, 1, 10],
            ))),
        );
        let (which, verdict) = firewall.evaluate(Zone::External, Zone::Internal, &flow());
        assert_eq!(which, ZoneAcl::InternalInbound);
        assert_eq!(verdict.action, AclAction::Deny);
    }

    #[test]
    fn same_zone_traffic_uses_only_that_zone() {
        let mut firewall = Firewall::new();
        // An external deny must not affect internal-to-internal traffic.
        let (which, verdict) = firewall.evaluate(Zone::Internal, Zone::Internal, &flow());
        assert_eq!(which, ZoneAcl::InternalInbound);
        assert_eq!(verdict.action, AclAction::Permit);
    }

    #[test]
    fn unassigned_ports_are_external() {
        let mut firewall = Firewall::new();
        assert_eq!(firewall.zone_of(7), Zone::External);
        firewall.set_zone(7, Zone::Dmz);
        assert_eq!(firewall.zone_of(7), Zone::Dmz);
    }

    #[test]
    fn deny_counters_land_on_the_denying_list() {
        let mut firewall = Firewall::new();
        firewall.evaluate(Zone::External, Zone::Internal, &flow());
        assert_eq!(firewall.acl(ZoneAcl::ExternalInbound).default_match_count(), 1);
        assert_eq!(firewall.acl(ZoneAcl::InternalInbound).default_match_count(), 0);
    }
}
