use crate::applications::MessageSink;
use crate::scenario::{
    build_standard, InfoExchangeRecord, LinkRecord, NodeRecord, PatternOfLifeRecord, PortRecord,
    RoleRecord, RouteRecord, ScenarioBuilder,
};
use cygnet_core::acl::{AclAction, AclRule, AddressFilter};
use cygnet_core::firewall::{Zone, ZoneAcl};
use cygnet_core::frame::DropReason;
use cygnet_core::node::NodeEventKind;
use cygnet_core::{
    IpProtocol, Ipv4Address, Message, Network, NodeId, SoftwareConfig, TrafficOrigin,
};

fn sink_count(network: &Network, node: NodeId) -> usize {
    network
        .node(node)
        .software
        .find("mailbox")
        .unwrap()
        .behavior()
        .as_any()
        .downcast_ref::<MessageSink>()
        .unwrap()
        .received()
        .len()
}

/// Runs a zoned firewall simulation.
///
/// An internal workstation and an outside host straddle a firewall whose
/// external-inbound list denies by default. Outbound mail crosses; inbound
/// mail dies at the firewall until a permit rule is added for it.
pub fn firewall_zones() {
    let unspecified = Ipv4Address::UNSPECIFIED;
    let builder = ScenarioBuilder::new()
        .node(
            NodeRecord::new(1, "workstation_1", RoleRecord::Host)
                .with_port(PortRecord::wired(1, Some("10.0.1.2/24".parse().unwrap())))
                .with_gateway("10.0.1.1".parse().unwrap())
                .with_software(
                    SoftwareConfig::service("mailbox", "message_sink")
                        .with_endpoint(IpProtocol::Udp, 25),
                ),
        )
        .node(
            NodeRecord::new(2, "outside_1", RoleRecord::Host)
                .with_port(PortRecord::wired(1, Some("203.0.113.2/24".parse().unwrap())))
                .with_gateway("203.0.113.1".parse().unwrap())
                .with_software(
                    SoftwareConfig::service("mailbox", "message_sink")
                        .with_endpoint(IpProtocol::Udp, 25),
                ),
        )
        .node(
            NodeRecord::new(
                3,
                "firewall_1",
                RoleRecord::Firewall {
                    routes: vec![
                        RouteRecord {
                            destination: "10.0.1.0/24".parse().unwrap(),
                            next_hop: unspecified,
                            metric: 0,
                        },
                        RouteRecord {
                            destination: "203.0.113.0/24".parse().unwrap(),
                            next_hop: unspecified,
                            metric: 0,
                        },
                    ],
                    zones: vec![(1, Zone::Internal), (2, Zone::External)],
                    rules: Vec::new(),
                },
            )
            .with_port(PortRecord::wired(1, Some("10.0.1.1/24".parse().unwrap())))
            .with_port(PortRecord::wired(2, Some("203.0.113.1/24".parse().unwrap()))),
        )
        .link(LinkRecord {
            id: 1,
            a: (1, 1),
            b: (3, 1),
            bandwidth: 1500,
        })
        .link(LinkRecord {
            id: 2,
            a: (2, 1),
            b: (3, 2),
            bandwidth: 1500,
        })
        // Outbound mail from the workstation every few ticks.
        .exchange(InfoExchangeRecord {
            id: 1,
            node: 1,
            protocol: IpProtocol::Udp,
            dst: "203.0.113.2".parse().unwrap(),
            dst_port: 25,
            src_port: 1025,
            payload: "outbound status mail".to_string(),
            origin: TrafficOrigin::Green,
            schedule: PatternOfLifeRecord::once(2),
        });
    let mut scenario = build_standard(builder).unwrap();
    scenario.run_until(3);

    let network = &mut scenario.network;
    let ws = network.node_id("workstation_1").unwrap();
    let outside = network.node_id("outside_1").unwrap();
    let fw = network.node_id("firewall_1").unwrap();
    assert_eq!(sink_count(network, outside), 1);

    // Inbound from outside dies on the external-inbound default.
    let ws_ip: Ipv4Address = "10.0.1.2".parse().unwrap();
    network.send_transport(
        outside,
        IpProtocol::Udp,
        ws_ip,
        25,
        1025,
        Message::new("unsolicited inbound"),
        TrafficOrigin::Red,
    );
    network.step();
    assert!(network.node(fw).saw_event(|kind| matches!(
        kind,
        NodeEventKind::FrameDropped(DropReason::AclDenied)
    )));
    assert_eq!(sink_count(network, ws), 0);

    // Permit inbound mail explicitly; the inner zone list still applies.
    let firewall = network.node_mut(fw).role.firewall_mut().unwrap();
    firewall.acl_mut(ZoneAcl::ExternalInbound).add_rule(
        0,
        AclRule::new(AclAction::Permit)
            .protocol(IpProtocol::Udp)
            .dst(AddressFilter::host(ws_ip))
            .dst_port(25),
    );
    network.send_transport(
        outside,
        IpProtocol::Udp,
        ws_ip,
        25,
        1025,
        Message::new("permitted inbound"),
        TrafficOrigin::Red,
    );
    network.step();
    assert_eq!(sink_count(network, ws), 1);
}

#[cfg(test)]
mod tests {
    #[test]
    fn firewall_zones() {
        super::firewall_zones()
    }
}
