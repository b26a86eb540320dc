use crate::applications::{standard_registry, MessageSink};
use cygnet_core::acl::{Acl, AclAction, AclRule, AddressFilter};
use cygnet_core::frame::DropReason;
use cygnet_core::hardware::{Attachment, InterfaceConfig, LinkConfig};
use cygnet_core::node::NodeEventKind;
use cygnet_core::router::{RouteEntry, Router};
use cygnet_core::switch::Switch;
use cygnet_core::{
    IpProtocol, Ipv4Address, Message, Network, NodeConfig, NodeId, NodeRole, PortNumber,
    SoftwareConfig, TrafficOrigin,
};

fn wire(network: &mut Network, a: NodeId, a_port: PortNumber, b: NodeId, b_port: PortNumber) {
    network
        .connect(
            Attachment { node: a, port: a_port },
            Attachment { node: b, port: b_port },
            LinkConfig::default(),
        )
        .unwrap();
}

/// Runs a rule-ordering simulation.
///
/// A router's list permits one workstation by host rule before a broader
/// rule denies its whole subnet. The earlier rule governs: the favored
/// workstation's traffic crosses while its neighbor's dies, and the match
/// counters attribute each frame to the rule that governed it.
pub fn acl_ordering() {
    let registry = standard_registry().unwrap();
    let mut network = Network::new();
    let favored_ip: Ipv4Address = "10.0.1.2".parse().unwrap();
    let server_ip: Ipv4Address = "10.0.2.2".parse().unwrap();
    let gateway: Ipv4Address = "10.0.1.1".parse().unwrap();

    let ws1 = network
        .add_node(
            NodeConfig::new("workstation_1").with_gateway(gateway),
            NodeRole::Host,
        )
        .unwrap();
    network
        .add_interface(ws1, 1, InterfaceConfig::wired(Some("10.0.1.2/24".parse().unwrap())))
        .unwrap();
    let ws2 = network
        .add_node(
            NodeConfig::new("workstation_2").with_gateway(gateway),
            NodeRole::Host,
        )
        .unwrap();
    network
        .add_interface(ws2, 1, InterfaceConfig::wired(Some("10.0.1.3/24".parse().unwrap())))
        .unwrap();
    let sw = network
        .add_node(NodeConfig::new("switch_1"), NodeRole::Switch(Switch::new()))
        .unwrap();
    for port in 1..=3 {
        network
            .add_interface(sw, port, InterfaceConfig::wired(None))
            .unwrap();
    }

    let mut router = Router::new(Acl::default_permit());
    router
        .table
        .add("10.0.1.0/24".parse().unwrap(), RouteEntry::connected());
    router
        .table
        .add("10.0.2.0/24".parse().unwrap(), RouteEntry::connected());
    router
        .acl
        .add_rule(0, AclRule::new(AclAction::Permit).src(AddressFilter::host(favored_ip)));
    router.acl.add_rule(
        1,
        AclRule::new(AclAction::Deny).src(AddressFilter::Match {
            address: "10.0.1.0".parse().unwrap(),
            wildcard: "0.0.0.255".parse().unwrap(),
        }),
    );
    let rt = network
        .add_node(NodeConfig::new("router_1"), NodeRole::Router(router))
        .unwrap();
    network
        .add_interface(rt, 1, InterfaceConfig::wired(Some("10.0.1.1/24".parse().unwrap())))
        .unwrap();
    network
        .add_interface(rt, 2, InterfaceConfig::wired(Some("10.0.2.1/24".parse().unwrap())))
        .unwrap();

    let server = network
        .add_node(
            NodeConfig::new("server_1").with_gateway("10.0.2.1".parse().unwrap()),
            NodeRole::Host,
        )
        .unwrap();
    network
        .add_interface(
            server,
            1,
            InterfaceConfig::wired(Some("10.0.2.2/24".parse().unwrap())),
        )
        .unwrap();
    network
        .install_software(
            server,
            &registry,
            SoftwareConfig::service("mailbox", "message_sink").with_endpoint(IpProtocol::Udp, 25),
        )
        .unwrap();

    wire(&mut network, ws1, 1, sw, 1);
    wire(&mut network, ws2, 1, sw, 2);
    wire(&mut network, rt, 1, sw, 3);
    wire(&mut network, server, 1, rt, 2);

    // Let the mailbox finish installing before traffic arrives.
    network.step();
    network.send_transport(
        ws1,
        IpProtocol::Udp,
        server_ip,
        25,
        1025,
        Message::new("from the favored workstation"),
        TrafficOrigin::Green,
    );
    network.send_transport(
        ws2,
        IpProtocol::Udp,
        server_ip,
        25,
        1025,
        Message::new("from its neighbor"),
        TrafficOrigin::Green,
    );
    network.step();

    let acl = &network.node(rt).role.router().unwrap().acl;
    assert_eq!(acl.rules()[0].match_count, 1);
    assert_eq!(acl.rules()[1].match_count, 1);
    assert_eq!(acl.default_match_count(), 0);
    assert!(network.node(rt).saw_event(|kind| matches!(
        kind,
        NodeEventKind::FrameDropped(DropReason::AclDenied)
    )));
    let mailbox = network
        .node(server)
        .software
        .find("mailbox")
        .unwrap()
        .behavior()
        .as_any()
        .downcast_ref::<MessageSink>()
        .unwrap();
    assert_eq!(mailbox.received().len(), 1);
    assert_eq!(
        mailbox.last().unwrap().to_vec(),
        b"from the favored workstation"
    );
}

#[cfg(test)]
mod tests {
    #[test]
    fn acl_ordering() {
        super::acl_ordering()
    }
}
