use cygnet_core::acl::{Acl, AclAction, AclRule, AddressFilter};
use cygnet_core::frame::DropReason;
use cygnet_core::hardware::{Attachment, InterfaceConfig, LinkConfig};
use cygnet_core::node::NodeEventKind;
use cygnet_core::router::{RouteEntry, Router};
use cygnet_core::{
    IpProtocol, Ipv4Address, Message, Network, NodeConfig, NodeRole, TrafficOrigin,
};

/// Runs a routed simulation with an access-control list.
///
/// A workstation and a server sit on opposite sides of a router whose list
/// denies the workstation's mail traffic but defaults to permit. The mail
/// send dies at the router with its rule counted; a ping crosses untouched.
pub fn router_acl() {
    let mut network = Network::new();
    let ws_ip: Ipv4Address = "10.0.1.2".parse().unwrap();
    let server_ip: Ipv4Address = "10.0.2.2".parse().unwrap();

    let ws = network
        .add_node(
            NodeConfig::new("workstation_1").with_gateway("10.0.1.1".parse().unwrap()),
            NodeRole::Host,
        )
        .unwrap();
    network
        .add_interface(ws, 1, InterfaceConfig::wired(Some("10.0.1.2/24".parse().unwrap())))
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

    let mut router = Router::new(Acl::default_permit());
    router
        .table
        .add("10.0.1.0/24".parse().unwrap(), RouteEntry::connected());
    router
        .table
        .add("10.0.2.0/24".parse().unwrap(), RouteEntry::connected());
    router.acl.add_rule(
        0,
        AclRule::new(AclAction::Deny)
            .protocol(IpProtocol::Udp)
            .src(AddressFilter::host(ws_ip)),
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
    network
        .connect(
            Attachment { node: ws, port: 1 },
            Attachment { node: rt, port: 1 },
            LinkConfig::default(),
        )
        .unwrap();
    network
        .connect(
            Attachment {
                node: server,
                port: 1,
            },
            Attachment { node: rt, port: 2 },
            LinkConfig::default(),
        )
        .unwrap();

    network.send_transport(
        ws,
        IpProtocol::Udp,
        server_ip,
        25,
        1025,
        Message::new("mail the router must not pass"),
        TrafficOrigin::Green,
    );
    network.step();
    network.ping(ws, server_ip, 1);
    network.step();

    let router_node = network.node(rt);
    assert!(router_node.saw_event(|kind| matches!(
        kind,
        NodeEventKind::FrameDropped(DropReason::AclDenied)
    )));
    let acl = &network.node(rt).role.router().unwrap().acl;
    assert_eq!(acl.rules()[0].match_count, 1);
    // The echo request and its reply both fell through to the default.
    assert_eq!(acl.default_match_count(), 2);
    assert!(network.node(ws).saw_event(
        |kind| matches!(kind, NodeEventKind::EchoReplyReceived { sequence: 1, .. })
    ));
    assert!(!network
        .node(server)
        .saw_event(|kind| matches!(kind, NodeEventKind::MessageDelivered { .. })));
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn router_acl() {
        super::router_acl()
    }
}
