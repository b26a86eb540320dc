use crate::applications::{standard_registry, MessageSink};
use cygnet_core::frame::DropReason;
use cygnet_core::hardware::{Attachment, InterfaceConfig, LinkConfig};
use cygnet_core::node::NodeEventKind;
use cygnet_core::{
    IpProtocol, Ipv4Address, Message, Network, NodeConfig, NodeRole, SoftwareConfig, TrafficOrigin,
};

/// Runs a bandwidth-exhaustion simulation.
///
/// Two hosts share a link that carries one mail frame per tick but not two.
/// The second send of the tick dies at the sender; only one message lands.
pub fn link_bandwidth() {
    let registry = standard_registry().unwrap();
    let mut network = Network::new();

    let client = network
        .add_node(NodeConfig::new("workstation_1"), NodeRole::Host)
        .unwrap();
    network
        .add_interface(
            client,
            1,
            InterfaceConfig::wired(Some("10.0.0.1/24".parse().unwrap())),
        )
        .unwrap();
    let server = network
        .add_node(NodeConfig::new("server_1"), NodeRole::Host)
        .unwrap();
    network
        .add_interface(
            server,
            1,
            InterfaceConfig::wired(Some("10.0.0.2/24".parse().unwrap())),
        )
        .unwrap();
    network
        .install_software(
            server,
            &registry,
            SoftwareConfig::service("mailbox", "message_sink").with_endpoint(IpProtocol::Udp, 25),
        )
        .unwrap();
    network
        .connect(
            Attachment {
                node: client,
                port: 1,
            },
            Attachment {
                node: server,
                port: 1,
            },
            LinkConfig { bandwidth: 100 },
        )
        .unwrap();

    let target: Ipv4Address = "10.0.0.2".parse().unwrap();
    // Resolve the address first so the mail is not competing with that
    // exchange for the link.
    network.ping(client, target, 1);
    network.step();

    // Each frame is 60 bytes on the wire; the link carries 100 per tick.
    let payload = Message::new("eighteen byte mail");
    for _ in 0..2 {
        network.send_transport(
            client,
            IpProtocol::Udp,
            target,
            25,
            1025,
            payload.clone(),
            TrafficOrigin::Green,
        );
    }
    network.step();

    assert!(network.node(client).saw_event(|kind| matches!(
        kind,
        NodeEventKind::FrameDropped(DropReason::BandwidthExceeded)
    )));
    let link = network.links().next().unwrap();
    assert_eq!(link.dropped(), 1);
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
}

#[cfg(test)]
mod tests {
    #[test]
    fn link_bandwidth() {
        super::link_bandwidth()
    }
}
