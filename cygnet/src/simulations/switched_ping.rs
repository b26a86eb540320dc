use crate::scenario::{
    build_standard, LinkRecord, NodeRecord, PortRecord, RoleRecord, ScenarioBuilder,
};
use cygnet_core::node::NodeEventKind;
use cygnet_core::Ipv4Address;

/// Runs a switched ping simulation.
///
/// Two workstations hang off a switch. One pings the other: the address is
/// resolved over a broadcast, the switch learns both stations, and the echo
/// pair lands in both event logs.
pub fn switched_ping() {
    let builder = ScenarioBuilder::new()
        .node(
            NodeRecord::new(1, "workstation_1", RoleRecord::Host)
                .with_port(PortRecord::wired(1, Some("192.168.0.10/24".parse().unwrap()))),
        )
        .node(
            NodeRecord::new(2, "workstation_2", RoleRecord::Host)
                .with_port(PortRecord::wired(1, Some("192.168.0.11/24".parse().unwrap()))),
        )
        .node(
            NodeRecord::new(3, "switch_1", RoleRecord::Switch)
                .with_port(PortRecord::wired(1, None))
                .with_port(PortRecord::wired(2, None)),
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
        });
    let mut scenario = build_standard(builder).unwrap();
    let network = &mut scenario.network;
    let ws1 = network.node_id("workstation_1").unwrap();
    let ws2 = network.node_id("workstation_2").unwrap();
    let sw = network.node_id("switch_1").unwrap();
    let target: Ipv4Address = "192.168.0.11".parse().unwrap();

    network.ping(ws1, target, 7);
    network.step();

    let pinger = network.node(ws1);
    assert!(pinger.saw_event(
        |kind| matches!(kind, NodeEventKind::ArpRequestSent { target: t } if *t == target)
    ));
    assert!(pinger.saw_event(|kind| matches!(kind, NodeEventKind::ArpReplyReceived { .. })));
    assert!(pinger.saw_event(
        |kind| matches!(kind, NodeEventKind::EchoReplyReceived { sequence: 7, .. })
    ));
    let target_node = network.node(ws2);
    assert!(target_node.saw_event(|kind| matches!(kind, NodeEventKind::ArpReplySent { .. })));
    assert!(target_node.saw_event(
        |kind| matches!(kind, NodeEventKind::EchoRequestReceived { sequence: 7, .. })
    ));

    // The broadcast and the replies taught the switch both stations.
    let mac1 = network.node(ws1).interface(1).unwrap().mac();
    let mac2 = network.node(ws2).interface(1).unwrap().mac();
    let switch = network.node(sw).role.switch().unwrap();
    assert_eq!(switch.learned_port(mac1), Some(1));
    assert_eq!(switch.learned_port(mac2), Some(2));
}

#[cfg(test)]
mod tests {
    #[test]
    fn switched_ping() {
        super::switched_ping()
    }
}
