use crate::applications::standard_registry;
use cygnet_core::hardware::InterfaceConfig;
use cygnet_core::{
    IpProtocol, Network, NodeConfig, NodeRole, SoftwareConfig, SoftwareState,
};

/// Runs a power-cycle simulation driven through the request interface.
///
/// A compromised mail service survives its server's power cycle still
/// compromised, and a fix interrupted by a second power cycle restarts its
/// countdown from the full duration.
pub fn power_cycle() {
    let registry = standard_registry().unwrap();
    let mut network = Network::new();
    let server = network
        .add_node(
            NodeConfig::new("server_1")
                .with_boot_ticks(2)
                .with_shutdown_ticks(2),
            NodeRole::Host,
        )
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
            SoftwareConfig::service("mail", "message_sink")
                .with_endpoint(IpProtocol::Udp, 25)
                .with_fix_duration(4),
        )
        .unwrap();
    let state = |network: &Network| network.node(server).software.find("mail").unwrap().state();

    network.step();
    assert_eq!(state(&network), SoftwareState::Running);
    let tokens = ["node", "server_1", "software", "mail", "compromise"];
    assert!(network.apply_request(&registry, &tokens).is_success());
    assert_eq!(state(&network), SoftwareState::Compromised);

    // Power cycle: the compromise survives in cold storage.
    assert!(network
        .apply_request(&registry, &["node", "server_1", "power", "off"])
        .is_success());
    network.step();
    network.step();
    assert!(!network.node(server).is_on());
    assert_eq!(state(&network), SoftwareState::Stopped);
    assert!(network
        .apply_request(&registry, &["node", "server_1", "power", "on"])
        .is_success());
    network.step();
    network.step();
    assert!(network.node(server).is_on());
    assert_eq!(state(&network), SoftwareState::Compromised);

    // Start a fix, burn one tick of it, then pull the plug again.
    let tokens = ["node", "server_1", "software", "mail", "fix"];
    assert!(network.apply_request(&registry, &tokens).is_success());
    network.step();
    assert_eq!(state(&network), SoftwareState::Fixing);
    network
        .apply_request(&registry, &["node", "server_1", "power", "off"]);
    network.step();
    network.step();
    network
        .apply_request(&registry, &["node", "server_1", "power", "on"]);
    network.step();
    network.step();
    // The countdown restarted in full: three ticks of progress before the
    // cycle would already have finished it.
    network.step();
    network.step();
    assert_eq!(state(&network), SoftwareState::Fixing);
    network.step();
    assert_eq!(state(&network), SoftwareState::Running);
}
