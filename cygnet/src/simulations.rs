//! Prebuilt network setups exercising the engine end to end, for testing
//! and for examples.

mod switched_ping;
pub use switched_ping::switched_ping;

mod router_acl;
pub use router_acl::router_acl;

mod acl_ordering;
pub use acl_ordering::acl_ordering;

mod link_bandwidth;
pub use link_bandwidth::link_bandwidth;

mod power_cycle;
pub use power_cycle::power_cycle;

mod firewall_zones;
pub use firewall_zones::firewall_zones;
