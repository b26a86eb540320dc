//! Addressable endpoints that frames enter and leave nodes through.

use crate::address::{Cidr, IpConfig, Ipv4Address};
use crate::frame::Mac;
use crate::hardware::airspace::Frequency;
use crate::id::{LinkId, PortNumber};
use crate::logging;
use serde::{Deserialize, Serialize};

/// What an interface transmits over.
///
/// Wired and wireless are one enum composed into a single concrete interface
/// type rather than separate interface types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Medium {
    /// A cabled port, attached to at most one [`Link`](crate::hardware::Link).
    Wired { link: Option<LinkId> },
    /// A radio sharing an [`AirSpace`](crate::hardware::AirSpace) frequency.
    Wireless { frequency: Frequency },
}

/// Configuration for one interface, validated at node construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// The logical address and subnet, if the interface is IP-capable.
    /// Switch ports operate purely at the link layer and leave this unset.
    pub ip: Option<IpConfig>,
    /// Wireless interfaces name the frequency they transmit on.
    pub frequency: Option<Frequency>,
}

impl InterfaceConfig {
    pub fn wired(ip: Option<IpConfig>) -> Self {
        Self {
            ip,
            frequency: None,
        }
    }

    pub fn wireless(ip: Option<IpConfig>, frequency: Frequency) -> Self {
        Self {
            ip,
            frequency: Some(frequency),
        }
    }
}

/// Per-interface traffic counters, exposed through the snapshot interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceCounters {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
}

/// A network interface card.
///
/// Interfaces do not own their link; they refer to it by [`LinkId`], and the
/// engine resolves the far endpoint when a frame is transmitted. A disabled
/// interface neither accepts inbound frames nor emits outbound ones.
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    mac: Mac,
    ip: Option<IpConfig>,
    enabled: bool,
    medium: Medium,
    pub(crate) counters: InterfaceCounters,
}

impl NetworkInterface {
    pub(crate) fn new(mac: Mac, config: &InterfaceConfig) -> Self {
        let medium = match config.frequency {
            Some(frequency) => Medium::Wireless { frequency },
            None => Medium::Wired { link: None },
        };
        Self {
            mac,
            ip: config.ip,
            enabled: false,
            medium,
            counters: InterfaceCounters::default(),
        }
    }

    pub fn mac(&self) -> Mac {
        self.mac
    }

    /// The interface's own logical address, if it is IP-capable.
    pub fn address(&self) -> Option<Ipv4Address> {
        self.ip.map(|ip| ip.address)
    }

    /// The subnet the interface's address belongs to.
    pub fn subnet(&self) -> Option<Cidr> {
        self.ip.map(|ip| ip.subnet())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn medium(&self) -> Medium {
        self.medium
    }

    /// The attached link, for wired interfaces that have one.
    pub fn link(&self) -> Option<LinkId> {
        match self.medium {
            Medium::Wired { link } => link,
            Medium::Wireless { .. } => None,
        }
    }

    pub fn counters(&self) -> InterfaceCounters {
        self.counters
    }

    /// Enables the interface. Idempotent: re-enabling an enabled interface
    /// does nothing and logs nothing.
    pub fn enable(&mut self, node: &str, port: PortNumber) {
        if !self.enabled {
            self.enabled = true;
            logging::interface_event(node, port, true);
        }
    }

    /// Disables the interface. Idempotent, like [`enable`](Self::enable).
    pub fn disable(&mut self, node: &str, port: PortNumber) {
        if self.enabled {
            self.enabled = false;
            logging::interface_event(node, port, false);
        }
    }

    pub(crate) fn attach_link(&mut self, link: LinkId) {
        debug_assert!(matches!(self.medium, Medium::Wired { link: None }));
        self.medium = Medium::Wired { link: Some(link) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn interface() -> NetworkInterface {
        NetworkInterface::new(Mac::new([2, 0, 0, 0, 0, 1]), &InterfaceConfig::wired(None))
    }

    #[test]
    #[traced_test]
    fn enable_is_idempotent() {
        let mut interface = interface();
        interface.enable("client_1", 1);
        interface.enable("client_1", 1);
        assert!(interface.is_enabled());
        interface.disable("client_1", 1);
        interface.disable("client_1", 1);
        assert!(!interface.is_enabled());
    }

    #[test]
    fn starts_disabled() {
        let interface = interface();
        assert!(!interface.is_enabled());
    }

    #[test]
    fn address_and_subnet() {
        let interface = NetworkInterface::new(
            Mac::new([2, 0, 0, 0, 0, 2]),
            &InterfaceConfig::wired(Some("10.0.0.5/8".parse().unwrap())),
        );
        assert_eq!(interface.address(), Some(Ipv4Address::new([10, 0, 0, 5])));
        assert!(interface
            .subnet()
            .unwrap()
            .contains(Ipv4Address::new([10, 200, 0, 1])));
    }
}
