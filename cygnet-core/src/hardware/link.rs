//! Bandwidth-limited channels connecting two interfaces.

use crate::id::{NodeId, PortNumber};
use serde::{Deserialize, Serialize};

/// One end of a link: an interface named by its owning node and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub node: NodeId,
    pub port: PortNumber,
}

/// Configuration for one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Total capacity in bytes per tick.
    pub bandwidth: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self { bandwidth: 1500 }
    }
}

/// A point-to-point channel between two interfaces.
///
/// Load accounting is per tick: the engine resets `current_load` at the start
/// of every tick, and a transmission whose size would push the load past the
/// bandwidth is dropped whole. There is no partial delivery and no carryover
/// of load across ticks.
#[derive(Debug, Clone)]
pub struct Link {
    endpoints: [Attachment; 2],
    bandwidth: u32,
    current_load: u32,
    pub(crate) dropped: u64,
}

impl Link {
    pub(crate) fn new(a: Attachment, b: Attachment, config: LinkConfig) -> Self {
        Self {
            endpoints: [a, b],
            bandwidth: config.bandwidth,
            current_load: 0,
            dropped: 0,
        }
    }

    pub fn bandwidth(&self) -> u32 {
        self.bandwidth
    }

    pub fn current_load(&self) -> u32 {
        self.current_load
    }

    pub fn endpoints(&self) -> [Attachment; 2] {
        self.endpoints
    }

    /// Frames lost to bandwidth exhaustion over the link's lifetime.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// The endpoint opposite the given sender.
    pub fn other_endpoint(&self, from: Attachment) -> Attachment {
        if self.endpoints[0] == from {
            self.endpoints[1]
        } else {
            self.endpoints[0]
        }
    }

    /// Tries to reserve capacity for a frame of `size` bytes this tick.
    /// Returns false, charging nothing, when the frame does not fit.
    pub(crate) fn reserve(&mut self, size: u32) -> bool {
        match self.current_load.checked_add(size) {
            Some(load) if load <= self.bandwidth => {
                self.current_load = load;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn reset_load(&mut self) {
        self.current_load = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(node: usize, port: PortNumber) -> Attachment {
        Attachment {
            node: NodeId::new(node),
            port,
        }
    }

    fn link(bandwidth: u32) -> Link {
        Link::new(
            attachment(0, 1),
            attachment(1, 1),
            LinkConfig { bandwidth },
        )
    }

    #[test]
    fn second_oversized_reservation_is_rejected() {
        let mut link = link(100);
        assert!(link.reserve(60));
        assert!(!link.reserve(60));
        assert_eq!(link.current_load(), 60);
    }

    #[test]
    fn load_resets_each_tick() {
        let mut link = link(100);
        assert!(link.reserve(100));
        assert!(!link.reserve(1));
        link.reset_load();
        assert!(link.reserve(100));
    }

    #[test]
    fn other_endpoint_flips() {
        let link = link(100);
        assert_eq!(link.other_endpoint(attachment(0, 1)), attachment(1, 1));
        assert_eq!(link.other_endpoint(attachment(1, 1)), attachment(0, 1));
    }
}
