//! The shared wireless medium.

use crate::id::{NodeId, PortNumber};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A wireless band. All interfaces registered on a frequency share one
/// bandwidth cap per tick.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Frequency {
    Wifi2_4,
    Wifi5,
}

impl Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wifi2_4 => write!(f, "2.4GHz"),
            Self::Wifi5 => write!(f, "5GHz"),
        }
    }
}

const DEFAULT_FREQUENCY_CAPACITY: u32 = 3000;

/// The simulation's one wireless medium.
///
/// Every transmission on a frequency, unicast or broadcast, is charged once
/// against that frequency's remaining capacity for the tick; delivery reaches
/// all registered interfaces on the frequency except the sender, and the
/// receivers filter by destination hardware address as usual.
#[derive(Debug, Default)]
pub struct AirSpace {
    capacities: FxHashMap<Frequency, u32>,
    used: FxHashMap<Frequency, u32>,
    members: Vec<(Frequency, NodeId, PortNumber)>,
}

impl AirSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the bandwidth cap for a frequency, in bytes per tick.
    pub fn set_capacity(&mut self, frequency: Frequency, capacity: u32) {
        self.capacities.insert(frequency, capacity);
    }

    pub fn capacity(&self, frequency: Frequency) -> u32 {
        self.capacities
            .get(&frequency)
            .copied()
            .unwrap_or(DEFAULT_FREQUENCY_CAPACITY)
    }

    pub(crate) fn register(&mut self, frequency: Frequency, node: NodeId, port: PortNumber) {
        self.members.push((frequency, node, port));
    }

    /// All interfaces on the frequency except the sender, in registration
    /// order for determinism.
    pub(crate) fn receivers(
        &self,
        frequency: Frequency,
        sender: (NodeId, PortNumber),
    ) -> Vec<(NodeId, PortNumber)> {
        self.members
            .iter()
            .filter(|(f, node, port)| *f == frequency && (*node, *port) != sender)
            .map(|(_, node, port)| (*node, *port))
            .collect()
    }

    /// Tries to reserve capacity on a frequency for this tick.
    pub(crate) fn reserve(&mut self, frequency: Frequency, size: u32) -> bool {
        let capacity = self.capacity(frequency);
        let used = self.used.entry(frequency).or_insert(0);
        match used.checked_add(size) {
            Some(total) if total <= capacity => {
                *used = total;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn reset_load(&mut self) {
        self.used.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_capacity_is_shared() {
        let mut airspace = AirSpace::new();
        airspace.set_capacity(Frequency::Wifi2_4, 100);
        assert!(airspace.reserve(Frequency::Wifi2_4, 60));
        assert!(!airspace.reserve(Frequency::Wifi2_4, 60));
        // The other band is unaffected.
        assert!(airspace.reserve(Frequency::Wifi5, 60));
        airspace.reset_load();
        assert!(airspace.reserve(Frequency::Wifi2_4, 60));
    }

    #[test]
    fn receivers_exclude_the_sender() {
        let mut airspace = AirSpace::new();
        let a = (NodeId::new(0), 1);
        let b = (NodeId::new(1), 1);
        let c = (NodeId::new(2), 1);
        airspace.register(Frequency::Wifi2_4, a.0, a.1);
        airspace.register(Frequency::Wifi2_4, b.0, b.1);
        airspace.register(Frequency::Wifi5, c.0, c.1);
        assert_eq!(airspace.receivers(Frequency::Wifi2_4, a), vec![b]);
    }
}
