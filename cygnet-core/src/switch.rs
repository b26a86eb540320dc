//! Link-layer switching: MAC-address learning and forwarding.

use crate::frame::Mac;
use crate::id::PortNumber;
use rustc_hash::FxHashMap;

/// Where a switch sends a frame it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchDecision {
    /// The destination was learned on a single other port.
    Unicast(PortNumber),
    /// Unknown destination or broadcast: every enabled port except ingress.
    Flood,
    /// The destination was learned on the ingress port; the frame is already
    /// where it needs to be.
    Drop,
}

/// The learning state of a switch.
///
/// The MAC table maps each observed source address to the port it was last
/// seen on. Entries are overwritten, never merged: a host that moves between
/// ports is re-learned at its new port by its next frame.
#[derive(Debug, Default)]
pub struct Switch {
    mac_table: FxHashMap<Mac, PortNumber>,
}

impl Switch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `source` was observed on `port`, then decides where the
    /// frame goes based on its destination.
    pub fn process(&mut self, port: PortNumber, source: Mac, destination: Mac) -> SwitchDecision {
        self.mac_table.insert(source, port);
        if destination.is_broadcast() {
            return SwitchDecision::Flood;
        }
        match self.mac_table.get(&destination) {
            Some(&learned) if learned == port => SwitchDecision::Drop,
            Some(&learned) => SwitchDecision::Unicast(learned),
            None => SwitchDecision::Flood,
        }
    }

    /// The learned port for a hardware address, if any.
    pub fn learned_port(&self, mac: Mac) -> Option<PortNumber> {
        self.mac_table.get(&mac).copied()
    }

    /// The MAC table in no particular order, for snapshots.
    pub fn mac_table(&self) -> impl Iterator<Item = (Mac, PortNumber)> + '_ {
        self.mac_table.iter().map(|(mac, port)| (*mac, *port))
    }

    pub fn table_len(&self) -> usize {
        self.mac_table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Mac = Mac::new([2, 0, 0, 0, 0, 0xa]);
    const B: Mac = Mac::new([2, 0, 0, 0, 0, 0xb]);

    #[test]
    fn unknown_destination_floods() {
        let mut switch = Switch::new();
        assert_eq!(switch.process(1, A, B), SwitchDecision::Flood);
        assert_eq!(switch.learned_port(A), Some(1));
    }

    #[test]
    fn learned_destination_is_unicast() {
        let mut switch = Switch::new();
        switch.process(1, A, Mac::BROADCAST);
        switch.process(2, B, A);
        assert_eq!(switch.process(1, A, B), SwitchDecision::Unicast(2));
    }

    #[test]
    fn destination_on_ingress_port_is_dropped() {
        let mut switch = Switch::new();
        switch.process(1, B, Mac::BROADCAST);
        assert_eq!(switch.process(1, A, B), SwitchDecision::Drop);
    }

    #[test]
    fn entries_are_overwritten_not_merged() {
        let mut switch = Switch::new();
        switch.process(1, A, Mac::BROADCAST);
        switch.process(2, A, Mac::BROADCAST);
        assert_eq!(switch.learned_port(A), Some(2));
        assert_eq!(switch.table_len(), 1);
    }

    #[test]
    fn broadcast_always_floods() {
        let mut switch = Switch::new();
        switch.process(1, A, Mac::BROADCAST);
        assert_eq!(switch.process(2, B, Mac::BROADCAST), SwitchDecision::Flood);
    }
}
