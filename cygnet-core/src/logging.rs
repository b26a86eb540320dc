//! Wrapper functions for logging simulation events.
//!
//! Each function corresponds to one type of event (drops, power transitions,
//! ACL denies, ...). They are called from inside the core so that every
//! module emits events with the same targets and fields; collaborators choose
//! the subscriber and the output format.

use crate::frame::DropReason;
use crate::id::{PortNumber, Tick};
use tracing::{event, Level};

/// A frame was dropped. Drops are silent for the simulation but observable
/// here and through counters.
pub(crate) fn drop_event(tick: Tick, node: &str, reason: DropReason) {
    event!(target: "DROP", Level::DEBUG, tick, node, reason = %reason);
}

/// A node's power state changed.
pub(crate) fn power_event(tick: Tick, node: &str, state: &str) {
    event!(target: "POWER", Level::INFO, tick, node, state);
}

/// An interface was enabled or disabled. Emitted only on an actual
/// transition, never for idempotent repeats.
pub(crate) fn interface_event(node: &str, port: PortNumber, enabled: bool) {
    event!(target: "INTERFACE", Level::INFO, node, port, enabled);
}

/// An ACL rule denied traffic.
pub(crate) fn acl_deny_event(tick: Tick, node: &str, rule_position: Option<usize>) {
    event!(target: "ACL", Level::INFO, tick, node, rule_position);
}

/// An installed software changed operating state.
pub(crate) fn software_event(node: &str, software: &str, state: &str) {
    event!(target: "SOFTWARE", Level::INFO, node, software, state);
}

/// An ARP request or reply was sent.
pub(crate) fn arp_event(tick: Tick, node: &str, detail: &str) {
    event!(target: "ARP", Level::DEBUG, tick, node, detail);
}

/// A payload was delivered to installed software.
pub(crate) fn delivery_event(tick: Tick, node: &str, port: u16, bytes: usize) {
    event!(target: "MESSAGE", Level::DEBUG, tick, node, port, bytes);
}
