//! Stable identifiers for entities owned by the simulation arenas.
//!
//! Nodes, links, and interfaces refer to one another through these indices
//! rather than through direct references, so the object graph stays acyclic
//! even though the network topology is not.

use std::fmt::{self, Display};

/// One discrete simulation timestep.
pub type Tick = u64;

/// The number identifying an interface slot on a [`Node`](crate::Node).
///
/// Interfaces are keyed by port number within their owning node, so a port
/// number alone only identifies an interface together with a [`NodeId`].
pub type PortNumber = u32;

/// An index into the simulation's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The position of the node in the arena, which is also its creation
    /// order. Timestep iteration follows this order.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// An index into the simulation's link arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(usize);

impl LinkId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Identifies one tracked conversation within a
/// [`SessionManager`](crate::session::SessionManager).
///
/// Session identifiers are allocated monotonically per node and are never
/// reused, so a stale identifier held after teardown simply fails to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}
