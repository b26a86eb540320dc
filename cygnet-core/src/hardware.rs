//! Physical-layer entities: interfaces, links, and shared wireless airspace.

pub mod airspace;
pub mod interface;
pub mod link;

pub use airspace::{AirSpace, Frequency};
pub use interface::{InterfaceConfig, Medium, NetworkInterface};
pub use link::{Attachment, Link, LinkConfig};
