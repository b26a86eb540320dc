//! A discrete-timestep simulation of computer networks, built for training
//! and evaluating autonomous cyber-defence agents.
//!
//! Cygnet models a network as an arena of nodes joined by bandwidth-limited
//! links and a shared wireless airspace. Nodes carry interfaces, an ARP
//! cache, tracked sessions, and installed software with a full operating
//! lifecycle, including the degraded states an attacker induces and a
//! defender repairs. Switches learn hardware addresses, routers forward by
//! longest prefix behind access lists, and firewalls filter between zones.
//!
//! # Organization
//! - [`Message`], [`Frame`](frame::Frame), and the address types are the
//!   data plane's vocabulary
//! - [`Node`], [`Switch`](switch::Switch), [`Router`](router::Router), and
//!   [`Firewall`](firewall::Firewall) hold per-device state
//! - [`Network`] owns everything and drives the simulation one
//!   [`step`](Network::step) at a time
//! - [`Request`](request::Request) and
//!   [`snapshot`](Network::snapshot) are the two surfaces external
//!   collaborators touch: one mutates, one observes
//!
//! # Determinism
//!
//! Stepping is synchronous and single-threaded. Nodes advance in creation
//! order and every frame sent during a tick is resolved before the tick
//! ends, so the same topology and the same requests always produce the same
//! trace.

mod logging;

pub mod acl;
pub mod address;
pub mod firewall;
pub mod frame;
pub mod hardware;
pub mod id;
pub mod request;
pub mod router;
pub mod session;
pub mod snapshot;
pub mod software;
pub mod switch;

pub mod message;
pub use message::Message;

pub mod node;
pub use node::{Node, NodeConfig, NodeRole, PowerState};

pub mod network;
pub use network::Network;

pub use address::{Cidr, IpConfig, Ipv4Address, Ipv4Mask};
pub use frame::{IpProtocol, Mac, TrafficOrigin};
pub use id::{LinkId, NodeId, PortNumber, SessionId, Tick};
pub use request::{Request, RequestResponse, RequestStatus};
pub use software::{Software, SoftwareConfig, SoftwareRegistry, SoftwareState};
