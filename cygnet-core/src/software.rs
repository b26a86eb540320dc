//! Installed software: services and applications, their lifecycle state
//! machine, and the per-node manager that dispatches inbound payloads.
//!
//! Software behavior is pluggable through the [`Software`] trait; concrete
//! implementations live outside the core and are constructed through a
//! [`SoftwareRegistry`], a mapping from software-type names to factory
//! functions validated when the registry is assembled.

use crate::address::Ipv4Address;
use crate::frame::{IpProtocol, TrafficOrigin};
use crate::id::{SessionId, Tick};
use crate::logging;
use crate::message::Message;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

/// The operating state of one installed software.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftwareState {
    Installing,
    Running,
    /// Entered only through the owning node powering off.
    Stopped,
    Fixing,
    Compromised,
    Overwhelmed,
}

impl SoftwareState {
    /// Whether the software accepts inbound payloads. Compromised software
    /// keeps operating; that is what makes compromise worth detecting.
    pub fn accepts_traffic(self) -> bool {
        matches!(self, Self::Running | Self::Compromised)
    }

    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Compromised | Self::Overwhelmed)
    }
}

impl Display for SoftwareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Installing => "installing",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Fixing => "fixing",
            Self::Compromised => "compromised",
            Self::Overwhelmed => "overwhelmed",
        };
        write!(f, "{}", text)
    }
}

/// Whether an installed software is a listening service or a user-facing
/// application. The request interface addresses the two categories
/// separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftwareCategory {
    Service,
    Application,
}

/// Configuration for one software install, validated at install time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareConfig {
    /// The instance name, unique within the owning node.
    pub name: String,
    /// The software-type name resolved through the [`SoftwareRegistry`].
    pub software_type: String,
    pub category: SoftwareCategory,
    pub protocol: IpProtocol,
    /// The listening port. Also used as the source port for traffic the
    /// software originates.
    pub port: u16,
    /// How many ticks a fix takes to complete.
    pub fix_duration: u32,
    /// The classification stamped on traffic this software originates.
    pub origin: TrafficOrigin,
    /// Free-form options interpreted by the concrete software type.
    pub options: Vec<(String, String)>,
}

impl SoftwareConfig {
    pub fn service(name: impl Into<String>, software_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            software_type: software_type.into(),
            category: SoftwareCategory::Service,
            protocol: IpProtocol::Tcp,
            port: 80,
            fix_duration: 2,
            origin: TrafficOrigin::Green,
            options: Vec::new(),
        }
    }

    pub fn application(name: impl Into<String>, software_type: impl Into<String>) -> Self {
        Self {
            category: SoftwareCategory::Application,
            ..Self::service(name, software_type)
        }
    }

    pub fn with_endpoint(mut self, protocol: IpProtocol, port: u16) -> Self {
        self.protocol = protocol;
        self.port = port;
        self
    }

    pub fn with_origin(mut self, origin: TrafficOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_fix_duration(mut self, ticks: u32) -> Self {
        self.fix_duration = ticks;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// The value of a free-form option, if set.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// An outbound effect requested by software while it ran.
///
/// Software never touches the network directly; it queues actions that the
/// engine applies after the call returns. That keeps frame handling free of
/// reentrancy: processing one frame can queue a second send, but never
/// re-enter the component mid-call.
#[derive(Debug, Clone)]
pub enum SoftwareAction {
    /// Open (or reuse) a conversation to the destination and send.
    Send {
        protocol: IpProtocol,
        dst: Ipv4Address,
        dst_port: u16,
        src_port: u16,
        payload: Message,
        origin: TrafficOrigin,
    },
    /// Send on an existing conversation, back toward the remote side.
    Reply {
        session: SessionId,
        payload: Message,
    },
    /// Tear the conversation down.
    Teardown { session: SessionId },
}

/// The context handed to software while it runs.
pub struct SoftwareCtx<'a> {
    pub tick: Tick,
    pub state: SoftwareState,
    origin: TrafficOrigin,
    src_port: u16,
    actions: &'a mut Vec<SoftwareAction>,
}

impl SoftwareCtx<'_> {
    /// Queues a send to the given destination.
    pub fn send(&mut self, protocol: IpProtocol, dst: Ipv4Address, dst_port: u16, payload: Message) {
        self.actions.push(SoftwareAction::Send {
            protocol,
            dst,
            dst_port,
            src_port: self.src_port,
            payload,
            origin: self.origin,
        });
    }

    /// Queues a reply on an existing session.
    pub fn reply(&mut self, session: SessionId, payload: Message) {
        self.actions.push(SoftwareAction::Reply { session, payload });
    }

    /// Queues a session teardown.
    pub fn teardown(&mut self, session: SessionId) {
        self.actions.push(SoftwareAction::Teardown { session });
    }
}

/// The behavior of one software type.
///
/// Implementations hold whatever per-instance state they need; lifecycle
/// state lives in the surrounding [`InstalledSoftware`] and is visible
/// through the context.
pub trait Software: Send {
    /// The software-type name, matching its registry key.
    fn kind(&self) -> &'static str;

    /// Called when a payload is dispatched to this software's port.
    fn receive(&mut self, ctx: &mut SoftwareCtx, session: SessionId, message: Message);

    /// Called once per tick while the owning node is on, for scheduled work.
    fn tick(&mut self, _ctx: &mut SoftwareCtx) {}

    /// Downcasting hook so simulations can inspect concrete software state.
    fn as_any(&self) -> &dyn Any;
}

type SoftwareFactory = Box<dyn Fn(&SoftwareConfig) -> Box<dyn Software> + Send>;

/// A mapping from software-type names to constructor functions.
#[derive(Default)]
pub struct SoftwareRegistry {
    factories: FxHashMap<String, SoftwareFactory>,
}

impl SoftwareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for a software-type name. Registering the same
    /// name twice is a configuration mistake caught at startup.
    pub fn register(
        &mut self,
        software_type: impl Into<String>,
        factory: impl Fn(&SoftwareConfig) -> Box<dyn Software> + Send + 'static,
    ) -> Result<(), SoftwareError> {
        let software_type = software_type.into();
        if self.factories.contains_key(&software_type) {
            return Err(SoftwareError::DuplicateType(software_type));
        }
        self.factories.insert(software_type, Box::new(factory));
        Ok(())
    }

    pub fn build(&self, config: &SoftwareConfig) -> Result<Box<dyn Software>, SoftwareError> {
        let factory = self
            .factories
            .get(&config.software_type)
            .ok_or_else(|| SoftwareError::UnknownType(config.software_type.clone()))?;
        Ok(factory(config))
    }
}

const INSTALL_DURATION: u32 = 1;

/// One installed software instance: its identity, lifecycle state, and
/// behavior.
pub struct InstalledSoftware {
    config: SoftwareConfig,
    state: SoftwareState,
    install_remaining: u32,
    fix_remaining: u32,
    /// The state to restore when the node powers back on.
    resume_state: Option<SoftwareState>,
    behavior: Box<dyn Software>,
}

impl InstalledSoftware {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SoftwareConfig {
        &self.config
    }

    pub fn state(&self) -> SoftwareState {
        self.state
    }

    pub fn fix_remaining(&self) -> u32 {
        self.fix_remaining
    }

    /// The concrete behavior, for downcasting in tests and observers.
    pub fn behavior(&self) -> &dyn Software {
        self.behavior.as_ref()
    }

    fn set_state(&mut self, node: &str, state: SoftwareState) {
        if self.state != state {
            self.state = state;
            logging::software_event(node, &self.config.name, &state.to_string());
        }
    }
}

/// The registry of software installed on one node, keyed by listening port
/// and protocol.
///
/// Owned by its [`Node`](crate::Node) and torn down with it; there is no
/// process-wide software state.
#[derive(Default)]
pub struct SoftwareManager {
    installed: BTreeMap<(u16, IpProtocol), InstalledSoftware>,
}

impl SoftwareManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs software from its validated config. Fails if the node
    /// already has software bound to the same port and protocol, or under a
    /// duplicate instance name; on failure nothing is left behind.
    pub fn install(
        &mut self,
        node: &str,
        registry: &SoftwareRegistry,
        config: SoftwareConfig,
    ) -> Result<(), SoftwareError> {
        let key = (config.port, config.protocol);
        if self.installed.contains_key(&key) {
            return Err(SoftwareError::PortInUse {
                port: config.port,
                protocol: config.protocol,
            });
        }
        if self.find(&config.name).is_some() {
            return Err(SoftwareError::DuplicateName(config.name));
        }
        let behavior = registry.build(&config)?;
        logging::software_event(node, &config.name, "installing");
        self.installed.insert(
            key,
            InstalledSoftware {
                config,
                state: SoftwareState::Installing,
                install_remaining: INSTALL_DURATION,
                fix_remaining: 0,
                resume_state: None,
                behavior,
            },
        );
        Ok(())
    }

    /// Removes the named software entirely.
    pub fn uninstall(&mut self, node: &str, name: &str) -> Result<(), SoftwareError> {
        let key = self
            .installed
            .iter()
            .find(|(_, software)| software.config.name == name)
            .map(|(key, _)| *key)
            .ok_or_else(|| SoftwareError::UnknownSoftware(name.to_string()))?;
        self.installed.remove(&key);
        logging::software_event(node, name, "uninstalled");
        Ok(())
    }

    /// The named software, if installed.
    pub fn find(&self, name: &str) -> Option<&InstalledSoftware> {
        self.installed
            .values()
            .find(|software| software.config.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut InstalledSoftware, SoftwareError> {
        self.installed
            .values_mut()
            .find(|software| software.config.name == name)
            .ok_or_else(|| SoftwareError::UnknownSoftware(name.to_string()))
    }

    /// Installed software in port order, for snapshots.
    pub fn iter(&self) -> impl Iterator<Item = &InstalledSoftware> {
        self.installed.values()
    }

    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    /// Marks the named software compromised. Only running software can be
    /// compromised.
    pub fn compromise(&mut self, node: &str, name: &str) -> Result<(), SoftwareError> {
        self.transition(node, name, SoftwareState::Compromised)
    }

    /// Marks the named software overwhelmed, as by resource exhaustion.
    pub fn overwhelm(&mut self, node: &str, name: &str) -> Result<(), SoftwareError> {
        self.transition(node, name, SoftwareState::Overwhelmed)
    }

    fn transition(
        &mut self,
        node: &str,
        name: &str,
        target: SoftwareState,
    ) -> Result<(), SoftwareError> {
        let software = self.find_mut(name)?;
        if software.state != SoftwareState::Running {
            return Err(SoftwareError::InvalidTransition {
                name: name.to_string(),
                from: software.state,
                to: target,
            });
        }
        software.set_state(node, target);
        Ok(())
    }

    /// Starts fixing the named software. Valid only from a degraded state;
    /// the fix completes after the configured duration.
    pub fn fix(&mut self, node: &str, name: &str) -> Result<(), SoftwareError> {
        let software = self.find_mut(name)?;
        if !software.state.is_degraded() {
            return Err(SoftwareError::InvalidTransition {
                name: name.to_string(),
                from: software.state,
                to: SoftwareState::Fixing,
            });
        }
        software.fix_remaining = software.config.fix_duration;
        software.set_state(node, SoftwareState::Fixing);
        Ok(())
    }

    /// Advances install and fix countdowns and gives each software its tick,
    /// collecting the actions they queued. Called only while the node is on.
    pub fn apply_timestep(&mut self, node: &str, tick: Tick) -> Vec<SoftwareAction> {
        let mut actions = Vec::new();
        for software in self.installed.values_mut() {
            match software.state {
                SoftwareState::Installing => {
                    software.install_remaining = software.install_remaining.saturating_sub(1);
                    if software.install_remaining == 0 {
                        software.set_state(node, SoftwareState::Running);
                    }
                }
                SoftwareState::Fixing => {
                    software.fix_remaining = software.fix_remaining.saturating_sub(1);
                    if software.fix_remaining == 0 {
                        software.set_state(node, SoftwareState::Running);
                    }
                }
                _ => {}
            }
            if software.state.accepts_traffic() {
                let mut ctx = SoftwareCtx {
                    tick,
                    state: software.state,
                    origin: software.config.origin,
                    src_port: software.config.port,
                    actions: &mut actions,
                };
                software.behavior.tick(&mut ctx);
            }
        }
        actions
    }

    /// Routes an inbound payload to the software listening on the port.
    /// Returns `None` when no software accepts it; that is a closed port,
    /// not an error.
    pub fn dispatch(
        &mut self,
        node: &str,
        tick: Tick,
        protocol: IpProtocol,
        port: u16,
        session: SessionId,
        message: Message,
    ) -> Option<Vec<SoftwareAction>> {
        let software = self.installed.get_mut(&(port, protocol))?;
        if !software.state.accepts_traffic() {
            return None;
        }
        logging::delivery_event(tick, node, port, message.len());
        let mut actions = Vec::new();
        let mut ctx = SoftwareCtx {
            tick,
            state: software.state,
            origin: software.config.origin,
            src_port: software.config.port,
            actions: &mut actions,
        };
        software.behavior.receive(&mut ctx, session, message);
        Some(actions)
    }

    /// Stops all software for a node power-off, preserving each instance's
    /// state for resume. A fix in progress does not survive the shutdown:
    /// its countdown restarts from the full duration on resume.
    pub fn stop_all(&mut self, node: &str) {
        for software in self.installed.values_mut() {
            if software.state == SoftwareState::Stopped {
                continue;
            }
            software.resume_state = Some(software.state);
            software.set_state(node, SoftwareState::Stopped);
        }
    }

    /// Resumes all software on power-on, restoring pre-shutdown states.
    pub fn resume_all(&mut self, node: &str) {
        for software in self.installed.values_mut() {
            let Some(resume) = software.resume_state.take() else {
                continue;
            };
            if resume == SoftwareState::Fixing {
                software.fix_remaining = software.config.fix_duration;
            }
            software.set_state(node, resume);
        }
    }
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum SoftwareError {
    #[error("software type {0:?} is already registered")]
    DuplicateType(String),
    #[error("no software type named {0:?} is registered")]
    UnknownType(String),
    #[error("port {port}/{protocol} already has software bound")]
    PortInUse { port: u16, protocol: IpProtocol },
    #[error("software named {0:?} is already installed")]
    DuplicateName(String),
    #[error("no software named {0:?} is installed")]
    UnknownSoftware(String),
    #[error("software {name:?} cannot go from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: SoftwareState,
        to: SoftwareState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Discards everything it receives.
    struct Null;

    impl Software for Null {
        fn kind(&self) -> &'static str {
            "null"
        }

        fn receive(&mut self, _ctx: &mut SoftwareCtx, _session: SessionId, _message: Message) {}

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn registry() -> SoftwareRegistry {
        let mut registry = SoftwareRegistry::new();
        registry.register("null", |_| Box::new(Null)).unwrap();
        registry
    }

    fn manager_with(config: SoftwareConfig) -> SoftwareManager {
        let mut manager = SoftwareManager::new();
        manager.install("node", &registry(), config).unwrap();
        manager
    }

    fn web_config() -> SoftwareConfig {
        SoftwareConfig::service("web", "null").with_endpoint(IpProtocol::Tcp, 80)
    }

    #[test]
    fn install_runs_after_one_tick() {
        let mut manager = manager_with(web_config());
        assert_eq!(manager.find("web").unwrap().state(), SoftwareState::Installing);
        manager.apply_timestep("node", 1);
        assert_eq!(manager.find("web").unwrap().state(), SoftwareState::Running);
    }

    #[test]
    fn conflicting_port_binding_fails() {
        let mut manager = manager_with(web_config());
        let conflict = SoftwareConfig::service("web2", "null").with_endpoint(IpProtocol::Tcp, 80);
        assert_eq!(
            manager.install("node", &registry(), conflict),
            Err(SoftwareError::PortInUse {
                port: 80,
                protocol: IpProtocol::Tcp
            })
        );
        // A different protocol on the same port is fine.
        let udp = SoftwareConfig::service("web3", "null").with_endpoint(IpProtocol::Udp, 80);
        assert!(manager.install("node", &registry(), udp).is_ok());
    }

    #[test]
    fn fix_requires_a_degraded_state() {
        let mut manager = manager_with(web_config());
        manager.apply_timestep("node", 1);
        assert!(manager.fix("node", "web").is_err());
        manager.compromise("node", "web").unwrap();
        manager.fix("node", "web").unwrap();
        assert_eq!(manager.find("web").unwrap().state(), SoftwareState::Fixing);
        manager.apply_timestep("node", 2);
        manager.apply_timestep("node", 3);
        assert_eq!(manager.find("web").unwrap().state(), SoftwareState::Running);
    }

    #[test]
    fn compromise_requires_running() {
        let mut manager = manager_with(web_config());
        // Still installing.
        assert!(manager.compromise("node", "web").is_err());
    }

    #[test]
    fn power_cycle_preserves_degraded_state() {
        let mut manager = manager_with(web_config());
        manager.apply_timestep("node", 1);
        manager.compromise("node", "web").unwrap();
        manager.stop_all("node");
        assert_eq!(manager.find("web").unwrap().state(), SoftwareState::Stopped);
        manager.resume_all("node");
        assert_eq!(
            manager.find("web").unwrap().state(),
            SoftwareState::Compromised
        );
    }

    #[test]
    fn power_cycle_restarts_a_fix() {
        let mut manager = manager_with(web_config().with_fix_duration(5));
        manager.apply_timestep("node", 1);
        manager.compromise("node", "web").unwrap();
        manager.fix("node", "web").unwrap();
        // Burn most of the countdown, then power-cycle.
        manager.apply_timestep("node", 2);
        manager.apply_timestep("node", 3);
        manager.stop_all("node");
        manager.resume_all("node");
        assert_eq!(manager.find("web").unwrap().state(), SoftwareState::Fixing);
        assert_eq!(manager.find("web").unwrap().fix_remaining(), 5);
    }

    #[test]
    fn dispatch_to_closed_port_is_none() {
        let mut manager = manager_with(web_config());
        manager.apply_timestep("node", 1);
        let message = Message::new("x");
        assert!(manager
            .dispatch("node", 2, IpProtocol::Udp, 9999, SessionId::new(1), message)
            .is_none());
    }

    #[test]
    fn uninstall_removes_the_binding() {
        let mut manager = manager_with(web_config());
        manager.uninstall("node", "web").unwrap();
        assert!(manager.find("web").is_none());
        assert!(manager.install("node", &registry(), web_config()).is_ok());
    }
}
