//! Conversation tracking.
//!
//! A [`Session`] holds the state for a single conversation: its protocol and
//! the two endpoints talking. Sessions are created lazily the first time an
//! exchange is observed, reused for traffic with the same key, and expire
//! after a period of inactivity or on explicit teardown. Inbound payloads are
//! tagged with their session before being handed to the
//! [`SoftwareManager`](crate::software::SoftwareManager).

use crate::address::Ipv4Address;
use crate::frame::IpProtocol;
use crate::id::{SessionId, Tick};
use rustc_hash::FxHashMap;

/// One side of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Endpoint {
    pub address: Ipv4Address,
    pub port: u16,
}

impl Endpoint {
    pub const fn new(address: Ipv4Address, port: u16) -> Self {
        Self { address, port }
    }
}

/// The addressing that identifies a conversation from the owning node's point
/// of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub protocol: IpProtocol,
    pub local: Endpoint,
    pub remote: Endpoint,
}

impl SessionKey {
    pub const fn new(protocol: IpProtocol, local: Endpoint, remote: Endpoint) -> Self {
        Self {
            protocol,
            local,
            remote,
        }
    }
}

/// A tracked conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub key: SessionKey,
    /// The tick the session last carried traffic, for expiry.
    pub last_activity: Tick,
}

/// The default inactivity timeout, in ticks.
const DEFAULT_SESSION_TIMEOUT: u64 = 60;

/// Tracks every conversation a node participates in.
///
/// Owned by its [`Node`](crate::Node); there is no process-wide session
/// state. Expired sessions are collected lazily whenever the manager is
/// touched by a new exchange.
#[derive(Debug)]
pub struct SessionManager {
    by_key: FxHashMap<SessionKey, SessionId>,
    by_id: FxHashMap<SessionId, Session>,
    next_id: u64,
    timeout: u64,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            by_key: FxHashMap::default(),
            by_id: FxHashMap::default(),
            next_id: 0,
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Overrides the inactivity timeout, in ticks.
    pub fn set_timeout(&mut self, ticks: u64) {
        self.timeout = ticks;
    }

    /// Looks up or lazily creates the session for an observed exchange and
    /// marks it active at `tick`.
    pub fn note_exchange(&mut self, key: SessionKey, tick: Tick) -> SessionId {
        self.expire(tick);
        if let Some(&id) = self.by_key.get(&key) {
            if let Some(session) = self.by_id.get_mut(&id) {
                session.last_activity = tick;
            }
            return id;
        }
        self.next_id += 1;
        let id = SessionId::new(self.next_id);
        self.by_key.insert(key, id);
        self.by_id.insert(
            id,
            Session {
                id,
                key,
                last_activity: tick,
            },
        );
        id
    }

    /// The session with the given id, if it is still live.
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.by_id.get(&id)
    }

    /// Explicitly tears down a session. Unknown ids are ignored.
    pub fn teardown(&mut self, id: SessionId) {
        if let Some(session) = self.by_id.remove(&id) {
            self.by_key.remove(&session.key);
        }
    }

    /// Drops every session, preserving the id counter so stale identifiers
    /// never resolve to a new conversation.
    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn expire(&mut self, tick: Tick) {
        let timeout = self.timeout;
        let by_key = &mut self.by_key;
        self.by_id.retain(|_, session| {
            let live = tick.saturating_sub(session.last_activity) < timeout;
            if !live {
                by_key.remove(&session.key);
            }
            live
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(local_port: u16, remote_port: u16) -> SessionKey {
        SessionKey::new(
            IpProtocol::Udp,
            Endpoint::new(Ipv4Address::new([10, 0, 0, 1]), local_port),
            Endpoint::new(Ipv4Address::new([10, 0, 0, 2]), remote_port),
        )
    }

    #[test]
    fn repeated_exchanges_reuse_the_session() {
        let mut manager = SessionManager::new();
        let first = manager.note_exchange(key(1024, 80), 1);
        let second = manager.note_exchange(key(1024, 80), 2);
        assert_eq!(first, second);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_sessions() {
        let mut manager = SessionManager::new();
        let first = manager.note_exchange(key(1024, 80), 1);
        let second = manager.note_exchange(key(1025, 80), 1);
        assert_ne!(first, second);
    }

    #[test]
    fn sessions_expire_after_inactivity() {
        let mut manager = SessionManager::new();
        manager.set_timeout(10);
        let id = manager.note_exchange(key(1024, 80), 1);
        // Touching the manager well past the timeout collects the session.
        let later = manager.note_exchange(key(2000, 80), 50);
        assert!(manager.get(id).is_none());
        assert!(manager.get(later).is_some());
    }

    #[test]
    fn teardown_removes_the_session() {
        let mut manager = SessionManager::new();
        let id = manager.note_exchange(key(1024, 80), 1);
        manager.teardown(id);
        assert!(manager.get(id).is_none());
        let reopened = manager.note_exchange(key(1024, 80), 2);
        assert_ne!(reopened, id);
    }
}
