//! Session-scoped state keyed by the `Mcp-Session-Id` header (spec.md
//! §4.5). Grounded on `gateway-crypto::pkce::StateStore`'s
//! `DashMap`-plus-TTL shape, minus the one-time `take()` semantics: a
//! session is read many times over its life and only removed explicitly
//! (`DELETE`) or when it goes idle past the TTL sweep.

use dashmap::DashMap;
use gateway_core::Clock;
use std::sync::Arc;
use std::time::Duration;

/// How long a session may sit idle before [`SessionTable::sweep`] reaps it.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Per-session state established by `initialize` (spec.md §4.5's "session
/// lifecycle": the agent identity a session carries never changes after
/// `initialize`, and never defaults to a hard-coded value).
#[derive(Debug, Clone)]
pub struct SessionState {
    pub agent: String,
    pub agent_version: Option<String>,
    pub created_at_ms: u64,
    pub last_active_ms: u64,
}

/// The live session table. Cheap to clone (shares the underlying map via
/// `Arc`/`DashMap`'s own internal sharding).
#[derive(Clone)]
pub struct SessionTable {
    sessions: Arc<DashMap<String, SessionState>>,
    clock: Arc<dyn Clock>,
}

impl SessionTable {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { sessions: Arc::new(DashMap::new()), clock }
    }

    /// Create a new session for a successful `initialize`, returning its id.
    pub fn create(&self, agent: String, agent_version: Option<String>) -> String {
        let id = gateway_core::ids::new_session_id();
        let now = self.clock.now_ms();
        self.sessions.insert(id.clone(), SessionState { agent, agent_version, created_at_ms: now, last_active_ms: now });
        id
    }

    /// Look up a session by id, bumping its `last_active_ms` on a hit.
    pub fn touch(&self, id: &str) -> Option<SessionState> {
        let mut entry = self.sessions.get_mut(id)?;
        entry.last_active_ms = self.clock.now_ms();
        Some(entry.clone())
    }

    /// Explicitly tear down a session (`DELETE`).
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Drop every session idle past [`SESSION_TTL`].
    pub fn sweep(&self) {
        let now = self.clock.now_ms();
        let ttl_ms = SESSION_TTL.as_millis() as u64;
        self.sessions.retain(|_, s| now.saturating_sub(s.last_active_ms) < ttl_ms);
    }

    /// Drop every session unconditionally (process shutdown).
    pub fn clear(&self) {
        self.sessions.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::FrozenClock;

    #[test]
    fn create_then_touch_round_trips_agent_identity() {
        let table = SessionTable::new(Arc::new(FrozenClock::new(0)));
        let id = table.create("agent-smith".into(), Some("1.2.3".into()));
        let state = table.touch(&id).unwrap();
        assert_eq!(state.agent, "agent-smith");
        assert_eq!(state.agent_version, Some("1.2.3".into()));
    }

    #[test]
    fn unknown_session_is_none() {
        let table = SessionTable::new(Arc::new(FrozenClock::new(0)));
        assert!(table.touch("no-such-session").is_none());
    }

    #[test]
    fn remove_tears_down_a_session() {
        let table = SessionTable::new(Arc::new(FrozenClock::new(0)));
        let id = table.create("agent".into(), None);
        assert!(table.remove(&id));
        assert!(table.touch(&id).is_none());
    }

    #[test]
    fn clear_drops_every_session_regardless_of_age() {
        let table = SessionTable::new(Arc::new(FrozenClock::new(0)));
        table.create("agent-a".into(), None);
        table.create("agent-b".into(), None);
        assert_eq!(table.len(), 2);
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn sweep_reaps_idle_sessions_past_ttl() {
        let clock = Arc::new(FrozenClock::new(0));
        let table = SessionTable::new(clock.clone());
        table.create("agent".into(), None);
        assert_eq!(table.len(), 1);
        clock.advance_ms(SESSION_TTL.as_millis() as u64 + 1);
        table.sweep();
        assert!(table.is_empty());
    }
}
