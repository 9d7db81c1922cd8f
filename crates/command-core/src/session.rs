//! Session bookkeeping, independent of command execution.

use crate::InterfaceKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 hex digits, for narration and logs.
    pub fn short(&self) -> String {
        self.0.simple().to_string().chars().take(8).collect()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub interface: InterfaceKind,
    pub created_at: OffsetDateTime,
    pub last_activity: OffsetDateTime,
}

impl Session {
    pub fn age(&self) -> time::Duration {
        OffsetDateTime::now_utc() - self.created_at
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_session(&self, interface: InterfaceKind) -> SessionId {
        let now = OffsetDateTime::now_utc();
        let id = SessionId::new();
        self.sessions.lock().insert(
            id,
            Session {
                id,
                interface,
                created_at: now,
                last_activity: now,
            },
        );
        tracing::info!(session = %id, %interface, "session created");
        id
    }

    /// Remove a session. Returns `false` if it was not registered.
    pub fn end_session(&self, id: &SessionId) -> bool {
        let removed = self.sessions.lock().remove(id).is_some();
        if removed {
            tracing::info!(session = %id, "session ended");
        } else {
            tracing::debug!(session = %id, "end_session for unknown session");
        }
        removed
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// Refresh `last_activity`. Unknown ids are left untouched.
    pub fn touch(&self, id: &SessionId) -> bool {
        match self.sessions.lock().get_mut(id) {
            Some(session) => {
                session.last_activity = OffsetDateTime::now_utc();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_by_interface(&self) -> HashMap<InterfaceKind, usize> {
        let mut counts = HashMap::new();
        for session in self.sessions.lock().values() {
            *counts.entry(session.interface).or_insert(0) += 1;
        }
        counts
    }

    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Drop every session; returns how many were registered.
    pub fn end_all(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let n = sessions.len();
        sessions.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_end() {
        let reg = SessionRegistry::new();
        let id = reg.create_session(InterfaceKind::Cli);
        assert!(reg.contains(&id));
        assert!(reg.end_session(&id));
        assert!(!reg.end_session(&id));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_ending_one_session_leaves_others() {
        let reg = SessionRegistry::new();
        let a = reg.create_session(InterfaceKind::Cli);
        let b = reg.create_session(InterfaceKind::Sui);
        let before = reg.get(&b).unwrap();
        assert!(reg.end_session(&a));
        let after = reg.get(&b).unwrap();
        assert_eq!(before.id, after.id);
        assert_eq!(before.interface, after.interface);
        assert_eq!(before.created_at, after.created_at);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_touch_unknown_is_noop() {
        let reg = SessionRegistry::new();
        reg.create_session(InterfaceKind::Api);
        assert!(!reg.touch(&SessionId::new()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_ids_are_unique_and_parse() {
        let reg = SessionRegistry::new();
        let a = reg.create_session(InterfaceKind::Tui);
        let b = reg.create_session(InterfaceKind::Tui);
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<SessionId>().unwrap(), a);
        assert_eq!(a.short().len(), 8);
        assert_eq!(reg.count_by_interface().get(&InterfaceKind::Tui), Some(&2));
    }
}
