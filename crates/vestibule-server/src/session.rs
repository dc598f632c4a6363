//! Per-client session records.
//!
//! Sessions live in memory, keyed by a random UUID carried in the
//! `vestibule_session` cookie. They are lost on restart or after sitting
//! idle past the sweep limit, which also resets the install and branding
//! caches held inside them.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::RwLock,
    time::{self, Instant},
};
use tracing::debug;
use uuid::Uuid;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "vestibule_session";

/// Session token (UUID stored in cookie).
pub type SessionToken = String;

/// Request extension naming the session the gate admitted the request under.
#[derive(Debug, Clone)]
pub struct SessionHandle(pub SessionToken);

/// Authenticated user attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub id: u64,
    pub name: String,
    pub two_fa_enabled: bool,
    pub two_fa_verified: bool,
}

/// Primary/secondary brand colors, always cached together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub primary: String,
    pub secondary: String,
}

/// Presentation settings hydrated once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
    pub logo_path: Option<String>,
    pub palette: Option<Palette>,
    pub site_name: Option<String>,
    pub language: Option<String>,
}

/// Everything the gate remembers about one client between requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub is_installed: Option<bool>,
    pub is_up_to_date: Option<bool>,
    pub user: Option<UserData>,
    pub branding: Branding,
    pub current_project: Option<u64>,
}

impl Session {
    pub fn installed(&self) -> bool {
        self.is_installed == Some(true)
    }

    pub fn up_to_date(&self) -> bool {
        self.is_up_to_date == Some(true)
    }

    /// True when a logged-in user still owes a second factor.
    pub fn awaiting_second_factor(&self) -> bool {
        matches!(&self.user, Some(u) if u.two_fa_enabled && !u.two_fa_verified)
    }
}

struct Entry {
    session: Session,
    last_seen: Instant,
}

impl Entry {
    fn new(session: Session) -> Self {
        Self {
            session,
            last_seen: Instant::now(),
        }
    }
}

/// In-memory session store. Entries idle for longer than the sweep's
/// `max_idle` are evicted by [`SessionStore::spawn_sweep`].
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionToken, Entry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session` under a fresh token and return the token.
    pub async fn insert(&self, session: Session) -> SessionToken {
        let token = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(token.clone(), Entry::new(session));
        token
    }

    /// Snapshot of the session behind `token`, if it exists.
    pub async fn load(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(token).map(|e| e.session.clone())
    }

    /// Apply `f` to the session behind `token` in place and mark it seen.
    /// Returns `None` when the session does not exist; a missing token is
    /// never recreated.
    pub async fn update<R>(&self, token: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(token)?;
        entry.last_seen = Instant::now();
        Some(f(&mut entry.session))
    }

    pub async fn destroy(&self, token: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(token);
    }

    /// Drop every session not seen within `max_idle`. Returns how many went.
    pub async fn prune(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, e| now.duration_since(e.last_seen) < max_idle);
        before - sessions.len()
    }

    /// Spawn a background task pruning idle sessions every `interval`.
    pub fn spawn_sweep(self, interval: Duration, max_idle: Duration) {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                let pruned = self.prune(max_idle).await;
                if pruned > 0 {
                    debug!(pruned, "swept idle sessions");
                }
            }
        });
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
