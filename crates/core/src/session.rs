//! In-memory session store.
//!
//! Holds the extracted material text, character and creative direction for
//! the short window between the REST `/story/start` call and the WebSocket
//! `/story/stream` connection.
//!
//! Sessions are one-shot: removed by the first retrieval attempt or by the
//! periodic sweep, whichever happens first. The store is in-process and not
//! durable; a production deployment would swap it for a shared store with
//! native per-key expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::story::Character;

/// Maximum session age. Five minutes is plenty of time to open the WebSocket.
pub const SESSION_TTL: Duration = Duration::from_secs(300);

/// Everything needed to start generation, captured at upload time.
#[derive(Debug, Clone)]
pub struct Session {
    pub character: Character,
    pub material: String,
    pub prompt: String,
    pub user_name: String,
    created_at: Instant,
}

/// TTL-bounded one-shot key-value table keyed by session id.
///
/// All mutations go through a single store-wide lock; every operation is a
/// brief in-memory map touch, so the lock is never held across I/O.
pub struct SessionStore {
    ttl: Duration,
    inner: Mutex<HashMap<String, Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn create(
        &self,
        id: String,
        character: Character,
        material: String,
        prompt: String,
        user_name: String,
    ) {
        let session = Session {
            character,
            material,
            prompt,
            user_name,
            created_at: Instant::now(),
        };
        self.inner.lock().await.insert(id, session);
    }

    /// Removes and returns the session in one critical section, so no two
    /// callers can observe the same session. Entries past the TTL are
    /// removed as well but reported as absent.
    pub async fn consume(&self, id: &str) -> Option<Session> {
        let session = self.inner.lock().await.remove(id)?;
        if session.created_at.elapsed() > self.ttl {
            return None;
        }
        Some(session)
    }

    /// Prunes sessions that were created but never streamed. `consume`
    /// re-checks age on its own, so this only exists to bound memory.
    pub async fn sweep_expired(&self) {
        let ttl = self.ttl;
        self.inner
            .lock()
            .await
            .retain(|_, session| session.created_at.elapsed() <= ttl);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
