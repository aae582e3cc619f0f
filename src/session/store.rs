//! In-memory per-user upload sessions.
//!
//! The store owns every piece of mutable upload state. Decisions that must be
//! race-free under concurrent delivery (position assignment, album detection,
//! the first-item acknowledgment) all happen inside one critical section of
//! the store mutex.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Upload state for one user. Created on the first accepted item, destroyed
/// on `/reset` or compilation. Never persisted.
#[derive(Debug, Default)]
pub struct UserSession {
    photos: BTreeMap<u32, PathBuf>,
    notified: bool,
    current_album: Option<String>,
    next_position: u32,
    awaiting_name: bool,
}

impl UserSession {
    /// Staged photo paths in ascending position order.
    pub fn ordered_photos(&self) -> Vec<PathBuf> {
        self.photos.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }
}

/// Outcome of admitting one incoming item into a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Position assigned to the item. Unique and strictly increasing within
    /// the session, starting at 1.
    pub position: u32,
    /// Whether this item is the first of its album or standalone run and the
    /// user should be told their photos arrived.
    pub acknowledge: bool,
}

/// Process-wide session map keyed by user id.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, UserSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits one incoming item: creates the session if absent, runs the
    /// album aggregation decision, and assigns the next position.
    ///
    /// An item without an album token is a standalone submission: it clears
    /// the stored album token and is acknowledged only when nothing in the
    /// current run has been acknowledged yet. An item carrying a token that
    /// differs from the stored one opens a fresh batch, which re-arms the
    /// acknowledgment; later items of the same album stay silent. The
    /// `notified` flip happens here, in the same critical section as the
    /// decision, so the acknowledgment fires exactly once even when album
    /// items land concurrently.
    pub fn admit(&self, user_id: i64, album: Option<&str>) -> Admission {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(user_id).or_default();

        match album {
            Some(token) => {
                if session.current_album.as_deref() != Some(token) {
                    session.current_album = Some(token.to_string());
                    session.notified = false;
                }
            }
            None => session.current_album = None,
        }

        let acknowledge = !session.notified;
        if acknowledge {
            session.notified = true;
        }

        session.next_position += 1;
        Admission {
            position: session.next_position,
            acknowledge,
        }
    }

    /// Records the staged file for a previously admitted position. Returns
    /// `false` when the session no longer exists (a concurrent `/reset` won
    /// the race); the caller is expected to discard the file it just wrote.
    pub fn record(&self, user_id: i64, position: u32, path: PathBuf) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&user_id) {
            Some(session) => {
                let previous = session.photos.insert(position, path);
                debug_assert!(previous.is_none(), "position {position} assigned twice");
                true
            }
            None => false,
        }
    }

    /// True when the user has a session holding at least one staged photo.
    pub fn exists_with_items(&self, user_id: i64) -> bool {
        self.sessions
            .lock()
            .get(&user_id)
            .is_some_and(|session| !session.photos.is_empty())
    }

    /// Staged photo paths in ascending position order; empty when there is no
    /// session.
    pub fn ordered_photos(&self, user_id: i64) -> Vec<PathBuf> {
        self.sessions
            .lock()
            .get(&user_id)
            .map(UserSession::ordered_photos)
            .unwrap_or_default()
    }

    /// Evicts the session, returning it for cleanup. Idempotent: an absent
    /// session yields `None`.
    pub fn delete(&self, user_id: i64) -> Option<UserSession> {
        self.sessions.lock().remove(&user_id)
    }

    /// Marks the session as awaiting the document name for `/create`.
    /// Returns `false` (and stays idle) when there is nothing to compile.
    pub fn begin_naming(&self, user_id: i64) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&user_id) {
            Some(session) if !session.photos.is_empty() => {
                session.awaiting_name = true;
                true
            }
            _ => false,
        }
    }

    /// Clears the awaiting-name flag, reporting whether it was set. The next
    /// free-text message consumes the flag whether or not the name turns out
    /// to be usable.
    pub fn end_naming(&self, user_id: i64) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&user_id) {
            Some(session) if session.awaiting_name => {
                session.awaiting_name = false;
                true
            }
            _ => false,
        }
    }
}
