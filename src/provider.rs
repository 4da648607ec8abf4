use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::database::{Database, Snapshot};
use crate::session::Session;

/// The in-memory session table.
///
/// The table lock is only held for map lookups and inserts. Per-session state
/// is guarded by each [`Session`]'s own lock.
#[derive(Debug, Default)]
pub(crate) struct Provider {
    sessions: RwLock<HashMap<String, Session>>,
    /// Destroyed tokens mapped to the date after which they may be forgotten.
    tombstones: RwLock<HashMap<String, OffsetDateTime>>,
    databases: RwLock<Vec<Arc<dyn Database>>>,
}

impl Provider {
    pub(crate) fn register_database(&self, db: Arc<dyn Database>) {
        self.databases.write().push(db);
    }

    pub(crate) fn database_count(&self) -> usize {
        self.databases.read().len()
    }

    /// Inserts a new empty session under `token` unless one already exists,
    /// returning whichever is live.
    ///
    /// Only the handle of a session inserted by this call reports
    /// [`Session::is_new`].
    pub(crate) fn init(&self, token: String, expiry_date: OffsetDateTime) -> Session {
        self.tombstones.write().remove(&token);
        let mut created = false;
        let session = self
            .sessions
            .write()
            .entry(token.clone())
            .or_insert_with(|| {
                created = true;
                debug!(token = %token, "created session");
                Session::new(token, expiry_date)
            })
            .clone();
        if created {
            session.into_new()
        } else {
            session
        }
    }

    /// Whether `session` is the one this table holds under its id.
    pub(crate) fn holds(&self, session: &Session) -> bool {
        self.sessions
            .read()
            .get(session.id())
            .is_some_and(|live| live.ptr_eq(session))
    }

    pub(crate) fn contains(&self, token: &str) -> bool {
        self.sessions.read().contains_key(token)
    }

    /// Resolves a live session from memory, falling back to the databases.
    pub(crate) async fn read(&self, token: &str) -> Option<Session> {
        let now = OffsetDateTime::now_utc();

        let cached = self.sessions.read().get(token).cloned();
        if let Some(session) = cached {
            if !session.is_expired_at(now) {
                return Some(session);
            }
            debug!(token = %token, "session expired");
            self.remove_if_same(token, &session);
            return None;
        }

        let tombstoned = self.tombstones.read().contains_key(token);
        if tombstoned {
            return None;
        }

        let snapshot = self.load_from_databases(token).await?;
        if snapshot.expiry_date <= now {
            return None;
        }

        // A concurrent request may have hydrated or destroyed the token while
        // the databases were queried.
        let tombstoned = self.tombstones.read().contains_key(token);
        if tombstoned {
            return None;
        }
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(token.to_string())
            .or_insert_with(|| {
                debug!(token = %token, "hydrated session from database");
                Session::from_snapshot(token.to_string(), snapshot)
            })
            .clone();
        Some(session)
    }

    async fn load_from_databases(&self, token: &str) -> Option<Snapshot> {
        let databases = self.databases.read().clone();
        for db in databases {
            match db.load(token).await {
                Ok(Some(snapshot)) => return Some(snapshot),
                Ok(None) => {}
                Err(err) => warn!(error = %err, database = ?db, "session database load failed"),
            }
        }
        None
    }

    /// Removes the session and remembers the token so that databases cannot
    /// bring it back.
    pub(crate) fn destroy(&self, token: &str) -> Option<Session> {
        let removed = self.sessions.write().remove(token);
        let forget_after = removed
            .as_ref()
            .and_then(Session::expiry_date)
            .unwrap_or_else(|| OffsetDateTime::now_utc() + crate::config::DEFAULT_DURATION);
        if let Some(session) = &removed {
            session.mark_destroyed();
        }
        if self.database_count() > 0 {
            self.tombstones.write().insert(token.to_string(), forget_after);
        }
        removed
    }

    pub(crate) fn destroy_all(&self) -> usize {
        let drained: Vec<(String, Session)> = self.sessions.write().drain().collect();
        let count = drained.len();
        let track = self.database_count() > 0;
        let mut tombstones = self.tombstones.write();
        for (token, session) in drained {
            if track {
                let forget_after = session
                    .expiry_date()
                    .unwrap_or_else(|| OffsetDateTime::now_utc() + crate::config::DEFAULT_DURATION);
                tombstones.insert(token, forget_after);
            }
            session.mark_destroyed();
        }
        count
    }

    /// Drops a session without destroying it, used for fresh sessions that
    /// ended their request empty.
    pub(crate) fn discard(&self, session: &Session) {
        self.remove_if_same(session.id(), session);
    }

    fn remove_if_same(&self, token: &str, session: &Session) {
        let mut sessions = self.sessions.write();
        if sessions.get(token).is_some_and(|live| live.ptr_eq(session)) {
            sessions.remove(token);
        }
    }

    /// Removes expired sessions and stale tombstones, returning how many
    /// sessions were dropped.
    pub(crate) fn delete_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let removed = {
            let mut sessions = self.sessions.write();
            let before = sessions.len();
            sessions.retain(|_, session| !session.is_expired_at(now));
            before - sessions.len()
        };
        self.tombstones.write().retain(|_, forget_after| *forget_after > now);
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.read().len()
    }
}
