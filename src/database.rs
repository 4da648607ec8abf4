//! Read-only databases consulted when a token is not in memory.
//!
//! A [`Database`] only ever loads state: the manager owns every write, so the
//! atomicity of session operations never depends on a backend. Attach one with
//! [`Sessions::use_database`](crate::Sessions::use_database).

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tower_sessions::session::{Id, Record};
use tower_sessions::SessionStore;

use crate::config::DEFAULT_DURATION;
use crate::error::Result;

/// Session state as loaded from a database.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub values: Map<String, Value>,
    pub flashes: Map<String, Value>,
    pub expiry_date: OffsetDateTime,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            values: Map::new(),
            flashes: Map::new(),
            expiry_date: OffsetDateTime::now_utc() + DEFAULT_DURATION,
        }
    }
}

impl From<Record> for Snapshot {
    fn from(record: Record) -> Self {
        Self {
            values: record.data.into_iter().collect(),
            flashes: Map::new(),
            expiry_date: record.expiry_date,
        }
    }
}

/// A read capability over pre-existing session state.
///
/// Implementations return `Ok(None)` for unknown or expired tokens. An `Err`
/// is logged by the manager and treated as a miss.
#[async_trait]
pub trait Database: Debug + Send + Sync + 'static {
    async fn load(&self, token: &str) -> Result<Option<Snapshot>>;
}

/// Uses any `tower-sessions` [`SessionStore`] as a [`Database`].
///
/// Only [`SessionStore::load`] is ever called. Tokens that are not valid
/// `tower-sessions` ids resolve to nothing.
///
/// ```
/// use tower_sessions::MemoryStore;
/// use tower_sessions_cache::{Config, SessionStoreDatabase, Sessions};
///
/// let sessions = Sessions::new(Config::default());
/// sessions.use_database(SessionStoreDatabase::new(MemoryStore::default()));
/// ```
#[derive(Debug, Clone)]
pub struct SessionStoreDatabase<S> {
    store: S,
}

impl<S: SessionStore> SessionStoreDatabase<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

#[async_trait]
impl<S: SessionStore> Database for SessionStoreDatabase<S> {
    async fn load(&self, token: &str) -> Result<Option<Snapshot>> {
        let Ok(id) = token.parse::<Id>() else {
            return Ok(None);
        };

        let record = self.store.load(&id).await?;
        Ok(record
            .filter(|record| record.expiry_date > OffsetDateTime::now_utc())
            .map(Snapshot::from))
    }
}
