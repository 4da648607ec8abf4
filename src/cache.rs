//! Process-wide session cache.
//!
//! A thin convenience over one [`Sessions`] instance kept in a static. Call
//! [`init_cache`] once at start-up; every other function returns
//! [`Error::NotInitialized`] until then.
//!
//! ```no_run
//! # async fn example() -> tower_sessions_cache::Result<()> {
//! tower_sessions_cache::init_cache()?;
//!
//! let session = tower_sessions_cache::cache("user:42").await?;
//! session.set("name", "iris")?;
//! # Ok(())
//! # }
//! ```

use std::sync::OnceLock;

use tracing::{error, info};

use crate::config::Config;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::manager::Sessions;
use crate::session::Session;

static SESSIONS: OnceLock<Sessions> = OnceLock::new();

/// Initializes the process-wide cache with the default configuration.
pub fn init_cache() -> Result<&'static Sessions> {
    init_cache_with(Config::default())
}

/// Initializes the process-wide cache with `config`.
///
/// Returns [`Error::AlreadyInitialized`] if the cache already exists.
pub fn init_cache_with(config: Config) -> Result<&'static Sessions> {
    let mut created = false;
    let sessions = SESSIONS.get_or_init(|| {
        created = true;
        Sessions::new(config)
    });
    if !created {
        return Err(Error::AlreadyInitialized);
    }

    info!(cookie = sessions.config().cookie_name(), "session cache initialized");
    Ok(sessions)
}

/// The process-wide manager.
pub fn sessions() -> Result<&'static Sessions> {
    SESSIONS.get().ok_or_else(|| {
        error!("session cache is not initialized");
        Error::NotInitialized
    })
}

/// The session stored under `key`, created if missing.
pub async fn cache(key: &str) -> Result<Session> {
    sessions()?.cache(key).await
}

/// Attaches a read-only database to the process-wide manager.
pub fn use_database<D: Database>(db: D) -> Result<()> {
    sessions()?.use_database(db);
    Ok(())
}
