//! # Tower Sessions Cache
//!
//! A cookie-keyed session cache for [`tower`](https://crates.io/crates/tower) and
//! [`axum`](https://crates.io/crates/axum) services, with flash messages and
//! read-through databases built on [`tower-sessions`](https://crates.io/crates/tower-sessions)
//! and [Sea-ORM](https://crates.io/crates/sea-orm).
//!
//! ## Features
//!
//! - Session tokens issued and expired through a configurable cookie
//! - Per-session key/value storage with per-session locking
//! - Flash values that disappear after their first read
//! - Inactivity, fixed-date and browser-session expiry with a cleanup sweep
//! - Read-only databases: any `tower-sessions` store, or a Sea-ORM table
//! - A process-wide facade for code without access to the manager
//!
//! ## Axum Integration Example
//!
//! ```no_run
//! use axum::{routing::get, Json, Router};
//! use serde_json::{Map, Value};
//! use tower_sessions_cache::{Config, Session, Sessions};
//!
//! async fn flashes(session: Session) -> Json<Map<String, Value>> {
//!     Json(session.get_flashes())
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sessions = Sessions::new(Config::default().with_cookie_name("app.sid"));
//!
//! let app = Router::new()
//!     .route("/flashes", get(flashes))
//!     .layer(sessions.layer());
//! # let _: Router = app;
//! # Ok(())
//! # }
//! ```
//!
//! ## Session Management
//!
//! ```no_run
//! use tower_sessions_cache::Session;
//!
//! # fn example(session: Session) -> tower_sessions_cache::Result<()> {
//! // Set a value
//! session.set("user_id", 123)?;
//!
//! // Get a value
//! let user_id: Option<u32> = session.get("user_id")?;
//!
//! // Flash a message for the next request
//! session.set_flash("notice", "Profile saved")?;
//!
//! // Remove all regular values
//! session.clear();
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod database;
pub mod entity;
mod error;
mod extract;
mod manager;
mod middleware;
#[cfg(feature = "migration")]
pub mod migration;
mod provider;
mod seaorm_database;
mod session;

pub use cache::{cache, init_cache, init_cache_with, sessions, use_database};
pub use config::{Config, DEFAULT_COOKIE_NAME, DEFAULT_DURATION};
pub use database::{Database, SessionStoreDatabase, Snapshot};
pub use error::{Error, Result};
pub use manager::Sessions;
pub use middleware::{RequestSession, SessionLayer, SessionService};
pub use seaorm_database::SeaOrmDatabase;
pub use session::Session;

/// Session expiry policy
///
/// Re-exported from `tower-sessions` for convenience.
pub use tower_sessions::Expiry;

/// Cookie `SameSite` attribute
pub use tower_cookies::cookie::SameSite;
