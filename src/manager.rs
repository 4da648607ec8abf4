use std::sync::Arc;

use axum::http::{header, HeaderMap};
use time::OffsetDateTime;
use tower_cookies::cookie::Cookie;
use tower_sessions::session::Id;
use tower_sessions::Expiry;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::Database;
use crate::error::Result;
use crate::middleware::SessionLayer;
use crate::provider::Provider;
use crate::session::Session;

/// The session manager.
///
/// `Sessions` is cheap to clone; clones share the same sessions. Pass it to
/// handlers as state, install it with [`Sessions::layer`], or reach the
/// process-wide instance through [`cache`](crate::cache).
///
/// ```
/// use tower_sessions_cache::{Config, Sessions};
///
/// # async fn example() -> tower_sessions_cache::Result<()> {
/// let sessions = Sessions::new(Config::default().with_cookie_name("app.sid"));
///
/// let session = sessions.start(None).await?;
/// session.set("user_id", 42)?;
///
/// let again = sessions.start(Some(session.id())).await?;
/// assert_eq!(again.get::<u32>("user_id")?, Some(42));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Sessions {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: Config,
    /// Sessions reached through cookie tokens.
    tokens: Provider,
    /// Sessions stored under caller-chosen keys; never reachable from a cookie.
    keyed: Provider,
}

impl Sessions {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                tokens: Provider::default(),
                keyed: Provider::default(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Adds a read-only database consulted, in registration order, when a
    /// token is not in memory.
    pub fn use_database<D: Database>(&self, db: D) {
        info!(database = ?db, "registered session database");
        let db: Arc<dyn Database> = Arc::new(db);
        self.inner.tokens.register_database(db.clone());
        self.inner.keyed.register_database(db);
    }

    /// Returns the session for `token`, or a new one with a fresh token.
    ///
    /// A token that is unknown, expired or destroyed is never adopted: the
    /// returned session then carries a different, newly generated token.
    pub async fn start(&self, token: Option<&str>) -> Result<Session> {
        if let Some(token) = token.filter(|token| !token.is_empty()) {
            if let Some(session) = self.resolve(&self.inner.tokens, token).await {
                return Ok(session);
            }
            debug!(token = %token, "ignoring unknown session token");
        }

        Ok(self.create())
    }

    /// Returns the session stored under a caller-chosen `key`, creating it
    /// if needed.
    ///
    /// Keys live apart from cookie tokens: a request whose cookie equals a
    /// key does not reach this session.
    pub async fn cache(&self, key: &str) -> Result<Session> {
        if let Some(session) = self.resolve(&self.inner.keyed, key).await {
            return Ok(session);
        }

        Ok(self.inner.keyed.init(key.to_string(), self.expiry_date()))
    }

    /// Removes the session and all of its values.
    ///
    /// Outstanding handles become empty and reject writes.
    pub fn destroy(&self, session: &Session) {
        if self.inner.keyed.holds(session) {
            self.inner.keyed.destroy(session.id());
            debug!(key = %session.id(), "destroyed keyed session");
        } else {
            self.destroy_by_id(session.id());
        }
        session.mark_destroyed();
    }

    /// Removes the session stored under the cookie `token`, if any.
    pub fn destroy_by_id(&self, token: &str) -> bool {
        let removed = self.inner.tokens.destroy(token).is_some();
        if removed {
            debug!(token = %token, "destroyed session");
        }
        removed
    }

    /// Removes every session, returning how many there were.
    pub fn destroy_all(&self) -> usize {
        let count = self.inner.tokens.destroy_all() + self.inner.keyed.destroy_all();
        info!(count, "destroyed all sessions");
        count
    }

    /// Restarts the expiry window of `session` from now.
    pub fn shift_expiration(&self, session: &Session) {
        session.shift_expiry(self.inner.config.lifetime());
    }

    /// Drops every expired session, returning how many were removed.
    pub fn delete_expired(&self) -> usize {
        let count = self.inner.tokens.delete_expired() + self.inner.keyed.delete_expired();
        if count > 0 {
            info!(count, "deleted expired sessions");
        }
        count
    }

    /// Runs [`Sessions::delete_expired`] every `period`, forever.
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use tower_sessions_cache::{Config, Sessions};
    ///
    /// # async fn example() {
    /// let sessions = Sessions::new(Config::default());
    /// tokio::spawn(sessions.clone().continuously_delete_expired(Duration::from_secs(60)));
    /// # }
    /// ```
    pub async fn continuously_delete_expired(self, period: std::time::Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.delete_expired();
        }
    }

    /// Number of sessions currently held in memory.
    pub fn len(&self) -> usize {
        self.inner.tokens.len() + self.inner.keyed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A tower layer that resolves sessions from this manager's cookie.
    pub fn layer(&self) -> SessionLayer {
        SessionLayer::new(self.clone())
    }

    /// Extracts the session token from a request's `Cookie` headers.
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let name = self.inner.config.cookie_name();
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    }

    async fn resolve(&self, provider: &Provider, token: &str) -> Option<Session> {
        let session = provider.read(token).await?;
        if matches!(self.inner.config.expiry(), Expiry::OnInactivity(_)) {
            self.shift_expiration(&session);
        }
        Some(session)
    }

    fn create(&self) -> Session {
        loop {
            let token = Id::default().to_string();
            // Collisions are astronomically unlikely but cheap to rule out.
            if !self.inner.tokens.contains(&token) {
                return self.inner.tokens.init(token, self.expiry_date());
            }
        }
    }

    pub(crate) fn discard(&self, session: &Session) {
        self.inner.tokens.discard(session);
    }

    fn expiry_date(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc() + self.inner.config.lifetime()
    }
}
