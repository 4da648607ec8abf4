use std::env;

use time::Duration;
use tower_cookies::cookie::SameSite;
use tower_sessions::Expiry;

use crate::error::{Error, Result};

/// Cookie name used when none is configured.
pub const DEFAULT_COOKIE_NAME: &str = "mycustomsessionid";

/// Lifetime given to sessions whose expiry is [`Expiry::OnSessionEnd`].
///
/// The browser drops such cookies when it closes, but the server still needs
/// a bound after which the state is swept.
pub const DEFAULT_DURATION: Duration = Duration::weeks(2);

/// Configuration of a [`Sessions`](crate::Sessions) manager.
///
/// # Examples
///
/// ```
/// use time::Duration;
/// use tower_sessions::Expiry;
/// use tower_sessions_cache::Config;
///
/// let config = Config::default()
///     .with_cookie_name("app.sid")
///     .with_expiry(Expiry::OnInactivity(Duration::hours(12)))
///     .with_secure(true);
/// assert_eq!(config.cookie_name(), "app.sid");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    cookie_name: String,
    expiry: Expiry,
    secure: bool,
    http_only: bool,
    same_site: SameSite,
    path: String,
    domain: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            expiry: Expiry::OnInactivity(DEFAULT_DURATION),
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            domain: None,
        }
    }
}

impl Config {
    /// Builds a configuration from the process environment.
    ///
    /// | Variable               | Meaning                                   |
    /// |------------------------|-------------------------------------------|
    /// | `SESSION_COOKIE`       | cookie name                               |
    /// | `SESSION_EXPIRES_SECS` | inactivity timeout, `0` for session end   |
    /// | `SESSION_SECURE`       | `true`/`false`, sets the `Secure` flag    |
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = env::var("SESSION_COOKIE") {
            if name.trim().is_empty() {
                return Err(Error::Config("SESSION_COOKIE is empty".to_string()));
            }
            config.cookie_name = name;
        }

        if let Ok(secs) = env::var("SESSION_EXPIRES_SECS") {
            let secs: i64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("SESSION_EXPIRES_SECS: {e}")))?;
            config.expiry = match secs {
                0 => Expiry::OnSessionEnd,
                secs if secs > 0 => Expiry::OnInactivity(Duration::seconds(secs)),
                _ => {
                    return Err(Error::Config(
                        "SESSION_EXPIRES_SECS must not be negative".to_string(),
                    ))
                }
            };
        }

        if let Ok(secure) = env::var("SESSION_SECURE") {
            config.secure = secure
                .parse()
                .map_err(|e| Error::Config(format!("SESSION_SECURE: {e}")))?;
        }

        Ok(config)
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn http_only(&self) -> bool {
        self.http_only
    }

    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Time until a session touched now should expire.
    pub(crate) fn lifetime(&self) -> Duration {
        match self.expiry {
            Expiry::OnSessionEnd => DEFAULT_DURATION,
            Expiry::OnInactivity(duration) => duration,
            Expiry::AtDateTime(at) => at - time::OffsetDateTime::now_utc(),
        }
    }

    /// `Max-Age` to send with the session cookie, `None` for a browser-session cookie.
    pub(crate) fn cookie_max_age(&self) -> Option<Duration> {
        match self.expiry {
            Expiry::OnSessionEnd => None,
            Expiry::OnInactivity(duration) => Some(duration),
            Expiry::AtDateTime(at) => {
                Some((at - time::OffsetDateTime::now_utc()).max(Duration::ZERO))
            }
        }
    }
}
