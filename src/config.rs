use crate::error::InvalidTtl;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

/// The default upper bound for the lifetime of a session, in seconds.
pub const DEFAULT_MAXLIFE: u64 = 86_400;

/// Options of a session, as configured by the enclosing application.
///
/// The options can be loaded with any serde format. Missing fields take their default value.
///
/// ```rust
/// # use locking_session::{SessionConfig, SessionTtl};
/// let config: SessionConfig = serde_json::from_str(r#"{"name": "sid", "ttl": 300}"#).unwrap();
/// assert_eq!(config.name, "sid");
/// assert_eq!(config.ttl, SessionTtl::Seconds(300));
/// assert_eq!(config.path, "/");
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The name of the session cookie.
    pub name: String,
    /// How long a session lives.
    pub ttl: SessionTtl,
    /// The upper bound for the lifetime of a session, in seconds.
    /// It applies when `ttl` is [`SessionTtl::UntilBrowserClose`].
    pub maxlife: NonZeroU64,
    /// The path of the session cookie.
    pub path: String,
}

/// The lifetime of a session.
///
/// Serialized as a signed integer, where `-1` stands for [`SessionTtl::UntilBrowserClose`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SessionTtl {
    /// The session lives until the browser is closed, but at most `maxlife` seconds.
    #[default]
    UntilBrowserClose,
    /// The session lives for the given number of seconds.
    Seconds(u64),
}

impl SessionConfig {
    /// Create a configuration with default options.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the name of the session cookie.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the lifetime of sessions.
    pub fn with_ttl(mut self, ttl: SessionTtl) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the upper bound for the lifetime of sessions that live until the browser is closed.
    pub fn with_maxlife(mut self, maxlife: NonZeroU64) -> Self {
        self.maxlife = maxlife;
        self
    }

    /// Sets the path of the session cookie.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// The expiry in seconds that is sent to the driver when saving a session.
    ///
    /// This is `maxlife` for sessions that live until the browser is closed.
    /// Otherwise it is one second more than `ttl`, such that the driver does not expire the
    /// session before the client drops its cookie.
    ///
    /// ```rust
    /// # use locking_session::{SessionConfig, SessionTtl};
    /// # use std::num::NonZeroU64;
    /// let config = SessionConfig::new().with_maxlife(NonZeroU64::new(600).unwrap());
    /// assert_eq!(config.effective_ttl(), 600);
    /// assert_eq!(config.with_ttl(SessionTtl::Seconds(30)).effective_ttl(), 31);
    /// ```
    pub fn effective_ttl(&self) -> u64 {
        match self.ttl {
            SessionTtl::UntilBrowserClose => self.maxlife.get(),
            SessionTtl::Seconds(seconds) => seconds.saturating_add(1),
        }
    }

    /// The max-age of the session cookie, or `None` for a cookie that lives until the browser is closed.
    pub fn cookie_max_age(&self) -> Option<u64> {
        match self.ttl {
            SessionTtl::UntilBrowserClose => None,
            SessionTtl::Seconds(seconds) => Some(seconds),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "session".to_owned(),
            ttl: SessionTtl::UntilBrowserClose,
            maxlife: NonZeroU64::new(DEFAULT_MAXLIFE).unwrap_or(NonZeroU64::MIN),
            path: "/".to_owned(),
        }
    }
}

impl TryFrom<i64> for SessionTtl {
    type Error = InvalidTtl;

    fn try_from(ttl: i64) -> Result<Self, Self::Error> {
        match ttl {
            -1 => Ok(Self::UntilBrowserClose),
            seconds => u64::try_from(seconds)
                .map(Self::Seconds)
                .map_err(|_| InvalidTtl(ttl)),
        }
    }
}

impl From<SessionTtl> for i64 {
    fn from(ttl: SessionTtl) -> Self {
        match ttl {
            SessionTtl::UntilBrowserClose => -1,
            SessionTtl::Seconds(seconds) => i64::try_from(seconds).unwrap_or(i64::MAX),
        }
    }
}
