use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MessagingError, Result};

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Default capacity of the hub event channel.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Which side of the marketplace the signed-in user is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Role {
    Admin,
    #[default]
    Vendor,
    Host,
}

impl Role {
    /// Refresh throttle window for this role.
    ///
    /// Admins triage many conversations and get the shortest window.
    pub fn cache_window(&self) -> Duration {
        match self {
            Role::Admin => Duration::from_millis(2000),
            Role::Host => Duration::from_millis(5000),
            Role::Vendor => Duration::from_millis(10_000),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Vendor => "vendor",
            Role::Host => "host",
        }
    }
}

impl FromStr for Role {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "support" => Ok(Role::Admin),
            "vendor" => Ok(Role::Vendor),
            "host" | "event_host" => Ok(Role::Host),
            other => Err(MessagingError::Config(format!("unknown role: {}", other))),
        }
    }
}

/// Messaging hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub role: Role,
    pub poll_interval: Duration,
    pub cache_window: Duration,
    /// Push channel endpoint. `None` runs polling only.
    pub socket_url: Option<String>,
    pub event_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::for_role(Role::default())
    }
}

impl HubConfig {
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cache_window: role.cache_window(),
            socket_url: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Load from `CHAT_ROLE`, `CHAT_SOCKET_URL`, `CHAT_POLL_INTERVAL_MS` and
    /// `CHAT_CACHE_WINDOW_MS`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let role = match env::var("CHAT_ROLE") {
            Ok(value) => value.parse()?,
            Err(_) => Role::default(),
        };
        let mut config = Self::for_role(role);

        if let Ok(url) = env::var("CHAT_SOCKET_URL") {
            if !url.trim().is_empty() {
                config.socket_url = Some(url);
            }
        }
        if let Some(ms) = millis_from_env("CHAT_POLL_INTERVAL_MS")? {
            config.poll_interval = ms;
        }
        if let Some(ms) = millis_from_env("CHAT_CACHE_WINDOW_MS")? {
            config.cache_window = ms;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_cache_window(mut self, window: Duration) -> Self {
        self.cache_window = window;
        self
    }

    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(MessagingError::Config("poll interval must be positive".into()));
        }
        if self.event_capacity == 0 {
            return Err(MessagingError::Config("event capacity must be positive".into()));
        }
        Ok(())
    }
}

fn millis_from_env(key: &str) -> Result<Option<Duration>> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| MessagingError::Config(format!("{} must be a number of milliseconds", key))),
        Err(_) => Ok(None),
    }
}
