use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Lifecycle status of a proxy record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    Live,
    Testing,
    /// Removed from rotation after too many failures. Only a manual reset undoes it.
    Quarantine,
    Blacklisted,
}

impl ProxyStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Testing => "testing",
            Self::Quarantine => "quarantine",
            Self::Blacklisted => "blacklisted",
        }
    }

    /// Statuses the selector may pick from.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        matches!(self, Self::Live | Self::Testing)
    }
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "testing" => Ok(Self::Testing),
            "quarantine" => Ok(Self::Quarantine),
            "blacklisted" => Ok(Self::Blacklisted),
            other => Err(format!("unknown proxy status '{other}'")),
        }
    }
}

/// Upstream proxy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "socks5" | "socks" | "socks5h" => Ok(Self::Socks5),
            other => Err(format!("unsupported proxy protocol '{other}'")),
        }
    }
}

/// A persistent proxy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    pub id: i64,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub protocol: ProxyProtocol,
    pub country: Option<String>,
    pub timezone: Option<String>,
    /// Last measured latency in milliseconds; `None` while untested.
    pub latency_ms: Option<u64>,
    /// Health score 0-100; `None` while untested.
    pub health_quality: Option<f64>,
    pub success_count: u64,
    pub fail_count: u64,
    pub usage_count: u64,
    pub status: ProxyStatus,
    pub in_use: bool,
    pub in_use_since: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Proxy {
    /// `host:port` for logs and listings.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Success rate in percent, or `None` without history.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.success_count + self.fail_count;
        if total == 0 {
            None
        } else {
            Some(self.success_count as f64 * 100.0 / total as f64)
        }
    }

    /// Whether the cooldown window has elapsed at `now`.
    #[must_use]
    pub fn cooled_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_none_or(|until| until <= now)
    }
}

/// Fields required to insert a proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProxy {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub protocol: ProxyProtocol,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_new_status")]
    pub status: ProxyStatus,
}

fn default_new_status() -> ProxyStatus {
    ProxyStatus::Testing
}

impl NewProxy {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, protocol: ProxyProtocol) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            protocol,
            country: None,
            timezone: None,
            status: ProxyStatus::Testing,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: ProxyStatus) -> Self {
        self.status = status;
        self
    }

    /// Parses one line of a proxy list.
    ///
    /// Accepted forms: `scheme://[user:pass@]host:port`, `host:port`, and
    /// `host:port:user:pass` (the last two default to `http`).
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the line cannot be parsed.
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (protocol, rest) = match line.split_once("://") {
            Some((scheme, rest)) => (scheme.parse::<ProxyProtocol>()?, rest),
            None => (ProxyProtocol::Http, line),
        };

        let (credentials, address) = match rest.rsplit_once('@') {
            Some((creds, addr)) => (Some(creds), addr),
            None => (None, rest),
        };

        let parts: Vec<&str> = address.split(':').collect();
        let (host, port, inline_creds) = match parts.as_slice() {
            [host, port] => (*host, *port, None),
            [host, port, user, pass] if credentials.is_none() => (*host, *port, Some((*user, *pass))),
            _ => return Err(format!("expected host:port in '{line}'")),
        };

        if host.is_empty() {
            return Err(format!("missing host in '{line}'"));
        }
        let port: u16 = port.parse().map_err(|_| format!("invalid port '{port}' in '{line}'"))?;

        let mut proxy = Self::new(host, port, protocol);
        let creds = credentials
            .map(|c| c.split_once(':').unwrap_or((c, "")))
            .or(inline_creds);
        if let Some((user, pass)) = creds {
            proxy = proxy.with_credentials(user, pass);
        }
        Ok(proxy)
    }
}

/// Outcome a worker reports when releasing its slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageOutcome {
    pub success: bool,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

impl UsageOutcome {
    #[must_use]
    pub fn success(latency_ms: u64) -> Self {
        Self { success: true, latency_ms: Some(latency_ms) }
    }

    #[must_use]
    pub fn failure() -> Self {
        Self { success: false, latency_ms: None }
    }
}

/// Pool counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub total: u64,
    pub live: u64,
    pub testing: u64,
    pub quarantine: u64,
    pub blacklisted: u64,
    pub in_use: u64,
    pub cooling_down: u64,
}
