use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Subscription class of the caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Anonymous,
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Anonymous, Tier::Free, Tier::Pro, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    /// Parse a plan name, ignoring case and surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anonymous" => Ok(Tier::Anonymous),
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// Coarse classification of a request path
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EndpointCategory {
    Generate,
    Export,
    Status,
    Default,
}

impl EndpointCategory {
    pub const ALL: [EndpointCategory; 4] = [
        EndpointCategory::Generate,
        EndpointCategory::Export,
        EndpointCategory::Status,
        EndpointCategory::Default,
    ];

    /// Classify a path by substring; the first match in
    /// `/generate`, `/export`, `/status` order wins.
    pub fn from_path(path: &str) -> Self {
        if path.contains("/generate") {
            EndpointCategory::Generate
        } else if path.contains("/export") {
            EndpointCategory::Export
        } else if path.contains("/status") {
            EndpointCategory::Status
        } else {
            EndpointCategory::Default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointCategory::Generate => "generate",
            EndpointCategory::Export => "export",
            EndpointCategory::Status => "status",
            EndpointCategory::Default => "default",
        }
    }
}

impl fmt::Display for EndpointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limit applied to one (tier, category) pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyEntry {
    /// Requests allowed per window; 0 forbids the operation outright
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl PolicyEntry {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Whether this entry denies every request
    pub fn is_forbidden(&self) -> bool {
        self.limit == 0
    }
}

/// Identity under which request counts are tracked.
///
/// One of `user:<id>`, `api:<last 8 chars of key>` or `ip:<masked address>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Number of trailing credential characters kept in an `api:` key
    pub const API_KEY_SUFFIX_LEN: usize = 8;

    pub fn user(id: &str) -> Self {
        Self(format!("user:{}", id))
    }

    /// Key an API credential by its last eight characters
    pub fn api(credential: &str) -> Self {
        let chars: Vec<char> = credential.chars().collect();
        let start = chars.len().saturating_sub(Self::API_KEY_SUFFIX_LEN);
        let suffix: String = chars[start..].iter().collect();
        Self(format!("api:{}", suffix))
    }

    pub fn ip(address: &str) -> Self {
        Self(format!("ip:{}", address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counter state for one (client key, path) pair within a fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRecord {
    /// Requests counted in the current window
    pub count: u32,
    /// End of the current window, epoch milliseconds. Also identifies the window.
    pub reset_at_ms: u64,
    /// Window length the record was opened with
    pub window_secs: u64,
}

impl WindowRecord {
    /// Open a fresh, empty window starting at `now_ms`
    pub fn open(now_ms: u64, window_secs: u64) -> Self {
        Self {
            count: 0,
            reset_at_ms: now_ms.saturating_add(window_secs.saturating_mul(1000)),
            window_secs,
        }
    }

    /// A window is expired once the clock is strictly past its reset time
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.reset_at_ms
    }
}

/// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Total limit for the window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the window resets, epoch milliseconds
    pub reset_at_ms: u64,
    /// Seconds to wait before retrying; 0 when allowed
    pub retry_after_secs: u64,
}

impl Decision {
    /// Reset time in epoch seconds, rounded up
    pub fn reset_epoch_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }
}
