//! Cache key scheme: `<domain>:<kind>:<fingerprint>`.

use std::fmt;

/// Query kinds. Each gets its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Entity,
    KillmailList,
    DailyActivity,
    RefreshCooldown,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::KillmailList => "killmails",
            Self::DailyActivity => "daily",
            Self::RefreshCooldown => "cooldown",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cache key. Derived purely from the query's logical identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub domain: String,
    pub kind: QueryKind,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(domain: impl Into<String>, kind: QueryKind, fingerprint: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            kind,
            fingerprint: fingerprint.into(),
        }
    }

    /// Prefix matching every key of one kind within a domain.
    pub fn prefix(domain: &str, kind: QueryKind) -> String {
        format!("{}:{}:", domain, kind.as_str())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.domain, self.kind.as_str(), self.fingerprint)
    }
}
