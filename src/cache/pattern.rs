//! Key namespacing and wildcard key patterns.

use super::error::{CacheError, CacheResult};

/// Prefix that keeps deployments sharing one cache server apart.
///
/// Adapters store `"{server}:{environment}:{key}"` and strip the prefix again
/// before matching patterns, so callers only ever see logical keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: String,
}

impl KeyNamespace {
    pub fn new(server_prefix: &str, environment: &str) -> Self {
        Self {
            prefix: format!("{server_prefix}:{environment}:"),
        }
    }

    /// A namespace that leaves keys untouched.
    pub fn none() -> Self {
        Self {
            prefix: String::new(),
        }
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self::new(&config.server_prefix, config.environment.as_str())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Logical key for a stored key, or `None` if it belongs to another namespace.
    pub fn strip<'a>(&self, stored: &'a str) -> Option<&'a str> {
        stored.strip_prefix(self.prefix.as_str())
    }
}

impl Default for KeyNamespace {
    fn default() -> Self {
        Self::none()
    }
}

/// A key pattern with `*` allowed only at its ends.
///
/// | Pattern  | Matches                         |
/// |----------|---------------------------------|
/// | `abc`    | exactly `abc`                   |
/// | `abc*`   | keys starting with `abc`        |
/// | `*abc`   | keys ending with `abc`          |
/// | `*abc*`  | keys containing `abc`           |
/// | `*`      | every key                       |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    Any,
}

impl KeyPattern {
    /// Parses `pattern`, rejecting interior wildcards such as `a*b`.
    pub fn parse(pattern: &str) -> CacheResult<Self> {
        let leading = pattern.starts_with('*');
        let trailing = pattern.len() > 1 && pattern.ends_with('*');
        let core = pattern.strip_prefix('*').unwrap_or(pattern);
        let core = if trailing {
            core.strip_suffix('*').unwrap_or(core)
        } else {
            core
        };

        if core.contains('*') {
            return Err(CacheError::InvalidKeyPattern(pattern.to_owned()));
        }

        Ok(match (leading, trailing) {
            (_, _) if core.is_empty() && leading => KeyPattern::Any,
            (true, true) => KeyPattern::Contains(core.to_owned()),
            (true, false) => KeyPattern::Suffix(core.to_owned()),
            (false, true) => KeyPattern::Prefix(core.to_owned()),
            (false, false) => KeyPattern::Exact(core.to_owned()),
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Exact(s) => key == s,
            KeyPattern::Prefix(s) => key.starts_with(s.as_str()),
            KeyPattern::Suffix(s) => key.ends_with(s.as_str()),
            KeyPattern::Contains(s) => key.contains(s.as_str()),
            KeyPattern::Any => true,
        }
    }

    /// Redis `MATCH` glob for this pattern inside `namespace`.
    #[cfg_attr(not(feature = "redis"), allow(dead_code))]
    pub(crate) fn to_glob(&self, namespace: &KeyNamespace) -> String {
        let ns = escape_glob(namespace.prefix());
        match self {
            KeyPattern::Exact(s) => format!("{ns}{}", escape_glob(s)),
            KeyPattern::Prefix(s) => format!("{ns}{}*", escape_glob(s)),
            KeyPattern::Suffix(s) => format!("{ns}*{}", escape_glob(s)),
            KeyPattern::Contains(s) => format!("{ns}*{}*", escape_glob(s)),
            KeyPattern::Any => format!("{ns}*"),
        }
    }
}

#[cfg_attr(not(feature = "redis"), allow(dead_code))]
fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
