//! AddressFilter - predicate over a message address
//!
//! Grammar:
//! - `*` or `/*`: any address
//! - `/a/b`: exact match
//! - `/a/*`: anything strictly below `/a/`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RelayError;

/// Characters reserved by OSC address patterns, never valid in a filter
const RESERVED: &[char] = &['#', ',', '?', '[', ']', '{', '}'];

/// Address filter attached to a binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AddressFilter {
    /// Matches every address
    Any,
    /// Matches one address exactly
    Exact(String),
    /// Matches addresses under a prefix; stored with its trailing `/`
    Prefix(String),
}

impl AddressFilter {
    /// Parse a filter string
    ///
    /// # Errors
    /// `InvalidFilter` when the syntax is malformed.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let invalid = |reason: &str| RelayError::invalid_filter(raw, reason);

        if raw.is_empty() {
            return Err(invalid("filter cannot be empty"));
        }
        if raw == "*" || raw == "/*" {
            return Ok(Self::Any);
        }
        if !raw.starts_with('/') {
            return Err(invalid("filter must start with '/'"));
        }
        if raw.ends_with('/') {
            return Err(invalid("filter cannot end with '/'"));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || RESERVED.contains(c))
        {
            return Err(invalid(&format!("reserved character {c:?}")));
        }

        let segments: Vec<&str> = raw[1..].split('/').collect();
        let last = segments.len() - 1;
        for (idx, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(invalid("empty path segment"));
            }
            if segment.contains('*') && !(idx == last && *segment == "*") {
                return Err(invalid("'*' is only allowed as the whole final segment"));
            }
        }

        match raw.strip_suffix('*') {
            Some(prefix) => Ok(Self::Prefix(prefix.to_string())),
            None => Ok(Self::Exact(raw.to_string())),
        }
    }

    /// Whether `address` satisfies this filter
    #[inline]
    pub fn matches(&self, address: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(exact) => address == exact,
            Self::Prefix(prefix) => address.len() > prefix.len() && address.starts_with(prefix),
        }
    }

    /// The literal prefix for prefix filters (`/4/` for `/4/*`)
    pub fn prefix(&self) -> Option<&str> {
        match self {
            Self::Prefix(prefix) => Some(prefix),
            _ => None,
        }
    }
}

impl fmt::Display for AddressFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(exact) => f.write_str(exact),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

impl FromStr for AddressFilter {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AddressFilter {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AddressFilter> for String {
    fn from(filter: AddressFilter) -> Self {
        filter.to_string()
    }
}
