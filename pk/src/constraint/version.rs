//! Numeric template versions
//!
//! Versions are `MAJOR.MINOR[.PATCH]`. An omitted patch is zero, and ordering is
//! numeric component by component, so `1.10` sorts above `1.9`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ConstraintError;

/// A template revision version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse one to three dot-separated components, padding the rest with zeros
    ///
    /// Used for range operands such as `^1` or `~1.2`, where a partial version is legal.
    pub(crate) fn parse_partial(token: &str, input: &str) -> Result<(Self, usize), ConstraintError> {
        debug!(%token, "Version::parse_partial: called");
        let parts: Vec<&str> = token.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(ConstraintError::invalid_version(input, token));
        }

        let mut components = [0u32; 3];
        for (slot, part) in components.iter_mut().zip(parts.iter()) {
            *slot = parse_component(part).ok_or_else(|| ConstraintError::invalid_version(input, token))?;
        }

        Ok((Self::new(components[0], components[1], components[2]), parts.len()))
    }

    /// Parse a full `MAJOR.MINOR[.PATCH]` version appearing inside a larger constraint
    pub(crate) fn parse_in(token: &str, input: &str) -> Result<Self, ConstraintError> {
        let (version, count) = Self::parse_partial(token, input)?;
        if count < 2 {
            debug!(%token, "Version::parse_in: missing minor component");
            return Err(ConstraintError::invalid_version(input, token));
        }
        Ok(version)
    }
}

fn parse_component(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl FromStr for Version {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::parse_in(trimmed, s)
    }
}

impl TryFrom<String> for Version {
    type Error = ConstraintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
