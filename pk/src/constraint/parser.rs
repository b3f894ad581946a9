//! Selector and constraint parsing
//!
//! Grammar: `name[@range][#label[+label...]]`
//!
//! | Range form          | Meaning                                  |
//! |---------------------|------------------------------------------|
//! | absent, `*`, `x`    | any version                              |
//! | `^1`, `1.x`         | `>=1.0.0, <2.0.0`                        |
//! | `~1.2`, `1.2.x`     | `>=1.2.0, <1.3.0`                        |
//! | `1.2`, `1.2.3`      | exactly that version (patch defaults 0)  |
//! | `>=1.2.0,<1.5.0`    | explicit interval, either side optional  |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::Version;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_./\-]*$").expect("name pattern is valid"));

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("label pattern is valid"));

/// Errors produced while parsing selectors and constraints
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("empty selector")]
    Empty,

    #[error("invalid template name '{0}'")]
    InvalidName(String),

    #[error("invalid version '{token}' in '{input}'")]
    InvalidVersion { input: String, token: String },

    #[error("invalid range '{0}'")]
    InvalidRange(String),

    #[error("empty interval in '{0}': lower bound exceeds upper bound")]
    EmptyInterval(String),

    #[error("invalid label list in '{0}'")]
    InvalidLabel(String),
}

impl ConstraintError {
    pub(crate) fn invalid_version(input: &str, token: &str) -> Self {
        Self::InvalidVersion {
            input: input.to_string(),
            token: token.to_string(),
        }
    }
}

/// One side of an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: true,
        }
    }

    pub fn exclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: false,
        }
    }
}

/// The version part of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VersionRange {
    /// Matches every version
    #[default]
    Any,
    /// Matches exactly one version
    Exact(Version),
    /// At least the given version, same major
    Caret(Version),
    /// At least the given version, same major and minor
    Tilde(Version),
    /// Explicit bounds; the parser never produces an interval with both sides absent
    Interval { min: Option<Bound>, max: Option<Bound> },
}

impl VersionRange {
    /// Check whether a version falls inside this range
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(v) => version == v,
            Self::Caret(base) => version >= base && version.major == base.major,
            Self::Tilde(base) => version >= base && version.major == base.major && version.minor == base.minor,
            Self::Interval { min, max } => {
                let above = match min {
                    Some(b) if b.inclusive => version >= &b.version,
                    Some(b) => version > &b.version,
                    None => true,
                };
                let below = match max {
                    Some(b) if b.inclusive => version <= &b.version,
                    Some(b) => version < &b.version,
                    None => true,
                };
                above && below
            }
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    fn parse(token: &str, input: &str) -> Result<Self, ConstraintError> {
        debug!(%token, "VersionRange::parse: called");
        let token = token.trim();
        if token.is_empty() {
            return Err(ConstraintError::InvalidRange(input.to_string()));
        }

        if matches!(token, "*" | "x" | "X") {
            return Ok(Self::Any);
        }

        if let Some(rest) = token.strip_prefix('^') {
            let (base, _) = Version::parse_partial(rest.trim(), input)?;
            return Ok(Self::Caret(base));
        }

        if let Some(rest) = token.strip_prefix('~') {
            let (base, count) = Version::parse_partial(rest.trim(), input)?;
            if count < 2 {
                debug!(%token, "VersionRange::parse: tilde needs MAJOR.MINOR");
                return Err(ConstraintError::InvalidRange(input.to_string()));
            }
            return Ok(Self::Tilde(base));
        }

        if token.starts_with('<') || token.starts_with('>') {
            return Self::parse_interval(token, input);
        }

        let wildcard_prefix = [".x", ".X", ".*"].iter().find_map(|suffix| token.strip_suffix(suffix));
        if let Some(prefix) = wildcard_prefix {
            let (base, count) = Version::parse_partial(prefix, input)?;
            return match count {
                1 => Ok(Self::Caret(base)),
                2 => Ok(Self::Tilde(base)),
                _ => Err(ConstraintError::InvalidRange(input.to_string())),
            };
        }

        Ok(Self::Exact(Version::parse_in(token, input)?))
    }

    fn parse_interval(token: &str, input: &str) -> Result<Self, ConstraintError> {
        debug!(%token, "VersionRange::parse_interval: called");
        let mut min: Option<Bound> = None;
        let mut max: Option<Bound> = None;

        for comparator in token.split(',') {
            let comparator = comparator.trim();
            let (is_lower, inclusive, operand) = if let Some(rest) = comparator.strip_prefix(">=") {
                (true, true, rest)
            } else if let Some(rest) = comparator.strip_prefix("<=") {
                (false, true, rest)
            } else if let Some(rest) = comparator.strip_prefix('>') {
                (true, false, rest)
            } else if let Some(rest) = comparator.strip_prefix('<') {
                (false, false, rest)
            } else {
                return Err(ConstraintError::InvalidRange(input.to_string()));
            };

            let bound = Bound {
                version: Version::parse_in(operand.trim(), input)?,
                inclusive,
            };
            let slot = if is_lower { &mut min } else { &mut max };
            if slot.replace(bound).is_some() {
                debug!(%comparator, "VersionRange::parse_interval: duplicate bound");
                return Err(ConstraintError::InvalidRange(input.to_string()));
            }
        }

        if let (Some(lo), Some(hi)) = (min, max) {
            let empty = lo.version > hi.version || (lo.version == hi.version && !(lo.inclusive && hi.inclusive));
            if empty {
                return Err(ConstraintError::EmptyInterval(input.to_string()));
            }
        }

        Ok(Self::Interval { min, max })
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(v) => write!(f, "{}", v),
            Self::Caret(v) if v.minor == 0 && v.patch == 0 => write!(f, "^{}", v.major),
            Self::Caret(v) => write!(f, "^{}", v),
            Self::Tilde(v) if v.patch == 0 => write!(f, "~{}.{}", v.major, v.minor),
            Self::Tilde(v) => write!(f, "~{}", v),
            Self::Interval { min, max } => {
                let mut parts = Vec::with_capacity(2);
                if let Some(b) = min {
                    parts.push(format!("{}{}", if b.inclusive { ">=" } else { ">" }, b.version));
                }
                if let Some(b) = max {
                    parts.push(format!("{}{}", if b.inclusive { "<=" } else { "<" }, b.version));
                }
                if parts.is_empty() {
                    write!(f, "*")
                } else {
                    write!(f, "{}", parts.join(","))
                }
            }
        }
    }
}

/// A parsed version range plus the labels a revision must carry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Constraint {
    range: VersionRange,
    labels: BTreeSet<String>,
}

impl Constraint {
    pub fn new(range: VersionRange) -> Self {
        Self {
            range,
            labels: BTreeSet::new(),
        }
    }

    /// A constraint that matches any revision
    pub fn any() -> Self {
        Self::default()
    }

    /// Any version carrying the given label
    pub fn with_label(label: impl Into<String>) -> Self {
        Self::any().and_label(label)
    }

    /// Add a required label
    pub fn and_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn range(&self) -> &VersionRange {
        &self.range
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// The label filter as written in a selector (`prod+exp_a`), if any
    pub fn label(&self) -> Option<String> {
        if self.labels.is_empty() {
            None
        } else {
            Some(self.labels.iter().cloned().collect::<Vec<_>>().join("+"))
        }
    }

    /// Check a version and label set against this constraint
    pub fn matches(&self, version: &Version, labels: &BTreeSet<String>) -> bool {
        self.range.matches(version) && self.labels.iter().all(|l| labels.contains(l))
    }

    /// Parse the part of a selector after the name: `[range][#labels]`
    ///
    /// An empty string is the unconstrained constraint.
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        debug!(%input, "Constraint::parse: called");
        let (range_part, label_part) = match input.split_once('#') {
            Some((range, labels)) => (range.trim(), Some(labels)),
            None => (input.trim(), None),
        };

        let range = if range_part.is_empty() {
            VersionRange::Any
        } else {
            VersionRange::parse(range_part, input)?
        };

        let labels = match label_part {
            Some(raw) => parse_labels(raw, input)?,
            None => BTreeSet::new(),
        };

        Ok(Self { range, labels })
    }
}

fn parse_labels(raw: &str, input: &str) -> Result<BTreeSet<String>, ConstraintError> {
    let mut labels = BTreeSet::new();
    for label in raw.split('+').map(str::trim).filter(|l| !l.is_empty()) {
        if !LABEL_RE.is_match(label) {
            debug!(%label, "parse_labels: rejected label");
            return Err(ConstraintError::InvalidLabel(input.to_string()));
        }
        labels.insert(label.to_string());
    }
    if labels.is_empty() {
        return Err(ConstraintError::InvalidLabel(input.to_string()));
    }
    Ok(labels)
}

impl FromStr for Constraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical text form; the cache keys on it, so two equal constraints always print the same
impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.range.is_any(), self.label()) {
            (true, None) => write!(f, "*"),
            (true, Some(labels)) => write!(f, "#{}", labels),
            (false, None) => write!(f, "{}", self.range),
            (false, Some(labels)) => write!(f, "{}#{}", self.range, labels),
        }
    }
}

/// A template name together with its constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector {
    pub name: String,
    pub constraint: Constraint,
}

impl Selector {
    pub fn new(name: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            name: name.into(),
            constraint,
        }
    }

    /// Parse `name[@range][#labels]`
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        debug!(%input, "Selector::parse: called");
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConstraintError::Empty);
        }

        let name = name_of(trimmed);
        if !NAME_RE.is_match(name) {
            return Err(ConstraintError::InvalidName(name.to_string()));
        }

        let rest = &trimmed[name.len()..];
        let constraint = if let Some(after_at) = rest.strip_prefix('@') {
            let range_text = after_at.split('#').next().unwrap_or_default();
            if range_text.trim().is_empty() {
                debug!("Selector::parse: '@' without a range");
                return Err(ConstraintError::InvalidRange(input.to_string()));
            }
            Constraint::parse(after_at)?
        } else {
            // Either empty or starts with '#'
            Constraint::parse(rest)?
        };

        Ok(Self {
            name: name.to_string(),
            constraint,
        })
    }
}

/// The name part of a selector string, even when the rest does not parse
///
/// Lets the fallback path find previous-prod state for a request whose constraint is broken.
pub fn name_of(selector: &str) -> &str {
    let trimmed = selector.trim();
    let end = trimmed.find(['@', '#']).unwrap_or(trimmed.len());
    trimmed[..end].trim_end()
}

impl FromStr for Selector {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Selector {
    type Error = ConstraintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(value: Selector) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.constraint.range().is_any() {
            write!(f, "@{}", self.constraint.range())?;
        }
        if let Some(labels) = self.constraint.label() {
            write!(f, "#{}", labels)?;
        }
        Ok(())
    }
}
