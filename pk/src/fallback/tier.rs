//! Fallback tiers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Degradation tier, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Cached resolution of the requested constraint
    Primary,
    /// Last revision served under the prod label for this name
    PreviousProd,
    /// Built-in variable-free revision; terminal
    Minimal,
}

impl Tier {
    /// The tier every resolution starts from
    pub const START: Tier = Tier::Primary;

    /// Tier to escalate to after this one fails
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Primary => Some(Tier::PreviousProd),
            Tier::PreviousProd => Some(Tier::Minimal),
            Tier::Minimal => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::PreviousProd => "previous_prod",
            Tier::Minimal => "minimal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_always_reach_minimal() {
        let mut path = vec![Tier::START];
        while let Some(next) = path.last().and_then(|t| t.next()) {
            path.push(next);
        }
        assert_eq!(path, vec![Tier::Primary, Tier::PreviousProd, Tier::Minimal]);
        assert!(Tier::Minimal.is_terminal());
        assert!(!Tier::Primary.is_terminal());
    }

    #[test]
    fn test_serde_names_match_as_str() {
        for tier in [Tier::Primary, Tier::PreviousProd, Tier::Minimal] {
            let json = serde_json::to_string(&tier).unwrap();
            assert_eq!(json, format!("\"{}\"", tier.as_str()));
            assert_eq!(tier.to_string(), tier.as_str());
        }
    }
}
