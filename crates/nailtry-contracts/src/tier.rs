use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Longest output side for standard accounts.
pub const STANDARD_MAX_DIMENSION: u32 = 512;

/// Longest output side for elevated (premium) accounts.
pub const ELEVATED_MAX_DIMENSION: u32 = 1024;

/// Wait applied before standard-tier requests are sent.
///
/// This is a product decision that makes the two tiers feel different. It is
/// not backed by any server-side queue.
pub const STANDARD_TIER_DELAY: Duration = Duration::from_secs(2);

/// Caller-declared service tier. The engine treats it as an opaque input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementTier {
    #[default]
    Standard,
    Elevated,
}

impl EntitlementTier {
    pub fn from_premium(is_premium: bool) -> Self {
        if is_premium {
            Self::Elevated
        } else {
            Self::Standard
        }
    }

    pub fn is_elevated(self) -> bool {
        matches!(self, Self::Elevated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Elevated => "elevated",
        }
    }

    pub fn default_max_dimension(self) -> u32 {
        match self {
            Self::Standard => STANDARD_MAX_DIMENSION,
            Self::Elevated => ELEVATED_MAX_DIMENSION,
        }
    }
}

impl fmt::Display for EntitlementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
