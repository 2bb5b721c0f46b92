use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::UnknownVariant;

/// Lifecycle of an API key. `Rejected` and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyState {
    Pending,
    Active,
    Rejected,
    Revoked,
}

impl ApiKeyState {
    /// States that still count as the user's live key.
    pub const LIVE: [Self; 2] = [Self::Pending, Self::Active];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Revoked)
    }
}

impl std::fmt::Display for ApiKeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiKeyState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "rejected" => Ok(Self::Rejected),
            "revoked" => Ok(Self::Revoked),
            other => Err(UnknownVariant {
                field: "state",
                value: other.to_string(),
            }),
        }
    }
}

/// Stored API key metadata. Carries the hash only, never the key itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,

    pub user_id: String,

    pub key_prefix: String,

    #[serde(skip)]
    pub key_hash: String,

    pub state: ApiKeyState,

    pub key_version: u32,

    pub created_at: String,

    pub updated_at: String,
}
