use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Identity;

/// Role stored on each identity. New identities start as `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Something a caller may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SubmitRuns,
    ReadStatistics,
    ManageOwnData,
    ManageIdentities,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    const fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::User => &[
                Capability::SubmitRuns,
                Capability::ReadStatistics,
                Capability::ManageOwnData,
            ],
            Self::Admin => &[
                Capability::SubmitRuns,
                Capability::ReadStatistics,
                Capability::ManageOwnData,
                Capability::ManageIdentities,
            ],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{other}', expected 'user' or 'admin'")),
        }
    }
}

/// Single authorization check shared by every privileged code path.
pub trait Authorize {
    fn permits(&self, capability: Capability) -> bool;
}

impl Authorize for Role {
    fn permits(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl Authorize for Identity {
    fn permits(&self, capability: Capability) -> bool {
        self.role.permits(capability)
    }
}
