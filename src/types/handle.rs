use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one running server for the lifetime of the daemon. Handles are
/// handed out from 1 upwards and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ServerHandle(pub u32);

impl fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ServerHandle {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>().map(ServerHandle)
    }
}
