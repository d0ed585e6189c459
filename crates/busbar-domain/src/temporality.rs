use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether the reporter judged a processing failure to be worth retrying.
///
/// `Unknown` is a valid wire value: reporters that cannot classify a failure
/// leave the decision to the recovery service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Temporality {
    Temporary,
    Permanent,
    Unknown,
}

impl Temporality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Temporality::Temporary => "TEMPORARY",
            Temporality::Permanent => "PERMANENT",
            Temporality::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Temporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown temporality: {0:?}")]
pub struct ParseTemporalityError(String);

impl FromStr for Temporality {
    type Err = ParseTemporalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEMPORARY" => Ok(Temporality::Temporary),
            "PERMANENT" => Ok(Temporality::Permanent),
            "UNKNOWN" => Ok(Temporality::Unknown),
            other => Err(ParseTemporalityError(other.to_owned())),
        }
    }
}
