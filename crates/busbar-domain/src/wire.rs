use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Record framing used by a cluster's schema registry.
///
/// Both registries put a fixed-size binary frame in front of the JSON body:
///
/// * `Confluent`: one `0x00` magic byte followed by a big-endian `u32`
///   schema id (5 bytes total).
/// * `Glue`: one `0x03` version byte followed by a 16-byte schema UUID
///   (17 bytes total).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordFormat {
    Confluent,
    Glue,
}

impl RecordFormat {
    pub const CONFLUENT_MAGIC: u8 = 0x00;
    pub const GLUE_VERSION: u8 = 0x03;

    /// Bytes of registry framing before the JSON body.
    pub fn frame_len(&self) -> usize {
        match self {
            RecordFormat::Confluent => 5,
            RecordFormat::Glue => 17,
        }
    }

    /// Guess the framing from the leading bytes of a payload.
    ///
    /// Returns `None` for payloads that carry no known frame, which
    /// includes bare JSON (`{`, `[`, ...) and truncated frames.
    pub fn sniff(payload: &[u8]) -> Option<RecordFormat> {
        let format = match payload.first()? {
            &Self::CONFLUENT_MAGIC => RecordFormat::Confluent,
            &Self::GLUE_VERSION => RecordFormat::Glue,
            _ => return None,
        };
        (payload.len() > format.frame_len()).then_some(format)
    }

    /// The JSON body behind the frame, or `None` when the payload is too
    /// short to contain one.
    pub fn strip<'a>(&self, payload: &'a [u8]) -> Option<&'a [u8]> {
        payload.get(self.frame_len()..)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFormat::Confluent => "CONFLUENT",
            RecordFormat::Glue => "GLUE",
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown record format: {0:?}")]
pub struct ParseFormatError(String);

impl FromStr for RecordFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFLUENT" => Ok(RecordFormat::Confluent),
            "GLUE" => Ok(RecordFormat::Glue),
            other => Err(ParseFormatError(other.to_owned())),
        }
    }
}
