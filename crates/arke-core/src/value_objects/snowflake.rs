//! Platform ids
//!
//! The top 42 bits hold milliseconds since the platform epoch; shard routing
//! depends on them too (`(id >> 22) % shard_count`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 64-bit platform id
///
/// Used as the major parameter of rate-limited routes (channel, guild and
/// webhook ids), so it has to hash and compare cheaply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Snowflake(u64);

impl Snowflake {
    /// 2015-01-01T00:00:00Z in Unix milliseconds
    pub const EPOCH_MS: u64 = 1_420_070_400_000;

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }

    /// Milliseconds since the platform epoch
    pub const fn epoch_offset_ms(self) -> u64 {
        self.0 >> 22
    }

    /// When the object behind this id was created
    pub fn created_at(self) -> DateTime<Utc> {
        let unix_ms = self.epoch_offset_ms() + Self::EPOCH_MS;
        DateTime::from_timestamp_millis(unix_ms as i64).unwrap_or_default()
    }

    pub fn parse(s: &str) -> Result<Self, SnowflakeParseError> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| SnowflakeParseError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid snowflake: {0:?}")]
pub struct SnowflakeParseError(pub String);

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Snowflake {
    type Err = SnowflakeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

// Ids travel as strings on the wire; integers are accepted on input too
impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Int(u64),
            Str(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Int(id) => Ok(Self(id)),
            Wire::Str(s) => Self::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}
