//! Value objects - immutable types shared by the REST and gateway crates

mod intents;
mod snowflake;

pub use intents::Intents;
pub use snowflake::{Snowflake, SnowflakeParseError};
