//! # arke-core
//!
//! Shared kernel for the arke client: platform snowflake ids and gateway intents.
//! This crate has no dependency on any transport.

pub mod value_objects;

pub use value_objects::{Intents, Snowflake, SnowflakeParseError};
