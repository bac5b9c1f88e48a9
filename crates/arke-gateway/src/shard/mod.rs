//! Sharding
//!
//! Each shard is one gateway session covering a slice of the guilds. The
//! manager starts them one identify slot at a time and restarts the ones
//! that fail.

mod identify;
mod manager;

pub use identify::IdentifyQueue;
pub use manager::ShardManager;

use std::fmt;

/// Position of a shard in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardInfo {
    pub id: u32,
    pub total: u32,
}

impl ShardInfo {
    #[must_use]
    pub const fn new(id: u32, total: u32) -> Self {
        Self { id, total }
    }

    /// `[shard_id, shard_count]` as sent in Identify
    #[must_use]
    pub const fn as_array(self) -> [u32; 2] {
        [self.id, self.total]
    }
}

impl fmt::Display for ShardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.id, self.total)
    }
}
