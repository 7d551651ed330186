// SPDX-License-Identifier: MPL-2.0

mod clock;
mod db;
mod eviction;
mod feeds;
mod profiles;
mod reactions;
mod schema;

pub use clock::{Clock, ManualClock, SystemClock};
pub use db::CacheDb;
pub use eviction::{EvictionPolicy, EvictionReport};
pub use feeds::{FeedCache, FeedState, StoredNote};
pub use profiles::{CachedProfile, Profile, ProfileCache, StoredProfile};
pub use reactions::{Reaction, ReactionCache, ReactionCounts, ReactionType, StoredReaction};
pub use schema::SCHEMA_VERSION;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found")]
    NotFound,
    #[error("database path error: {0}")]
    Path(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CacheError {
    pub(crate) fn invalid(message: &str) -> Self {
        Self::InvalidInput(message.to_string())
    }
}
