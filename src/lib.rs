// SPDX-License-Identifier: MPL-2.0

//! Local incremental cache and sync layer for a Nostr social feed.
//!
//! Notes, profiles and reactions are kept in a single SQLite store
//! ([`cache::CacheDb`]). The [`sync`] types serve reads from that store first
//! and reconcile with a remote [`nostr::NostrClient`] afterwards.

pub mod cache;
pub mod config;
pub mod nostr;
pub mod settings;
pub mod sync;

pub use cache::{CacheDb, CacheError};
pub use nostr::{ClientError, NostrClient};
pub use settings::CacheSettings;
