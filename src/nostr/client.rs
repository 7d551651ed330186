// SPDX-License-Identifier: MPL-2.0

use crate::nostr::types::{Event, FeedKind, ProfileMetadata, RemoteProfile};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("rejected by relay: {0}")]
    Rejected(String),
}

/// Remote protocol client the caches reconcile against.
///
/// `since` and `until` are unix-second bounds, inclusive, as relays treat
/// them. Implementations are handed to the sync types as
/// `Arc<dyn NostrClient>`; nothing in this crate reaches for a global client.
#[async_trait]
pub trait NostrClient: Send + Sync {
    async fn fetch_feed(
        &self,
        kind: FeedKind,
        since: Option<i64>,
        until: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Event>, ClientError>;

    async fn fetch_user_feed(
        &self,
        pubkey: &str,
        kind: FeedKind,
        since: Option<i64>,
        until: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Event>, ClientError>;

    async fn fetch_user_profile(&self, pubkey: &str) -> Result<RemoteProfile, ClientError>;

    async fn fetch_user_metadata(&self, pubkey: &str) -> Result<ProfileMetadata, ClientError>;

    async fn fetch_note_likes(
        &self,
        note_id: &str,
        since: Option<i64>,
    ) -> Result<Vec<Event>, ClientError>;

    async fn fetch_note_reposts(
        &self,
        note_id: &str,
        since: Option<i64>,
    ) -> Result<Vec<Event>, ClientError>;

    async fn publish_note(&self, content: &str) -> Result<Event, ClientError>;

    async fn like_note(&self, note_id: &str) -> Result<Event, ClientError>;

    async fn repost_note(&self, note_id: &str, quote: &str) -> Result<Event, ClientError>;

    async fn reply_to_note(&self, note_id: &str, content: &str) -> Result<Event, ClientError>;

    async fn follow_user(&self, pubkey: &str) -> Result<(), ClientError>;

    async fn unfollow_user(&self, pubkey: &str) -> Result<(), ClientError>;
}
