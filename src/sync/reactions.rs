// SPDX-License-Identifier: MPL-2.0

use crate::cache::{CacheDb, CacheError, Reaction, ReactionCache, ReactionCounts, ReactionType};
use crate::nostr::{ClientError, Event, NostrClient};
use crate::sync::Fetched;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    /// Removed locally; there is no remote retraction
    Removed,
    Failed,
}

/// Like and repost counts for notes, plus the viewer's own reactions
#[derive(Clone)]
pub struct ReactionSync {
    db: CacheDb,
    client: Arc<dyn NostrClient>,
    viewer: String,
}

impl ReactionSync {
    pub fn new(db: CacheDb, client: Arc<dyn NostrClient>, viewer: &str) -> Self {
        Self {
            db,
            client,
            viewer: viewer.to_string(),
        }
    }

    pub fn cached_counts(&self, note_id: &str) -> Result<ReactionCounts, CacheError> {
        ReactionCache::new(&self.db).get_reaction_counts_for_note(note_id)
    }

    /// Fetch reactions newer than the cached ones and return the combined
    /// counts. On network failure the cached counts are returned unchanged.
    pub async fn refresh_counts(&self, note_id: &str) -> Result<ReactionCounts, CacheError> {
        if note_id.is_empty() {
            return Err(CacheError::invalid("note id is required"));
        }

        let (likes_since, reposts_since) = {
            let reactions = ReactionCache::new(&self.db);
            (
                Self::since(&reactions, note_id, ReactionType::Like)?,
                Self::since(&reactions, note_id, ReactionType::Repost)?,
            )
        };

        let (likes, reposts) = tokio::join!(
            self.client.fetch_note_likes(note_id, likes_since),
            self.client.fetch_note_reposts(note_id, reposts_since),
        );

        self.store(note_id, ReactionType::Like, likes)?;
        self.store(note_id, ReactionType::Repost, reposts)?;

        self.cached_counts(note_id)
    }

    /// Two-phase counts: cached right away, then refreshed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch_counts(&self, note_id: &str) -> Result<mpsc::Receiver<Fetched<ReactionCounts>>, CacheError> {
        let cached = self.cached_counts(note_id)?;
        let (tx, rx) = mpsc::channel(2);
        let _ = tx.try_send(Fetched::cached(cached));

        let sync = self.clone();
        let note_id = note_id.to_string();
        tokio::spawn(async move {
            match sync.refresh_counts(&note_id).await {
                Ok(counts) => {
                    let _ = tx.send(Fetched::fresh(counts)).await;
                }
                Err(e) => {
                    tracing::warn!(note = %note_id, "failed to refresh reaction counts: {}", e);
                }
            }
        });

        Ok(rx)
    }

    pub async fn toggle_like(&self, note_id: &str) -> Result<ToggleOutcome, CacheError> {
        self.toggle(note_id, ReactionType::Like).await
    }

    pub async fn toggle_repost(&self, note_id: &str) -> Result<ToggleOutcome, CacheError> {
        self.toggle(note_id, ReactionType::Repost).await
    }

    /// Already reacted: drop the local marker. Otherwise publish, then cache
    /// the reaction with the published event's timestamp.
    async fn toggle(&self, note_id: &str, kind: ReactionType) -> Result<ToggleOutcome, CacheError> {
        if note_id.is_empty() {
            return Err(CacheError::invalid("note id is required"));
        }

        let already = ReactionCache::new(&self.db).has_user_reacted(note_id, &self.viewer, kind)?;
        if already {
            ReactionCache::new(&self.db).remove_reaction(note_id, &self.viewer, kind)?;
            tracing::debug!(note = note_id, %kind, "removed own reaction");
            return Ok(ToggleOutcome::Removed);
        }

        let published = match kind {
            ReactionType::Like => self.client.like_note(note_id).await,
            ReactionType::Repost => self.client.repost_note(note_id, "").await,
        };

        match published {
            Ok(event) => {
                let reaction = Reaction::new(note_id, &self.viewer, kind, event.created_at);
                ReactionCache::new(&self.db).add_reaction(&reaction)?;
                Ok(ToggleOutcome::Added)
            }
            Err(e) => {
                tracing::warn!(note = note_id, %kind, "failed to publish reaction: {}", e);
                Ok(ToggleOutcome::Failed)
            }
        }
    }

    /// Inclusive: other reactions may share the newest cached second, and
    /// the ones already cached are re-added as no-ops.
    fn since(
        reactions: &ReactionCache,
        note_id: &str,
        kind: ReactionType,
    ) -> Result<Option<i64>, CacheError> {
        reactions.most_recent_reaction_timestamp(note_id, Some(kind))
    }

    fn store(
        &self,
        note_id: &str,
        kind: ReactionType,
        fetched: Result<Vec<Event>, ClientError>,
    ) -> Result<(), CacheError> {
        let events = match fetched {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(note = note_id, %kind, "failed to fetch reactions: {}", e);
                return Ok(());
            }
        };

        let reactions = ReactionCache::new(&self.db);
        let mut added = 0;
        for event in events.iter().filter(|e| e.kind == kind.event_kind()) {
            if reactions.add_reaction(&Reaction::new(note_id, &event.pubkey, kind, event.created_at))? {
                added += 1;
            }
        }

        tracing::debug!(note = note_id, %kind, fetched = events.len(), added, "stored reactions");
        Ok(())
    }
}
