// SPDX-License-Identifier: MPL-2.0

use crate::cache::{CacheDb, CacheError, FeedCache};
use crate::nostr::{ClientError, Event, FeedKind, Note, NostrClient};
use crate::sync::{InFlight, SyncOutcome, merge_notes};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which notes a feed shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// Notes from everyone `viewer` follows
    Following { viewer: String },
    /// Notes authored by `pubkey`
    Author { pubkey: String },
}

impl FeedSource {
    pub fn following(viewer: &str) -> Self {
        Self::Following {
            viewer: viewer.to_string(),
        }
    }

    pub fn author(pubkey: &str) -> Self {
        Self::Author {
            pubkey: pubkey.to_string(),
        }
    }

    /// Cache partition the feed reads and writes
    pub fn partition_key(&self) -> String {
        match self {
            Self::Following { viewer } => format!("following:{viewer}"),
            Self::Author { pubkey } => format!("notes:{pubkey}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Initial,
    Loaded,
    LoadingMore,
    Refreshing,
}

/// One displayed feed: cached notes first, then whatever the network adds.
pub struct FeedSync {
    db: CacheDb,
    client: Arc<dyn NostrClient>,
    source: FeedSource,
    partition: String,
    notes: Mutex<Vec<Note>>,
    loaded: AtomicBool,
    loading_more: AtomicBool,
    refreshing: AtomicBool,
    alive: AtomicBool,
}

impl FeedSync {
    pub fn new(db: CacheDb, client: Arc<dyn NostrClient>, source: FeedSource) -> Self {
        let partition = source.partition_key();
        Self {
            db,
            client,
            source,
            partition,
            notes: Mutex::new(Vec::new()),
            loaded: AtomicBool::new(false),
            loading_more: AtomicBool::new(false),
            refreshing: AtomicBool::new(false),
            alive: AtomicBool::new(true),
        }
    }

    pub fn source(&self) -> &FeedSource {
        &self.source
    }

    /// Snapshot of the displayed notes, newest first
    pub fn notes(&self) -> Vec<Note> {
        self.displayed().clone()
    }

    pub fn phase(&self) -> FeedPhase {
        if self.refreshing.load(Ordering::Acquire) {
            FeedPhase::Refreshing
        } else if self.loading_more.load(Ordering::Acquire) {
            FeedPhase::LoadingMore
        } else if self.loaded.load(Ordering::Acquire) {
            FeedPhase::Loaded
        } else {
            FeedPhase::Initial
        }
    }

    /// Stop merging into the displayed list. Calls still running keep
    /// persisting what they fetch.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        !self.alive.load(Ordering::Acquire)
    }

    /// Show whatever the cache holds for this feed, possibly nothing
    pub fn cold_read(&self) -> Result<Vec<Note>, CacheError> {
        self.adopt_legacy()?;
        let cached: Vec<Note> = FeedCache::new(&self.db)
            .get_notes(&self.partition, self.initial_page(), None)?
            .into_iter()
            .map(Note::from)
            .collect();

        tracing::debug!(partition = %self.partition, cached = cached.len(), "cold read");
        self.merge(cached.clone());
        Ok(cached)
    }

    /// First load: cold read, then a forward sync. An empty cache asks for a
    /// full initial page, otherwise only for what is newer than the cache.
    pub async fn load(&self) -> Result<SyncOutcome, CacheError> {
        let cached = self.cold_read()?;
        let limit = if cached.is_empty() {
            self.initial_page()
        } else {
            self.db.settings().pages.refresh
        };

        let mut outcome = self.sync_forward(limit).await;
        self.loaded.store(true, Ordering::Release);

        if let Ok(outcome) = outcome.as_mut() {
            outcome.from_cache = cached.len();
        }
        outcome
    }

    /// User-triggered forward sync. Skipped while another refresh runs.
    pub async fn refresh(&self) -> Result<SyncOutcome, CacheError> {
        let Some(_guard) = InFlight::acquire(&self.refreshing) else {
            tracing::debug!(partition = %self.partition, "refresh already in flight");
            return Ok(SyncOutcome::skipped());
        };

        let outcome = self.sync_forward(self.db.settings().pages.refresh).await?;
        self.loaded.store(true, Ordering::Release);
        Ok(outcome)
    }

    /// Extend the feed backwards: older cached notes first, the network only
    /// when the cache comes up short of a page.
    pub async fn load_more(&self) -> Result<SyncOutcome, CacheError> {
        let Some(_guard) = InFlight::acquire(&self.loading_more) else {
            tracing::debug!(partition = %self.partition, "load more already in flight");
            return Ok(SyncOutcome::skipped());
        };

        let Some(oldest) = self.displayed().last().map(|note| note.created_at) else {
            return Ok(SyncOutcome::default());
        };

        let page = self.db.settings().pages.load_more;
        let feeds = FeedCache::new(&self.db);
        let mut outcome = SyncOutcome::default();

        let older: Vec<Note> = feeds
            .get_notes(&self.partition, page, Some(oldest))?
            .into_iter()
            .map(Note::from)
            .collect();
        let from_cache = self.merge(older);
        outcome.from_cache = from_cache;

        if from_cache >= page {
            return Ok(outcome);
        }

        match self.fetch(None, Some(oldest), page).await {
            Ok(fetched) => {
                outcome.from_network = feeds.add_notes(&self.partition, &fetched)?;
                self.merge(fetched);
            }
            Err(e) => {
                tracing::warn!(partition = %self.partition, "failed to load older notes: {}", e);
                outcome.network_failed = true;
            }
        }

        Ok(outcome)
    }

    /// Publish a note and show it in this feed straight away.
    /// Returns None if the client could not publish it.
    pub async fn publish_note(&self, content: &str) -> Result<Option<Note>, CacheError> {
        if content.trim().is_empty() {
            return Err(CacheError::invalid("note content is empty"));
        }

        let published = self.client.publish_note(content).await;
        self.adopt_published(published)
    }

    pub async fn reply_to_note(
        &self,
        note_id: &str,
        content: &str,
    ) -> Result<Option<Note>, CacheError> {
        if note_id.is_empty() {
            return Err(CacheError::invalid("reply needs a note id"));
        }
        if content.trim().is_empty() {
            return Err(CacheError::invalid("reply content is empty"));
        }

        let published = self.client.reply_to_note(note_id, content).await;
        self.adopt_published(published)
    }

    fn adopt_published(
        &self,
        published: Result<Event, ClientError>,
    ) -> Result<Option<Note>, CacheError> {
        let event = match published {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(partition = %self.partition, "failed to publish note: {}", e);
                return Ok(None);
            }
        };

        let Some(note) = event.into_note() else {
            return Ok(None);
        };

        FeedCache::new(&self.db).add_notes(&self.partition, std::slice::from_ref(&note))?;
        self.merge(vec![note.clone()]);
        Ok(Some(note))
    }

    async fn sync_forward(&self, limit: usize) -> Result<SyncOutcome, CacheError> {
        self.adopt_legacy()?;
        let feeds = FeedCache::new(&self.db);
        let since = feeds
            .get_latest_timestamp(&self.partition)?
            .map(|latest| latest + 1);
        let mut outcome = SyncOutcome::default();

        match self.fetch(since, None, limit).await {
            Ok(fetched) => {
                outcome.from_network = feeds.add_notes(&self.partition, &fetched)?;
                feeds.mark_refreshed(&self.partition)?;
                let merged = self.merge(fetched);
                tracing::debug!(
                    partition = %self.partition,
                    stored = outcome.from_network,
                    merged,
                    "forward sync"
                );
            }
            Err(e) => {
                tracing::warn!(partition = %self.partition, "failed to fetch newer notes: {}", e);
                outcome.network_failed = true;
            }
        }

        Ok(outcome)
    }

    /// Remote page for this feed, text notes only
    async fn fetch(
        &self,
        since: Option<i64>,
        until: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Note>, ClientError> {
        let events = match &self.source {
            FeedSource::Following { .. } => {
                self.client
                    .fetch_feed(FeedKind::Following, since, until, limit)
                    .await?
            }
            FeedSource::Author { pubkey } => {
                self.client
                    .fetch_user_feed(pubkey, FeedKind::Notes, since, until, limit)
                    .await?
            }
        };

        Ok(events.into_iter().filter_map(Event::into_note).collect())
    }

    /// Notes cached before feeds were partitioned all belong to the home feed
    fn adopt_legacy(&self) -> Result<(), CacheError> {
        if let FeedSource::Following { .. } = self.source {
            self.db.adopt_legacy_feed(&self.partition)?;
        }
        Ok(())
    }

    fn initial_page(&self) -> usize {
        let pages = &self.db.settings().pages;
        match self.source {
            FeedSource::Following { .. } => pages.initial,
            FeedSource::Author { .. } => pages.author_initial,
        }
    }

    fn merge(&self, incoming: Vec<Note>) -> usize {
        if self.is_closed() {
            return 0;
        }
        merge_notes(&mut self.displayed(), incoming)
    }

    fn displayed(&self) -> MutexGuard<'_, Vec<Note>> {
        self.notes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
