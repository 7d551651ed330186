// SPDX-License-Identifier: MPL-2.0

//! In-memory relay stand-in for orchestrator tests.

use crate::nostr::{
    ClientError, Event, FeedKind, KIND_REACTION, KIND_REPOST, KIND_TEXT_NOTE, NostrClient,
    ProfileMetadata, RemoteProfile,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Semaphore;

pub(crate) const MOCK_SELF: &str = "mock-self";

pub(crate) fn text_note(id: &str, pubkey: &str, created_at: i64) -> Event {
    Event {
        id: id.to_string(),
        pubkey: pubkey.to_string(),
        created_at,
        kind: KIND_TEXT_NOTE,
        tags: vec![],
        content: format!("content of {id}"),
        sig: format!("sig-{id}"),
    }
}

pub(crate) fn reaction(kind: u16, note_id: &str, pubkey: &str, created_at: i64) -> Event {
    Event {
        id: format!("{kind}-{pubkey}-{note_id}"),
        pubkey: pubkey.to_string(),
        created_at,
        kind,
        tags: vec![vec!["e".to_string(), note_id.to_string()]],
        content: "+".to_string(),
        sig: String::new(),
    }
}

#[derive(Default)]
pub(crate) struct MockState {
    pub following: Vec<Event>,
    pub authored: HashMap<String, Vec<Event>>,
    pub profiles: HashMap<String, RemoteProfile>,
    pub metadata: HashMap<String, ProfileMetadata>,
    pub likes: HashMap<String, Vec<Event>>,
    pub reposts: HashMap<String, Vec<Event>>,
    /// One entry per remote call, e.g. `fetch_feed since=Some(101) until=None limit=20`
    pub calls: Vec<String>,
}

pub(crate) struct MockClient {
    state: Mutex<MockState>,
    offline: AtomicBool,
    held: AtomicBool,
    gate: Semaphore,
    clock: AtomicI64,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            offline: AtomicBool::new(false),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            clock: AtomicI64::new(1_000),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.split_whitespace().next() == Some(method))
            .count()
    }

    /// Every call fails with a network error while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Park every call until [`MockClient::release`]
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(1024);
    }

    async fn enter(&self, call: String) -> Result<(), ClientError> {
        self.state().calls.push(call);
        if self.held.load(Ordering::SeqCst) {
            let _permit = self.gate.acquire().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ClientError::Network("relay unreachable".to_string()));
        }
        Ok(())
    }

    fn next_timestamp(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, kind: u16, content: &str, tags: Vec<Vec<String>>) -> Event {
        let created_at = self.next_timestamp();
        let event = Event {
            id: format!("published-{created_at}"),
            pubkey: MOCK_SELF.to_string(),
            created_at,
            kind,
            tags,
            content: content.to_string(),
            sig: "mock-sig".to_string(),
        };
        if kind == KIND_TEXT_NOTE {
            self.state()
                .authored
                .entry(MOCK_SELF.to_string())
                .or_default()
                .push(event.clone());
        }
        event
    }
}

/// Relay-style window: inclusive bounds, newest first, capped at `limit`
fn window(events: &[Event], since: Option<i64>, until: Option<i64>, limit: usize) -> Vec<Event> {
    let mut matched: Vec<Event> = events
        .iter()
        .filter(|e| since.is_none_or(|s| e.created_at >= s))
        .filter(|e| until.is_none_or(|u| e.created_at <= u))
        .cloned()
        .collect();
    matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    matched.truncate(limit);
    matched
}

#[async_trait]
impl NostrClient for MockClient {
    async fn fetch_feed(
        &self,
        kind: FeedKind,
        since: Option<i64>,
        until: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Event>, ClientError> {
        self.enter(format!(
            "fetch_feed kind={} since={since:?} until={until:?} limit={limit}",
            kind.as_str()
        ))
        .await?;
        Ok(window(&self.state().following, since, until, limit))
    }

    async fn fetch_user_feed(
        &self,
        pubkey: &str,
        kind: FeedKind,
        since: Option<i64>,
        until: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Event>, ClientError> {
        self.enter(format!(
            "fetch_user_feed pubkey={pubkey} kind={} since={since:?} until={until:?} limit={limit}",
            kind.as_str()
        ))
        .await?;
        let state = self.state();
        Ok(state
            .authored
            .get(pubkey)
            .map(|events| window(events, since, until, limit))
            .unwrap_or_default())
    }

    async fn fetch_user_profile(&self, pubkey: &str) -> Result<RemoteProfile, ClientError> {
        self.enter(format!("fetch_user_profile pubkey={pubkey}")).await?;
        self.state()
            .profiles
            .get(pubkey)
            .cloned()
            .ok_or_else(|| ClientError::InvalidResponse(format!("no profile for {pubkey}")))
    }

    async fn fetch_user_metadata(&self, pubkey: &str) -> Result<ProfileMetadata, ClientError> {
        self.enter(format!("fetch_user_metadata pubkey={pubkey}")).await?;
        self.state()
            .metadata
            .get(pubkey)
            .cloned()
            .ok_or_else(|| ClientError::InvalidResponse(format!("no metadata for {pubkey}")))
    }

    async fn fetch_note_likes(
        &self,
        note_id: &str,
        since: Option<i64>,
    ) -> Result<Vec<Event>, ClientError> {
        self.enter(format!("fetch_note_likes note={note_id} since={since:?}"))
            .await?;
        let state = self.state();
        Ok(state
            .likes
            .get(note_id)
            .map(|events| window(events, since, None, usize::MAX))
            .unwrap_or_default())
    }

    async fn fetch_note_reposts(
        &self,
        note_id: &str,
        since: Option<i64>,
    ) -> Result<Vec<Event>, ClientError> {
        self.enter(format!("fetch_note_reposts note={note_id} since={since:?}"))
            .await?;
        let state = self.state();
        Ok(state
            .reposts
            .get(note_id)
            .map(|events| window(events, since, None, usize::MAX))
            .unwrap_or_default())
    }

    async fn publish_note(&self, content: &str) -> Result<Event, ClientError> {
        self.enter("publish_note".to_string()).await?;
        Ok(self.publish(KIND_TEXT_NOTE, content, vec![]))
    }

    async fn like_note(&self, note_id: &str) -> Result<Event, ClientError> {
        self.enter(format!("like_note note={note_id}")).await?;
        let tags = vec![vec!["e".to_string(), note_id.to_string()]];
        Ok(self.publish(KIND_REACTION, "+", tags))
    }

    async fn repost_note(&self, note_id: &str, quote: &str) -> Result<Event, ClientError> {
        self.enter(format!("repost_note note={note_id}")).await?;
        let tags = vec![vec!["e".to_string(), note_id.to_string()]];
        Ok(self.publish(KIND_REPOST, quote, tags))
    }

    async fn reply_to_note(&self, note_id: &str, content: &str) -> Result<Event, ClientError> {
        self.enter(format!("reply_to_note note={note_id}")).await?;
        let tags = vec![vec!["e".to_string(), note_id.to_string()]];
        Ok(self.publish(KIND_TEXT_NOTE, content, tags))
    }

    async fn follow_user(&self, pubkey: &str) -> Result<(), ClientError> {
        self.enter(format!("follow_user pubkey={pubkey}")).await
    }

    async fn unfollow_user(&self, pubkey: &str) -> Result<(), ClientError> {
        self.enter(format!("unfollow_user pubkey={pubkey}")).await
    }
}
