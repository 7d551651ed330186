// SPDX-License-Identifier: MPL-2.0

use crate::cache::{CacheDb, CacheError, CachedProfile, Profile, ProfileCache, StoredProfile};
use crate::nostr::{NostrClient, ProfileMetadata};
use crate::sync::Fetched;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowChange {
    Followed,
    Unfollowed,
    /// Nothing changed remotely or locally
    Failed,
}

/// Profiles served from the cache, refreshed from the network when stale
#[derive(Clone)]
pub struct ProfileSync {
    db: CacheDb,
    client: Arc<dyn NostrClient>,
}

impl ProfileSync {
    pub fn new(db: CacheDb, client: Arc<dyn NostrClient>) -> Self {
        Self { db, client }
    }

    pub fn cached(&self, pubkey: &str) -> Result<Option<CachedProfile>, CacheError> {
        ProfileCache::new(&self.db).get_profile(pubkey)
    }

    /// Two-phase read. The channel yields the cached profile (even a stale
    /// one) right away, then the fetched one if a refresh was needed and
    /// succeeded. It closes after the last value.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(&self, pubkey: &str) -> Result<mpsc::Receiver<Fetched<StoredProfile>>, CacheError> {
        let cached = self.cached(pubkey)?;
        let (tx, rx) = mpsc::channel(2);

        let needs_refresh = match &cached {
            Some(cached) => cached.is_stale || !cached.profile.is_full,
            None => true,
        };

        if let Some(cached) = cached {
            tracing::debug!(pubkey, stale = cached.is_stale, "profile cache hit");
            // Capacity 2 with at most two sends; this cannot be full
            let _ = tx.try_send(Fetched::cached(cached.profile));
        }

        if needs_refresh {
            let sync = self.clone();
            let pubkey = pubkey.to_string();
            tokio::spawn(async move {
                match sync.refresh(&pubkey).await {
                    Ok(Some(profile)) => {
                        let _ = tx.send(Fetched::fresh(profile)).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(pubkey = %pubkey, "failed to store refreshed profile: {}", e);
                    }
                }
            });
        }

        Ok(rx)
    }

    /// Fetch the full profile and replace the cached entry.
    /// None if the network call failed.
    pub async fn refresh(&self, pubkey: &str) -> Result<Option<StoredProfile>, CacheError> {
        if pubkey.is_empty() {
            return Err(CacheError::invalid("profile must have a pubkey"));
        }

        let remote = match self.client.fetch_user_profile(pubkey).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(pubkey, "failed to fetch profile: {}", e);
                return Ok(None);
            }
        };

        let profiles = ProfileCache::new(&self.db);
        profiles.update_profile(&Profile::from_remote(pubkey, remote))?;
        Ok(profiles.get_profile(pubkey)?.map(|cached| cached.profile))
    }

    /// Best available full profile: fresh from cache, else from the network,
    /// else whatever the cache still has.
    pub async fn resolve(&self, pubkey: &str) -> Result<Option<StoredProfile>, CacheError> {
        let cached = self.cached(pubkey)?;

        if let Some(cached) = &cached
            && !cached.is_stale
            && cached.profile.is_full
        {
            return Ok(Some(cached.profile.clone()));
        }

        match self.refresh(pubkey).await? {
            Some(profile) => Ok(Some(profile)),
            None => Ok(cached.map(|cached| cached.profile)),
        }
    }

    /// Metadata for a list of pubkeys, e.g. a follower list. Cached entries
    /// answer directly; the rest are fetched concurrently and cached as
    /// metadata-only. Pubkeys that fail to resolve are left out.
    pub async fn resolve_metadata(
        &self,
        pubkeys: &[String],
    ) -> Result<HashMap<String, ProfileMetadata>, CacheError> {
        let profiles = ProfileCache::new(&self.db);
        let mut resolved = HashMap::new();
        let mut missing = Vec::new();

        let unique: BTreeSet<&str> = pubkeys.iter().map(String::as_str).collect();
        for pubkey in unique {
            match profiles.get_profile(pubkey)? {
                Some(cached) => {
                    resolved.insert(pubkey.to_string(), cached.profile.metadata);
                }
                None => missing.push(pubkey),
            }
        }

        if missing.is_empty() {
            return Ok(resolved);
        }

        let fetched = join_all(missing.iter().map(|pubkey| async move {
            (*pubkey, self.client.fetch_user_metadata(pubkey).await)
        }))
        .await;

        for (pubkey, result) in fetched {
            match result {
                Ok(metadata) => {
                    profiles.update_metadata(pubkey, &metadata)?;
                    resolved.insert(pubkey.to_string(), metadata);
                }
                Err(e) => {
                    tracing::warn!(pubkey, "failed to fetch profile metadata: {}", e);
                }
            }
        }

        tracing::debug!(
            requested = pubkeys.len(),
            fetched = missing.len(),
            resolved = resolved.len(),
            "resolved profile metadata"
        );
        Ok(resolved)
    }

    /// Follow `target` if `viewer` does not follow them yet, unfollow otherwise.
    /// The cached follow sets of both sides are updated on success.
    pub async fn toggle_follow(&self, viewer: &str, target: &str) -> Result<FollowChange, CacheError> {
        if viewer.is_empty() || target.is_empty() {
            return Err(CacheError::invalid("viewer and target are required"));
        }

        let Some(viewer_profile) = self.resolve(viewer).await?.filter(|p| p.is_full) else {
            tracing::warn!(viewer, "cannot toggle follow without the viewer's follow list");
            return Ok(FollowChange::Failed);
        };

        let unfollow = viewer_profile.following.contains(target);
        let result = if unfollow {
            self.client.unfollow_user(target).await
        } else {
            self.client.follow_user(target).await
        };

        if let Err(e) = result {
            tracing::warn!(viewer, target, "failed to toggle follow: {}", e);
            return Ok(FollowChange::Failed);
        }

        let profiles = ProfileCache::new(&self.db);

        let mut updated = Profile::from(viewer_profile);
        if unfollow {
            updated.following.remove(target);
        } else {
            updated.following.insert(target.to_string());
        }
        profiles.update_profile(&updated)?;

        if let Some(cached) = profiles.get_profile(target)?
            && cached.profile.is_full
        {
            let mut target_profile = Profile::from(cached.profile);
            if unfollow {
                target_profile.followers.remove(viewer);
            } else {
                target_profile.followers.insert(viewer.to_string());
            }
            profiles.update_profile(&target_profile)?;
        }

        Ok(if unfollow {
            FollowChange::Unfollowed
        } else {
            FollowChange::Followed
        })
    }
}
