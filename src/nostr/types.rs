// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

pub const KIND_TEXT_NOTE: u16 = 1;
pub const KIND_REPOST: u16 = 6;
pub const KIND_REACTION: u16 = 7;

/// Signed event as the remote client hands it over.
/// Decoupled from any relay library so we own the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    /// Unix seconds
    pub created_at: i64,
    pub kind: u16,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl Event {
    pub fn is_text_note(&self) -> bool {
        self.kind == KIND_TEXT_NOTE
    }

    /// The note carried by this event, if it is a text note
    pub fn into_note(self) -> Option<Note> {
        if !self.is_text_note() {
            return None;
        }
        Some(Note {
            id: self.id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            content: self.content,
            tags: self.tags,
            sig: self.sig,
        })
    }
}

/// A kind-1 text note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub pubkey: String,
    /// Unix seconds; drives display order and pagination
    pub created_at: i64,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub sig: String,
}

impl Note {
    /// Id of the note this one replies to: the last `e` tag
    pub fn parent_id(&self) -> Option<&str> {
        self.tags
            .iter()
            .filter(|tag| tag.first().is_some_and(|name| name == "e"))
            .filter_map(|tag| tag.get(1))
            .last()
            .map(String::as_str)
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id().is_some()
    }
}

/// Which remote feed to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Notes from everyone the viewer follows
    Following,
    /// Notes authored by one user
    Notes,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Following => "FOLLOWING_FEED",
            Self::Notes => "NOTES_FEED",
        }
    }
}

/// Kind-0 profile metadata. Unknown fields are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Profile snapshot as returned by `fetch_user_profile`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteProfile {
    #[serde(default)]
    pub metadata: ProfileMetadata,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
}
