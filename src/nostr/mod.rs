// SPDX-License-Identifier: MPL-2.0

mod client;
#[cfg(test)]
pub(crate) mod mock;
mod types;

pub use client::{ClientError, NostrClient};
pub use types::{
    Event, FeedKind, KIND_REACTION, KIND_REPOST, KIND_TEXT_NOTE, Note, ProfileMetadata,
    RemoteProfile,
};
