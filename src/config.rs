// SPDX-License-Identifier: MPL-2.0

pub const APP_ID: &str = "io.github.sethcottle.Perch";
pub const APP_NAME: &str = "perch";

/// File name of the cache database inside the data directory
pub const CACHE_FILE: &str = "cache.db";

pub const NOTES_MAX_AGE_HOURS: i64 = 14 * 24;
pub const NOTES_MAX_ITEMS: usize = 5000;

pub const PROFILES_MAX_AGE_HOURS: i64 = 25;
pub const PROFILES_MAX_ITEMS: usize = 10000;
pub const PROFILE_STALE_AFTER_MINUTES: i64 = 1440;

pub const REACTIONS_MAX_AGE_HOURS: i64 = 30 * 24;
pub const REACTIONS_MAX_ITEMS: usize = 10000;

pub const INITIAL_FETCH_SIZE: usize = 100;
pub const AUTHOR_INITIAL_FETCH_SIZE: usize = 10;
pub const REFRESH_FETCH_SIZE: usize = 20;
pub const LOAD_MORE_SIZE: usize = 50;
