//! Publish VK user and community walls as RSS feeds.
//!
//! The pieces, leaf to root:
//!
//! - [`vk`] - identifier normalization, the VK API client and source metadata
//! - [`content`] - wall post to entry HTML
//! - [`translate`] - memoized title translation
//! - [`storage`] - SQLite persistence of users, feeds and rendered documents
//! - [`feed`] - RSS writing, the cached render pipeline and bulk-import parsing
//! - [`app`] - feed endpoint and management operations

pub mod app;
pub mod config;
pub mod content;
pub mod feed;
pub mod storage;
pub mod translate;
pub mod util;
pub mod vk;
