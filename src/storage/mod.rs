mod feed_cache;
mod feeds;
mod schema;
mod types;
mod users;

pub use schema::Database;
pub use types::{CachedFeedDocument, DatabaseError, FeedConfig, FeedSettings, User};
