//! Feed document production.
//!
//! - [`rss`] - RSS 2.0 serialization with `quick-xml`
//! - [`pipeline`] - the cached render of one feed configuration
//! - [`import`] - bulk-import line parsing
//!
//! # Example
//!
//! ```ignore
//! let pipeline = FeedPipeline::new(&config, &db, &vk, &translator);
//! let document = pipeline.render(&feed).await;
//! ```

mod import;
mod pipeline;
mod rss;

pub use import::{parse_import_lines, ImportLine};
pub use pipeline::{FeedPipeline, RenderOutcome, MAX_ENTRY_TITLE_CHARS};
pub use rss::{error_document, write_rss, Channel, Item};
