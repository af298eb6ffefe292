//! Conversion of VK wall posts into feed entry HTML.

mod formatter;

pub use formatter::{format_post, post_url};
