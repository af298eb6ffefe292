//! Small helpers shared by the feed pipeline and the management operations.
//!
//! - **Text**: character-based truncation and XML-safe sanitizing of
//!   upstream strings (VK titles and post bodies are user-controlled)
//! - **Access tokens**: generation and comparison of per-feed secrets
//! - **HTTP**: size-capped body reads shared by the upstream clients
//!
//! # Examples
//!
//! ```
//! use vk2rss::util::{first_line, truncate_chars};
//!
//! assert_eq!(first_line("Headline\nbody"), "Headline");
//! assert_eq!(truncate_chars("Привет, мир", 6), "Привет");
//! ```

mod http;
mod text;
mod token;

pub use http::{read_limited_bytes, ReadLimitError};
pub use text::{first_line, strip_xml_invalid_chars, truncate_chars};
pub use token::{generate_access_token, tokens_match};
