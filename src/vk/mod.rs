//! VK API access: identifier normalization, the HTTP client, wire models and
//! source metadata lookups.

pub mod client;
pub mod resolver;
pub mod source_info;
pub mod types;

pub use client::{VkApiError, VkClient};
pub use resolver::{resolve, validate_identifier, wall_filter, IdentifierError, ResolvedSource};
pub use source_info::{get_source_info, lookup_source, SourceInfo, SourceMetadata};
pub use types::{SourceType, WallPost};
