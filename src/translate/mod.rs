//! Title translation through the MyMemory service, memoized in process.

mod cache;
mod mymemory;

pub use cache::{TranslationCache, MAX_TRANSLATION_CHARS};
pub use mymemory::{MyMemoryClient, TranslationError};
