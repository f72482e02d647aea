pub mod analyzer;
pub mod composer;
pub mod config;
pub mod error;
pub mod index;
pub mod persist;
pub mod schema;
pub mod store;
pub mod tokenizer;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub use composer::KeywordComposer;
pub use config::TextConfig;
pub use error::{AnalyzerError, StoreError};
pub use store::{ContentStore, ScoredItem, SimilarOutcome, SimilarStatus};
pub use tokenizer::Tokenizer;

pub type ItemId = u64;
pub type TermId = u32;

/// Maximum title length in characters, measured after trimming.
pub const MAX_TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub author_ref: String,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    /// Search-only text generated from `title` and `body` on every write.
    pub derived_keywords: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Caller-supplied fields for a new item. Everything else is assigned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewItem {
    pub author_ref: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub image_url: Option<String>,
}
