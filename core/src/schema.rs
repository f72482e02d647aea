//! Text index declarations for the content collection.
//!
//! The collection carries exactly one text index, over `derived_keywords`.
//! Older layouts indexed `title` and `body` directly; those declarations are
//! superseded when the store opens.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// Current on-disk layout version.
pub const SCHEMA_VERSION: u32 = 1;
pub const KEYWORDS_FIELD: &str = "derived_keywords";
pub const KEYWORDS_INDEX_NAME: &str = "items_derived_keywords_text";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextIndexSpec {
    pub name: String,
    pub fields: Vec<String>,
}

impl TextIndexSpec {
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self { name: name.into(), fields: fields.iter().map(|f| f.to_string()).collect() }
    }

    pub fn derived_keywords() -> Self {
        Self::new(KEYWORDS_INDEX_NAME, &[KEYWORDS_FIELD])
    }

    pub fn covers_keywords_only(&self) -> bool {
        self.fields.len() == 1 && self.fields[0] == KEYWORDS_FIELD
    }
}

impl Default for TextIndexSpec {
    fn default() -> Self {
        Self::derived_keywords()
    }
}

/// Outcome of reconciling declared text indexes with the single-index rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextIndexPlan {
    pub active: TextIndexSpec,
    pub dropped: Vec<TextIndexSpec>,
    pub created: bool,
}

impl TextIndexPlan {
    pub fn is_noop(&self) -> bool {
        self.dropped.is_empty() && !self.created
    }
}

/// Decide which text index the collection keeps.
///
/// Declarations that do not cover exactly `derived_keywords` are dropped.
/// Two or more keyword indexes cannot be reconciled and fail fast.
pub fn plan_text_indexes(declared: &[TextIndexSpec]) -> Result<TextIndexPlan, StoreError> {
    let (keyword, dropped): (Vec<_>, Vec<_>) = declared.iter().cloned().partition(TextIndexSpec::covers_keywords_only);
    match keyword.len() {
        0 => Ok(TextIndexPlan { active: TextIndexSpec::derived_keywords(), dropped, created: true }),
        1 => Ok(TextIndexPlan { active: keyword[0].clone(), dropped, created: false }),
        n => {
            let names: Vec<&str> = keyword.iter().map(|s| s.name.as_str()).collect();
            Err(StoreError::Schema(format!(
                "{n} text indexes declared on {KEYWORDS_FIELD} ({}), only one is allowed",
                names.join(", ")
            )))
        }
    }
}
