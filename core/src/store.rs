//! Content store: sled-backed items plus the single keyword text index.
//!
//! Every create/update recomputes `derived_keywords` before taking the index
//! write lock, then persists the record and refreshes its postings under that
//! lock. Readers therefore never observe a record whose postings are stale.

use crate::composer::KeywordComposer;
use crate::error::StoreError;
use crate::index::InvertedIndex;
use crate::persist::{self, DataPaths, MetaFile, Trees};
use crate::schema::{plan_text_indexes, TextIndexPlan, TextIndexSpec, SCHEMA_VERSION};
use crate::{ContentItem, ItemId, NewItem, MAX_TITLE_CHARS};
use parking_lot::RwLock;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const DEFAULT_SIMILAR_LIMIT: usize = 3;
pub const MAX_RESULT_LIMIT: usize = 100;
/// Keyword strings shorter than this (in characters) are not worth querying.
pub const MIN_KEYWORDS_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarStatus {
    Found,
    InsufficientKeywords,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredItem {
    pub item: ContentItem,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct SimilarOutcome {
    pub status: SimilarStatus,
    pub items: Vec<ScoredItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexReport {
    pub items: usize,
    pub updated: usize,
}

pub struct ContentStore {
    trees: Trees,
    composer: KeywordComposer,
    index: RwLock<InvertedIndex>,
    migration: TextIndexPlan,
}

fn clamp_limit(k: usize, default: usize) -> usize {
    if k == 0 { default } else { k.min(MAX_RESULT_LIMIT) }
}

fn validate_title(title: &str) -> Result<String, StoreError> {
    let title = title.trim();
    let chars = title.chars().count();
    if chars > MAX_TITLE_CHARS {
        return Err(StoreError::Validation(format!("title must be at most {MAX_TITLE_CHARS} characters, got {chars}")));
    }
    Ok(title.to_string())
}

impl ContentStore {
    /// Open (or create) the store under `root`.
    pub fn open<P: AsRef<Path>>(root: P, composer: KeywordComposer) -> Result<Self, StoreError> {
        let trees = persist::open_trees(&DataPaths::new(root))?;
        Self::with_trees(trees, composer)
    }

    /// Store backed by a throwaway database, for tests and tooling.
    pub fn temporary(composer: KeywordComposer) -> Result<Self, StoreError> {
        Self::with_trees(persist::open_temporary_trees()?, composer)
    }

    /// Migrate the schema held in `trees` and rebuild the index from stored keywords.
    pub fn with_trees(trees: Trees, composer: KeywordComposer) -> Result<Self, StoreError> {
        let migration = migrate(&trees)?;
        let mut index = InvertedIndex::new(migration.active.clone());
        let mut items = 0usize;
        for item in persist::load_items(&trees) {
            let item = item?;
            index.upsert(item.id, &item.derived_keywords);
            items += 1;
        }
        tracing::info!(
            items,
            indexed = index.num_docs,
            terms = index.num_terms(),
            text_index = %migration.active.name,
            analyzer = composer.tokenizer().analyzer_name(),
            "content store opened"
        );
        Ok(Self { trees, composer, index: RwLock::new(index), migration })
    }

    pub fn composer(&self) -> &KeywordComposer {
        &self.composer
    }

    pub fn text_index(&self) -> TextIndexSpec {
        self.index.read().spec.clone()
    }

    /// What the schema migration did when this store was opened.
    pub fn migration(&self) -> &TextIndexPlan {
        &self.migration
    }

    pub fn len(&self) -> usize {
        self.trees.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.items.is_empty()
    }

    /// Number of documents holding postings (items with non-empty keywords).
    pub fn indexed_len(&self) -> usize {
        self.index.read().num_docs as usize
    }

    pub fn num_terms(&self) -> usize {
        self.index.read().num_terms()
    }

    pub fn create(&self, new: NewItem) -> Result<ContentItem, StoreError> {
        self.create_with_timestamp(new, OffsetDateTime::now_utc())
    }

    /// Create an item with an explicit creation time (used by imports).
    pub fn create_with_timestamp(&self, new: NewItem, created_at: OffsetDateTime) -> Result<ContentItem, StoreError> {
        let title = validate_title(&new.title)?;
        let derived_keywords = self.composer.compose(&title, &new.body);

        let mut index = self.index.write();
        let item = ContentItem {
            id: self.trees.db.generate_id()?,
            author_ref: new.author_ref,
            title,
            body: new.body,
            image_url: new.image_url,
            derived_keywords,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            created_at,
            updated_at: None,
        };
        persist::save_item(&self.trees, &item)?;
        index.upsert(item.id, &item.derived_keywords);
        tracing::debug!(id = item.id, keywords = item.derived_keywords.len(), "item created");
        Ok(item)
    }

    pub fn get(&self, id: ItemId) -> Result<ContentItem, StoreError> {
        persist::load_item(&self.trees, id)?.ok_or(StoreError::NotFound(id))
    }

    /// Replace title and body; keywords are recomputed in the same write.
    pub fn update(&self, id: ItemId, title: &str, body: &str) -> Result<ContentItem, StoreError> {
        let title = validate_title(title)?;
        let derived_keywords = self.composer.compose(&title, body);

        let mut index = self.index.write();
        let mut item = persist::load_item(&self.trees, id)?.ok_or(StoreError::NotFound(id))?;
        item.title = title;
        item.body = body.to_string();
        item.derived_keywords = derived_keywords;
        item.updated_at = Some(OffsetDateTime::now_utc());
        persist::save_item(&self.trees, &item)?;
        index.upsert(item.id, &item.derived_keywords);
        tracing::debug!(id, "item updated");
        Ok(item)
    }

    pub fn delete(&self, id: ItemId) -> Result<(), StoreError> {
        let mut index = self.index.write();
        if !persist::delete_item(&self.trees, id)? {
            return Err(StoreError::NotFound(id));
        }
        index.remove(id);
        tracing::debug!(id, "item deleted");
        Ok(())
    }

    /// Items most similar to `id`, best first. `k == 0` selects the default of 3.
    ///
    /// Keywords are recomputed from the item's current title and body rather
    /// than read from the stored field.
    pub fn find_similar(&self, id: ItemId, k: usize) -> Result<SimilarOutcome, StoreError> {
        let source = self.get(id)?;
        let keywords = self.composer.compose(&source.title, &source.body);
        if keywords.chars().count() < MIN_KEYWORDS_CHARS {
            tracing::debug!(id, "not enough keywords for similarity query");
            return Ok(SimilarOutcome { status: SimilarStatus::InsufficientKeywords, items: Vec::new() });
        }
        let hits = self.index.read().search(&keywords, Some(id));
        let items = self.rank(hits, clamp_limit(k, DEFAULT_SIMILAR_LIMIT))?;
        tracing::debug!(id, results = items.len(), "similar items");
        Ok(SimilarOutcome { status: SimilarStatus::Found, items })
    }

    /// Ranked keyword search over free text.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredItem>, StoreError> {
        let keywords = self.composer.tokenizer().tokenize(query).join(" ");
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.index.read().search(&keywords, None);
        self.rank(hits, clamp_limit(k, 10))
    }

    /// Load the top `k` hits, ordered by score, then newest first, then highest id.
    fn rank(&self, hits: Vec<(ItemId, f32)>, k: usize) -> Result<Vec<ScoredItem>, StoreError> {
        // The cutoff is the score of the k-th hit that actually loads; every hit
        // tied with it is kept so the recency tie-break sees all of them.
        let mut cutoff: Option<f32> = None;
        let mut ranked = Vec::new();
        for (doc_id, score) in hits {
            if cutoff.is_some_and(|c| score < c) {
                break;
            }
            match persist::load_item(&self.trees, doc_id)? {
                Some(item) => {
                    ranked.push(ScoredItem { item, score });
                    if ranked.len() == k {
                        cutoff = Some(score);
                    }
                }
                // Deleted between the index read and this load.
                None => tracing::debug!(doc_id, "skipping vanished hit"),
            }
        }
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(b.item.created_at.cmp(&a.item.created_at))
                .then(b.item.id.cmp(&a.item.id))
        });
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Recompute `derived_keywords` for every item and rebuild the index.
    ///
    /// Keywords are composed without holding the index lock. The rewritten
    /// records go out in one sled batch and the rebuilt index replaces the live
    /// one only after that batch lands; on any error both stay as they were.
    pub fn reindex_all(&self) -> Result<ReindexReport, StoreError> {
        let mut fresh: HashMap<ItemId, (String, String, String)> = HashMap::new();
        for item in persist::load_items(&self.trees) {
            let item = item?;
            let keywords = self.composer.compose(&item.title, &item.body);
            fresh.insert(item.id, (item.title, item.body, keywords));
        }

        let mut index = self.index.write();
        let mut rebuilt = InvertedIndex::new(index.spec.clone());
        let mut batch = sled::Batch::default();
        let mut report = ReindexReport::default();
        for item in persist::load_items(&self.trees) {
            let mut item = item?;
            // Items written since the first pass already carry current keywords.
            if let Some((title, body, keywords)) = fresh.remove(&item.id) {
                if title == item.title && body == item.body && keywords != item.derived_keywords {
                    item.derived_keywords = keywords;
                    batch.insert(persist::item_key(item.id).to_vec(), persist::encode_item(&item)?);
                    report.updated += 1;
                }
            }
            rebuilt.upsert(item.id, &item.derived_keywords);
            report.items += 1;
        }
        self.trees.items.apply_batch(batch)?;
        *index = rebuilt;
        tracing::info!(items = report.items, updated = report.updated, "reindex complete");
        Ok(report)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.trees.db.flush()?;
        Ok(())
    }
}

fn migrate(trees: &Trees) -> Result<TextIndexPlan, StoreError> {
    let meta = persist::load_meta(trees)?;
    if let Some(m) = &meta {
        if m.version > SCHEMA_VERSION {
            return Err(StoreError::Schema(format!(
                "store was written by schema version {}, this build supports {SCHEMA_VERSION}",
                m.version
            )));
        }
    }
    let declared = meta.as_ref().map(|m| m.text_indexes.clone()).unwrap_or_default();
    let plan = plan_text_indexes(&declared)?;
    for dropped in &plan.dropped {
        tracing::info!(name = %dropped.name, fields = ?dropped.fields, "dropping superseded text index");
    }

    let needs_write = match &meta {
        Some(m) => m.version < SCHEMA_VERSION || !plan.is_noop(),
        None => true,
    };
    if needs_write {
        let created_at = match meta {
            Some(m) => m.created_at,
            None => OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        };
        persist::save_meta(
            trees,
            &MetaFile { version: SCHEMA_VERSION, created_at, text_indexes: vec![plan.active.clone()] },
        )?;
        if plan.created {
            tracing::info!(name = %plan.active.name, "declared keyword text index");
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::open_temporary_trees;

    fn new_item(title: &str, body: &str) -> NewItem {
        NewItem { author_ref: "author-1".into(), title: title.into(), body: body.into(), image_url: None }
    }

    #[test]
    fn create_persists_derived_keywords() {
        let store = ContentStore::temporary(KeywordComposer::default()).unwrap();
        let item = store.create(new_item("Go tips", "use go vet")).unwrap();
        assert_eq!(item.derived_keywords, "go tips go tips go tips use go vet");
        assert_eq!(store.get(item.id).unwrap(), item);
    }

    #[test]
    fn title_is_trimmed_and_bounded() {
        let store = ContentStore::temporary(KeywordComposer::default()).unwrap();
        let item = store.create(new_item("  hello  ", "")).unwrap();
        assert_eq!(item.title, "hello");
        let long = "x".repeat(MAX_TITLE_CHARS + 1);
        assert!(matches!(store.create(new_item(&long, "")), Err(StoreError::Validation(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_recomputes_keywords() {
        let store = ContentStore::temporary(KeywordComposer::default()).unwrap();
        let item = store.create(new_item("rust", "")).unwrap();
        let updated = store.update(item.id, "pasta", "tonight").unwrap();
        assert_eq!(updated.derived_keywords, "pasta pasta pasta tonight");
        assert!(updated.updated_at.is_some());
        assert!(store.search("rust", 10).unwrap().is_empty());
    }

    #[test]
    fn missing_items_are_not_found() {
        let store = ContentStore::temporary(KeywordComposer::default()).unwrap();
        assert!(matches!(store.get(42), Err(StoreError::NotFound(42))));
        assert!(matches!(store.update(42, "a", "b"), Err(StoreError::NotFound(42))));
        assert!(matches!(store.delete(42), Err(StoreError::NotFound(42))));
        assert!(matches!(store.find_similar(42, 3), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn legacy_text_index_is_replaced_on_open() {
        let trees = open_temporary_trees().unwrap();
        let legacy = TextIndexSpec::new("title_text_body_text", &["title", "body"]);
        persist::save_meta(
            &trees,
            &MetaFile { version: 1, created_at: String::new(), text_indexes: vec![legacy.clone()] },
        )
        .unwrap();
        let store = ContentStore::with_trees(trees.clone(), KeywordComposer::default()).unwrap();
        assert_eq!(store.migration().dropped, vec![legacy]);
        assert_eq!(store.text_index(), TextIndexSpec::derived_keywords());
        let meta = persist::load_meta(&trees).unwrap().unwrap();
        assert_eq!(meta.text_indexes, vec![TextIndexSpec::derived_keywords()]);
    }

    #[test]
    fn conflicting_keyword_indexes_fail_open() {
        let trees = open_temporary_trees().unwrap();
        let declared = vec![TextIndexSpec::derived_keywords(), TextIndexSpec::new("dup", &["derived_keywords"])];
        persist::save_meta(&trees, &MetaFile { version: 1, created_at: String::new(), text_indexes: declared }).unwrap();
        assert!(matches!(
            ContentStore::with_trees(trees, KeywordComposer::default()),
            Err(StoreError::Schema(_))
        ));
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let trees = open_temporary_trees().unwrap();
        persist::save_meta(&trees, &MetaFile { version: SCHEMA_VERSION + 1, created_at: String::new(), text_indexes: vec![] })
            .unwrap();
        assert!(matches!(
            ContentStore::with_trees(trees, KeywordComposer::default()),
            Err(StoreError::Schema(_))
        ));
    }

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(clamp_limit(0, DEFAULT_SIMILAR_LIMIT), 3);
        assert_eq!(clamp_limit(5, DEFAULT_SIMILAR_LIMIT), 5);
        assert_eq!(clamp_limit(1000, DEFAULT_SIMILAR_LIMIT), MAX_RESULT_LIMIT);
    }

    #[test]
    fn updated_item_reads_back() {
        let store = ContentStore::temporary(KeywordComposer::default()).unwrap();
        let item = store.create(new_item("rust", "")).unwrap();
        let updated = store.update(item.id, "rust async", "tokio").unwrap();
        assert_eq!(store.get(item.id).unwrap(), updated);
    }

    #[test]
    fn failed_reindex_keeps_live_index() {
        let store = ContentStore::temporary(KeywordComposer::default()).unwrap();
        let a = store.create(new_item("graphql schema", "")).unwrap();
        store.create(new_item("graphql resolvers", "")).unwrap();
        store.create(new_item("graphql", "")).unwrap();
        let ids = |store: &ContentStore| -> Vec<ItemId> {
            store.find_similar(a.id, 10).unwrap().items.into_iter().map(|s| s.item.id).collect()
        };
        let before = ids(&store);
        assert_eq!(before.len(), 2);

        store.trees.items.insert(persist::item_key(u64::MAX), vec![1u8, 2]).unwrap();
        assert!(matches!(store.reindex_all(), Err(StoreError::Codec(_))));
        assert_eq!(ids(&store), before);
        assert_eq!(store.indexed_len(), 3);
    }

    #[test]
    fn vanished_hits_are_replaced() {
        let store = ContentStore::temporary(KeywordComposer::default()).unwrap();
        let source = store.create(new_item("graphql schema", "")).unwrap();
        let c = store.create(new_item("graphql schema", "")).unwrap();
        let b = store.create(new_item("graphql schema resolvers", "")).unwrap();
        let d = store.create(new_item("graphql federation directives", "")).unwrap();
        // Record gone, postings still present.
        persist::delete_item(&store.trees, c.id).unwrap();

        let ids: Vec<ItemId> = store.find_similar(source.id, 2).unwrap().items.into_iter().map(|s| s.item.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&b.id) && ids.contains(&d.id));
    }
}
