use crate::error::StoreError;
use crate::schema::TextIndexSpec;
use crate::{ContentItem, ItemId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

const ITEMS_TREE: &str = "items";
const META_TREE: &str = "meta";
const META_KEY: &[u8] = b"meta";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub created_at: String,
    pub text_indexes: Vec<TextIndexSpec>,
}

pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn db(&self) -> PathBuf { self.root.join("content.sled") }
}

/// Open trees of the content database.
#[derive(Clone)]
pub struct Trees {
    pub db: sled::Db,
    pub items: sled::Tree,
    pub meta: sled::Tree,
}

impl Trees {
    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let items = db.open_tree(ITEMS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Self { db, items, meta })
    }
}

pub fn open_trees(paths: &DataPaths) -> Result<Trees, StoreError> {
    std::fs::create_dir_all(&paths.root).map_err(|e| StoreError::IndexUnavailable(e.into()))?;
    Trees::from_db(sled::open(paths.db())?)
}

/// A database that lives only as long as the returned handle.
pub fn open_temporary_trees() -> Result<Trees, StoreError> {
    Trees::from_db(sled::Config::new().temporary(true).open()?)
}

pub fn item_key(id: ItemId) -> [u8; 8] {
    id.to_be_bytes()
}

/// On-disk layout of a content item. Timestamps are unix nanoseconds, since
/// bincode cannot drive the string-based RFC 3339 deserializers.
#[derive(Debug, Serialize, Deserialize)]
struct StoredItem {
    id: ItemId,
    author_ref: String,
    title: String,
    body: String,
    image_url: Option<String>,
    derived_keywords: String,
    view_count: u64,
    like_count: u64,
    comment_count: u64,
    created_at_ns: i128,
    updated_at_ns: Option<i128>,
}

fn from_unix_nanos(ns: i128) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(ns).map_err(|e| StoreError::Codec(e.to_string()))
}

impl From<&ContentItem> for StoredItem {
    fn from(item: &ContentItem) -> Self {
        Self {
            id: item.id,
            author_ref: item.author_ref.clone(),
            title: item.title.clone(),
            body: item.body.clone(),
            image_url: item.image_url.clone(),
            derived_keywords: item.derived_keywords.clone(),
            view_count: item.view_count,
            like_count: item.like_count,
            comment_count: item.comment_count,
            created_at_ns: item.created_at.unix_timestamp_nanos(),
            updated_at_ns: item.updated_at.map(OffsetDateTime::unix_timestamp_nanos),
        }
    }
}

impl TryFrom<StoredItem> for ContentItem {
    type Error = StoreError;

    fn try_from(stored: StoredItem) -> Result<Self, StoreError> {
        Ok(ContentItem {
            id: stored.id,
            author_ref: stored.author_ref,
            title: stored.title,
            body: stored.body,
            image_url: stored.image_url,
            derived_keywords: stored.derived_keywords,
            view_count: stored.view_count,
            like_count: stored.like_count,
            comment_count: stored.comment_count,
            created_at: from_unix_nanos(stored.created_at_ns)?,
            updated_at: stored.updated_at_ns.map(from_unix_nanos).transpose()?,
        })
    }
}

pub fn encode_item(item: &ContentItem) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(&StoredItem::from(item))?)
}

pub fn decode_item(bytes: &[u8]) -> Result<ContentItem, StoreError> {
    let stored: StoredItem = bincode::deserialize(bytes)?;
    ContentItem::try_from(stored)
}

pub fn load_item(trees: &Trees, id: ItemId) -> Result<Option<ContentItem>, StoreError> {
    trees.items.get(item_key(id))?.map(|bytes| decode_item(&bytes)).transpose()
}

pub fn save_item(trees: &Trees, item: &ContentItem) -> Result<(), StoreError> {
    trees.items.insert(item_key(item.id), encode_item(item)?)?;
    Ok(())
}

pub fn delete_item(trees: &Trees, id: ItemId) -> Result<bool, StoreError> {
    Ok(trees.items.remove(item_key(id))?.is_some())
}

/// All stored items in id order.
pub fn load_items(trees: &Trees) -> impl Iterator<Item = Result<ContentItem, StoreError>> + '_ {
    trees.items.iter().values().map(|value| decode_item(&value?))
}

pub fn save_meta(trees: &Trees, meta: &MetaFile) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(meta)?;
    trees.meta.insert(META_KEY, json)?;
    Ok(())
}

pub fn load_meta(trees: &Trees) -> Result<Option<MetaFile>, StoreError> {
    match trees.meta.get(META_KEY)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
