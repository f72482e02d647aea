//! In-memory inverted index over the `derived_keywords` field.
//!
//! Scoring is TF-IDF cosine similarity: every term gets weight
//! `(1 + ln tf) * ln(1 + N / df)` in both the query and the document, each
//! side is L2-normalized, and the score is their dot product.

use crate::schema::TextIndexSpec;
use crate::{ItemId, TermId};
use std::collections::HashMap;

pub type DocId = ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
}

#[derive(Debug, Default)]
pub struct InvertedIndex {
    pub spec: TextIndexSpec,
    pub dictionary: HashMap<String, TermId>,
    pub df: Vec<u32>,
    pub postings: HashMap<TermId, Vec<Posting>>, // postings sorted by doc_id
    /// Per-document (term, tf) pairs sorted by term id; used for removal and norms.
    pub doc_terms: HashMap<DocId, Vec<(TermId, u32)>>,
    pub num_docs: u32,
}

/// Whitespace split of an already tokenized keyword blob.
pub fn keyword_terms(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

fn term_frequencies<'a>(terms: impl Iterator<Item = &'a str>) -> HashMap<&'a str, u32> {
    let mut tf: HashMap<&str, u32> = HashMap::new();
    for term in terms {
        *tf.entry(term).or_insert(0) += 1;
    }
    tf
}

#[inline]
fn tf_weight(tf_raw: u32) -> f32 {
    if tf_raw > 0 { 1.0 + (tf_raw as f32).ln() } else { 0.0 }
}

impl InvertedIndex {
    pub fn new(spec: TextIndexSpec) -> Self {
        Self { spec, ..Self::default() }
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.doc_terms.contains_key(&doc_id)
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    /// Index `keywords` for `doc_id`, replacing any previous postings for it.
    /// Documents without terms are not indexed.
    pub fn upsert(&mut self, doc_id: DocId, keywords: &str) {
        self.remove(doc_id);
        let tf_counts = term_frequencies(keyword_terms(keywords));
        if tf_counts.is_empty() {
            return;
        }

        let mut terms: Vec<(TermId, u32)> = Vec::with_capacity(tf_counts.len());
        for (term, tf) in tf_counts {
            let tid = self.term_id_or_insert(term);
            self.df[tid as usize] += 1;
            let plist = self.postings.entry(tid).or_default();
            let pos = plist.partition_point(|p| p.doc_id < doc_id);
            plist.insert(pos, Posting { doc_id, tf });
            terms.push((tid, tf));
        }
        terms.sort_unstable_by_key(|(tid, _)| *tid);
        self.doc_terms.insert(doc_id, terms);
        self.num_docs += 1;
    }

    /// Drop every posting of `doc_id`. Returns whether the document was indexed.
    pub fn remove(&mut self, doc_id: DocId) -> bool {
        let Some(terms) = self.doc_terms.remove(&doc_id) else {
            return false;
        };
        for (tid, _) in terms {
            if let Some(plist) = self.postings.get_mut(&tid) {
                if let Ok(pos) = plist.binary_search_by_key(&doc_id, |p| p.doc_id) {
                    plist.remove(pos);
                }
                if plist.is_empty() {
                    self.postings.remove(&tid);
                }
            }
            if let Some(df) = self.df.get_mut(tid as usize) {
                *df = df.saturating_sub(1);
            }
        }
        self.num_docs -= 1;
        true
    }

    fn term_id_or_insert(&mut self, term: &str) -> TermId {
        if let Some(&tid) = self.dictionary.get(term) {
            return tid;
        }
        let tid = self.df.len() as TermId;
        self.dictionary.insert(term.to_string(), tid);
        self.df.push(0);
        tid
    }

    fn idf(&self, tid: TermId) -> f32 {
        let n = self.num_docs.max(1) as f32;
        let df_t = self.df.get(tid as usize).copied().unwrap_or(0).max(1) as f32;
        (1.0 + n / df_t).ln()
    }

    fn doc_norm(&self, doc_id: DocId) -> f32 {
        let norm = self
            .doc_terms
            .get(&doc_id)
            .map(|terms| {
                terms
                    .iter()
                    .map(|&(tid, tf)| {
                        let w = tf_weight(tf) * self.idf(tid);
                        w * w
                    })
                    .sum::<f32>()
                    .sqrt()
            })
            .unwrap_or(0.0);
        if norm == 0.0 { 1.0 } else { norm }
    }

    /// Score every document sharing at least one term with `query`.
    ///
    /// `query` is a keyword blob (already tokenized). Hits are ordered by
    /// descending score; equal scores keep ascending doc id order so the
    /// output is deterministic. `exclude` is never returned.
    pub fn search(&self, query: &str, exclude: Option<DocId>) -> Vec<(DocId, f32)> {
        let mut q_terms: Vec<(TermId, f32)> = term_frequencies(keyword_terms(query))
            .into_iter()
            .filter_map(|(term, tf)| self.dictionary.get(term).map(|&tid| (tid, tf)))
            .filter(|(tid, _)| self.postings.contains_key(tid))
            .map(|(tid, tf)| (tid, tf_weight(tf) * self.idf(tid)))
            .collect();
        if q_terms.is_empty() {
            return Vec::new();
        }
        q_terms.sort_unstable_by_key(|(tid, _)| *tid);

        let mut norm = q_terms.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm == 0.0 { norm = 1.0; }

        let mut raw: HashMap<DocId, f32> = HashMap::new();
        for (tid, q_w) in q_terms.iter() {
            let idf = self.idf(*tid);
            for p in self.postings.get(tid).into_iter().flatten() {
                if Some(p.doc_id) == exclude {
                    continue;
                }
                *raw.entry(p.doc_id).or_insert(0.0) += (q_w / norm) * tf_weight(p.tf) * idf;
            }
        }

        let mut scored: Vec<(DocId, f32)> = raw
            .into_iter()
            .map(|(doc_id, dot)| (doc_id, dot / self.doc_norm(doc_id)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored
    }
}
