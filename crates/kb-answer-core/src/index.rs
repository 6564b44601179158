//! In-memory metadata index.
//!
//! Holds three parallel, index-aligned structures built once at startup:
//! the document records, their unit-length embeddings, and a BM25 model
//! fitted over their descriptions. Row `i` in each refers to the same
//! document. The index is immutable after [`MetadataIndex::build`], so it can
//! be shared across concurrent queries behind an `Arc` without locking.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::bm25::Bm25;
use crate::embedding::normalize_in_place;
use crate::models::{ConflictPair, DocumentRecord};

/// A record plus its raw (not yet normalized) embedding, as read from the
/// metadata store.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub record: DocumentRecord,
    /// `None` (or empty) when the store has no embedding for this record.
    pub embedding: Option<Vec<f32>>,
}

/// Read-only index over every known document.
#[derive(Debug)]
pub struct MetadataIndex {
    records: Vec<DocumentRecord>,
    embeddings: Vec<Vec<f32>>,
    bm25: Bm25,
    vocabulary: BTreeSet<String>,
    conflict_pairs: Vec<ConflictPair>,
    positions: HashMap<String, usize>,
    dims: usize,
    missing_embeddings: usize,
}

/// Counts reported by `kba index` and `GET /index`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub documents: usize,
    pub tags: usize,
    pub conflict_pairs: usize,
    pub dims: usize,
    pub missing_embeddings: usize,
}

impl MetadataIndex {
    /// Build the index from the canonical tag vocabulary and records in load order.
    ///
    /// Embeddings are normalized to unit length; records without one get a
    /// zero vector. `default_dims` is only used when no record carries an
    /// embedding at all.
    ///
    /// # Errors
    ///
    /// Fails on an empty description, a duplicate path, or embeddings of
    /// inconsistent dimension.
    pub fn build<I>(vocabulary: I, entries: Vec<IndexEntry>, default_dims: usize) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let vocabulary: BTreeSet<String> = vocabulary
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let dims = entries
            .iter()
            .filter_map(|e| e.embedding.as_ref())
            .find(|v| !v.is_empty())
            .map(Vec::len)
            .unwrap_or(default_dims);

        let mut records = Vec::with_capacity(entries.len());
        let mut embeddings = Vec::with_capacity(entries.len());
        let mut positions = HashMap::with_capacity(entries.len());
        let mut missing_embeddings = 0;

        for (row, entry) in entries.into_iter().enumerate() {
            let record = entry.record;
            if record.description.trim().is_empty() {
                bail!("document '{}' has an empty description", record.path);
            }
            if positions.insert(record.path.clone(), row).is_some() {
                bail!("duplicate document path '{}'", record.path);
            }

            let vector = match entry.embedding {
                Some(mut v) if !v.is_empty() => {
                    if v.len() != dims {
                        bail!(
                            "document '{}' has a {}-dimensional embedding, expected {}",
                            record.path,
                            v.len(),
                            dims
                        );
                    }
                    normalize_in_place(&mut v);
                    v
                }
                _ => {
                    missing_embeddings += 1;
                    vec![0.0; dims]
                }
            };

            records.push(record);
            embeddings.push(vector);
        }

        let mut bm25 = Bm25::default();
        let descriptions: Vec<&str> = records.iter().map(|r| r.description.as_str()).collect();
        bm25.fit(&descriptions);

        let conflict_pairs = derive_conflict_pairs(&records);

        tracing::info!(
            documents = records.len(),
            tags = vocabulary.len(),
            conflict_pairs = conflict_pairs.len(),
            missing_embeddings,
            "metadata index loaded"
        );

        Ok(Self {
            records,
            embeddings,
            bm25,
            vocabulary,
            conflict_pairs,
            positions,
            dims,
            missing_embeddings,
        })
    }

    /// Records in load order.
    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    /// Unit-length embeddings, aligned with [`records`](Self::records).
    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn bm25(&self) -> &Bm25 {
        &self.bm25
    }

    pub fn vocabulary(&self) -> &BTreeSet<String> {
        &self.vocabulary
    }

    pub fn conflict_pairs(&self) -> &[ConflictPair] {
        &self.conflict_pairs
    }

    pub fn get(&self, path: &str) -> Option<&DocumentRecord> {
        self.positions.get(path).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn summary(&self) -> IndexSummary {
        IndexSummary {
            documents: self.records.len(),
            tags: self.vocabulary.len(),
            conflict_pairs: self.conflict_pairs.len(),
            dims: self.dims,
            missing_embeddings: self.missing_embeddings,
        }
    }
}

/// Scan `supersedes` / `conflict_with` links into deduplicated unordered pairs,
/// in first-seen order. Links back to the record itself are ignored.
fn derive_conflict_pairs(records: &[DocumentRecord]) -> Vec<ConflictPair> {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for record in records {
        for other in record.conflict_links() {
            let other = other.trim();
            if other.is_empty() || other == record.path {
                continue;
            }
            let pair = ConflictPair::new(record.path.clone(), other);
            if seen.insert(pair.clone()) {
                pairs.push(pair);
            }
        }
    }
    pairs
}
