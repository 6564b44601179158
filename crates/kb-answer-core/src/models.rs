//! Data types that flow through retrieval and answer composition.

use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// One document known to the metadata index.
///
/// The file path is the identity. Records are created once at index load and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    /// Path relative to the knowledge-base root (unique key).
    pub path: String,
    pub filename: String,
    pub file_type: String,
    /// Non-empty summary used both as the embedding source and the BM25 corpus entry.
    pub description: String,
    /// Canonical tags, deduplicated.
    pub tags: BTreeSet<String>,
    pub last_modified: String,
    /// Free-text lifecycle status (`current`, `outdated`, `draft`, `superseded`, ...).
    pub status: String,
    pub department: String,
    pub author: String,
    pub in_manifest: bool,
    /// Path of the document this one replaces.
    pub supersedes: Option<String>,
    /// Path of a document this one contradicts.
    pub conflict_with: Option<String>,
}

impl DocumentRecord {
    /// Paths referenced by `supersedes` and `conflict_with`, in that order.
    pub fn conflict_links(&self) -> impl Iterator<Item = &str> {
        self.supersedes
            .as_deref()
            .into_iter()
            .chain(self.conflict_with.as_deref())
    }
}

/// An unordered pair of document paths known to contradict each other.
///
/// Members are stored in lexicographic order so that `(a, b)` and `(b, a)`
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConflictPair {
    first: String,
    second: String,
}

impl ConflictPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    pub fn contains(&self, path: &str) -> bool {
        self.first == path || self.second == path
    }

    /// True when both members are in `paths`.
    pub fn is_within(&self, paths: &HashSet<&str>) -> bool {
        paths.contains(self.first.as_str()) && paths.contains(self.second.as_str())
    }
}

/// A scored document for one query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub record: DocumentRecord,
    /// Cosine similarity rescaled to `[0, 1]`.
    pub vector_score: f64,
    /// Overlap coefficient between query tags and document tags.
    pub tag_score: f64,
    /// BM25 divided by the batch maximum.
    pub bm25_score: f64,
    /// Weighted combination of the three sub-scores.
    pub score: f64,
    /// Tags extracted from the query (shared by every result of one query).
    pub query_tags: Vec<String>,
}

impl RetrievalResult {
    pub fn path(&self) -> &str {
        &self.record.path
    }
}

/// The composed answer for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    /// Paths of every source block given to the model, in prompt order.
    pub sources: Vec<String>,
    pub has_contradiction: bool,
    /// Number of documents placed in the model context.
    pub context_size: usize,
}
