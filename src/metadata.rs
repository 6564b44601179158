//! Metadata store loader.
//!
//! Reads the per-document CSV (one row per file, description embedding as a
//! JSON array) and the raw→canonical tag map, and builds the in-memory
//! [`MetadataIndex`]. Any malformed row aborts the load.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use kb_answer_core::index::{IndexEntry, MetadataIndex};
use kb_answer_core::models::DocumentRecord;

use crate::config::Config;

/// One CSV row as written by the ingestion step.
#[derive(Debug, Deserialize)]
struct MetadataRow {
    filepath: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    file_type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    last_modified: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    department: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    in_manifest: String,
    #[serde(default)]
    supersedes: String,
    #[serde(default)]
    conflict_with: String,
    #[serde(default)]
    embedding: String,
}

/// Load the index described by `[paths]` in the config.
pub fn load_index(config: &Config) -> Result<MetadataIndex> {
    let vocabulary = load_vocabulary(&config.paths.master_tags_json)?;
    let entries = load_entries(&config.paths.metadata_csv)?;
    MetadataIndex::build(vocabulary, entries, config.embedding.dims).with_context(|| {
        format!(
            "Failed to build index from {}",
            config.paths.metadata_csv.display()
        )
    })
}

/// Canonical tag vocabulary: the sorted, deduplicated values of the tag map.
pub fn load_vocabulary(path: &Path) -> Result<BTreeSet<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tag map: {}", path.display()))?;
    let raw: BTreeMap<String, String> = serde_json::from_str(&content)
        .with_context(|| format!("Tag map must be a JSON object of strings: {}", path.display()))?;
    Ok(raw.into_values().filter(|t| !t.trim().is_empty()).collect())
}

/// Parse every CSV row into an index entry.
pub fn load_entries(path: &Path) -> Result<Vec<IndexEntry>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open metadata CSV: {}", path.display()))?;

    let mut entries = Vec::new();
    for (i, row) in reader.deserialize::<MetadataRow>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let row = row.with_context(|| format!("{}:{line}: malformed row", path.display()))?;
        let entry =
            into_entry(row).with_context(|| format!("{}:{line}: invalid row", path.display()))?;
        entries.push(entry);
    }
    Ok(entries)
}

fn into_entry(row: MetadataRow) -> Result<IndexEntry> {
    let path = row.filepath.trim().to_string();
    if path.is_empty() {
        bail!("filepath is empty");
    }

    let embedding = parse_embedding(&row.embedding)?;

    let filename = non_empty_or(row.filename, || {
        path.rsplit('/').next().unwrap_or(&path).to_string()
    });
    let file_type = non_empty_or(row.file_type, || {
        Path::new(&path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });

    let record = DocumentRecord {
        filename,
        file_type,
        description: row.description.trim().to_string(),
        tags: split_tags(&row.tags),
        last_modified: row.last_modified.trim().to_string(),
        status: row.status.trim().to_string(),
        department: row.department.trim().to_string(),
        author: row.author.trim().to_string(),
        in_manifest: parse_flag(&row.in_manifest),
        supersedes: optional(&row.supersedes),
        conflict_with: optional(&row.conflict_with),
        path,
    };

    Ok(IndexEntry { record, embedding })
}

fn non_empty_or(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.trim().is_empty() {
        fallback()
    } else {
        value.trim().to_string()
    }
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Pipe-separated tags, blanks dropped.
fn split_tags(raw: &str) -> BTreeSet<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

/// JSON float array; empty cell or `[]` means no embedding.
fn parse_embedding(raw: &str) -> Result<Option<Vec<f32>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let vector: Vec<f32> =
        serde_json::from_str(raw).context("embedding must be a JSON array of numbers")?;
    Ok((!vector.is_empty()).then_some(vector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str = "filepath,filename,file_type,description,tags,last_modified,status,department,author,in_manifest,supersedes,conflict_with,embedding\n";

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_vocabulary_is_sorted_canonical_values() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "tags.json",
            r#"{"PTO": "pto", "vacation": "pto", "k8s": "kubernetes", "blank": " "}"#,
        );
        let vocab: Vec<String> = load_vocabulary(&path).unwrap().into_iter().collect();
        assert_eq!(vocab, vec!["kubernetes", "pto"]);
    }

    #[test]
    fn test_vocabulary_rejects_non_object() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "tags.json", r#"["pto"]"#);
        assert!(load_vocabulary(&path).is_err());
    }

    #[test]
    fn test_load_entries_full_row() {
        let tmp = TempDir::new().unwrap();
        let csv = format!(
            "{HEADER}hr/pto_2024.md,pto_2024.md,md,Updated PTO policy,pto|hr| ,2024-06-01,current,HR,Dana,True,hr/pto_2023.md,,\"[0.5, 0.5]\"\n"
        );
        let path = write(&tmp, "meta.csv", &csv);

        let entries = load_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        let rec = &entries[0].record;
        assert_eq!(rec.path, "hr/pto_2024.md");
        assert_eq!(rec.file_type, "md");
        assert_eq!(rec.tags.iter().collect::<Vec<_>>(), vec!["hr", "pto"]);
        assert!(rec.in_manifest);
        assert_eq!(rec.supersedes.as_deref(), Some("hr/pto_2023.md"));
        assert_eq!(rec.conflict_with, None);
        assert_eq!(entries[0].embedding, Some(vec![0.5, 0.5]));
    }

    #[test]
    fn test_missing_optional_columns_default() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "meta.csv",
            "filepath,description,tags\nslack/general.json,Office chatter,\n",
        );
        let entries = load_entries(&path).unwrap();
        let rec = &entries[0].record;
        assert_eq!(rec.filename, "general.json");
        assert_eq!(rec.file_type, "json");
        assert!(rec.tags.is_empty());
        assert!(!rec.in_manifest);
        assert!(entries[0].embedding.is_none());
    }

    #[test]
    fn test_bad_embedding_names_line() {
        let tmp = TempDir::new().unwrap();
        let csv = format!("{HEADER}a.md,a.md,md,A,,,,,,,,,[0.1]\nb.md,b.md,md,B,,,,,,,,,not-json\n");
        let path = write(&tmp, "meta.csv", &csv);
        let err = format!("{:#}", load_entries(&path).unwrap_err());
        assert!(err.contains(":3:"), "{err}");
        assert!(err.contains("embedding"), "{err}");
    }

    #[test]
    fn test_empty_filepath_rejected() {
        let tmp = TempDir::new().unwrap();
        let csv = format!("{HEADER} ,x.md,md,X,,,,,,,,,\n");
        let path = write(&tmp, "meta.csv", &csv);
        assert!(load_entries(&path).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("True"));
        assert!(parse_flag(" 1 "));
        assert!(!parse_flag("False"));
        assert!(!parse_flag(""));
    }
}
