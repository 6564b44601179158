//! Document lookup by index path.
//!
//! Shows a record's metadata and its body exactly as the answer composer
//! would see it (JSON message logs flattened, missing files as markers).
//! Used by `kba get`; needs no model services.

use anyhow::{bail, Result};
use serde::Serialize;

use kb_answer_core::answer::load_body;
use kb_answer_core::models::DocumentRecord;

use crate::config::Config;
use crate::docstore::FsDocumentStore;
use crate::metadata::load_index;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub record: DocumentRecord,
    /// Paths this document is known to conflict with.
    pub conflicts: Vec<String>,
    pub body: String,
}

pub async fn get_document(config: &Config, path: &str) -> Result<DocumentResponse> {
    let index = load_index(config)?;
    let Some(record) = index.get(path) else {
        bail!("document not found in index: {}", path);
    };

    let conflicts = index
        .conflict_pairs()
        .iter()
        .filter(|pair| pair.contains(path))
        .map(|pair| {
            if pair.first() == path {
                pair.second().to_string()
            } else {
                pair.first().to_string()
            }
        })
        .collect();

    let store = FsDocumentStore::new(&config.paths.kb_root);
    let body = load_body(&store, path).await?;

    Ok(DocumentResponse {
        record: record.clone(),
        conflicts,
        body,
    })
}

/// CLI entry point: calls get_document and prints to stdout.
pub async fn run_get(config: &Config, path: &str) -> Result<()> {
    let doc = get_document(config, path).await?;
    let rec = &doc.record;

    println!("--- Document ---");
    println!("path:          {}", rec.path);
    println!("filename:      {}", rec.filename);
    println!("file_type:     {}", rec.file_type);
    println!("status:        {}", or_dash(&rec.status));
    println!("last_modified: {}", or_dash(&rec.last_modified));
    println!("department:    {}", or_dash(&rec.department));
    println!("author:        {}", or_dash(&rec.author));
    println!("in_manifest:   {}", rec.in_manifest);
    println!(
        "tags:          {}",
        rec.tags.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    println!("description:   {}", rec.description);
    if let Some(ref s) = rec.supersedes {
        println!("supersedes:    {}", s);
    }
    for other in &doc.conflicts {
        println!("conflicts:     {}", other);
    }
    println!();

    println!("--- Body ---");
    println!("{}", doc.body);

    Ok(())
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}
