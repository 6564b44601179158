//! Index statistics.
//!
//! Loads the metadata store exactly as the server would and prints what it
//! found: document and tag counts, embedding coverage, per-status and
//! per-department breakdowns, and every known conflict pair. Used by
//! `kba index` to validate a metadata store before serving it. No model
//! service is contacted.

use anyhow::Result;
use std::collections::BTreeMap;

use kb_answer_core::index::MetadataIndex;

use crate::config::Config;
use crate::metadata::load_index;

pub fn run_index(config: &Config, json: bool) -> Result<()> {
    let index = load_index(config)?;

    if json {
        let summary = index.summary();
        let conflicts: Vec<[&str; 2]> = index
            .conflict_pairs()
            .iter()
            .map(|p| [p.first(), p.second()])
            .collect();
        let out = serde_json::json!({
            "summary": summary,
            "by_status": count_by(&index, |r| r.status.as_str()),
            "conflicts": conflicts,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_report(config, &index);
    Ok(())
}

fn print_report(config: &Config, index: &MetadataIndex) {
    let summary = index.summary();

    println!("kb-answer — Index");
    println!("=================");
    println!();
    println!("  Metadata:    {}", config.paths.metadata_csv.display());
    println!("  Tag map:     {}", config.paths.master_tags_json.display());
    println!("  KB root:     {}", config.paths.kb_root.display());
    println!();
    println!("  Documents:   {}", summary.documents);
    println!("  Tags:        {}", summary.tags);
    println!(
        "  Embedded:    {} / {} (dims {})",
        summary.documents - summary.missing_embeddings,
        summary.documents,
        summary.dims
    );
    println!("  Conflicts:   {}", summary.conflict_pairs);

    print_breakdown("Status", &count_by(index, |r| r.status.as_str()));
    print_breakdown("Department", &count_by(index, |r| r.department.as_str()));

    if !index.conflict_pairs().is_empty() {
        println!();
        println!("  Conflict pairs");
        for pair in index.conflict_pairs() {
            println!("    {} <-> {}", pair.first(), pair.second());
        }
    }
}

fn print_breakdown(title: &str, counts: &BTreeMap<String, usize>) {
    println!();
    println!("  {}", title);
    for (key, count) in counts {
        println!("    {:<20} {}", key, count);
    }
}

fn count_by<F>(index: &MetadataIndex, key: F) -> BTreeMap<String, usize>
where
    F: Fn(&kb_answer_core::models::DocumentRecord) -> &str,
{
    let mut counts = BTreeMap::new();
    for record in index.records() {
        let k = match key(record) {
            "" => "(none)",
            k => k,
        };
        *counts.entry(k.to_string()).or_insert(0) += 1;
    }
    counts
}
