//! Analyze command implementation

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use billwise_core::{
    export::{render_summary, write_summary_json},
    load_ledger, summarize, CategorizedRecord, ImportOptions, LedgerEntry, PeriodSummary,
    PipelineConfig, Provenance,
};
use tracing::warn;

use super::{period_from_path, summary_file_name};

/// Categorized records of a ledger file
///
/// Rows without a category are an error; unreviewed suggestions are counted
/// with a warning.
pub fn load_categorized(config: &PipelineConfig, file: &Path) -> Result<Vec<CategorizedRecord>> {
    let options = ImportOptions::from_config(config);
    let entries = load_ledger(file, &options)
        .with_context(|| format!("Failed to read categorized file: {}", file.display()))?;

    let mut records = Vec::with_capacity(entries.len());
    let mut uncategorized = 0;
    for entry in entries {
        match entry {
            LedgerEntry::Categorized(record) => records.push(record),
            LedgerEntry::Pending(_) => uncategorized += 1,
        }
    }

    if uncategorized > 0 {
        bail!(
            "{} rows in {} have no category yet; run `billwise categorize` first",
            uncategorized,
            file.display()
        );
    }

    let unreviewed = records
        .iter()
        .filter(|r| r.provenance == Provenance::AiSuggested)
        .count();
    if unreviewed > 0 {
        warn!(unreviewed, "Counting unreviewed suggestions as-is");
    }

    Ok(records)
}

pub fn summarize_records(
    config: &PipelineConfig,
    period: &str,
    records: &[CategorizedRecord],
) -> Result<PeriodSummary> {
    summarize(period, records, &config.taxonomy)
        .with_context(|| format!("Failed to summarize period {}", period))
}

pub fn cmd_analyze(
    config: &PipelineConfig,
    file: &Path,
    period: Option<String>,
    json: Option<PathBuf>,
) -> Result<()> {
    let period = period.unwrap_or_else(|| period_from_path(file));
    let records = load_categorized(config, file)?;
    let summary = summarize_records(config, &period, &records)?;

    print!("{}", render_summary(&summary, &config.currency));

    let json_path = json.unwrap_or_else(|| file.with_file_name(summary_file_name(&period)));
    write_summary_json(&json_path, &summary)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    println!();
    println!("📊 Summary written to {}", json_path.display());

    Ok(())
}
