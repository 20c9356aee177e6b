//! Categorize command implementation

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use billwise_core::{
    export::write_ledger, load_ledger, AIClient, AcceptAll, Categorizer, ClassificationService,
    ClassifyOutcome, ClassifyStats, DecisionMemory, DeferAll, ImportOptions, PipelineConfig,
    Reviewer,
};
use tracing::info;

use super::{categorized_path, ConsoleReviewer, ReviewMode};

/// Categorize one billing file and write the categorized ledger
///
/// Reviewed rows in `file` are carried over untouched. The decision memory at
/// `memory_path` is consulted and updated when given.
pub async fn categorize_file<C, R>(
    config: &PipelineConfig,
    service: &C,
    file: &Path,
    output: &Path,
    memory_path: Option<&Path>,
    reviewer: &mut R,
) -> Result<ClassifyOutcome>
where
    C: ClassificationService + ?Sized,
    R: Reviewer + ?Sized,
{
    let options = ImportOptions::from_config(config);
    let entries = load_ledger(file, &options)
        .with_context(|| format!("Failed to read billing file: {}", file.display()))?;

    let mut memory = match memory_path {
        Some(path) => Some(
            DecisionMemory::load(path)
                .with_context(|| format!("Failed to read decision memory: {}", path.display()))?
                .with_threshold(config.memory_threshold),
        ),
        None => None,
    };

    let outcome = {
        let mut categorizer = Categorizer::new(service, &config.taxonomy);
        if let Some(memory) = memory.as_mut() {
            categorizer = categorizer.with_memory(memory);
        }
        categorizer.classify(entries, reviewer).await
    };

    write_ledger(
        output,
        &outcome.records,
        config.sign_convention,
        config.currency.minor_digits,
    )
    .with_context(|| format!("Failed to write {}", output.display()))?;

    if let (Some(memory), Some(path)) = (memory.as_ref(), memory_path) {
        memory
            .save(path)
            .with_context(|| format!("Failed to write decision memory: {}", path.display()))?;
        info!(path = %path.display(), entries = memory.len(), "Saved decision memory");
    }

    Ok(outcome)
}

/// Categorize with the configured service and the chosen review mode
pub async fn categorize_with_mode<C>(
    config: &PipelineConfig,
    service: &C,
    file: &Path,
    output: &Path,
    memory_path: Option<&Path>,
    mode: ReviewMode,
) -> Result<ClassifyOutcome>
where
    C: ClassificationService + ?Sized,
{
    match mode {
        ReviewMode::Interactive => {
            let stdin = io::stdin();
            let mut reviewer = ConsoleReviewer::new(
                stdin.lock(),
                io::stdout(),
                config.taxonomy.labels(),
                &config.currency,
            );
            reviewer.print_categories()?;
            categorize_file(config, service, file, output, memory_path, &mut reviewer).await
        }
        ReviewMode::AcceptAll => {
            categorize_file(config, service, file, output, memory_path, &mut AcceptAll).await
        }
        ReviewMode::Defer => {
            categorize_file(config, service, file, output, memory_path, &mut DeferAll).await
        }
    }
}

pub async fn cmd_categorize(
    config: &PipelineConfig,
    file: &Path,
    output: Option<PathBuf>,
    memory_path: Option<&Path>,
    mode: ReviewMode,
) -> Result<()> {
    let output = output.unwrap_or_else(|| categorized_path(file));
    let client = AIClient::classifier(config)?;
    info!(model = client.model(), host = client.host(), "Classification service");

    println!("🏷️  Categorizing {}...", file.display());

    let outcome = categorize_with_mode(config, &client, file, &output, memory_path, mode).await?;

    println!();
    print_stats(&outcome.stats);
    println!("✅ Wrote {}", output.display());

    let pending = outcome.pending_review();
    if pending > 0 {
        println!(
            "   {} rows still need review; run `billwise categorize --file {}` again",
            pending,
            output.display()
        );
    }

    Ok(())
}

pub fn print_stats(stats: &ClassifyStats) {
    println!("   Processed: {}", stats.processed);
    if stats.skipped > 0 {
        println!("   Already reviewed: {}", stats.skipped);
    }
    if stats.from_memory > 0 {
        println!("   From memory: {}", stats.from_memory);
    }
    println!("   Confirmed: {}", stats.confirmed);
    println!("   Overridden: {}", stats.overridden);
    if stats.deferred > 0 {
        println!("   Deferred: {}", stats.deferred);
    }
    if stats.unresolved > 0 {
        println!("   Unresolved: {}", stats.unresolved);
    }
    if stats.service_failures > 0 {
        println!("   ⚠️  Service failures: {}", stats.service_failures);
    }
    if stats.taxonomy_fallbacks > 0 {
        println!("   Unknown categories mapped to Other: {}", stats.taxonomy_fallbacks);
    }
}
