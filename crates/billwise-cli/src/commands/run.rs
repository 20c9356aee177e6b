//! Run command: categorize, analyze and recommend in one pass

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use billwise_core::{
    export::{render_summary, write_summary_json},
    AIClient, ClassificationService, ClassifyStats, PipelineConfig, ReasoningService,
};
use tracing::{info, warn};

use super::{
    categorize_with_mode, load_prior, print_stats, recommend_period, report_file_name,
    summarize_records, summary_file_name, ReviewMode, CATEGORIZED_SUFFIX,
};

/// Inputs of one pipeline run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub file: PathBuf,
    pub period: String,
    pub prior: Option<PathBuf>,
    pub memory: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub user_context: String,
    pub recommend: bool,
}

impl RunOptions {
    fn artifact(&self, name: &str) -> PathBuf {
        match self.out_dir {
            Some(ref dir) => dir.join(name),
            None => self.file.with_file_name(name),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.artifact(&format!("{}{}.csv", self.period, CATEGORIZED_SUFFIX))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.artifact(&summary_file_name(&self.period))
    }

    pub fn report_path(&self) -> PathBuf {
        self.artifact(&report_file_name(&self.period))
    }
}

/// Files written by a run
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub ledger: PathBuf,
    pub summary: PathBuf,
    pub report: Option<PathBuf>,
    pub stats: ClassifyStats,
}

/// Run the whole pipeline against the given services
///
/// The categorized ledger and the summary are written before the reasoning
/// service is called, so a failed recommendation leaves both in place.
pub async fn run_pipeline<C, S>(
    config: &PipelineConfig,
    classifier: &C,
    reasoner: &S,
    options: &RunOptions,
    mode: ReviewMode,
) -> Result<RunArtifacts>
where
    C: ClassificationService + ?Sized,
    S: ReasoningService + ?Sized,
{
    if let Some(ref dir) = options.out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    // Read before any service call so a bad path fails fast
    let prior = load_prior(options.prior.as_deref())?;

    let ledger = options.ledger_path();
    let outcome = categorize_with_mode(
        config,
        classifier,
        &options.file,
        &ledger,
        options.memory.as_deref(),
        mode,
    )
    .await?;
    print_stats(&outcome.stats);

    let summary = summarize_records(config, &options.period, &outcome.records)?;
    let summary_path = options.summary_path();
    write_summary_json(&summary_path, &summary)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    println!();
    print!("{}", render_summary(&summary, &config.currency));

    let mut artifacts = RunArtifacts {
        ledger,
        summary: summary_path,
        report: None,
        stats: outcome.stats,
    };

    if !options.recommend {
        return Ok(artifacts);
    }

    let pending = outcome.pending_review();
    if pending > 0 {
        warn!(pending, "Recommending with unreviewed categories");
    }

    let report_path = options.report_path();
    recommend_period(
        config,
        reasoner,
        &outcome.records,
        &summary,
        prior.as_ref(),
        &options.user_context,
        &report_path,
    )
    .await
    .with_context(|| {
        format!(
            "Recommendation failed; the summary is still at {}",
            artifacts.summary.display()
        )
    })?;

    artifacts.report = Some(report_path);
    Ok(artifacts)
}

pub async fn cmd_run(config: &PipelineConfig, options: &RunOptions, mode: ReviewMode) -> Result<()> {
    let classifier = AIClient::classifier(config)?;
    let reasoner = AIClient::reasoner(config)?;
    info!(
        classify_model = classifier.model(),
        reason_model = reasoner.model(),
        period = %options.period,
        "Starting run"
    );

    println!("🏷️  Categorizing {}...", options.file.display());
    let artifacts = run_pipeline(config, &classifier, &reasoner, options, mode).await?;

    println!();
    print_artifact("Categorized ledger", &artifacts.ledger);
    print_artifact("Summary", &artifacts.summary);
    if let Some(ref report) = artifacts.report {
        print_artifact("Recommendation", report);
    }

    Ok(())
}

fn print_artifact(label: &str, path: &Path) {
    println!("✅ {}: {}", label, path.display());
}
