//! Recommend command implementation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use billwise_core::{
    export::{read_summary_json, write_report_markdown},
    verify, AIClient, CategorizedRecord, Composer, PeriodSummary, PipelineConfig, ReasoningService,
    RecommendationReport,
};
use tracing::info;

use super::{load_categorized, period_from_path, report_file_name, summarize_records};

/// User context from `--context` or `--context-file`; empty when neither is given
pub fn read_context(text: Option<&str>, file: Option<&Path>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text.to_string()),
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read context file: {}", path.display()))?;
            Ok(content.trim_end().to_string())
        }
        (None, None) => Ok(String::new()),
    }
}

/// Previous period summary, if a path was given
///
/// The file is checked with [`verify`] so an edited or damaged summary is
/// rejected instead of skewing the comparison.
pub fn load_prior(path: Option<&Path>) -> Result<Option<PeriodSummary>> {
    path.map(|p| {
        let summary = read_summary_json(p)
            .with_context(|| format!("Failed to read prior summary: {}", p.display()))?;
        verify(&summary)
            .with_context(|| format!("Prior summary is inconsistent: {}", p.display()))?;
        Ok(summary)
    })
    .transpose()
}

/// Ask for a recommendation and write the markdown report
pub async fn recommend_period<S>(
    config: &PipelineConfig,
    service: &S,
    records: &[CategorizedRecord],
    summary: &PeriodSummary,
    prior: Option<&PeriodSummary>,
    user_context: &str,
    output: &Path,
) -> Result<RecommendationReport>
where
    S: ReasoningService + ?Sized,
{
    let report = Composer::new(service, &config.currency)
        .with_records(records)
        .recommend(summary, prior, user_context)
        .await?;

    write_report_markdown(output, &report)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(report)
}

pub async fn cmd_recommend(
    config: &PipelineConfig,
    file: &Path,
    period: Option<String>,
    prior: Option<&Path>,
    user_context: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let period = period.unwrap_or_else(|| period_from_path(file));
    let records = load_categorized(config, file)?;
    let summary = summarize_records(config, &period, &records)?;
    let prior = load_prior(prior)?;

    let client = AIClient::reasoner(config)?;
    info!(model = client.model(), host = client.host(), "Reasoning service");

    println!("🤖 Requesting recommendation for {}...", period);

    let output = output.unwrap_or_else(|| file.with_file_name(report_file_name(&period)));
    recommend_period(
        config,
        &client,
        &records,
        &summary,
        prior.as_ref(),
        user_context,
        &output,
    )
    .await?;

    println!("✅ Report written to {}", output.display());

    Ok(())
}
