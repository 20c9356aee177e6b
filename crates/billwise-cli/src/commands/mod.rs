//! CLI command implementations
//!
//! Commands are organized by pipeline stage:
//! - `categorize` - Classify and review a billing file, write it back
//! - `analyze` - Period statistics and the summary JSON
//! - `recommend` - Budget recommendation report
//! - `run` - All three stages in sequence
//! - `prompts` - Prompt library inspection
//! - `review` - Console reviewer used by categorize and run

pub mod analyze;
pub mod categorize;
pub mod prompts;
pub mod recommend;
pub mod review;
pub mod run;

// Re-export command functions for main.rs
pub use analyze::*;
pub use categorize::*;
pub use prompts::*;
pub use recommend::*;
pub use review::*;
pub use run::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use billwise_core::PipelineConfig;

/// Suffix of categorized ledgers; categorizing such a file rewrites it in place
pub const CATEGORIZED_SUFFIX: &str = "_categorized";

/// Decision memory file name, kept next to the billing files
pub const MEMORY_FILE: &str = "billwise_memory.json";

/// How `categorize` and `run` review suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewMode {
    /// Ask on the console
    Interactive,
    /// Accept everything (`--yes`)
    AcceptAll,
    /// Leave everything ai-suggested (`--defer`)
    Defer,
}

impl ReviewMode {
    pub fn from_flags(yes: bool, defer: bool) -> Self {
        if yes {
            ReviewMode::AcceptAll
        } else if defer {
            ReviewMode::Defer
        } else {
            ReviewMode::Interactive
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    PipelineConfig::load(path).with_context(|| match path {
        Some(p) => format!("Failed to load config from {}", p.display()),
        None => "Failed to load config".to_string(),
    })
}

/// Period label from a billing file name: `202506.csv` and
/// `202506_categorized.csv` both give `202506`
pub fn period_from_path(path: &Path) -> String {
    let stem = file_stem(path);
    stem.strip_suffix(CATEGORIZED_SUFFIX)
        .unwrap_or(&stem)
        .to_string()
}

/// Where the categorized ledger for `input` is written
pub fn categorized_path(input: &Path) -> PathBuf {
    let stem = file_stem(input);
    if stem.ends_with(CATEGORIZED_SUFFIX) {
        return input.to_path_buf();
    }
    input.with_file_name(format!("{}{}.csv", stem, CATEGORIZED_SUFFIX))
}

/// Decision memory location; None when disabled
pub fn memory_path(file: &Path, explicit: Option<PathBuf>, disabled: bool) -> Option<PathBuf> {
    if disabled {
        return None;
    }
    Some(explicit.unwrap_or_else(|| file.with_file_name(MEMORY_FILE)))
}

pub fn summary_file_name(period: &str) -> String {
    format!("{}_summary.json", period)
}

pub fn report_file_name(period: &str) -> String {
    format!("recommendation_{}.md", period)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "period".to_string())
}
