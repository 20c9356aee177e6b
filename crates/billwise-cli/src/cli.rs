//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Billwise - Categorize billing statements and plan the next budget
#[derive(Parser)]
#[command(name = "billwise")]
#[command(about = "AI-assisted billing categorization and budget recommendations", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ~/.config/billwise/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// How suggestions are reviewed
#[derive(Args, Debug, Clone, Default)]
pub struct ReviewArgs {
    /// Accept every suggestion without asking
    #[arg(short, long, conflicts_with = "defer")]
    pub yes: bool,

    /// Leave suggestions unreviewed so a later run asks again
    #[arg(long)]
    pub defer: bool,
}

/// Free-text context for the recommendation
#[derive(Args, Debug, Clone, Default)]
pub struct ContextArgs {
    /// What happened this period (trips, events, plans), passed verbatim
    #[arg(long, conflicts_with = "context_file")]
    pub context: Option<String>,

    /// Read the context from a file
    #[arg(long)]
    pub context_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Suggest a category for every line item and review the suggestions
    Categorize {
        /// Billing CSV (date,description,amount[,note[,category[,provenance]]])
        #[arg(short, long)]
        file: PathBuf,

        /// Categorized CSV to write (default: <file>_categorized.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Decision memory file (default: billwise_memory.json next to the file)
        #[arg(long)]
        memory: Option<PathBuf>,

        /// Neither read nor update the decision memory
        #[arg(long, conflicts_with = "memory")]
        no_memory: bool,

        #[command(flatten)]
        review: ReviewArgs,
    },

    /// Per-category statistics for a categorized file
    Analyze {
        /// Categorized CSV
        #[arg(short, long)]
        file: PathBuf,

        /// Period label (default: file name, e.g. 202506)
        #[arg(short, long)]
        period: Option<String>,

        /// Summary JSON to write (default: <period>_summary.json next to the file)
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Budget recommendation for a categorized file
    Recommend {
        /// Categorized CSV
        #[arg(short, long)]
        file: PathBuf,

        /// Period label (default: file name, e.g. 202506)
        #[arg(short, long)]
        period: Option<String>,

        /// Summary JSON of the previous period, for comparison
        #[arg(long)]
        prior: Option<PathBuf>,

        #[command(flatten)]
        context: ContextArgs,

        /// Markdown report to write (default: recommendation_<period>.md)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Categorize, analyze and recommend in one go
    Run {
        /// Billing CSV
        #[arg(short, long)]
        file: PathBuf,

        /// Period label (default: file name, e.g. 202506)
        #[arg(short, long)]
        period: Option<String>,

        /// Summary JSON of the previous period, for comparison
        #[arg(long)]
        prior: Option<PathBuf>,

        /// Decision memory file (default: billwise_memory.json next to the file)
        #[arg(long)]
        memory: Option<PathBuf>,

        /// Neither read nor update the decision memory
        #[arg(long, conflicts_with = "memory")]
        no_memory: bool,

        /// Directory for the artifacts (default: next to the file)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Stop after the summary
        #[arg(long)]
        no_recommend: bool,

        #[command(flatten)]
        review: ReviewArgs,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Manage prompt templates
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all available prompts and their override status
    List,

    /// Show the content of a specific prompt
    Show {
        /// Prompt ID (classify_item or budget_recommendation)
        prompt_id: String,
    },

    /// Show the path where prompt overrides should be placed
    Path,
}
