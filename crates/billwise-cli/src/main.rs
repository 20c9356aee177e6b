//! Billwise CLI - billing categorization and budget recommendations
//!
//! Usage:
//!   billwise categorize --file 202506.csv        Suggest and review categories
//!   billwise analyze --file 202506_categorized.csv   Per-category statistics
//!   billwise recommend --file 202506_categorized.csv --prior 202505_summary.json
//!   billwise run --file 202506.csv --context "business trip May 28-30"

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use commands::{ReviewMode, RunOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Categorize {
            file,
            output,
            memory,
            no_memory,
            review,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let memory = commands::memory_path(&file, memory, no_memory);
            commands::cmd_categorize(
                &config,
                &file,
                output,
                memory.as_deref(),
                ReviewMode::from_flags(review.yes, review.defer),
            )
            .await
        }
        Commands::Analyze { file, period, json } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_analyze(&config, &file, period, json)
        }
        Commands::Recommend {
            file,
            period,
            prior,
            context,
            output,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let user_context =
                commands::read_context(context.context.as_deref(), context.context_file.as_deref())?;
            commands::cmd_recommend(
                &config,
                &file,
                period,
                prior.as_deref(),
                &user_context,
                output,
            )
            .await
        }
        Commands::Run {
            file,
            period,
            prior,
            memory,
            no_memory,
            out_dir,
            no_recommend,
            review,
            context,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let options = RunOptions {
                period: period.unwrap_or_else(|| commands::period_from_path(&file)),
                memory: commands::memory_path(&file, memory, no_memory),
                prior,
                out_dir,
                user_context: commands::read_context(
                    context.context.as_deref(),
                    context.context_file.as_deref(),
                )?,
                recommend: !no_recommend,
                file,
            };
            commands::cmd_run(
                &config,
                &options,
                ReviewMode::from_flags(review.yes, review.defer),
            )
            .await
        }
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
    }
}
