//! Prompts-related command implementations

use anyhow::Result;
use billwise_core::prompts::{default_prompts_dir, PromptId, PromptLibrary};

/// List all available prompts and their override status
pub fn cmd_prompts_list() -> Result<()> {
    let mut library = PromptLibrary::new();

    println!("Available Prompts:\n");

    println!(
        "{:<25} {:>7}  {:<20}  {}",
        "ID", "VERSION", "TASK TYPE", "OVERRIDE"
    );
    println!("{}", "-".repeat(70));

    for id in PromptId::all() {
        let prompt = library.get(*id)?;
        let override_status = if prompt.is_override {
            "✓ Custom"
        } else {
            "Default"
        };

        println!(
            "{:<25} {:>7}  {:<20}  {}",
            prompt.metadata.id, prompt.metadata.version, prompt.metadata.task_type, override_status
        );
    }

    println!();
    println!(
        "Override directory: {}",
        default_prompts_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not available)".to_string())
    );

    println!();
    println!("To customize a prompt:");
    println!("  1. Copy the default to the override directory as <id>.md");
    println!("  2. Edit the file with your changes");
    println!("  3. The next run picks it up");

    Ok(())
}

/// Show the content of a specific prompt
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    let Some(id) = find_prompt(prompt_id) else {
        eprintln!("Unknown prompt ID: {}", prompt_id);
        eprintln!();
        eprintln!("Available prompts:");
        for id in PromptId::all() {
            eprintln!("  - {}", id.as_str());
        }
        return Ok(());
    };

    let mut library = PromptLibrary::new();
    let prompt = library.get(id)?;

    println!("Prompt: {}", prompt.metadata.id);
    println!("Version: {}", prompt.metadata.version);
    println!("Task Type: {}", prompt.metadata.task_type);
    println!(
        "Source: {}",
        if prompt.is_override {
            "Override"
        } else {
            "Default"
        }
    );

    println!();
    println!("--- Content ---");
    println!("{}", prompt.content);

    Ok(())
}

/// Show the path where prompt overrides should be placed
pub fn cmd_prompts_path() -> Result<()> {
    match default_prompts_dir() {
        Some(path) => {
            println!("{}", path.display());

            if !path.exists() {
                eprintln!();
                eprintln!("Note: This directory does not exist yet.");
                eprintln!("Create it to start adding custom prompts.");
            }
        }
        None => {
            eprintln!("Could not determine prompts directory.");
            eprintln!("The data directory is not available on this system.");
        }
    }

    Ok(())
}

pub fn find_prompt(prompt_id: &str) -> Option<PromptId> {
    PromptId::all()
        .iter()
        .copied()
        .find(|id| id.as_str() == prompt_id.trim())
}
