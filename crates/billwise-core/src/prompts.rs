//! Prompt templates for the classification and reasoning services
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/billwise/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Templates use `{{var}}` placeholders and `{{#if var}}...{{/if}}` blocks
//! that are dropped when the variable is missing or empty.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const CLASSIFY_ITEM: &str = include_str!("../../../prompts/classify_item.md");
    pub const BUDGET_RECOMMENDATION: &str =
        include_str!("../../../prompts/budget_recommendation.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Single line item to one taxonomy category
    ClassifyItem,
    /// Period summary to advisory narrative
    BudgetRecommendation,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassifyItem => "classify_item",
            Self::BudgetRecommendation => "budget_recommendation",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::ClassifyItem, Self::BudgetRecommendation]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::ClassifyItem => defaults::CLASSIFY_ITEM,
            Self::BudgetRecommendation => defaults::BUDGET_RECOMMENDATION,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub version: u32,
    /// fast_classification or narrative
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// The prompt content (system + user sections)
    pub content: String,
    pub is_override: bool,
}

impl Prompt {
    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the user section (or the whole body if it has none)
    pub fn render_user(&self, vars: &HashMap<&str, String>) -> String {
        let template = self.user_section().unwrap_or(&self.content);
        render(template, vars)
    }
}

/// Prompt library for loading and caching prompts
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a prompt library with the default override directory
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Embedded prompts only
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::InvalidData(format!("prompt {} not cached", id.as_str())))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(ref override_dir) = self.override_dir {
            let override_path = override_dir.join(format!("{}.md", id.as_str()));
            if override_path.exists() {
                debug!(prompt = id.as_str(), path = %override_path.display(), "Using prompt override");
                let content = fs::read_to_string(&override_path).map_err(|e| {
                    Error::InvalidData(format!("Failed to read prompt override: {}", e))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                return Ok(Prompt {
                    metadata,
                    content: body,
                    is_override: true,
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
        })
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("billwise").join("prompts").join("overrides"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(Error::InvalidData(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    }

    let rest = &content[3..];
    let end = rest.find("\n---").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 4..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Extract a section from the prompt content
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];

    let end = after_header.find("\n# ").unwrap_or(after_header.len());

    Some(after_header[..end].trim())
}

/// Resolve conditionals, then substitute variables
///
/// Conditionals go first so substituted values containing template syntax
/// are never interpreted.
fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = resolve_conditionals(template, vars);
    for (key, value) in vars {
        let pattern = format!("{{{{{}}}}}", key);
        result = result.replace(&pattern, value);
    }
    result
}

/// Keep `{{#if var}}` blocks whose variable is present and non-empty
fn resolve_conditionals(content: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = content.to_string();

    while let Some(if_start) = result.find("{{#if ") {
        let var_start = if_start + 6;
        let Some(var_end) = result[var_start..].find("}}") else {
            break;
        };
        let var_name = result[var_start..var_start + var_end].trim().to_string();
        let block_start = var_start + var_end + 2;

        let Some(endif_pos) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let full_end = block_start + endif_pos + 7;

        let keep = vars.get(var_name.as_str()).is_some_and(|v| !v.is_empty());
        result = if keep {
            format!(
                "{}{}{}",
                &result[..if_start],
                &result[block_start..block_start + endif_pos],
                &result[full_end..]
            )
        } else {
            format!("{}{}", &result[..if_start], &result[full_end..])
        };
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_parse_prompt() {
        let content = r#"---
id: test_prompt
version: 2
task_type: fast_classification
---

# System
Test system prompt.

# User
Item: {{description}}
"#;

        let (metadata, body) = parse_prompt(content).unwrap();
        assert_eq!(metadata.id, "test_prompt");
        assert_eq!(metadata.version, 2);
        assert!(body.starts_with("# System"));
    }

    #[test]
    fn test_parse_prompt_requires_frontmatter() {
        assert!(parse_prompt("# System\nhello").is_err());
        assert!(parse_prompt("---\nid: x\n# System").is_err());
    }

    #[test]
    fn test_extract_section() {
        let content = "# System\nSystem content here.\n\n# User\nUser content here.";
        assert_eq!(
            extract_section(content, "# System"),
            Some("System content here.")
        );
        assert_eq!(extract_section(content, "# User"), Some("User content here."));
        assert_eq!(extract_section(content, "# Missing"), None);
    }

    #[test]
    fn test_conditional_blocks() {
        let template = "Start\n{{#if note}}Note: {{note}}\n{{/if}}End";

        let rendered = render(template, &vars(&[("note", "gift")]));
        assert_eq!(rendered, "Start\nNote: gift\nEnd");

        let rendered = render(template, &vars(&[("note", "")]));
        assert_eq!(rendered, "Start\nEnd");

        let rendered = render(template, &HashMap::new());
        assert_eq!(rendered, "Start\nEnd");
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let rendered = render("Item: {{description}}", &vars(&[("description", "{{#if x}}")]));
        assert_eq!(rendered, "Item: {{#if x}}");
    }

    #[test]
    fn test_default_prompts_parse() {
        for id in PromptId::all() {
            let (metadata, body) = parse_prompt(id.default_content()).unwrap();
            assert_eq!(metadata.id, id.as_str());
            assert!(body.contains("# System"));
            assert!(body.contains("# User"));
        }
    }

    #[test]
    fn test_classify_prompt_renders_note_only_when_present() {
        let mut lib = PromptLibrary::embedded_only();
        let prompt = lib.get(PromptId::ClassifyItem).unwrap();
        assert!(!prompt.is_override);

        let rendered = prompt.render_user(&vars(&[
            ("description", "東京ガス"),
            ("categories", "- Utilities/公用事业"),
        ]));
        assert!(rendered.contains("Item: 東京ガス"));
        assert!(rendered.contains("- Utilities/公用事业"));
        assert!(!rendered.contains("Note:"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_override_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("classify_item.md"),
            "---\nid: classify_item\nversion: 9\ntask_type: fast_classification\n---\n# System\nS\n# User\nCustom {{description}}",
        )
        .unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        let prompt = lib.get(PromptId::ClassifyItem).unwrap();
        assert!(prompt.is_override);
        assert_eq!(prompt.metadata.version, 9);
        assert_eq!(
            prompt.render_user(&vars(&[("description", "x")])),
            "Custom x"
        );

        // No override for this one: embedded default
        let prompt = lib.get(PromptId::BudgetRecommendation).unwrap();
        assert!(!prompt.is_override);
    }
}
