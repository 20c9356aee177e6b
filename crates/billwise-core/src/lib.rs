//! Billwise Core Library
//!
//! Turns a period's billing line items into reviewed categories, per-category
//! statistics and an AI budget recommendation:
//! - CSV ingestion with configurable sign convention and currency precision
//! - Taxonomy-constrained categorization with human review and provenance
//! - Deterministic aggregation (totals, means, percentages, daily series)
//! - Recommendation composer over a pluggable reasoning service
//! - OpenAI-compatible service adapters with bounded timeouts
//! - Decision memory so reviewed merchants are not asked about twice
//! - Markdown, CSV and JSON artifacts

pub mod aggregate;
pub mod ai;
pub mod categorize;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod memory;
pub mod models;
pub mod prompts;
pub mod recommend;
pub mod taxonomy;

/// Test utilities including mock chat-completions server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aggregate::{summarize, verify};
pub use ai::{
    AIClient, Breakdown, ClassificationRequest, ClassificationService, MockBackend,
    OpenAICompatibleBackend, ReasoningService, RecommendationRequest, Suggestion, TopExpense,
};
pub use categorize::{
    AcceptAll, Categorizer, ClassifyOutcome, ClassifyStats, DeferAll, FnReviewer, Proposal,
    ProposalSource, ReviewDecision, Reviewer,
};
pub use config::{CurrencyConfig, PipelineConfig, ServiceConfig, SignConvention};
pub use error::{Error, Result, ServiceError};
pub use import::{load_ledger, parse_ledger, ImportOptions};
pub use memory::{DecisionMemory, MemoryMatch};
pub use models::{
    CategorizedRecord, CategoryAggregate, DailyAmount, DateRange, ExcludedRows, LedgerEntry,
    PeriodSummary, Provenance, RawLineItem, RecommendationReport,
};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use recommend::Composer;
pub use taxonomy::{CategoryLabel, Taxonomy};
