//! Data models for billwise
//!
//! Amounts are signed integers in the currency's minor unit (yen for JPY,
//! cents for USD). After ingestion, expenses are positive and refunds negative.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ai::types::RecommendationRequest;
use crate::taxonomy::CategoryLabel;

/// One billing line item as ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLineItem {
    /// 1-based row in the source file
    pub row: usize,
    pub date: NaiveDate,
    pub description: String,
    /// Minor currency units, expenses positive
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RawLineItem {
    /// Stable fingerprint of this line item
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.row.to_be_bytes());
        hasher.update(self.date.to_string().as_bytes());
        hasher.update(self.description.as_bytes());
        hasher.update(self.amount.to_be_bytes());
        if let Some(ref note) = self.note {
            hasher.update(note.as_bytes());
        }
        hex::encode(hasher.finalize())[..12].to_string()
    }
}

impl fmt::Display for RawLineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} ({} {} {})",
            self.row, self.date, self.description, self.amount
        )
    }
}

/// How a record's category was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Classifier suggestion not yet reviewed by a human
    AiSuggested,
    /// Reviewer accepted the suggestion
    UserConfirmed,
    /// Reviewer supplied a replacement category
    UserOverridden,
    /// Classification failed or was rejected; needs manual categorization
    Unresolved,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiSuggested => "ai-suggested",
            Self::UserConfirmed => "user-confirmed",
            Self::UserOverridden => "user-overridden",
            Self::Unresolved => "unresolved",
        }
    }

    /// Terminal states of the review state machine
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UserConfirmed | Self::UserOverridden | Self::Unresolved
        )
    }

    /// Decided by a human; never reprocessed
    pub fn is_reviewed(&self) -> bool {
        matches!(self, Self::UserConfirmed | Self::UserOverridden)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "ai-suggested" => Ok(Self::AiSuggested),
            "user-confirmed" => Ok(Self::UserConfirmed),
            "user-overridden" => Ok(Self::UserOverridden),
            "unresolved" => Ok(Self::Unresolved),
            _ => Err(format!("Unknown provenance: {}", s)),
        }
    }
}

/// A line item with its category decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedRecord {
    pub item: RawLineItem,
    pub category: CategoryLabel,
    pub provenance: Provenance,
    /// Raw category text the classifier suggested, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// A ledger row: either still NEW or already categorized
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    Pending(RawLineItem),
    Categorized(CategorizedRecord),
}

impl LedgerEntry {
    pub fn item(&self) -> &RawLineItem {
        match self {
            LedgerEntry::Pending(item) => item,
            LedgerEntry::Categorized(record) => &record.item,
        }
    }
}

/// Inclusive date range of a period's line items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from, self.to)
    }
}

/// Per-category statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAggregate {
    pub category: CategoryLabel,
    pub total_amount: i64,
    pub transaction_count: usize,
    pub average_amount: f64,
    pub percentage_of_total: f64,
}

/// Spending on one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAmount {
    pub date: NaiveDate,
    pub amount: i64,
}

/// Rows kept out of the category statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedRows {
    /// Sum of negative (refund) rows, as a positive number
    pub refund_total: i64,
    pub refund_count: usize,
    pub zero_amount_count: usize,
}

/// Statistics for one billing period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period_id: String,
    pub date_range: Option<DateRange>,
    pub total_amount: i64,
    pub transaction_count: usize,
    pub average_amount: f64,
    /// Canonical taxonomy order, empty categories omitted
    pub categories: Vec<CategoryAggregate>,
    /// Ascending by date, days without expenses omitted
    pub daily: Vec<DailyAmount>,
    #[serde(default)]
    pub excluded: ExcludedRows,
}

impl PeriodSummary {
    /// Categories sorted by total, largest first (ties keep canonical order)
    pub fn by_total_desc(&self) -> Vec<&CategoryAggregate> {
        let mut sorted: Vec<&CategoryAggregate> = self.categories.iter().collect();
        sorted.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
        sorted
    }

    pub fn category(&self, key: &str) -> Option<&CategoryAggregate> {
        self.categories.iter().find(|c| c.category.key == key)
    }
}

/// Narrative recommendation for a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub period_id: String,
    pub user_context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<PeriodSummary>,
    /// Exact structured input sent to the reasoning service
    pub request: RecommendationRequest,
    /// Generated text, verbatim
    pub narrative: String,
    pub generated_at: DateTime<Utc>,
}
