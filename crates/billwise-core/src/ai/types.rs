//! Service request and response types
//!
//! These types are backend-agnostic and used across all service implementations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::CurrencyConfig;
use crate::models::{CategorizedRecord, DateRange, PeriodSummary};
use crate::taxonomy::CategoryLabel;

/// Number of largest line items included in a recommendation request
pub const TOP_EXPENSES: usize = 10;

/// Input to the classification service for one line item
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRequest {
    pub description: String,
    pub note: Option<String>,
    /// Allowed categories, Other excluded
    pub taxonomy: Vec<CategoryLabel>,
}

/// Raw category suggestion as returned by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Free text; resolved against the taxonomy by the caller
    pub category: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl Suggestion {
    pub fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            rationale: None,
        }
    }
}

/// One category line in a breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownLine {
    pub key: String,
    /// "English/localized"
    pub category: String,
    pub total_amount: i64,
    pub transaction_count: usize,
    pub percentage: f64,
}

/// Numeric view of a period sent to the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub period_id: String,
    pub date_range: Option<DateRange>,
    pub total_amount: i64,
    pub transaction_count: usize,
    pub average_amount: f64,
    /// Largest category first
    pub categories: Vec<BreakdownLine>,
}

impl Breakdown {
    pub fn from_summary(summary: &PeriodSummary) -> Self {
        Self {
            period_id: summary.period_id.clone(),
            date_range: summary.date_range,
            total_amount: summary.total_amount,
            transaction_count: summary.transaction_count,
            average_amount: summary.average_amount,
            categories: summary
                .by_total_desc()
                .into_iter()
                .map(|c| BreakdownLine {
                    key: c.category.key.clone(),
                    category: c.category.display_name(),
                    total_amount: c.total_amount,
                    transaction_count: c.transaction_count,
                    percentage: c.percentage_of_total,
                })
                .collect(),
        }
    }
}

/// A single large line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopExpense {
    pub date: NaiveDate,
    pub description: String,
    pub amount: i64,
    pub category: String,
}

impl TopExpense {
    /// Largest expenses first; equal amounts keep input order
    pub fn largest(records: &[CategorizedRecord], limit: usize) -> Vec<TopExpense> {
        let mut expenses: Vec<&CategorizedRecord> =
            records.iter().filter(|r| r.item.amount > 0).collect();
        expenses.sort_by(|a, b| b.item.amount.cmp(&a.item.amount));
        expenses
            .into_iter()
            .take(limit)
            .map(|r| TopExpense {
                date: r.item.date,
                description: r.item.description.clone(),
                amount: r.item.amount,
                category: r.category.display_name(),
            })
            .collect()
    }
}

/// Everything sent to the reasoning service for one recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub current: Breakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<Breakdown>,
    /// Free text from the user, verbatim
    pub user_context: String,
    pub top_expenses: Vec<TopExpense>,
    pub currency: CurrencyConfig,
}

impl RecommendationRequest {
    pub fn period_id(&self) -> &str {
        &self.current.period_id
    }
}
