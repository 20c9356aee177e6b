//! Recommendation composer
//!
//! Turns a period summary, an optional prior summary and free-text user
//! context into one reasoning request, then wraps the narrative with the exact
//! request that produced it. One service call per recommendation; on failure
//! no report exists.

use chrono::Utc;
use tracing::{info, warn};

use crate::ai::{Breakdown, ReasoningService, RecommendationRequest, TopExpense, TOP_EXPENSES};
use crate::config::CurrencyConfig;
use crate::error::{Error, Result};
use crate::models::{CategorizedRecord, PeriodSummary, RecommendationReport};

pub struct Composer<'a, S: ReasoningService + ?Sized> {
    service: &'a S,
    currency: CurrencyConfig,
    top_expenses: Vec<TopExpense>,
}

impl<'a, S: ReasoningService + ?Sized> Composer<'a, S> {
    pub fn new(service: &'a S, currency: &CurrencyConfig) -> Self {
        Self {
            service,
            currency: currency.clone(),
            top_expenses: Vec::new(),
        }
    }

    /// Include the period's largest line items in the request
    pub fn with_records(mut self, records: &[CategorizedRecord]) -> Self {
        self.top_expenses = TopExpense::largest(records, TOP_EXPENSES);
        self
    }

    /// Build the request without sending it
    pub fn build_request(
        &self,
        current: &PeriodSummary,
        prior: Option<&PeriodSummary>,
        user_context: &str,
    ) -> RecommendationRequest {
        RecommendationRequest {
            current: Breakdown::from_summary(current),
            prior: prior.map(Breakdown::from_summary),
            user_context: user_context.to_string(),
            top_expenses: self.top_expenses.clone(),
            currency: self.currency.clone(),
        }
    }

    /// Ask the reasoning service for a recommendation
    ///
    /// The narrative is stored verbatim. A service failure is returned as
    /// [`Error::ReasoningService`] naming the period.
    pub async fn recommend(
        &self,
        current: &PeriodSummary,
        prior: Option<&PeriodSummary>,
        user_context: &str,
    ) -> Result<RecommendationReport> {
        let request = self.build_request(current, prior, user_context);

        info!(
            period = %current.period_id,
            prior = prior.map(|p| p.period_id.as_str()).unwrap_or("-"),
            "Requesting recommendation"
        );

        let narrative = self
            .service
            .generate_narrative(&request)
            .await
            .map_err(|source| {
                warn!(period = %current.period_id, error = %source, "Reasoning service failed");
                Error::ReasoningService {
                    period_id: current.period_id.clone(),
                    source,
                }
            })?;

        Ok(RecommendationReport {
            period_id: current.period_id.clone(),
            user_context: user_context.to_string(),
            prior: prior.cloned(),
            request,
            narrative,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::models::ExcludedRows;

    fn summary(period_id: &str, total: i64) -> PeriodSummary {
        PeriodSummary {
            period_id: period_id.to_string(),
            date_range: None,
            total_amount: total,
            transaction_count: 0,
            average_amount: 0.0,
            categories: vec![],
            daily: vec![],
            excluded: ExcludedRows::default(),
        }
    }

    #[tokio::test]
    async fn test_report_keeps_inputs_and_narrative() {
        let mock = MockBackend::new().with_narrative("<b>verbatim</b>\n  keep spacing  ");
        let composer = Composer::new(&mock, &CurrencyConfig::default());

        let current = summary("202506", 878273);
        let prior = summary("202505", 650000);
        let context = "business trip May 28–30; birthday June 9";

        let report = composer
            .recommend(&current, Some(&prior), context)
            .await
            .unwrap();

        assert_eq!(report.narrative, "<b>verbatim</b>\n  keep spacing  ");
        assert_eq!(report.request.current.total_amount, 878273);
        assert_eq!(report.request.prior.as_ref().unwrap().total_amount, 650000);
        assert_eq!(report.user_context, context);
        assert_eq!(report.request.user_context, context);
        assert_eq!(report.prior.as_ref().unwrap().period_id, "202505");
        assert_eq!(mock.reason_calls(), 1);
        assert_eq!(mock.last_recommendation().unwrap(), report.request);
    }

    #[tokio::test]
    async fn test_failure_yields_no_report() {
        let mock = MockBackend::new().failing_reasoning();
        let composer = Composer::new(&mock, &CurrencyConfig::default());

        let result = composer.recommend(&summary("202506", 1), None, "").await;
        match result {
            Err(Error::ReasoningService { period_id, source }) => {
                assert_eq!(period_id, "202506");
                assert!(source.is_timeout());
            }
            other => panic!("expected ReasoningService error, got {:?}", other),
        }
        assert_eq!(mock.reason_calls(), 1);
    }
}
