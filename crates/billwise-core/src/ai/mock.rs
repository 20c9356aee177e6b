//! Mock backend for testing
//!
//! Keyword-based classification and a canned narrative, plus knobs to inject
//! failures and counters to assert how often each service was called.
//! Useful for unit tests and for running the CLI without a model server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ServiceError;

use super::types::{ClassificationRequest, RecommendationRequest, Suggestion};
use super::{ClassificationService, ReasoningService};

/// Description keywords and the category the mock answers for them
const KEYWORDS: &[(&[&str], &str)] = &[
    (&["ガス", "電力", "電気", "水道", "docomo", "au "], "Utilities/公用事业"),
    (&["jr", "suica", "pasmo", "地下鉄", "メトロ", "タクシー", "uber"], "Transportation/交通"),
    (&["セブン", "ローソン", "ファミリーマート", "ファミマ"], "Convenience Store/便利店"),
    (&["自販機", "自動販売機"], "Vending Machine/自动售货机"),
    (&["netflix", "spotify", "prime", "icloud", "youtube"], "Subscription/订阅"),
    (&["映画", "toho", "シネマ"], "Movie/电影"),
    (&["ユニクロ", "uniqlo", "gu ", "zara"], "Clothes/服装"),
    (&["ホテル", "hotel", "旅館", "新幹線"], "Travel/旅行"),
    (&["薬", "病院", "クリニック", "pharmacy"], "Healthcare/医疗"),
    (&["カラオケ", "ゲーム", "steam"], "Entertainment/娱乐"),
    (&["amazon", "アマゾン", "楽天", "ヨドバシ"], "Shopping/购物"),
    (&["レストラン", "食堂", "マクドナルド", "スターバックス", "ラーメン", "寿司", "cafe"], "Food/餐饮"),
];

/// Category the keyword table assigns to a description, "Other" if none
pub(crate) fn keyword_category(description: &str) -> &'static str {
    let haystack = format!("{} ", description.to_lowercase());
    KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|w| haystack.contains(w)))
        .map(|(_, category)| *category)
        .unwrap_or("Other")
}

/// Mock backend for testing
///
/// Clones share call counters, so a test can keep one handle while the
/// pipeline owns another.
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Description substrings whose classification fails
    fail_on: Vec<String>,
    fail_reasoning: bool,
    /// Explicit (substring, reply) rules checked before the keyword table
    rules: Vec<(String, String)>,
    narrative: Option<String>,
    classify_calls: Arc<AtomicUsize>,
    reason_calls: Arc<AtomicUsize>,
    last_recommendation: Arc<Mutex<Option<RecommendationRequest>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail classification for any item whose description contains `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    /// Fail every reasoning call
    pub fn failing_reasoning(mut self) -> Self {
        self.fail_reasoning = true;
        self
    }

    /// Answer `reply` for descriptions containing `needle`
    pub fn with_rule(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    /// Fixed narrative returned by the reasoning service
    pub fn with_narrative(mut self, narrative: &str) -> Self {
        self.narrative = Some(narrative.to_string());
        self
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn reason_calls(&self) -> usize {
        self.reason_calls.load(Ordering::SeqCst)
    }

    /// The most recent recommendation request received
    pub fn last_recommendation(&self) -> Option<RecommendationRequest> {
        self.last_recommendation
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    pub fn model(&self) -> &str {
        "mock"
    }

    pub fn host(&self) -> &str {
        "mock://localhost"
    }

    fn unavailable(&self) -> ServiceError {
        ServiceError::Status {
            status: 503,
            body: "mock service unavailable".to_string(),
        }
    }
}

#[async_trait]
impl ClassificationService for MockBackend {
    async fn suggest_category(
        &self,
        request: &ClassificationRequest,
    ) -> Result<Suggestion, ServiceError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);

        if self
            .fail_on
            .iter()
            .any(|needle| request.description.contains(needle.as_str()))
        {
            return Err(self.unavailable());
        }

        if let Some((_, reply)) = self
            .rules
            .iter()
            .find(|(needle, _)| request.description.contains(needle.as_str()))
        {
            return Ok(Suggestion {
                category: reply.clone(),
                rationale: Some("mock rule".to_string()),
            });
        }

        Ok(Suggestion {
            category: keyword_category(&request.description).to_string(),
            rationale: Some("mock keyword match".to_string()),
        })
    }
}

#[async_trait]
impl ReasoningService for MockBackend {
    async fn generate_narrative(
        &self,
        request: &RecommendationRequest,
    ) -> Result<String, ServiceError> {
        self.reason_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_recommendation.lock() {
            *last = Some(request.clone());
        }

        if self.fail_reasoning {
            return Err(ServiceError::Timeout {
                endpoint: self.host().to_string(),
                after: Duration::from_secs(0),
            });
        }

        Ok(self.narrative.clone().unwrap_or_else(|| {
            format!(
                "## Spending Pattern Analysis\nPeriod {} spent {} across {} transactions.",
                request.period_id(),
                request.currency.format(request.current.total_amount),
                request.current.transaction_count
            )
        }))
    }
}
