//! Error types for billwise

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid config TOML: {0}")]
    ConfigToml(#[from] toml::de::Error),

    /// A malformed billing row, rejected at the ingestion boundary
    #[error("Ingestion error at row {row}: {reason}")]
    Ingestion { row: usize, reason: String },

    /// The classification service failed for one line item
    #[error("Classification failed for item {item}: {source}")]
    ClassificationService {
        item: String,
        #[source]
        source: ServiceError,
    },

    /// The reasoning service failed; no report was produced
    #[error("Recommendation failed for period {period_id}: {source}")]
    ReasoningService {
        period_id: String,
        #[source]
        source: ServiceError,
    },

    /// Category text that matches no taxonomy entry and is not "Other"
    #[error("Unknown category '{input}' (not in taxonomy)")]
    TaxonomyViolation { input: String },

    /// Category totals disagree with the period total
    #[error("Aggregation inconsistency in category {category}: {detail}")]
    AggregationInconsistency { category: String, detail: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Failure talking to an external AI service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Map a reqwest failure, keeping timeouts distinguishable
    pub fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout {
                endpoint: endpoint.to_string(),
                after: timeout,
            }
        } else {
            ServiceError::Transport(err)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_offender() {
        let err = Error::Ingestion {
            row: 3,
            reason: "missing amount".into(),
        };
        assert_eq!(err.to_string(), "Ingestion error at row 3: missing amount");

        let err = Error::AggregationInconsistency {
            category: "food".into(),
            detail: "sum mismatch".into(),
        };
        assert!(err.to_string().contains("food"));

        let err = Error::TaxonomyViolation {
            input: "Snacks".into(),
        };
        assert!(err.to_string().contains("Snacks"));
    }

    #[test]
    fn test_timeout_is_distinguishable() {
        let err = ServiceError::Timeout {
            endpoint: "http://localhost:1".into(),
            after: Duration::from_secs(5),
        };
        assert!(err.is_timeout());
        assert!(!ServiceError::InvalidResponse("x".into()).is_timeout());

        let wrapped = Error::ReasoningService {
            period_id: "202507".into(),
            source: err,
        };
        assert!(wrapped.to_string().contains("202507"));
        assert!(wrapped.to_string().contains("timed out"));
    }
}
