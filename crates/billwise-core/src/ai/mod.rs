//! External AI services
//!
//! Two roles, each behind its own trait so the pipeline never depends on a
//! particular vendor:
//!
//! - `ClassificationService`: one line item in, one raw category suggestion out
//! - `ReasoningService`: one period's numbers plus user context in, narrative out
//!
//! `AIClient` is the concrete wrapper providing Clone + compile-time dispatch
//! over the OpenAI-compatible adapter and the mock.
//!
//! # Configuration
//!
//! Endpoints come from [`PipelineConfig`]. Setting `AI_BACKEND=mock` swaps in
//! the mock backend for both roles (offline runs and demos).

mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub(crate) use mock::keyword_category;
pub use mock::MockBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;

use crate::config::{PipelineConfig, ServiceConfig};
use crate::error::{Result, ServiceError};

/// Suggests a category for a single line item
#[async_trait]
pub trait ClassificationService: Send + Sync {
    async fn suggest_category(
        &self,
        request: &ClassificationRequest,
    ) -> std::result::Result<Suggestion, ServiceError>;
}

/// Produces a recommendation narrative for a period
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn generate_narrative(
        &self,
        request: &RecommendationRequest,
    ) -> std::result::Result<String, ServiceError>;
}

/// Concrete AI client enum
#[derive(Clone)]
pub enum AIClient {
    /// Any OpenAI chat-completions endpoint
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Client for the classification role
    pub fn classifier(config: &PipelineConfig) -> Result<Self> {
        Self::for_service(&config.classification, config)
    }

    /// Client for the reasoning role
    pub fn reasoner(config: &PipelineConfig) -> Result<Self> {
        Self::for_service(&config.reasoning, config)
    }

    fn for_service(service: &ServiceConfig, config: &PipelineConfig) -> Result<Self> {
        if mock_requested(std::env::var("AI_BACKEND").ok().as_deref()) {
            tracing::info!("AI_BACKEND=mock, using mock services");
            return Ok(Self::mock());
        }
        Ok(AIClient::OpenAICompatible(OpenAICompatibleBackend::new(
            service,
            config.timeout,
        )?))
    }

    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Get the model name (for logging)
    pub fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    /// Get the host URL (for logging)
    pub fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

fn mock_requested(backend: Option<&str>) -> bool {
    backend.is_some_and(|b| b.trim().eq_ignore_ascii_case("mock"))
}

#[async_trait]
impl ClassificationService for AIClient {
    async fn suggest_category(
        &self,
        request: &ClassificationRequest,
    ) -> std::result::Result<Suggestion, ServiceError> {
        match self {
            AIClient::OpenAICompatible(b) => b.suggest_category(request).await,
            AIClient::Mock(b) => b.suggest_category(request).await,
        }
    }
}

#[async_trait]
impl ReasoningService for AIClient {
    async fn generate_narrative(
        &self,
        request: &RecommendationRequest,
    ) -> std::result::Result<String, ServiceError> {
        match self {
            AIClient::OpenAICompatible(b) => b.generate_narrative(request).await,
            AIClient::Mock(b) => b.generate_narrative(request).await,
        }
    }
}
