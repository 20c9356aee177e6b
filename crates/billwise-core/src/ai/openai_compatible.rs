//! OpenAI-compatible service adapter
//!
//! Works with any server that implements the OpenAI chat completions API
//! (SambaNova Cloud, vLLM, LocalAI, llama-server). The same adapter serves
//! both the classification and the reasoning role; only the config differs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::error::{Error, Result, ServiceError};
use crate::prompts::{PromptId, PromptLibrary};

use super::parsing::{parse_suggestion, strip_think};
use super::types::{Breakdown, ClassificationRequest, RecommendationRequest, Suggestion};
use super::{ClassificationService, ReasoningService};

/// OpenAI-compatible backend
///
/// Every request is bounded by the configured timeout; an elapsed timeout
/// surfaces as [`ServiceError::Timeout`].
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Duration,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OpenAICompatibleBackend {
    /// Create a backend for one service endpoint
    pub fn new(service: &ServiceConfig, timeout: Duration) -> Result<Self> {
        Self::with_prompts(service, timeout, PromptLibrary::new())
    }

    /// Create a backend with an explicit prompt library
    pub fn with_prompts(
        service: &ServiceConfig,
        timeout: Duration,
        prompts: PromptLibrary,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: service.host.trim_end_matches('/').to_string(),
            model: service.model.clone(),
            api_key: service.api_key.clone(),
            temperature: service.temperature,
            max_tokens: service.max_tokens,
            timeout,
            prompts: Arc::new(RwLock::new(prompts)),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Render the system and user sections of a prompt
    fn render(
        &self,
        id: PromptId,
        vars: &HashMap<&str, String>,
    ) -> std::result::Result<(Option<String>, String), ServiceError> {
        let mut prompts = self.prompts.write().map_err(|_| {
            ServiceError::InvalidResponse("Failed to acquire prompt library lock".into())
        })?;
        let template = prompts
            .get(id)
            .map_err(|e| ServiceError::InvalidResponse(format!("Prompt unavailable: {}", e)))?;
        Ok((
            template.system_section().map(str::to_string),
            template.render_user(vars),
        ))
    }

    /// Make a chat completion request
    async fn chat_completion(
        &self,
        system: Option<String>,
        user: String,
    ) -> std::result::Result<String, ServiceError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user,
        });

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let endpoint = format!("{}/v1/chat/completions", self.base_url);
        let mut req_builder = self.http_client.post(&endpoint).json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        debug!(endpoint = %endpoint, model = %self.model, "Sending chat completion");

        let response = req_builder
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, &endpoint, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint = %endpoint, status, "Chat completion failed");
            return Err(ServiceError::Status { status, body });
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, &endpoint, self.timeout))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::InvalidResponse("No choices in response".into()))
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ClassificationService for OpenAICompatibleBackend {
    async fn suggest_category(
        &self,
        request: &ClassificationRequest,
    ) -> std::result::Result<Suggestion, ServiceError> {
        let categories = request
            .taxonomy
            .iter()
            .map(|c| format!("- {}", c.display_name()))
            .collect::<Vec<_>>()
            .join("\n");

        let mut vars = HashMap::new();
        vars.insert("description", request.description.clone());
        vars.insert("note", request.note.clone().unwrap_or_default());
        vars.insert("categories", categories);

        let (system, user) = self.render(PromptId::ClassifyItem, &vars)?;
        let response = self.chat_completion(system, user).await?;
        parse_suggestion(&response)
    }
}

#[async_trait]
impl ReasoningService for OpenAICompatibleBackend {
    async fn generate_narrative(
        &self,
        request: &RecommendationRequest,
    ) -> std::result::Result<String, ServiceError> {
        let vars = recommendation_vars(request);
        let (system, user) = self.render(PromptId::BudgetRecommendation, &vars)?;
        let response = self.chat_completion(system, user).await?;

        let narrative = strip_think(&response);
        if narrative.is_empty() {
            return Err(ServiceError::InvalidResponse(
                "Reasoning service returned no visible text".into(),
            ));
        }
        Ok(narrative)
    }
}

/// Template variables for the budget recommendation prompt
fn recommendation_vars(request: &RecommendationRequest) -> HashMap<&'static str, String> {
    let currency = &request.currency;
    let current = &request.current;

    let mut vars = HashMap::new();
    vars.insert("period_id", current.period_id.clone());
    vars.insert(
        "date_range",
        current
            .date_range
            .map(|r| r.to_string())
            .unwrap_or_else(|| "n/a".to_string()),
    );
    vars.insert("total", currency.format(current.total_amount));
    vars.insert("transaction_count", current.transaction_count.to_string());
    vars.insert("current_breakdown", breakdown_lines(current, request));

    if let Some(ref prior) = request.prior {
        vars.insert("prior_period_id", prior.period_id.clone());
        vars.insert("prior_total", currency.format(prior.total_amount));
        vars.insert("prior_breakdown", breakdown_lines(prior, request));
    }

    let top = request
        .top_expenses
        .iter()
        .map(|t| {
            format!(
                "- {} {} {} ({})",
                t.date,
                t.description,
                currency.format(t.amount),
                t.category
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    vars.insert("top_expenses", top);

    let context = request.user_context.trim();
    vars.insert(
        "user_context",
        if context.is_empty() {
            "(none)".to_string()
        } else {
            request.user_context.clone()
        },
    );

    vars
}

fn breakdown_lines(breakdown: &Breakdown, request: &RecommendationRequest) -> String {
    breakdown
        .categories
        .iter()
        .map(|line| {
            format!(
                "- {}: {} ({:.1}%, {} transactions)",
                line.category,
                request.currency.format(line.total_amount),
                line.percentage,
                line.transaction_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
