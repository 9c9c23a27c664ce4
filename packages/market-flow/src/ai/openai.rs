//! LLM analyst backed by an OpenAI-compatible chat API.
//!
//! # Example
//!
//! ```rust,ignore
//! use market_flow::ai::LlmAnalyst;
//! use market_flow::security::LlmCredentials;
//!
//! let analyst = LlmAnalyst::new(LlmCredentials::new(key))?.with_max_retries(3);
//! let controller = FlowController::new(config, scraper, analyst)?;
//! ```

use async_trait::async_trait;
use openai_client::{ChatRequest, Message, OpenAIClient, OpenAIError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CollaboratorError, CollaboratorResult};
use crate::pipeline::prompts::{
    format_export_prompt, format_matching_prompt, EXPORT_SYSTEM_PROMPT, MATCHING_SYSTEM_PROMPT,
};
use crate::security::credentials::LlmCredentials;
use crate::traits::analyst::Analyst;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Analyst that sends the matching and export prompts to an LLM.
#[derive(Clone)]
pub struct LlmAnalyst {
    client: OpenAIClient,
    credentials: LlmCredentials,
    max_retries: u32,
}

impl LlmAnalyst {
    pub fn new(credentials: LlmCredentials) -> CollaboratorResult<Self> {
        if credentials.api_key.is_empty() {
            return Err(CollaboratorError::Llm("API key is empty".into()));
        }

        let client = OpenAIClient::new(credentials.api_key.expose())
            .with_base_url(credentials.base_url.clone());

        Ok(Self {
            client,
            credentials,
            max_retries: 3,
        })
    }

    /// Bound each HTTP request by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> CollaboratorResult<Self> {
        self.client = self.client.with_timeout(timeout).map_err(llm_error)?;
        Ok(self)
    }

    /// Retries after the first attempt on network and 429/5xx errors.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn model(&self) -> &str {
        &self.credentials.model
    }

    /// Short round trip used to verify the endpoint and key.
    pub async fn ping(&self) -> CollaboratorResult<String> {
        self.chat(
            "You are a connectivity check.",
            "Reply with one short sentence confirming you are reachable.",
        )
        .await
    }

    async fn chat(&self, system: &str, user: &str) -> CollaboratorResult<String> {
        let request = ChatRequest::new(self.credentials.model.clone())
            .message(Message::system(system))
            .message(Message::user(user))
            .temperature(self.credentials.temperature)
            .max_tokens(self.credentials.max_tokens);

        let mut attempt = 0;
        loop {
            match self.client.chat_completion(request.clone()).await {
                Ok(response) => {
                    if let Some(usage) = &response.usage {
                        debug!(
                            model = %self.credentials.model,
                            total_tokens = usage.total_tokens,
                            "LLM call complete"
                        );
                    }
                    return Ok(response.content);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(llm_error(e)),
            }
        }
    }
}

#[async_trait]
impl Analyst for LlmAnalyst {
    async fn match_products(&self, records_json: &str) -> CollaboratorResult<String> {
        self.chat(MATCHING_SYSTEM_PROMPT, &format_matching_prompt(records_json))
            .await
    }

    async fn format_csv(&self, groups_json: &str) -> CollaboratorResult<String> {
        self.chat(EXPORT_SYSTEM_PROMPT, &format_export_prompt(groups_json))
            .await
    }
}

fn llm_error(error: OpenAIError) -> CollaboratorError {
    CollaboratorError::Llm(error.to_string())
}
