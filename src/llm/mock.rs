//! Mock LLM client and model factory for testing.
//!
//! Provides deterministic responses based on input patterns and records
//! every prompt it receives.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{NarrateError, Result};
use crate::llm::factory::ModelFactory;
use crate::llm::types::{Completion, Message, Role, TokenUsage};
use crate::llm::LlmClient;
use crate::model::{DatabaseConnection, LlmIdentity};

/// Answer returned when no pattern matches.
const DEFAULT_RESPONSE: &str = "I don't know.";

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Clones share the recorded prompts and the call counter.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response).
    responses: Vec<(String, String)>,
    /// When set, every call fails with this message.
    failure: Option<String>,
    /// Fixed usage to report instead of the estimate.
    usage: Option<TokenUsage>,
    delay: Option<Duration>,
    prompts: Arc<Mutex<Vec<Vec<Message>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the last user message contains `pattern` (case-insensitive), the
    /// mock returns `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.responses.push((pattern.into(), response.into()));
        self
    }

    /// Makes every call fail with a provider error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Reports `usage` for every successful call.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Sleeps before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns how many times `complete` was called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the messages of every call so far.
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    /// Returns the last user message of the most recent call.
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts()
            .last()
            .map(|messages| Self::extract_user_input(messages))
    }

    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        DEFAULT_RESPONSE.to_string()
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    /// Rough token estimate: four characters per token.
    fn estimate_tokens(text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(NarrateError::llm(message.clone()));
        }

        let input = Self::extract_user_input(messages);
        let text = self.mock_response(&input);
        let usage = self.usage.unwrap_or_else(|| {
            TokenUsage::new(Self::estimate_tokens(&input), Self::estimate_tokens(&text))
        });

        Ok(Completion::new(text, usage))
    }
}

/// Model factory that hands out clones of one mock client.
///
/// Records the temperature and identity of every request.
#[derive(Debug, Clone, Default)]
pub struct MockModelFactory {
    client: MockLlmClient,
    requests: Arc<Mutex<Vec<(f32, LlmIdentity)>>>,
}

impl MockModelFactory {
    pub fn new(client: MockLlmClient) -> Self {
        Self {
            client,
            requests: Arc::default(),
        }
    }

    /// The shared client, for inspecting prompts and calls.
    pub fn client(&self) -> &MockLlmClient {
        &self.client
    }

    /// Returns `(temperature, identity)` for every client created so far.
    pub fn requests(&self) -> Vec<(f32, LlmIdentity)> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl ModelFactory for MockModelFactory {
    fn create(
        &self,
        _connection: &DatabaseConnection,
        temperature: f32,
        identity: &LlmIdentity,
    ) -> Result<Box<dyn LlmClient>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((temperature, identity.clone()));
        }
        Ok(Box::new(self.client.clone()))
    }
}
