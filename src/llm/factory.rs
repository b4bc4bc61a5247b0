//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use crate::error::{NarrateError, Result};
use crate::llm::{LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig};
use crate::model::{DatabaseConnection, LlmIdentity};

/// Builds a language model handle for one answer.
pub trait ModelFactory: Send + Sync {
    /// Creates a client for `identity` at `temperature`, using credentials
    /// attached to `connection` where the provider needs them.
    fn create(
        &self,
        connection: &DatabaseConnection,
        temperature: f32,
        identity: &LlmIdentity,
    ) -> Result<Box<dyn LlmClient>>;
}

/// Creates an LLM client for the given provider.
///
/// For OpenAI the API key is resolved in order:
/// 1. Provided `api_key` parameter
/// 2. `OPENAI_API_KEY` environment variable
pub fn create_client(
    provider: LlmProvider,
    identity: &LlmIdentity,
    api_key: Option<String>,
    temperature: f32,
) -> Result<Box<dyn LlmClient>> {
    match provider {
        LlmProvider::OpenAi => {
            let key = api_key
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| {
                    NarrateError::llm(
                        "No API key configured. Store one on the connection or set OPENAI_API_KEY.",
                    )
                })?;
            Ok(Box::new(OpenAiClient::new(openai_config(
                key,
                identity,
                temperature,
            ))?))
        }
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}

/// Answer clients make exactly one model call per answer.
fn openai_config(api_key: String, identity: &LlmIdentity, temperature: f32) -> OpenAiConfig {
    let config = OpenAiConfig::new(api_key, identity.llm_name.clone())
        .with_temperature(temperature)
        .with_max_attempts(1);
    match &identity.api_base {
        Some(api_base) => config.with_api_base(api_base.clone()),
        None => config,
    }
}

/// Model factory backed by a configured provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderModelFactory {
    provider: LlmProvider,
}

impl ProviderModelFactory {
    pub fn new(provider: LlmProvider) -> Self {
        Self { provider }
    }
}

impl ModelFactory for ProviderModelFactory {
    fn create(
        &self,
        connection: &DatabaseConnection,
        temperature: f32,
        identity: &LlmIdentity,
    ) -> Result<Box<dyn LlmClient>> {
        create_client(
            self.provider,
            identity,
            connection.llm_api_key.clone(),
            temperature,
        )
    }
}
