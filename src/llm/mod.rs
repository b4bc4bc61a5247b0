//! LLM integration for db-narrate.
//!
//! Provides the client trait, the OpenAI-compatible and mock implementations,
//! answer prompt templates, usage accounting and the answer synthesizer.

pub mod factory;
pub mod mock;
pub mod openai;
pub mod prompt;
pub mod synthesizer;
pub mod types;
pub mod usage;

pub use factory::{create_client, ModelFactory, ProviderModelFactory};
pub use mock::{MockLlmClient, MockModelFactory};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use prompt::{PromptTemplate, DEFAULT_TEMPLATE_NAME};
pub use synthesizer::{AnswerSynthesizer, Synthesis, SynthesisOutcome};
pub use types::{Completion, Message, Role, TokenUsage};
pub use usage::{
    MemoryUsageSink, ModelPricing, PriceTable, TracingUsageSink, UsageMetrics, UsageRecord,
    UsageSink,
};

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::Result;

/// Trait for LLM clients that can generate completions.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a completion for the given messages.
    async fn complete(&self, messages: &[Message]) -> Result<Completion>;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// OpenAI or any OpenAI-compatible endpoint
    #[default]
    OpenAi,
    /// Mock client for testing (no API key required)
    Mock,
}

impl LlmProvider {
    /// Returns the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
