//! One model call per answer, with failures captured instead of raised.

use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::NarrateError;
use crate::llm::types::{Message, TokenUsage};
use crate::llm::usage::{PriceTable, UsageMetrics};
use crate::llm::LlmClient;

/// How a synthesis attempt ended.
#[derive(Debug)]
pub enum SynthesisOutcome {
    Succeeded(String),
    Failed(NarrateError),
}

/// Result of one synthesis attempt. Usage is zero when the call failed.
#[derive(Debug)]
pub struct Synthesis {
    pub outcome: SynthesisOutcome,
    pub usage: UsageMetrics,
    pub duration: Duration,
}

impl Synthesis {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, SynthesisOutcome::Succeeded(_))
    }

    pub fn into_result(self) -> crate::error::Result<String> {
        match self.outcome {
            SynthesisOutcome::Succeeded(text) => Ok(text),
            SynthesisOutcome::Failed(e) => Err(e),
        }
    }
}

/// Invokes a language model with a composed prompt.
#[derive(Debug, Clone)]
pub struct AnswerSynthesizer {
    timeout: Duration,
    pricing: PriceTable,
}

impl AnswerSynthesizer {
    pub fn new(timeout: Duration, pricing: PriceTable) -> Self {
        Self { timeout, pricing }
    }

    /// Sends `prompt` as a single user message.
    ///
    /// Provider errors and timeouts are logged and returned as
    /// [`SynthesisOutcome::Failed`]; this never returns an error itself.
    pub async fn synthesize(&self, client: &dyn LlmClient, model: &str, prompt: &str) -> Synthesis {
        let messages = [Message::user(prompt)];
        let start = Instant::now();

        debug!(model, prompt_chars = prompt.len(), "Calling language model");
        let result = tokio::time::timeout(self.timeout, client.complete(&messages)).await;
        let duration = start.elapsed();

        let result = result.unwrap_or_else(|_| {
            Err(NarrateError::timeout(format!(
                "Language model did not answer within {}s",
                self.timeout.as_secs_f64()
            )))
        });

        match result {
            Ok(completion) => {
                let cost = self.pricing.cost(model, &completion.usage);
                let usage = UsageMetrics::from_usage(completion.usage, cost);
                info!(
                    model,
                    total_tokens = usage.total_tokens,
                    elapsed_ms = duration.as_millis() as u64,
                    "Language model answered"
                );
                Synthesis {
                    outcome: SynthesisOutcome::Succeeded(completion.text),
                    usage,
                    duration,
                }
            }
            Err(e) => {
                error!(model, "Language model call failed: {e}");
                Synthesis {
                    outcome: SynthesisOutcome::Failed(e),
                    usage: UsageMetrics::from_usage(TokenUsage::default(), 0.0),
                    duration,
                }
            }
        }
    }
}
