//! Token usage, cost and where usage records go.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

use crate::llm::types::TokenUsage;

/// Price of a model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost of `usage` in USD.
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 * self.input_per_million
            + usage.completion_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

const DEFAULT_PRICES: &[(&str, ModelPricing)] = &[
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.60)),
    ("gpt-4o", ModelPricing::new(2.50, 10.00)),
    ("gpt-4-turbo", ModelPricing::new(10.00, 30.00)),
    ("gpt-4", ModelPricing::new(30.00, 60.00)),
    ("gpt-3.5-turbo", ModelPricing::new(0.50, 1.50)),
];

/// Model prices keyed by model name or name prefix.
///
/// The longest matching key wins, so `gpt-4o-mini-2024-07-18` is priced as
/// `gpt-4o-mini` rather than `gpt-4o`. Unknown models cost nothing.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<String, ModelPricing>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            prices: DEFAULT_PRICES
                .iter()
                .map(|(model, pricing)| (model.to_string(), *pricing))
                .collect(),
        }
    }
}

impl PriceTable {
    /// Defaults with `overrides` layered on top.
    pub fn with_overrides(overrides: &HashMap<String, ModelPricing>) -> Self {
        let mut table = Self::default();
        table
            .prices
            .extend(overrides.iter().map(|(model, pricing)| (model.clone(), *pricing)));
        table
    }

    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        self.prices
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, pricing)| *pricing)
    }

    /// Cost of `usage` on `model` in USD; zero for unknown models.
    pub fn cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        self.lookup(model)
            .map(|pricing| pricing.cost(usage))
            .unwrap_or(0.0)
    }
}

/// Usage of one synthesis step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageMetrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

impl UsageMetrics {
    pub fn from_usage(usage: TokenUsage, cost_usd: f64) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total(),
            total_cost_usd: cost_usd,
        }
    }
}

/// What gets emitted to a [`UsageSink`] after each model call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub sql_generation_id: String,
    pub model: String,
    pub metrics: UsageMetrics,
    pub succeeded: bool,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

/// Receives usage records. Implementations must not fail the pipeline.
pub trait UsageSink: Send + Sync {
    fn record(&self, record: &UsageRecord);
}

/// Writes usage records as structured log events under `db_narrate::usage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn record(&self, record: &UsageRecord) {
        info!(
            target: "db_narrate::usage",
            sql_generation_id = %record.sql_generation_id,
            model = %record.model,
            prompt_tokens = record.metrics.prompt_tokens,
            completion_tokens = record.metrics.completion_tokens,
            total_tokens = record.metrics.total_tokens,
            total_cost_usd = record.metrics.total_cost_usd,
            succeeded = record.succeeded,
            duration_ms = record.duration.as_millis() as u64,
            "LLM usage"
        );
    }
}

/// Keeps usage records in memory; clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MemoryUsageSink {
    records: Arc<Mutex<Vec<UsageRecord>>>,
}

impl MemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl UsageSink for MemoryUsageSink {
    fn record(&self, record: &UsageRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}
