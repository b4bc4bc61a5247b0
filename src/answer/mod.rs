//! The answer pipeline.
//!
//! [`AnswerService::synthesize_answer`] takes a SQL generation and produces
//! exactly one [`NlGeneration`]:
//!
//! 1. Look up the prompt and its database connection (`NotFound` if either is missing).
//! 2. If the SQL generation is INVALID, answer with a canned text. Nothing else runs.
//! 3. Build the model handle at temperature 0, so a missing credential fails
//!    before any query runs.
//! 4. Open a read-only handle, guard and execute the SQL bounded to `top_k` rows,
//!    then release the handle.
//! 5. Normalize the rows, compose the prompt and call the model.
//! 6. Emit usage, then apply the model failure policy.
//!
//! Lookup, model construction, connection and query errors propagate unchanged.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, ModelFailurePolicy, DEFAULT_FALLBACK_TEXT};
use crate::connection::ConnectionResolver;
use crate::db::DatabaseClient;
use crate::error::{NarrateError, Result};
use crate::llm::{
    AnswerSynthesizer, ModelFactory, PriceTable, PromptTemplate, SynthesisOutcome,
    TracingUsageSink, UsageRecord, UsageSink,
};
use crate::model::{LlmIdentity, NlGeneration, SqlGeneration};
use crate::query::{normalize_rows, QueryExecutor, QueryOutcome};
use crate::repository::{ConnectionLookup, PromptLookup};

/// Answer returned for SQL generations marked INVALID.
pub const INVALID_SQL_ANSWER: &str = "I don't know, the SQL query is invalid.";

/// Answers are generated deterministically.
const ANSWER_TEMPERATURE: f32 = 0.0;

/// Everything the pipeline needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct AnswerSettings {
    pub llm: LlmIdentity,
    pub template: PromptTemplate,
    pub query_timeout: Duration,
    pub llm_timeout: Duration,
    pub pricing: PriceTable,
    pub on_model_failure: ModelFailurePolicy,
    pub fallback_text: String,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            llm: LlmIdentity::new("gpt-4o"),
            template: PromptTemplate::default(),
            query_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(60),
            pricing: PriceTable::default(),
            on_model_failure: ModelFailurePolicy::default(),
            fallback_text: DEFAULT_FALLBACK_TEXT.to_string(),
        }
    }
}

impl AnswerSettings {
    /// Builds settings from a validated configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut llm = LlmIdentity::new(config.llm.model.clone());
        llm.api_base = config.llm.api_base.clone();

        Ok(Self {
            llm,
            template: config.prompt.resolve()?,
            query_timeout: config.query.timeout(),
            llm_timeout: config.llm.timeout(),
            pricing: PriceTable::with_overrides(&config.llm.pricing),
            on_model_failure: config.answer.on_model_failure,
            fallback_text: config.answer.fallback_text.clone(),
        })
    }
}

/// Produces natural-language answers for SQL generations.
pub struct AnswerService {
    prompts: Arc<dyn PromptLookup>,
    connections: Arc<dyn ConnectionLookup>,
    resolver: Arc<dyn ConnectionResolver>,
    models: Arc<dyn ModelFactory>,
    usage: Arc<dyn UsageSink>,
    synthesizer: AnswerSynthesizer,
    settings: AnswerSettings,
}

impl AnswerService {
    /// Creates a service that logs usage through `tracing`.
    pub fn new(
        prompts: Arc<dyn PromptLookup>,
        connections: Arc<dyn ConnectionLookup>,
        resolver: Arc<dyn ConnectionResolver>,
        models: Arc<dyn ModelFactory>,
        settings: AnswerSettings,
    ) -> Self {
        Self {
            prompts,
            connections,
            resolver,
            models,
            usage: Arc::new(TracingUsageSink),
            synthesizer: AnswerSynthesizer::new(settings.llm_timeout, settings.pricing.clone()),
            settings,
        }
    }

    /// Sends usage records to `sink` instead of the log.
    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = sink;
        self
    }

    pub fn settings(&self) -> &AnswerSettings {
        &self.settings
    }

    /// Answers `generation` from at most `top_k` result rows.
    pub async fn synthesize_answer(
        &self,
        generation: &SqlGeneration,
        top_k: usize,
    ) -> Result<NlGeneration> {
        let prompt = self
            .prompts
            .find_prompt(&generation.prompt_id)
            .await?
            .ok_or_else(|| NarrateError::not_found(format!("Prompt {}", generation.prompt_id)))?;

        let connection = self
            .connections
            .find_connection(&prompt.db_connection_id)
            .await?
            .ok_or_else(|| {
                NarrateError::not_found(format!("Database connection {}", prompt.db_connection_id))
            })?;

        if generation.status.is_invalid() {
            info!(
                sql_generation_id = %generation.id,
                "SQL generation is invalid; answering without running it"
            );
            return Ok(NlGeneration {
                sql_generation_id: generation.id.clone(),
                llm_config: None,
                text: INVALID_SQL_ANSWER.to_string(),
                created_at: Utc::now(),
            });
        }

        let client = self
            .models
            .create(&connection, ANSWER_TEMPERATURE, &self.settings.llm)?;

        let db = self.resolver.resolve(&connection, true).await?;
        let executed = self.run_query(db.as_ref(), &generation.sql, top_k).await;
        if let Err(e) = db.close().await {
            warn!("Failed to close database handle: {e}");
        }
        let outcome = executed?;

        let rows = normalize_rows(&outcome.result)?;
        let prompt_text = self
            .settings
            .template
            .compose(&prompt.text, &generation.sql, &rows);

        let synthesis = self
            .synthesizer
            .synthesize(client.as_ref(), &self.settings.llm.llm_name, &prompt_text)
            .await;

        self.usage.record(&UsageRecord {
            sql_generation_id: generation.id.clone(),
            model: self.settings.llm.llm_name.clone(),
            metrics: synthesis.usage,
            succeeded: synthesis.succeeded(),
            duration: synthesis.duration,
        });

        let text = match synthesis.outcome {
            SynthesisOutcome::Succeeded(text) => text,
            SynthesisOutcome::Failed(e) => match self.settings.on_model_failure {
                ModelFailurePolicy::Propagate => return Err(e),
                ModelFailurePolicy::Fallback => {
                    warn!(
                        sql_generation_id = %generation.id,
                        "Answering with fallback text after model failure"
                    );
                    self.settings.fallback_text.clone()
                }
            },
        };

        Ok(NlGeneration {
            sql_generation_id: generation.id.clone(),
            llm_config: Some(self.settings.llm.clone()),
            text,
            created_at: Utc::now(),
        })
    }

    async fn run_query(
        &self,
        db: &dyn DatabaseClient,
        sql: &str,
        top_k: usize,
    ) -> Result<QueryOutcome> {
        QueryExecutor::new(db, self.settings.query_timeout)
            .execute(sql, top_k)
            .await
    }
}
