//! narrate - answer a question in plain language from a SQL query and its result.

use db_narrate::answer::{AnswerService, AnswerSettings};
use db_narrate::cli::Cli;
use db_narrate::config::Config;
use db_narrate::connection::SqlxConnectionResolver;
use db_narrate::error::{NarrateError, Result};
use db_narrate::llm::{LlmProvider, ModelFactory, ProviderModelFactory};
use db_narrate::logging;
use db_narrate::model::{DatabaseConnection, Prompt};
use db_narrate::repository::InMemoryRepository;
use std::sync::Arc;
use tracing::{error, info};

const CONNECTION_ID: &str = "cli";
const PROMPT_ID: &str = "cli-prompt";
const SQL_GENERATION_ID: &str = "cli-sql";

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => {
            let path = path.clone().unwrap_or_else(logging::default_log_path);
            logging::init_file_logging(&path);
        }
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_overrides(&mut config);

    let settings = AnswerSettings::from_config(&config)?;
    let connection_config = cli.resolve_connection(&config)?;
    info!("Connection: {}", connection_config.display_string());

    let repo = Arc::new(InMemoryRepository::new());
    repo.insert_connection(DatabaseConnection {
        id: CONNECTION_ID.to_string(),
        alias: cli.connection.clone(),
        config: connection_config,
        llm_api_key: None,
    })?;
    repo.insert_prompt(Prompt {
        id: PROMPT_ID.to_string(),
        text: cli.question.clone(),
        db_connection_id: CONNECTION_ID.to_string(),
    })?;

    let provider: LlmProvider = config.llm.provider.parse().map_err(NarrateError::config)?;
    let models: Arc<dyn ModelFactory> = Arc::new(ProviderModelFactory::new(provider));

    let service = AnswerService::new(
        repo.clone(),
        repo,
        Arc::new(SqlxConnectionResolver::new(config.query.timeout())),
        models,
        settings,
    );

    let generation = cli.sql_generation(SQL_GENERATION_ID, PROMPT_ID)?;
    let answer = service
        .synthesize_answer(&generation, config.query.top_k)
        .await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&answer)
            .map_err(|e| NarrateError::internal(format!("Failed to encode answer: {e}")))?;
        println!("{json}");
    } else {
        println!("{}", answer.text);
    }

    Ok(())
}
