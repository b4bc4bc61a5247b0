//! Answer pipeline tests against PostgreSQL.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable to run them.

use db_narrate::answer::{AnswerService, AnswerSettings};
use db_narrate::config::ConnectionConfig;
use db_narrate::connection::SqlxConnectionResolver;
use db_narrate::db::{self, ConnectOptions, Value};
use db_narrate::error::NarrateError;
use db_narrate::llm::{MockLlmClient, MockModelFactory};
use db_narrate::model::{DatabaseConnection, Prompt, SqlGeneration, SqlGenerationStatus};
use db_narrate::repository::InMemoryRepository;
use std::sync::Arc;
use std::time::Duration;

/// Helper to get test connection config from environment.
fn get_test_config() -> Option<ConnectionConfig> {
    let url = std::env::var("DATABASE_URL").ok()?;
    ConnectionConfig::from_connection_string(&url).ok()
}

fn service(config: ConnectionConfig, settings: AnswerSettings) -> (AnswerService, MockModelFactory) {
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert_connection(DatabaseConnection {
        id: "pg".to_string(),
        alias: None,
        config,
        llm_api_key: None,
    })
    .unwrap();
    repo.insert_prompt(Prompt {
        id: "p1".to_string(),
        text: "What is the total?".to_string(),
        db_connection_id: "pg".to_string(),
    })
    .unwrap();

    let models = MockModelFactory::default();
    let resolver = SqlxConnectionResolver::new(settings.query_timeout);
    let service = AnswerService::new(
        repo.clone(),
        repo,
        Arc::new(resolver),
        Arc::new(models.clone()),
        settings,
    );
    (service, models)
}

fn generation(sql: &str) -> SqlGeneration {
    SqlGeneration {
        id: "g1".to_string(),
        prompt_id: "p1".to_string(),
        sql: sql.to_string(),
        status: SqlGenerationStatus::Valid,
    }
}

#[tokio::test]
async fn test_numeric_and_date_values_reach_prompt() {
    let Some(config) = get_test_config() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let (service, models) = service(config, AnswerSettings::default());

    service
        .synthesize_answer(
            &generation("SELECT 12.50::numeric AS total, DATE '2024-01-01' AS day"),
            100,
        )
        .await
        .unwrap();

    let prompt = models.client().last_prompt().unwrap();
    assert!(prompt.contains("{\"total\":12.5,\"day\":\"2024-01-01\"}"));
}

#[tokio::test]
async fn test_rows_bounded_by_top_k() {
    let Some(config) = get_test_config() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let (service, models) = service(config, AnswerSettings::default());

    service
        .synthesize_answer(&generation("SELECT n FROM generate_series(1, 1000) AS n"), 2)
        .await
        .unwrap();

    let prompt = models.client().last_prompt().unwrap();
    assert!(prompt.contains("{\"n\":1}\n{\"n\":2}"));
    assert!(!prompt.contains("{\"n\":3}"));
}

#[tokio::test]
async fn test_slow_query_times_out() {
    let Some(config) = get_test_config() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let settings = AnswerSettings {
        query_timeout: Duration::from_secs(1),
        ..AnswerSettings::default()
    };
    let (service, models) = service(config, settings);

    let err = service
        .synthesize_answer(&generation("SELECT pg_sleep(5)"), 100)
        .await
        .unwrap_err();

    assert!(matches!(err, NarrateError::Timeout(_)));
    assert_eq!(models.client().call_count(), 0);
}

#[tokio::test]
async fn test_read_only_handle_refuses_writes() {
    let Some(config) = get_test_config() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let client = db::connect(&config, ConnectOptions::default()).await.unwrap();
    let err = client
        .execute_query("CREATE TEMP TABLE scratch (id int)", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, NarrateError::SqlInjection(_)));

    let result = client.execute_query("SELECT 1 AS one", 10).await.unwrap();
    assert_eq!(result.rows, vec![vec![Value::Int(1)]]);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_count_answer() {
    let Some(config) = get_test_config() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert_connection(DatabaseConnection {
        id: "pg".to_string(),
        alias: None,
        config,
        llm_api_key: None,
    })
    .unwrap();
    repo.insert_prompt(Prompt {
        id: "p1".to_string(),
        text: "How many?".to_string(),
        db_connection_id: "pg".to_string(),
    })
    .unwrap();
    let models = MockModelFactory::new(
        MockLlmClient::new().with_response("\"count\":3", "Three."),
    );
    let service = AnswerService::new(
        repo.clone(),
        repo,
        Arc::new(SqlxConnectionResolver::default()),
        Arc::new(models),
        AnswerSettings::default(),
    );

    let answer = service
        .synthesize_answer(&generation("SELECT COUNT(*) AS count FROM generate_series(1, 3)"), 100)
        .await
        .unwrap();

    assert_eq!(answer.text, "Three.");
}

#[tokio::test]
async fn test_non_text_types_keep_their_values() {
    let Some(config) = get_test_config() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let client = db::connect(&config, ConnectOptions::default()).await.unwrap();
    let result = client
        .execute_query(
            "SELECT gen_random_uuid() AS id, 1e30::numeric AS big, 'NaN'::numeric AS nan, \
             interval '1 day 02:00:00' AS span, ARRAY[1, 2, 3] AS ids, '10.0.0.1'::inet AS addr",
            10,
        )
        .await
        .unwrap();
    client.close().await.unwrap();

    let row = &result.rows[0];
    match &row[0] {
        Value::String(uuid) => {
            assert_eq!(uuid.len(), 36);
            assert_eq!(uuid.matches('-').count(), 4);
        }
        other => panic!("Expected uuid text, got {:?}", other),
    }
    assert_eq!(row[1], Value::Float(1e30));
    assert_eq!(row[2], Value::String("NaN".to_string()));
    assert_eq!(row[3], Value::String("1 day 02:00:00".to_string()));
    assert_eq!(row[4], Value::Json(serde_json::json!([1, 2, 3])));
    assert_eq!(row[5], Value::String("10.0.0.1/32".to_string()));
}

#[tokio::test]
async fn test_large_numeric_reaches_prompt() {
    let Some(config) = get_test_config() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let (service, models) = service(config, AnswerSettings::default());

    service
        .synthesize_answer(&generation("SELECT 1e30::numeric AS total"), 100)
        .await
        .unwrap();

    let prompt = models.client().last_prompt().unwrap();
    assert!(prompt.contains("{\"total\":1e30}"));
}
