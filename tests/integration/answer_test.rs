//! End-to-end answer tests against a SQLite file.
//!
//! The database is real; the language model is the mock client.

use db_narrate::answer::{AnswerService, AnswerSettings, INVALID_SQL_ANSWER};
use db_narrate::config::ConnectionConfig;
use db_narrate::connection::SqlxConnectionResolver;
use db_narrate::db::DatabaseBackend;
use db_narrate::error::NarrateError;
use db_narrate::llm::{MemoryUsageSink, MockLlmClient, MockModelFactory};
use db_narrate::model::{
    DatabaseConnection, LlmIdentity, Prompt, SqlGeneration, SqlGenerationStatus,
};
use db_narrate::repository::InMemoryRepository;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const ORDER_COUNT: i64 = 42;

/// Creates `shop.db` with 42 orders.
async fn seed_database(dir: &TempDir) -> String {
    let path = dir.path().join("shop.db");
    let url = format!("sqlite:{}?mode=rwc", path.display());
    let pool = sqlx::SqlitePool::connect(&url).await.unwrap();

    sqlx::query(
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL NOT NULL, placed_on DATE NOT NULL)",
    )
    .execute(&pool)
    .await
    .unwrap();

    for id in 1..=ORDER_COUNT {
        sqlx::query("INSERT INTO orders (id, total, placed_on) VALUES (?, ?, ?)")
            .bind(id)
            .bind(id as f64 * 2.5)
            .bind(format!("2024-03-{:02}", (id % 28) + 1))
            .execute(&pool)
            .await
            .unwrap();
    }

    pool.close().await;
    path.display().to_string()
}

async fn count_orders(path: &str) -> i64 {
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{path}"))
        .await
        .unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .unwrap();
    pool.close().await;
    count
}

struct Fixture {
    service: AnswerService,
    models: MockModelFactory,
    usage: MemoryUsageSink,
}

fn fixture(db_path: &str, llm: MockLlmClient) -> Fixture {
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert_connection(DatabaseConnection {
        id: "shop".to_string(),
        alias: Some("Shop".to_string()),
        config: ConnectionConfig {
            backend: DatabaseBackend::Sqlite,
            path: Some(db_path.to_string()),
            ..Default::default()
        },
        llm_api_key: None,
    })
    .unwrap();
    repo.insert_prompt(Prompt {
        id: "p1".to_string(),
        text: "How many orders were placed?".to_string(),
        db_connection_id: "shop".to_string(),
    })
    .unwrap();

    let models = MockModelFactory::new(llm);
    let usage = MemoryUsageSink::new();
    let service = AnswerService::new(
        repo.clone(),
        repo,
        Arc::new(SqlxConnectionResolver::default()),
        Arc::new(models.clone()),
        AnswerSettings::default(),
    )
    .with_usage_sink(Arc::new(usage.clone()));

    Fixture {
        service,
        models,
        usage,
    }
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
async fn test_answers_count_question() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed_database(&dir).await;
    let f = fixture(
        &db,
        MockLlmClient::new().with_response("\"n\":42", "There were 42 orders."),
    );

    let answer = f
        .service
        .synthesize_answer(&generation("SELECT COUNT(*) AS n FROM orders"), 100)
        .await
        .unwrap();

    assert_eq!(answer.text, "There were 42 orders.");
    assert_eq!(answer.sql_generation_id, "g1");
    assert_eq!(answer.llm_config, Some(LlmIdentity::new("gpt-4o")));

    let prompt = f.models.client().last_prompt().unwrap();
    assert!(prompt.contains("Question: How many orders were placed?"));
    assert!(prompt.contains("SQL query result: {\"n\":42}"));

    let records = f.usage.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].succeeded);
    assert!(records[0].metrics.total_tokens > 0);
}

#[tokio::test]
async fn test_rows_bounded_by_top_k() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed_database(&dir).await;
    let f = fixture(&db, MockLlmClient::new());

    f.service
        .synthesize_answer(&generation("SELECT id, total FROM orders ORDER BY id"), 3)
        .await
        .unwrap();

    let prompt = f.models.client().last_prompt().unwrap();
    assert!(prompt.contains("{\"id\":1,\"total\":2.5}\n{\"id\":2,\"total\":5.0}\n{\"id\":3,\"total\":7.5}"));
    assert!(!prompt.contains("{\"id\":4,"));
}

#[tokio::test]
async fn test_empty_result_still_answers() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed_database(&dir).await;
    let f = fixture(&db, MockLlmClient::new());

    let answer = f
        .service
        .synthesize_answer(&generation("SELECT id FROM orders WHERE id < 0"), 100)
        .await
        .unwrap();

    assert_eq!(answer.text, "I don't know.");
    assert_eq!(f.models.client().call_count(), 1);
}

#[tokio::test]
async fn test_stacked_statement_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed_database(&dir).await;
    let f = fixture(&db, MockLlmClient::new());

    let err = f
        .service
        .synthesize_answer(&generation("SELECT 1; DELETE FROM orders"), 100)
        .await
        .unwrap_err();

    assert!(matches!(err, NarrateError::SqlInjection(_)));
    assert_eq!(f.models.client().call_count(), 0);
    assert!(f.usage.records().is_empty());
    assert_eq!(count_orders(&db).await, ORDER_COUNT);
}

#[tokio::test]
async fn test_write_in_cte_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed_database(&dir).await;
    let f = fixture(&db, MockLlmClient::new());

    let err = f
        .service
        .synthesize_answer(
            &generation("WITH gone AS (DELETE FROM orders RETURNING id) SELECT COUNT(*) FROM gone"),
            100,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, NarrateError::SqlInjection(_)));
    assert_eq!(count_orders(&db).await, ORDER_COUNT);
}

#[tokio::test]
async fn test_invalid_generation_never_opens_database() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.db");
    assert!(!Path::new(&missing).exists());
    let f = fixture(&missing.display().to_string(), MockLlmClient::new());

    let mut invalid = generation("SELECT COUNT(*) FROM orders");
    invalid.status = SqlGenerationStatus::Invalid;

    let answer = f.service.synthesize_answer(&invalid, 100).await.unwrap();

    assert_eq!(answer.text, INVALID_SQL_ANSWER);
    assert_eq!(answer.llm_config, None);
    assert_eq!(f.models.client().call_count(), 0);
    assert!(!missing.exists());
}

#[tokio::test]
async fn test_unknown_column_is_query_error() {
    let dir = tempfile::tempdir().unwrap();
    let db = seed_database(&dir).await;
    let f = fixture(&db, MockLlmClient::new());

    let err = f
        .service
        .synthesize_answer(&generation("SELECT shipped_on FROM orders"), 100)
        .await
        .unwrap_err();

    assert!(matches!(err, NarrateError::Query(_)));
}
