mod support;

use serde_json::json;

use pulsevo_tasks::error::TaskError;
use pulsevo_tasks::nl_query::{GuardrailViolation, PromptBuilder, SqlGuardrail, TaskQueryAgent};

use support::{agent, RecordingExecutor, ScriptedClient};

#[tokio::test]
async fn answers_with_validated_sql_and_rows() {
    let client = ScriptedClient::sql("SELECT COUNT(*) FROM tasks WHERE status = 'in_progress';");
    let executor = RecordingExecutor::returning(vec![json!({"count": 3})]);

    let answer = agent(client.clone(), executor.clone())
        .answer("How many tasks are in progress?")
        .await
        .unwrap();

    assert_eq!(answer.sql, "SELECT COUNT(*) FROM tasks WHERE status = 'in_progress'");
    assert_eq!(answer.rows.len(), 1);
    assert_eq!(answer.rows[0]["count"], json!(3));
    assert_eq!(executor.statements(), vec![answer.sql.clone()]);
}

#[tokio::test]
async fn sends_fixed_system_prompt_and_question_verbatim() {
    let client = ScriptedClient::sql("SELECT * FROM tasks");
    let executor = RecordingExecutor::returning(vec![]);
    let agent = agent(client.clone(), executor);

    agent.answer("  which team closed the most?  ").await.unwrap();
    agent.answer("average cycle time per team").await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, PromptBuilder::default().render());
    assert_eq!(calls[0].0, calls[1].0);
    assert_eq!(calls[0].1, "  which team closed the most?  ");
}

#[tokio::test]
async fn row_order_and_column_order_are_preserved() {
    let client = ScriptedClient::sql(
        "SELECT team_name, AVG(cycle_time) AS avg_cycle FROM tasks GROUP BY team_name ORDER BY avg_cycle",
    );
    let executor = RecordingExecutor::returning(vec![
        json!({"team_name": "Platform", "avg_cycle": 1.5}),
        json!({"team_name": "Pulse Analytics", "avg_cycle": null}),
    ]);

    let answer = agent(client, executor).answer("avg cycle per team").await.unwrap();

    let teams: Vec<&str> = answer
        .rows
        .iter()
        .map(|row| row["team_name"].as_str().unwrap())
        .collect();
    assert_eq!(teams, vec!["Platform", "Pulse Analytics"]);
    let columns: Vec<&String> = answer.rows[0].keys().collect();
    assert_eq!(columns, vec!["team_name", "avg_cycle"]);
    assert!(answer.rows[1]["avg_cycle"].is_null());
}

#[tokio::test]
async fn empty_result_is_not_an_error() {
    let client = ScriptedClient::sql("SELECT * FROM tasks WHERE team_name = 'Nobody'");
    let executor = RecordingExecutor::returning(vec![]);

    let answer = agent(client, executor).answer("tasks for team Nobody").await.unwrap();

    assert_eq!(answer.sql, "SELECT * FROM tasks WHERE team_name = 'Nobody'");
    assert!(answer.rows.is_empty());
    assert_eq!(
        serde_json::to_value(&answer).unwrap(),
        json!({"sql": "SELECT * FROM tasks WHERE team_name = 'Nobody'", "rows": []})
    );
}

#[tokio::test]
async fn prose_completion_fails_before_execution() {
    let client = ScriptedClient::replying("Sure! Here's your query: SELECT * FROM tasks");
    let executor = RecordingExecutor::returning(vec![]);

    let err = agent(client, executor.clone())
        .answer("list all tasks")
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::ResponseParse(_)));
    assert_eq!(err.status_code(), 500);
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn mutating_statement_is_rejected_before_execution() {
    let client = ScriptedClient::sql("DELETE FROM tasks");
    let executor = RecordingExecutor::returning(vec![]);

    let err = agent(client, executor.clone())
        .answer("remove everything")
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Guardrail(GuardrailViolation::NotASelect)));
    assert_eq!(err.status_code(), 400);
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn stacked_statement_is_rejected_by_keyword() {
    let client = ScriptedClient::sql("SELECT * FROM tasks; DROP TABLE tasks");
    let executor = RecordingExecutor::returning(vec![]);

    let err = agent(client, executor.clone())
        .answer("list tasks then clean up")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TaskError::Guardrail(GuardrailViolation::ForbiddenKeyword("drop"))
    ));
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn other_tables_are_rejected() {
    let client = ScriptedClient::sql("SELECT * FROM users");
    let executor = RecordingExecutor::returning(vec![]);

    let err = agent(client, executor.clone()).answer("list users").await.unwrap_err();

    assert!(matches!(err, TaskError::Guardrail(GuardrailViolation::WrongTable)));
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn strict_guardrail_rejects_lookalike_tables() {
    let client = ScriptedClient::sql("SELECT * FROM tasks_archive");
    let executor = RecordingExecutor::returning(vec![]);
    let agent = TaskQueryAgent::new(
        PromptBuilder::default(),
        SqlGuardrail::strict(),
        client,
        executor.clone(),
    );

    let err = agent.answer("archived tasks").await.unwrap_err();

    assert!(matches!(
        err,
        TaskError::Guardrail(GuardrailViolation::UnsupportedShape(_))
    ));
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn strict_guardrail_does_not_leak_nested_cte_names() {
    let client = ScriptedClient::sql(
        "SELECT * FROM (WITH users AS (SELECT * FROM tasks) SELECT * FROM users) a, users",
    );
    let executor = RecordingExecutor::returning(vec![json!({"secret": "pw"})]);
    let agent = TaskQueryAgent::new(
        PromptBuilder::default(),
        SqlGuardrail::strict(),
        client,
        executor.clone(),
    );

    let err = agent.answer("tasks joined with users").await.unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert!(matches!(
        err,
        TaskError::Guardrail(GuardrailViolation::UnsupportedShape(_))
    ));
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn missing_credentials_surface_as_unavailable() {
    let client = ScriptedClient::unavailable("OPENAI_API_KEY not configured.");
    let executor = RecordingExecutor::returning(vec![]);

    let err = agent(client, executor.clone())
        .answer("how many tasks?")
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 503);
    assert_eq!(err.detail(), "OPENAI_API_KEY not configured.");
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn execution_failure_is_reported_without_partial_rows() {
    let client = ScriptedClient::sql("SELECT no_such_column FROM tasks");
    let executor = RecordingExecutor::failing("column \"no_such_column\" does not exist");

    let err = agent(client, executor.clone())
        .answer("select a missing column")
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Execution(_)));
    assert_eq!(executor.statements().len(), 1);
}

#[tokio::test]
async fn build_sql_never_executes() {
    let client = ScriptedClient::sql("SELECT status, COUNT(*) FROM tasks GROUP BY status;;");
    let executor = RecordingExecutor::returning(vec![json!({"status": "open", "count": 1})]);

    let sql = agent(client, executor.clone())
        .build_sql("tasks per status")
        .await
        .unwrap();

    assert_eq!(sql, "SELECT status, COUNT(*) FROM tasks GROUP BY status");
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn concurrent_questions_do_not_share_state() {
    let client = ScriptedClient::sql("SELECT * FROM tasks");
    let executor = RecordingExecutor::returning(vec![json!({"task_id": "T-1"})]);
    let agent = agent(client.clone(), executor.clone());

    let (first, second) = tokio::join!(agent.answer("first question"), agent.answer("second question"));

    assert_eq!(first.unwrap().rows, second.unwrap().rows);
    assert_eq!(client.calls().len(), 2);
    assert_eq!(executor.statements().len(), 2);
}
