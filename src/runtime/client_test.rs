use crate::core::{CancelReason, CommandSpec, Config, ErrorKind};
use crate::runtime::client::{Client, ConfirmationHandler, StreamOutcome};
use crate::runtime::process::CancelHandle;
use crate::runtime::test_support::FakeGcloud;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config_for(fake: &FakeGcloud) -> Config {
    Config {
        binary: fake.binary(),
        grace_period_ms: 500,
        retry_delay_ms: 10,
        ..Config::default()
    }
}

fn client(fake: &FakeGcloud) -> Client {
    Client::builder().config(config_for(fake)).build().unwrap()
}

struct Decline {
    asked: AtomicUsize,
}

#[async_trait]
impl ConfirmationHandler for Decline {
    async fn confirm(&self, _spec: &CommandSpec) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[tokio::test]
async fn test_exempt_command_runs_without_probe() {
    let fake = FakeGcloud::signed_out();
    let client = client(&fake);

    let result = client.run_command(CommandSpec::new(["version"])).await;

    assert!(result.success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout_lines[0], "Google Cloud SDK 999.0.0");
    assert_eq!(result.error, None);
    assert_eq!(result.authentication_required, None);
    assert!(!result.cancelled);
    assert_eq!(client.executor().spawn_count(), 1);
}

#[tokio::test]
async fn test_structured_command_returns_parsed_output() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let result = client
        .run_command(CommandSpec::new(["projects", "list"]).structured_output(true))
        .await;

    assert!(result.success, "{result:?}");
    assert!(result.command.ends_with("gcloud projects list --format=json"));
    assert_eq!(
        result.structured_output,
        Some(serde_json::json!([{"projectId": "demo-project", "name": "Demo"}]))
    );
    assert_eq!(result.stdout_lines.len(), 3);
}

#[tokio::test]
async fn test_unauthenticated_gate_spawns_nothing_for_the_command() {
    let fake = FakeGcloud::signed_out();
    let client = client(&fake);

    let result = client
        .run_command(CommandSpec::new(["projects", "list"]).structured_output(true))
        .await;

    assert!(!result.success);
    assert_eq!(result.authentication_required, Some(true));
    assert_eq!(result.error_kind, Some(ErrorKind::AuthenticationRequired));
    assert_eq!(result.exit_code, None);
    assert!(result.stdout_lines.is_empty());
    assert!(result.suggestions.iter().any(|s| s.contains("auth login")));
    // only the two probe commands ran
    assert_eq!(client.executor().spawn_count(), 2);
}

#[tokio::test]
async fn test_gate_can_be_disabled() {
    let fake = FakeGcloud::signed_out();
    let client = Client::builder()
        .config(config_for(&fake))
        .require_authentication(false)
        .build()
        .unwrap();

    let result = client.run_command(CommandSpec::new(["projects", "list"])).await;

    assert!(result.success);
    assert_eq!(client.executor().spawn_count(), 1);
}

#[tokio::test]
async fn test_auth_failure_is_classified_and_invalidates_cache() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let first = client.run_command(CommandSpec::new(["projects", "list"])).await;
    assert!(first.success);
    assert_eq!(client.executor().spawn_count(), 3);

    let failed = client.run_command(CommandSpec::new(["storage", "ls"])).await;
    assert!(!failed.success);
    assert_eq!(failed.exit_code, Some(1));
    assert_eq!(failed.authentication_required, Some(true));
    assert_eq!(failed.error_kind, Some(ErrorKind::AuthenticationRequired));
    assert!(failed.suggestions.iter().any(|s| s.contains("auth login")));
    assert!(failed.error.unwrap().starts_with("authentication-required:"));
    assert_eq!(client.executor().spawn_count(), 4);

    // cache was dropped, so the next gated command probes again
    client.run_command(CommandSpec::new(["projects", "list"])).await;
    assert_eq!(client.executor().spawn_count(), 7);
}

#[tokio::test]
async fn test_timeout_result() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let result = client
        .run_command(CommandSpec::new(["sleep", "5"]).timeout(Duration::from_millis(50)))
        .await;

    assert!(!result.success);
    assert!(result.cancelled);
    assert_eq!(result.cancel_reason, Some(CancelReason::Timeout));
    // cancelled executions carry no classification
    assert_eq!(result.error_kind, None);
    assert_eq!(result.authentication_required, None);
    let error = result.error.unwrap();
    assert!(error.starts_with("timed out after "), "{error}");
    assert!(error.ends_with("(limit 50 ms)"), "{error}");
    assert!(result.suggestions[0].contains("--timeout"));
}

#[tokio::test]
async fn test_user_cancellation_result() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);
    let cancel = CancelHandle::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });
    let result = client
        .run_command_with(CommandSpec::new(["sleep", "5"]), cancel)
        .await;

    assert!(result.cancelled);
    assert_eq!(result.cancel_reason, Some(CancelReason::UserRequested));
    assert!(result.error.unwrap().starts_with("cancelled by user"));
    assert_eq!(result.error_kind, None);
}

#[tokio::test]
async fn test_unknown_failure_keeps_raw_stderr() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let result = client.run_command(CommandSpec::new(["explode"])).await;

    assert_eq!(result.exit_code, Some(7));
    assert_eq!(result.error_kind, Some(ErrorKind::Unknown));
    assert_eq!(
        result.error.as_deref(),
        Some("something strange happened\nand then it stopped")
    );
    assert_eq!(result.stderr_lines.len(), 2);
    assert_eq!(result.authentication_required, Some(false));
}

#[tokio::test]
async fn test_not_found_classification() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let result = client
        .run_command(CommandSpec::new(["compute", "instances", "describe", "vm-1"]))
        .await;

    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    assert!(result.error.unwrap().starts_with("not-found:"));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let fake = FakeGcloud::signed_in();
    let counter = fake.dir().join("flaky-counter");
    let client = Client::builder()
        .config(config_for(&fake))
        .max_retries(2)
        .build()
        .unwrap();

    let result = client
        .run_command(CommandSpec::new(["flaky".to_string(), counter.display().to_string()]))
        .await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.stdout_lines, vec!["recovered"]);
    // probe (2) + failed attempt + retry
    assert_eq!(client.executor().spawn_count(), 4);
}

#[tokio::test]
async fn test_cancel_during_retry_delay_starts_no_new_attempt() {
    let fake = FakeGcloud::signed_in();
    let counter = fake.dir().join("flaky-counter");
    let client = Client::builder()
        .config(Config {
            max_retries: 1,
            retry_delay_ms: 2_000,
            ..config_for(&fake)
        })
        .build()
        .unwrap();
    // warm the auth cache so only the command itself spawns below
    client.auth_status().await;
    assert_eq!(client.executor().spawn_count(), 2);

    let cancel = CancelHandle::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = client
        .run_command_with(
            CommandSpec::new(["flaky".to_string(), counter.display().to_string()]),
            cancel,
        )
        .await;

    assert!(started.elapsed() < Duration::from_millis(1_500));
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::TransientInfrastructure));
    assert_eq!(client.executor().spawn_count(), 3);
}

#[tokio::test]
async fn test_no_retry_by_default() {
    let fake = FakeGcloud::signed_in();
    let counter = fake.dir().join("flaky-counter");
    let client = client(&fake);

    let result = client
        .run_command(CommandSpec::new(["flaky".to_string(), counter.display().to_string()]))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::TransientInfrastructure));
}

#[tokio::test]
async fn test_declined_confirmation_spawns_nothing() {
    let fake = FakeGcloud::signed_in();
    let handler = Arc::new(Decline {
        asked: AtomicUsize::new(0),
    });
    let client = Client::builder()
        .config(config_for(&fake))
        .confirmation_handler(handler.clone())
        .build()
        .unwrap();

    let result = client
        .run_command(CommandSpec::new(["version"]).requires_confirmation(true))
        .await;
    assert_eq!(result.error.as_deref(), Some("command declined"));
    assert_eq!(handler.asked.load(Ordering::SeqCst), 1);

    let result = client.run_command(CommandSpec::new(["version"])).await;
    assert!(result.success);
    assert_eq!(handler.asked.load(Ordering::SeqCst), 1);
    assert_eq!(client.executor().spawn_count(), 1);
}

#[tokio::test]
async fn test_validation_failure_becomes_result() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let result = client
        .run_command(CommandSpec::new(["version"]).working_dir("/does/not/exist"))
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("/does/not/exist"));
    assert_eq!(client.executor().spawn_count(), 0);
}

#[tokio::test]
async fn test_authentication_status_signed_in() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let result = client.authentication_status().await;

    assert!(result.success);
    assert_eq!(result.authentication_required, Some(false));
    let status = result.structured_output.unwrap();
    assert_eq!(status["isAuthenticated"], true);
    assert_eq!(status["activeAccount"], "dev@example.com");
    assert_eq!(status["project"], "demo-project");
    assert_eq!(status["accounts"].as_array().unwrap().len(), 2);
    assert!(result.stdout_lines[0].contains("dev@example.com"));
}

#[tokio::test]
async fn test_authentication_status_signed_out() {
    let fake = FakeGcloud::signed_out();
    let client = client(&fake);

    let result = client.authentication_status().await;

    assert_eq!(result.authentication_required, Some(true));
    assert_eq!(result.structured_output.unwrap()["isAuthenticated"], false);
    assert!(!result.suggestions.is_empty());
}

#[tokio::test]
async fn test_auth_status_is_cached_until_invalidated() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let first = client.auth_status().await;
    let second = client.auth_status().await;
    assert_eq!(first, second);
    assert_eq!(client.executor().spawn_count(), 2);

    client.invalidate_auth_cache();
    client.auth_status().await;
    assert_eq!(client.executor().spawn_count(), 4);
}

#[tokio::test]
async fn test_stream_command_then_summarize() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let stream = match client
        .stream_command(CommandSpec::new(["version"]), CancelHandle::new())
        .await
    {
        StreamOutcome::Started(stream) => stream,
        StreamOutcome::Rejected(result) => panic!("rejected: {result:?}"),
    };
    let execution = stream.finish().await.unwrap();
    let result = client.summarize(&execution);

    assert!(result.success);
    assert_eq!(result.stdout_lines.len(), 2);
}

#[tokio::test]
async fn test_result_serializes_camel_case() {
    let fake = FakeGcloud::signed_in();
    let client = client(&fake);

    let result = client.run_command(CommandSpec::new(["version"])).await;
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["exitCode"], 0);
    assert!(json["stdoutLines"].is_array());
    assert!(json["executionTimeMs"].is_u64());
    assert!(json.get("error").is_none());
    assert!(json.get("suggestions").is_none());
}

#[test]
fn test_builder_rejects_invalid_config() {
    let result = Client::builder().timeout_secs(0).build();
    assert!(result.is_err());
}
