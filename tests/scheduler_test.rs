// Daily scheduler driving the check-in runner against a mock provider

use anyrouter_auto::checkin::CheckinClient;
use anyrouter_auto::config::{HttpTimeouts, OAuthConfig, ScheduleConfig};
use anyrouter_auto::credentials::{CredentialRecord, CredentialStore};
use anyrouter_auto::history::HistoryStore;
use anyrouter_auto::oauth::AuthorizationFlow;
use anyrouter_auto::runner::CheckinRunner;
use anyrouter_auto::scheduler::{DailyScheduler, ScheduleState, ScheduleStore};
use chrono::{Local, Timelike};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn runner(base_url: &str, dir: &Path) -> CheckinRunner {
    let config = OAuthConfig {
        client_id: Some("client-abc".to_string()),
        base_url: base_url.to_string(),
        ..OAuthConfig::default()
    };
    let timeouts = HttpTimeouts::default();
    let store = Arc::new(CredentialStore::new(dir.join("credentials.json"), None));
    store.save(&CredentialRecord::new("tok1")).unwrap();

    let flow = Arc::new(AuthorizationFlow::new(config.clone(), timeouts.clone(), store));
    let client = CheckinClient::new(&config, &timeouts).unwrap();
    CheckinRunner::new(flow, client, HistoryStore::new(dir.join("history.jsonl")))
}

fn schedule_in_two_seconds(dir: &Path) -> ScheduleStore {
    // Truncated to whole seconds, so still more than one second ahead
    let soon = Local::now() + chrono::Duration::seconds(2);
    let store = ScheduleStore::new(dir.join("schedule.json"), ScheduleConfig::default());
    store
        .save(&ScheduleState {
            hour: soon.hour(),
            minute: soon.minute(),
            second: soon.second(),
            last_run: None,
        })
        .unwrap();
    store
}

async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

#[tokio::test]
async fn test_scheduled_checkin_records_history_and_last_run() {
    let mut provider = mockito::Server::new_async().await;
    let checkin = provider
        .mock("POST", "/api/checkin")
        .match_header("authorization", "Bearer tok1")
        .with_status(200)
        .with_body(r#"{"success":true,"message":"ok","reward":"1"}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let schedule_path = dir.path().join("schedule.json");
    let history = HistoryStore::new(dir.path().join("history.jsonl"));

    let mut scheduler = DailyScheduler::new(
        Arc::new(runner(&provider.url(), dir.path())),
        schedule_in_two_seconds(dir.path()),
    );
    scheduler.start();

    let reloaded = ScheduleStore::new(&schedule_path, ScheduleConfig::default());
    assert!(eventually(|| reloaded.load().last_run.is_some()).await);
    assert_eq!(history.load().unwrap().len(), 1);

    scheduler.stop().await;
    checkin.assert_async().await;
}

#[tokio::test]
async fn test_failed_checkin_keeps_scheduler_running() {
    let mut provider = mockito::Server::new_async().await;
    let checkin = provider
        .mock("POST", "/api/checkin")
        .with_status(502)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let schedule_path = dir.path().join("schedule.json");

    let mut scheduler = DailyScheduler::new(
        Arc::new(runner(&provider.url(), dir.path())),
        schedule_in_two_seconds(dir.path()),
    );
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert!(scheduler.is_running());
    let state = ScheduleStore::new(&schedule_path, ScheduleConfig::default()).load();
    assert_eq!(state.last_run, None);
    assert!(HistoryStore::new(dir.path().join("history.jsonl"))
        .load()
        .unwrap()
        .is_empty());

    scheduler.stop().await;
    checkin.assert_async().await;
}
