//! Contract checks shared by every store backend

use flowstat_core::{
    EventStatus, EventType, ExecutionStatus, Message, SqliteSettings, StatusEvent, StoreBackend,
    StoreConfig,
};
use flowstat_store::{open_store, StatusStore, StoreError};
use std::sync::Arc;

fn event(execution_id: &str, event_type: EventType, status: EventStatus) -> StatusEvent {
    StatusEvent::new(event_type, status, execution_id, "appA", "r1")
}

async fn backends() -> Vec<Arc<dyn StatusStore>> {
    let memory = StoreConfig::default();
    let sqlite = StoreConfig {
        backend: StoreBackend::Sqlite,
        sqlite: SqliteSettings::with_url("sqlite::memory:"),
        ..StoreConfig::default()
    };
    vec![
        open_store(&memory).await.unwrap(),
        open_store(&sqlite).await.unwrap(),
    ]
}

#[tokio::test]
async fn test_terminal_status_follows_complete_event() {
    for store in backends().await {
        store.create_execution("ok", "appA", "r1").await.unwrap();
        store.create_execution("bad", "appA", "r2").await.unwrap();

        for id in ["ok", "bad"] {
            store
                .add_status(id, &event(id, EventType::NodeStart, EventStatus::Running).with_node("n1", "llm"))
                .await
                .unwrap();
        }
        store
            .add_status("ok", &event("ok", EventType::Complete, EventStatus::Success))
            .await
            .unwrap();
        store
            .add_status(
                "bad",
                &event("bad", EventType::Complete, EventStatus::Success).with_error("tool exploded: timeout"),
            )
            .await
            .unwrap();

        let ok = store.get_execution("ok").await.unwrap().unwrap();
        assert_eq!(ok.status, ExecutionStatus::Completed, "backend {}", store.backend());
        assert!(ok.error.is_none());

        let bad = store.get_execution("bad").await.unwrap().unwrap();
        assert_eq!(bad.status, ExecutionStatus::Failed, "backend {}", store.backend());
        assert_eq!(bad.error.as_deref(), Some("tool exploded: timeout"));
        assert!(bad.end_time.is_some());
    }
}

#[tokio::test]
async fn test_unknown_execution_never_created() {
    for store in backends().await {
        let accepted = store
            .add_status("ghost", &event("ghost", EventType::Complete, EventStatus::Success))
            .await
            .unwrap();
        assert!(!accepted, "backend {}", store.backend());
        assert!(store.get_execution("ghost").await.unwrap().is_none());
        let (_, total) = store.list_executions(1, 10).await.unwrap();
        assert_eq!(total, 0);
    }
}

#[tokio::test]
async fn test_list_total_matches_creates() {
    for store in backends().await {
        for i in 0..7 {
            store
                .create_execution(&format!("e{}", i), "appA", "r")
                .await
                .unwrap();
        }
        for page in 0..5 {
            let (records, total) = store.list_executions(page, 3).await.unwrap();
            assert!(records.len() <= 3);
            assert_eq!(total, 7, "backend {}", store.backend());
        }
    }
}

#[tokio::test]
async fn test_result_is_independent_of_events() {
    for store in backends().await {
        store.create_execution("e1", "appA", "r1").await.unwrap();
        assert!(store
            .set_result("e1", &Message::assistant("final answer"))
            .await
            .unwrap());
        let record = store.get_execution("e1").await.unwrap().unwrap();
        assert_eq!(record.result, Some(Message::assistant("final answer")));
        assert_eq!(record.status, ExecutionStatus::Running);
        assert!(record.status_history.is_empty());
    }
}

#[tokio::test]
async fn test_disabled_store_cannot_be_built() {
    let config = StoreConfig {
        enabled: false,
        ..StoreConfig::default()
    };
    assert!(matches!(open_store(&config).await, Err(StoreError::Disabled)));
}

#[tokio::test]
async fn test_sqlite_without_url_is_fatal() {
    let config = StoreConfig {
        backend: StoreBackend::Sqlite,
        ..StoreConfig::default()
    };
    assert!(matches!(open_store(&config).await, Err(StoreError::Config(_))));
}

#[tokio::test]
async fn test_sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("status.db").display());
    let config = StoreConfig {
        backend: StoreBackend::Sqlite,
        sqlite: SqliteSettings::with_url(url),
        ..StoreConfig::default()
    };

    {
        let store = open_store(&config).await.unwrap();
        store.create_execution("e1", "appA", "r1").await.unwrap();
        store
            .add_status("e1", &event("e1", EventType::Complete, EventStatus::Success))
            .await
            .unwrap();
    }

    let reopened = open_store(&config).await.unwrap();
    let record = reopened.get_execution("e1").await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.status_history.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_sqlite_file_concurrent_appends() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        backend: StoreBackend::Sqlite,
        sqlite: SqliteSettings::with_url(format!(
            "sqlite://{}",
            dir.path().join("status.db").display()
        )),
        ..StoreConfig::default()
    };
    let store = open_store(&config).await.unwrap();
    store.create_execution("e1", "appA", "r1").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let event = event("e1", EventType::NodeEnd, EventStatus::Success)
                .with_node(format!("n{}", i), "llm");
            store.add_status("e1", &event).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }
    store
        .add_status("e1", &event("e1", EventType::Complete, EventStatus::Success))
        .await
        .unwrap();

    let record = store.get_execution("e1").await.unwrap().unwrap();
    assert_eq!(record.status_history.len(), 65);
    assert_eq!(record.status, ExecutionStatus::Completed);
}
