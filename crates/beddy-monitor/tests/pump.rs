//! Drives the monitor pipeline from JSON lines to report lines

use std::sync::Arc;

use beddy_eventstore::{EventStore, EventStoreConfig, InMemoryEventStore};
use beddy_monitor::{EventService, MonitorConfig, MonitorError, pump};
use serde_json::Value;

const INPUT: &str = r#"
{"id":"e1","type":"session.started","logical_clock":1,"unix_timestamp":1000,"data":{"id":"A","name":"Nursery","host_connection_id":"C1","started_at":"2024-05-01T20:00:00Z"}}
{"id":"e2","type":"client.connected","logical_clock":2,"unix_timestamp":2000,"data":{"client_id":"cam","connection_id":"C1","request_id":"R1"}}

not json at all
{"id":"e3","type":"client.disconnected","logical_clock":3,"unix_timestamp":3000,"data":{"client_id":"cam","connection_id":"C1","request_id":"R0","web_socket_close_code":1006}}
{"id":"e4","type":"session.started","logical_clock":4,"unix_timestamp":4000,"data":{"id":"B","name":"Bedroom","host_connection_id":"C2","started_at":"2024-05-01T21:00:00Z"}}
{"id":"e5","type":"server.started","logical_clock":5,"unix_timestamp":5000}
"#;

fn reports(output: &[u8]) -> Vec<Value> {
    std::str::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_pump_reports_changes_and_final_list() {
    let service = EventService::new(Arc::new(InMemoryEventStore::new()), Default::default());
    let mut output = Vec::new();

    let stats = pump(&service, INPUT.as_bytes(), &mut output).await.unwrap();

    assert_eq!(stats.events_put, 5);
    assert_eq!(stats.lines_skipped, 1);
    assert_eq!(stats.last_clock, 5);

    let reports = reports(&output);
    let changed: Vec<u64> = reports
        .iter()
        .filter(|r| r["kind"] == "changed")
        .map(|r| r["logical_clock"].as_u64().unwrap())
        .collect();
    // The stale disconnect at clock 3 is a no-op
    assert_eq!(changed, vec![1, 2, 4, 5]);

    let last = reports.last().unwrap();
    assert_eq!(last["kind"], "final");
    assert_eq!(last["logical_clock"], 5);
    let sessions = last["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["id"], "A");
    assert_eq!(sessions[0]["host_connection_state"]["state"], "disconnected");
    assert_eq!(sessions[0]["host_connection_state"]["since"], 5000);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_pump_empty_input() {
    let service = EventService::new(Arc::new(InMemoryEventStore::new()), Default::default());
    let mut output = Vec::new();

    let stats = pump(&service, "\n\n".as_bytes(), &mut output).await.unwrap();
    assert_eq!(stats.events_put, 0);

    let reports = reports(&output);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["kind"], "final");
    assert!(reports[0]["sessions"].as_array().unwrap().is_empty());
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_put_failure_aborts() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = MonitorConfig {
        store: EventStoreConfig::persistent(temp_dir.path().join("events.redb")).with_max_events(2),
        ..Default::default()
    };
    let service = EventService::open(&config).unwrap();
    let mut output = Vec::new();

    let result = pump(&service, INPUT.as_bytes(), &mut output).await;
    assert!(matches!(result, Err(MonitorError::Storage(_))));

    // Only the events that fit were stored
    assert_eq!(service.resume_cursor().await.unwrap(), 2);
    assert_eq!(service.store().inner().get_last_event().await.unwrap().unwrap().id, "e2");
    service.stop().await.unwrap();
}
