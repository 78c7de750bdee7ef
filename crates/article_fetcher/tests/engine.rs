use std::sync::Arc;
use std::time::{Duration, Instant};

use article_fetcher::{
    EngineEvent, EngineHandle, FailureKind, MemoryDataStore, ReqwestManager, Site, Title,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &str = r#"{"mobileview": {"id": 7, "sections": [{"id": 0, "text": "<p>Lead</p>"}]}}"#;

fn start_server() -> (tokio::runtime::Runtime, MockServer) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("page", "Lead_only"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(BODY, "application/json"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("page", "Slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_raw(BODY, "application/json"),
            )
            .mount(&server)
            .await;
        server
    });
    (runtime, server)
}

fn title(server: &MockServer, text: &str) -> Title {
    let site = Site::from_api_url(&format!("{}/w/api.php", server.uri())).unwrap();
    Title::new(site, text).unwrap()
}

fn drain_until_completed(engine: &EngineHandle, job_id: u64) -> Vec<EngineEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    while Instant::now() < deadline {
        let Some(event) = engine.recv_timeout(Duration::from_millis(50)) else {
            continue;
        };
        let done = matches!(&event, EngineEvent::Completed { job_id: id, .. } if *id == job_id);
        events.push(event);
        if done {
            return events;
        }
    }
    panic!("job {job_id} did not complete: {events:?}");
}

#[test]
fn engine_emits_progress_then_completion() {
    let (_runtime, server) = start_server();
    let store = Arc::new(MemoryDataStore::new());
    let engine = EngineHandle::new(store.clone(), Arc::new(ReqwestManager::default())).unwrap();

    let handle = engine.enqueue(1, title(&server, "Lead only"));
    assert_eq!(handle.id(), 1);
    let events = drain_until_completed(&engine, 1);

    let (last, progress) = events.split_last().unwrap();
    assert!(progress
        .iter()
        .all(|event| matches!(event, EngineEvent::Progress { job_id: 1, .. })));
    assert!(matches!(
        last,
        EngineEvent::Completed {
            job_id: 1,
            result: Ok(_)
        }
    ));
    assert!(matches!(
        progress.last(),
        Some(EngineEvent::Progress { fraction, .. }) if *fraction == 1.0
    ));
    assert_eq!(store.len(), 1);
    assert!(engine.try_recv().is_none());
    assert!(!engine.cancel(1));
}

#[test]
fn engine_cancels_job_by_id() {
    let (_runtime, server) = start_server();
    let engine = EngineHandle::new(
        Arc::new(MemoryDataStore::new()),
        Arc::new(ReqwestManager::default()),
    )
    .unwrap();

    let _handle = engine.enqueue(9, title(&server, "Slow"));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(engine.fetcher().in_flight(), 1);
    assert!(engine.cancel(9));

    let events = drain_until_completed(&engine, 9);
    match events.last() {
        Some(EngineEvent::Completed { result: Err(err), .. }) => {
            assert_eq!(err.kind, FailureKind::Cancelled)
        }
        other => panic!("unexpected {other:?}"),
    }
    engine.shutdown();
}

#[test]
fn shutdown_delivers_completion_for_outstanding_jobs() {
    let (_runtime, server) = start_server();
    let engine = EngineHandle::new(
        Arc::new(MemoryDataStore::new()),
        Arc::new(ReqwestManager::default()),
    )
    .unwrap();

    let _slow = engine.enqueue(3, title(&server, "Slow"));
    let _other = engine.enqueue(4, title(&server, "Slow"));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(engine.fetcher().in_flight(), 2);

    let started = Instant::now();
    let events = engine.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));

    for job_id in [3, 4] {
        let completions: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Completed { job_id: id, result } if *id == job_id => Some(result),
                _ => None,
            })
            .collect();
        assert_eq!(completions.len(), 1, "job {job_id}: {events:?}");
        assert_eq!(
            completions[0].as_ref().unwrap_err().kind,
            FailureKind::Cancelled
        );
    }
}

#[test]
fn shutdown_returns_unread_events_of_finished_jobs() {
    let (_runtime, server) = start_server();
    let engine = EngineHandle::new(
        Arc::new(MemoryDataStore::new()),
        Arc::new(ReqwestManager::default()),
    )
    .unwrap();

    let handle = engine.enqueue(5, title(&server, "Lead only"));
    let deadline = Instant::now() + Duration::from_secs(10);
    while !handle.is_finished() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(handle.is_finished());

    let events = engine.shutdown();
    assert!(matches!(
        events.last(),
        Some(EngineEvent::Completed {
            job_id: 5,
            result: Ok(_)
        })
    ));
}
