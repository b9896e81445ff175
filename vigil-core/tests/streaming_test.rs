//! Streaming analysis protocol

use futures::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use test_utils::{
    create_test_camera, create_test_detection, llm_completion, MemoryKv, MemoryStore,
    MockCompletionProvider, MockFailure,
};
use vigil_core::analyzer::NemotronAnalyzer;
use vigil_core::semaphore::InferenceSemaphore;
use vigil_core::{Settings, StreamingErrorCode, StreamingEvent};

struct Fixture {
    store: Arc<MemoryStore>,
    llm: Arc<MockCompletionProvider>,
    analyzer: NemotronAnalyzer,
}

fn fixture(llm: MockCompletionProvider) -> Fixture {
    let kv = Arc::new(MemoryKv::default());
    let store = Arc::new(MemoryStore::new());
    store.add_camera(create_test_camera("front_door"));
    store.add_detection(create_test_detection(1, "front_door"));
    let llm = Arc::new(llm);
    let analyzer = NemotronAnalyzer::new(
        kv,
        store.clone(),
        llm.clone(),
        Arc::new(InferenceSemaphore::new(4)),
        &Settings::default(),
    );
    Fixture {
        store,
        llm,
        analyzer,
    }
}

async fn collect(
    analyzer: &NemotronAnalyzer,
    batch_id: &str,
    camera_id: Option<&str>,
    detection_ids: Option<Vec<i64>>,
) -> Vec<StreamingEvent> {
    analyzer
        .analyze_batch_streaming(batch_id, camera_id, detection_ids)
        .collect()
        .await
}

#[tokio::test]
async fn chunks_stream_as_progress_then_complete() {
    let llm = MockCompletionProvider::default();
    let payload = llm_completion(75, "high", "Person at entrance");
    let (head, tail) = payload.split_at(payload.len() / 2);
    llm.push_chunks(&[head, tail]);
    let fixture = fixture(llm);

    let events = collect(&fixture.analyzer, "b1", Some("front_door"), Some(vec![1])).await;

    assert_eq!(events.len(), 3);
    let StreamingEvent::Progress {
        content,
        accumulated_text,
        ..
    } = &events[0]
    else {
        panic!("expected progress first");
    };
    assert_eq!(content, head);
    assert_eq!(accumulated_text, head);

    let StreamingEvent::Progress {
        accumulated_text, ..
    } = &events[1]
    else {
        panic!("expected progress second");
    };
    assert_eq!(accumulated_text, &payload);

    let StreamingEvent::Complete {
        event_id,
        risk_score,
        risk_level,
        ..
    } = &events[2]
    else {
        panic!("expected terminal complete");
    };
    assert_eq!(*risk_score, 75);
    assert_eq!(risk_level, "high");

    // The full persist flow ran exactly once
    let persisted = fixture.store.events();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].id, *event_id);
    assert_eq!(persisted[0].risk_score, 75);
}

#[tokio::test]
async fn existing_event_short_circuits_without_llm() {
    let fixture = fixture(MockCompletionProvider::with_content(&llm_completion(
        75, "high", "s",
    )));
    let first = fixture
        .analyzer
        .analyze_batch("b1", Some("front_door"), Some(vec![1]))
        .await
        .unwrap();
    let calls_before = fixture.llm.calls.load(Ordering::SeqCst);

    let events = collect(&fixture.analyzer, "b1", Some("front_door"), Some(vec![1])).await;

    assert_eq!(events.len(), 1);
    let StreamingEvent::Complete { event_id, .. } = &events[0] else {
        panic!("expected a single complete");
    };
    assert_eq!(*event_id, first.id);
    assert_eq!(fixture.llm.calls.load(Ordering::SeqCst), calls_before);
}

#[tokio::test]
async fn connection_failure_ends_the_stream_with_a_recoverable_error() {
    let llm = MockCompletionProvider::default();
    llm.push_failure(MockFailure::Connection);
    let fixture = fixture(llm);

    let events = collect(&fixture.analyzer, "b1", Some("front_door"), Some(vec![1])).await;

    assert_eq!(events.len(), 1);
    let StreamingEvent::Error {
        error_code,
        recoverable,
        ..
    } = &events[0]
    else {
        panic!("expected terminal error");
    };
    assert_eq!(*error_code, StreamingErrorCode::LlmConnectionError);
    assert!(*recoverable);
    assert!(fixture.store.events().is_empty(), "nothing persisted");
}

#[tokio::test]
async fn mid_stream_failure_emits_progress_then_error() {
    let llm = MockCompletionProvider::default();
    llm.push_chunks_then_failure(&["partial "], MockFailure::Server);
    let fixture = fixture(llm);

    let events = collect(&fixture.analyzer, "b1", Some("front_door"), Some(vec![1])).await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], StreamingEvent::Progress { .. }));
    let StreamingEvent::Error { error_code, .. } = &events[1] else {
        panic!("expected terminal error");
    };
    assert_eq!(*error_code, StreamingErrorCode::LlmServerError);
    assert!(fixture.store.events().is_empty());
}

#[tokio::test]
async fn unparsable_stream_persists_fallback_risk_data() {
    let llm = MockCompletionProvider::default();
    llm.push_chunks(&["no json ", "here at all"]);
    let fixture = fixture(llm);

    let events = collect(&fixture.analyzer, "b1", Some("front_door"), Some(vec![1])).await;

    let StreamingEvent::Complete {
        risk_score,
        risk_level,
        summary,
        ..
    } = events.last().unwrap()
    else {
        panic!("expected terminal complete");
    };
    assert_eq!(*risk_score, 50);
    assert_eq!(risk_level, "medium");
    assert!(summary.contains("Analysis unavailable"));
    assert_eq!(fixture.store.events().len(), 1);
}

#[tokio::test]
async fn unknown_batch_yields_batch_not_found() {
    let fixture = fixture(MockCompletionProvider::default());
    let events = collect(&fixture.analyzer, "ghost", None, None).await;

    assert_eq!(events.len(), 1);
    let StreamingEvent::Error {
        error_code,
        recoverable,
        ..
    } = &events[0]
    else {
        panic!("expected terminal error");
    };
    assert_eq!(*error_code, StreamingErrorCode::BatchNotFound);
    assert!(!*recoverable);
}

#[tokio::test]
async fn empty_batch_yields_no_detections() {
    let fixture = fixture(MockCompletionProvider::default());
    let events = collect(&fixture.analyzer, "b1", Some("front_door"), Some(vec![])).await;

    assert_eq!(events.len(), 1);
    let StreamingEvent::Error { error_code, .. } = &events[0] else {
        panic!("expected terminal error");
    };
    assert_eq!(*error_code, StreamingErrorCode::NoDetections);
}

#[tokio::test]
async fn cancellation_releases_the_inference_permit() {
    let llm = MockCompletionProvider::default();
    let payload = llm_completion(40, "medium", "s");
    llm.push_chunks(&[&payload]);
    let kv = Arc::new(MemoryKv::default());
    let store = Arc::new(MemoryStore::new());
    store.add_camera(create_test_camera("front_door"));
    store.add_detection(create_test_detection(1, "front_door"));
    let semaphore = Arc::new(InferenceSemaphore::new(1));
    let analyzer = NemotronAnalyzer::new(
        kv,
        store.clone(),
        Arc::new(llm),
        Arc::clone(&semaphore),
        &Settings::default(),
    );

    {
        let stream = analyzer.analyze_batch_streaming("b1", Some("front_door"), Some(vec![1]));
        futures::pin_mut!(stream);
        // Take only the first item, then drop the stream mid-flight
        let first = stream.next().await;
        assert!(first.is_some());
    }

    // The permit must be back; nothing may be persisted for the batch
    assert_eq!(semaphore.available_permits(), 1);
    assert!(store.events().is_empty());
}
