//! End-to-end worker runs against in-memory storage, queue and engine.

use std::sync::Arc;
use std::time::Duration;

use reelsync_models::{ClipInput, JobRequest, JobStatus};
use reelsync_queue::ReceivedJob;
use reelsync_worker::testing::{
    FakeEngine, FakeJobSource, MemoryStore, Queued, RecordingHost, StaticGpu, StaticMetadata,
};
use reelsync_worker::{
    fingerprint, InvocationLog, JobRunner, LifecycleController, LogShipper, WorkerConfig,
    WorkerOutcome,
};
use tempfile::TempDir;

fn config(dir: &TempDir) -> WorkerConfig {
    WorkerConfig {
        work_dir: dir.path().join("work"),
        cache_dir: dir.path().join("cache"),
        debug_output_dir: dir.path().join("out"),
        log_dir: dir.path().join("logs"),
        debug_hold_marker: dir.path().join("extend-hold"),
        logo_path: None,
        ..WorkerConfig::default()
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    store.insert("media/cams/a.mp4", b"A");
    store.insert("media/cams/b.mp4", b"B");
    store.insert("media/cams/c.mp4", b"C");
    store
}

fn three_camera_job() -> Arc<FakeJobSource> {
    Arc::new(FakeJobSource::new(Queued::Job(ReceivedJob {
        message_id: "1700000000000-0".to_string(),
        request: JobRequest {
            job_id: None,
            production_id: Some("prod-42".to_string()),
            bucket: "media".to_string(),
            inputs: vec![
                ClipInput::Spec("cams/a.mp4:portrait:0".to_string()),
                ClipInput::Spec("cams/b.mp4:landscape:5.2".to_string()),
                ClipInput::Object {
                    key: "cams/c.mp4".to_string(),
                    orientation: "portrait".to_string(),
                    offset: Some(serde_json::json!(3.5)),
                },
            ],
            outputs: vec!["renders/prod-42.mp4".to_string()],
            segment_seconds: Some(10.0),
        },
        deliveries: 1,
    })))
}

#[tokio::test]
async fn test_sequential_job_from_queue_to_shutdown() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let store = seeded_store();
    let engine = Arc::new(FakeEngine::with_duration(60.0));
    let host = Arc::new(RecordingHost::default());

    let (log, _file) = InvocationLog::create(&config.log_dir).unwrap();
    let shipper = LogShipper::new(log.clone(), store.clone(), "ops-logs", "worker-1");
    let runner = Arc::new(JobRunner::new(config.clone(), store.clone(), engine.clone()));
    let controller = LifecycleController::new(
        runner,
        Arc::new(StaticGpu::present()),
        Arc::new(StaticMetadata::subscription("jobs")),
        host.clone(),
    )
    .with_log_shipper(shipper);

    let source = three_camera_job();
    let s = source.clone();
    let outcome = controller.run(move |_| async move { Ok(s) }).await;

    assert_eq!(
        outcome,
        WorkerOutcome::Success {
            location: "media/renders/prod-42.mp4".to_string()
        }
    );
    assert_eq!(outcome.exit_code(), 0);

    let rendered = engine.rendered();
    for pass in ["segment-1", "segment-2", "segment-3", "compose"] {
        assert!(rendered.iter().any(|p| p == pass), "missing pass {pass}: {rendered:?}");
    }
    assert_eq!(rendered.last().map(String::as_str), Some("compose"));

    assert!(store.get("media/renders/prod-42.mp4").is_some());
    let key = log.remote_key("ops-logs", "worker-1").unwrap();
    assert!(store.get(&key.qualified()).is_some());

    assert_eq!(source.acked(), vec!["1700000000000-0".to_string()]);
    let results = source.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, JobStatus::Completed);
    assert_eq!(results[0].production_id.as_deref(), Some("prod-42"));

    assert_eq!(host.sleeps(), vec![Duration::from_secs(5)]);
    assert_eq!(host.shutdowns(), 1);

    // Production runs leave only the cache behind.
    let leftovers = std::fs::read_dir(&config.work_dir).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_cache_survives_between_runs() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let store = seeded_store();
    let engine = Arc::new(FakeEngine::with_duration(60.0));
    let runner = JobRunner::new(config.clone(), store.clone(), engine);

    let request = JobRequest {
        job_id: None,
        production_id: None,
        bucket: "media".to_string(),
        inputs: vec![
            ClipInput::Spec("cams/a.mp4:landscape:0".to_string()),
            ClipInput::Spec("cams/b.mp4:landscape:-0.25".to_string()),
        ],
        outputs: vec!["renders/pair.mp4".to_string()],
        segment_seconds: None,
    };

    for _ in 0..2 {
        let job = reelsync_models::JobDescriptor::from_request(&request, config.mode).unwrap();
        runner.run(&job).await.unwrap();
    }

    assert_eq!(store.downloads(), 2);
    let key = reelsync_models::RemoteKey::new("media", "cams/a.mp4").unwrap();
    assert!(config
        .cache_dir
        .join(format!("{}.mp4", fingerprint(&key)))
        .exists());
}

#[tokio::test]
async fn test_missing_accelerator_holds_without_a_job() {
    let dir = TempDir::new().unwrap();
    let host = Arc::new(RecordingHost::default());
    let runner = Arc::new(JobRunner::new(
        config(&dir),
        seeded_store(),
        Arc::new(FakeEngine::with_duration(60.0)),
    ));
    let controller = LifecycleController::new(
        runner,
        Arc::new(StaticGpu::absent()),
        Arc::new(StaticMetadata::subscription("jobs")),
        host.clone(),
    );

    let outcome = controller
        .run(|_| async { Ok(Arc::new(FakeJobSource::new(Queued::Nothing))) })
        .await;

    assert_eq!(outcome.exit_code(), 6);
    assert_eq!(host.total_slept(), Duration::from_secs(30 * 60));
    assert_eq!(host.shutdowns(), 1);
}
