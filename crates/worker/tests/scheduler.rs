use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use planforge_builder::Builder;
use planforge_core::commands::CommandRegistry;
use planforge_core::job::{FailureCode, Job, JobPayload, JobStatus};
use planforge_core::recipe::Recipe;
use planforge_core::types::JobId;
use planforge_model::{ArtifactStore, ModelAuthority, TemplateSpec};
use planforge_worker::{
    AuthorityLoop, CancelError, JobEventBus, JobEventType, JobRegistry, Scheduler,
    SchedulerConfig, SchedulerHandle, SubmitError,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scheduler(dir: &tempfile::TempDir, capacity: usize) -> (SchedulerHandle, AuthorityLoop) {
    let config = SchedulerConfig {
        queue_capacity: capacity,
        ..SchedulerConfig::default()
    };
    scheduler_with(dir, &config)
}

fn scheduler_with(
    dir: &tempfile::TempDir,
    config: &SchedulerConfig,
) -> (SchedulerHandle, AuthorityLoop) {
    let builder = Builder::new(
        ModelAuthority::new(TemplateSpec::builtin()),
        CommandRegistry::default(),
        ArtifactStore::new(dir.path()),
    );
    Scheduler::new(
        Arc::new(JobRegistry::new()),
        Arc::new(JobEventBus::default()),
        builder,
        config,
    )
}

fn id(s: &str) -> JobId {
    JobId::parse(s).unwrap()
}

fn build(steps: serde_json::Value) -> JobPayload {
    let recipe: Recipe = serde_json::from_value(json!({ "steps": steps })).unwrap();
    JobPayload::Build { recipe }
}

fn level_recipe(name: &str) -> JobPayload {
    build(json!([
        {"commandType": "CreateLevel", "parameters": {"name": name, "elevation": 0}},
        {"commandType": "CreateView", "parameters": {"view_type": "3D", "name": "{3D}"}}
    ]))
}

/// A recipe that keeps the authority busy long enough to be interrupted.
/// Level-name checks scan the document, so the cost grows quadratically.
fn long_recipe(levels: usize) -> JobPayload {
    let steps: Vec<_> = (0..levels)
        .map(|i| {
            json!({"commandType": "CreateLevel", "parameters": {"name": format!("L{i}"), "elevation": i * 3000}})
        })
        .collect();
    build(serde_json::Value::Array(steps))
}

async fn wait_terminal(handle: &SchedulerHandle, job_id: &JobId) -> Job {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let job = handle.registry().get(job_id).unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job should reach a terminal state")
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[test]
fn full_queue_is_overloaded_and_creates_no_job() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, _loop_not_started) = scheduler(&dir, 2);

    handle.submit(id("a"), level_recipe("A")).unwrap();
    handle.submit(id("b"), level_recipe("B")).unwrap();
    assert_eq!(handle.queue_depth(), 2);

    assert_matches!(
        handle.submit(id("c"), level_recipe("C")),
        Err(SubmitError::Overloaded { capacity: 2 })
    );
    assert_eq!(handle.registry().len(), 2);
    assert!(handle.registry().get(&id("c")).is_err());
}

#[test]
fn duplicate_job_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, _loop_not_started) = scheduler(&dir, 4);
    handle.submit(id("a"), level_recipe("A")).unwrap();
    assert_matches!(
        handle.submit(id("a"), level_recipe("A")),
        Err(SubmitError::Registry(_))
    );
    assert_eq!(handle.queue_depth(), 1);
}

#[test]
fn submit_after_loop_exit_reports_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, authority) = scheduler(&dir, 4);
    drop(authority);
    assert_matches!(
        handle.submit(id("late"), level_recipe("A")),
        Err(SubmitError::ShuttingDown)
    );
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn jobs_run_one_at_a_time_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, authority) = scheduler(&dir, 8);
    let mut events = handle.events().subscribe();

    // Two concurrent callers; B is only submitted once A is queued.
    let a = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.submit(id("a"), level_recipe("A")).unwrap() })
    };
    a.await.unwrap();
    let b = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.submit(id("b"), level_recipe("B")).unwrap() })
    };
    b.await.unwrap();

    let thread = authority.spawn().unwrap();

    let mut order = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.event_type == JobEventType::Queued {
                continue;
            }
            let done = event.job_id.as_str() == "b" && event.event_type != JobEventType::Started;
            order.push((event.job_id.as_str().to_string(), event.event_type));
            if done {
                break;
            }
        }
    })
    .await
    .expect("both jobs should finish");

    assert_eq!(
        order,
        vec![
            ("a".to_string(), JobEventType::Started),
            ("a".to_string(), JobEventType::Succeeded),
            ("b".to_string(), JobEventType::Started),
            ("b".to_string(), JobEventType::Succeeded),
        ]
    );

    let a = handle.registry().get(&id("a")).unwrap();
    let b = handle.registry().get(&id("b")).unwrap();
    assert!(a.finished_at.unwrap() <= b.started_at.unwrap());

    drop(handle);
    thread.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_submitted_job_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, authority) = scheduler(&dir, 8);
    let _thread = authority.spawn().unwrap();

    let payloads = vec![
        ("ok", level_recipe("L")),
        ("bad-tag", build(json!([{"commandType": "CreateStair", "parameters": {}}]))),
        (
            "bad-ref",
            build(json!([{"commandType": "CreateView", "parameters": {"view_type": "FloorPlan", "name": "P", "level": "Missing"}}])),
        ),
        ("empty", build(json!([]))),
        (
            "render-garbage",
            JobPayload::Render {
                artifact: b"garbage".to_vec(),
                source_job: None,
            },
        ),
    ];
    for (job_id, payload) in payloads {
        handle.submit(id(job_id), payload).unwrap();
    }

    let ok = wait_terminal(&handle, &id("ok")).await;
    assert_eq!(ok.status, JobStatus::Succeeded);
    assert!(ok.result.is_some() && ok.error.is_none());

    let bad_tag = wait_terminal(&handle, &id("bad-tag")).await;
    assert_eq!(bad_tag.status, JobStatus::Failed);
    assert_eq!(bad_tag.error.as_ref().unwrap().code, FailureCode::ValidationError);
    assert!(bad_tag.started_at.is_none(), "validation failures never run");
    assert!(bad_tag.result.is_none());

    let bad_ref = wait_terminal(&handle, &id("bad-ref")).await;
    let error = bad_ref.error.unwrap();
    assert_eq!(error.code, FailureCode::ReferenceNotFound);
    assert_eq!(error.step_index, Some(0));

    let empty = wait_terminal(&handle, &id("empty")).await;
    assert_eq!(empty.error.unwrap().code, FailureCode::ValidationError);

    let render = wait_terminal(&handle, &id("render-garbage")).await;
    assert_eq!(render.status, JobStatus::Failed);

    assert!(!dir.path().join("bad-tag.pfm.json").exists());
    assert!(!dir.path().join("bad-ref.pfm.json").exists());
    assert!(handle.authority_alive());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_build_leaves_earlier_artifact_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, authority) = scheduler(&dir, 8);
    let _thread = authority.spawn().unwrap();

    handle.submit(id("good"), level_recipe("L")).unwrap();
    let good = wait_terminal(&handle, &id("good")).await;
    let locator = good.result.unwrap();
    let before = std::fs::read(&locator.path).unwrap();

    handle
        .submit(
            id("broken"),
            build(json!([
                {"commandType": "CreateLevel", "parameters": {"name": "L", "elevation": 0}},
                {"commandType": "CreateLevel", "parameters": {"name": "M", "elevation": 3000}},
                {"commandType": "CreateWall", "parameters": {
                    "curve": {"start": {"x": 0, "y": 0}, "end": {"x": 1000, "y": 0}},
                    "wall_type": "Generic - 200mm", "level": "Nowhere", "height": 3000
                }}
            ])),
        )
        .unwrap();
    let broken = wait_terminal(&handle, &id("broken")).await;

    assert_eq!(broken.error.as_ref().unwrap().step_index, Some(2));
    assert!(!dir.path().join("broken.pfm.json").exists());
    assert_eq!(std::fs::read(&locator.path).unwrap(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn polling_a_terminal_job_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, authority) = scheduler(&dir, 8);
    let _thread = authority.spawn().unwrap();

    handle.submit(id("done"), level_recipe("L")).unwrap();
    wait_terminal(&handle, &id("done")).await;

    let first = serde_json::to_value(handle.registry().get(&id("done")).unwrap()).unwrap();
    for _ in 0..5 {
        let again = serde_json::to_value(handle.registry().get(&id("done")).unwrap()).unwrap();
        assert_eq!(again, first);
    }
}

// ---------------------------------------------------------------------------
// Cancellation and shutdown
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_queued_job_never_runs() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, authority) = scheduler(&dir, 8);

    handle.submit(id("doomed"), level_recipe("L")).unwrap();
    let cancelled = handle.cancel(&id("doomed")).unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error.unwrap().code, FailureCode::Cancelled);

    let _thread = authority.spawn().unwrap();
    handle.submit(id("next"), level_recipe("L")).unwrap();
    assert_eq!(
        wait_terminal(&handle, &id("next")).await.status,
        JobStatus::Succeeded
    );

    let doomed = handle.registry().get(&id("doomed")).unwrap();
    assert!(doomed.started_at.is_none());
    assert!(!dir.path().join("doomed.pfm.json").exists());

    assert_matches!(
        handle.cancel(&id("doomed")),
        Err(CancelError::AlreadyFinished { .. })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_a_running_job_rolls_it_back() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, authority) = scheduler(&dir, 4);
    let mut events = handle.events().subscribe();
    let registry = Arc::clone(handle.registry());
    let thread = authority.spawn().unwrap();

    handle.submit(id("long"), long_recipe(20_000)).unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.event_type == JobEventType::Started {
                break;
            }
        }
    })
    .await
    .expect("job should start");

    let running = handle.cancel(&id("long")).unwrap();
    assert_eq!(running.status, JobStatus::Running);

    let job = wait_terminal(&handle, &id("long")).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().code, FailureCode::Cancelled);
    assert!(job.started_at.is_some());
    assert!(job.result.is_none());

    drop(handle);
    thread.join().unwrap();
    assert!(!dir.path().join("long.pfm.json").exists());
    assert_eq!(registry.get(&id("long")).unwrap().status, JobStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overdue_job_times_out_and_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = SchedulerConfig {
        queue_capacity: 4,
        job_timeout: Duration::from_millis(50),
        watchdog_interval: Duration::from_millis(10),
        ..SchedulerConfig::default()
    };
    let (handle, authority) = scheduler_with(&dir, &config);
    let registry = Arc::clone(handle.registry());
    let thread = authority.spawn().unwrap();

    let cancel = CancellationToken::new();
    let watchdog = tokio::spawn(
        handle
            .watchdog()
            .run(config.watchdog_interval, cancel.clone()),
    );

    handle.submit(id("slow"), long_recipe(20_000)).unwrap();
    let job = wait_terminal(&handle, &id("slow")).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_ref().unwrap().code, FailureCode::Timeout);
    assert!(job.result.is_none());

    // Once the authority thread has drained, any late completion must have
    // been rejected and its artifact discarded.
    drop(handle);
    thread.join().unwrap();
    cancel.cancel();
    watchdog.await.unwrap();

    let job = registry.get(&id("slow")).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().code, FailureCode::Timeout);
    assert!(!dir.path().join("slow.pfm.json").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn finished_job_releases_its_payload() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, authority) = scheduler(&dir, 4);
    let registry = Arc::clone(handle.registry());
    let thread = authority.spawn().unwrap();

    let upload = Arc::new(JobPayload::Render {
        artifact: vec![0u8; 8 * 1024 * 1024],
        source_job: None,
    });
    handle.submit(id("upload"), Arc::clone(&upload)).unwrap();
    let job = wait_terminal(&handle, &id("upload")).await;
    assert_eq!(job.status, JobStatus::Failed);

    drop(handle);
    thread.join().unwrap();

    assert!(registry.get(&id("upload")).is_ok());
    assert_eq!(Arc::strong_count(&upload), 1);
}

#[test]
fn dropping_every_handle_stops_the_authority_thread() {
    let dir = tempfile::tempdir().unwrap();
    let (handle, authority) = scheduler(&dir, 4);
    let thread = authority.spawn().unwrap();
    assert!(handle.authority_alive());

    drop(handle);
    thread.join().unwrap();
}
