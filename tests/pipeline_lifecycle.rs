// End-to-end walk of one task through the default pipeline

mod common;

use common::{FakeDispatcher, Harness};
use labelflow::tracker::TaskState;
use labelflow::{
    CompletionPipeline, CompletionRequest, CoreError, DispatchMode, NotificationEvent, Scheduler,
    TickOptions, TrackerCall, WorkflowConfig,
};

#[tokio::test]
async fn task_travels_from_todo_to_done() {
    let harness = Harness::new().await;
    harness.register("shop", "Shop").await;
    harness.tracker("shop").add_task(7, "Refactor checkout flow", &["To Do"]);
    harness.tracker("shop").set_artifact(7, "https://tracker.local/pull/70");

    let scheduler = Scheduler::new(harness.services.clone());
    let pipeline = CompletionPipeline::new(harness.services.clone());

    let tick = scheduler.tick("shop", TickOptions::default()).await.unwrap();
    assert_eq!(tick.pickups.len(), 1);
    let pickup = &tick.pickups[0];
    assert_eq!(pickup.role, "developer");
    assert_eq!(pickup.level, "senior");
    assert_eq!(pickup.mode, DispatchMode::Spawn);
    assert_eq!(tick.skip_reason("tester"), Some("no tasks queued"));
    assert!(harness.tracker("shop").task(7).unwrap().has_label("Doing"));

    let done = pipeline
        .execute(CompletionRequest::new("shop", "developer", "done").with_summary("split the reducer"))
        .await
        .unwrap();
    assert_eq!(done.next_state, "tester queue");
    assert_eq!(done.artifact_url.as_deref(), Some("https://tracker.local/pull/70"));
    assert!(done.announcement.contains("#7"));

    let tick = scheduler.tick("shop", TickOptions::default()).await.unwrap();
    assert_eq!(tick.pickups.len(), 1);
    assert_eq!(tick.pickups[0].role, "tester");
    assert!(harness.tracker("shop").task(7).unwrap().has_label("Testing"));

    let pass = pipeline
        .execute(CompletionRequest::new("shop", "tester", "pass"))
        .await
        .unwrap();
    assert!(pass.closed);
    let task = harness.tracker("shop").task(7).unwrap();
    assert!(task.has_label("Done"));
    assert_eq!(task.state, TaskState::Closed);

    let transitions = harness.tracker("shop").transitions();
    assert_eq!(
        transitions,
        vec![
            TrackerCall::Transition { id: 7, from: "To Do".into(), to: "Doing".into() },
            TrackerCall::Transition { id: 7, from: "Doing".into(), to: "To Test".into() },
            TrackerCall::Transition { id: 7, from: "To Test".into(), to: "Testing".into() },
            TrackerCall::Transition { id: 7, from: "Testing".into(), to: "Done".into() },
        ]
    );

    let project = harness.store.get_project("shop").await.unwrap();
    assert!(!project.is_active());
    assert_eq!(
        harness.audit.names(),
        vec!["work_start", "work_finish", "work_start", "work_finish"]
    );

    harness.flush().await;
    assert_eq!(harness.services.notifications.pending(), 0);
    let kinds: Vec<&str> = harness.notifier.events().iter().map(NotificationEvent::kind).collect();
    assert_eq!(kinds.iter().filter(|kind| **kind == "pickup").count(), 2);
    assert_eq!(kinds.iter().filter(|kind| **kind == "worker-complete").count(), 2);
}

#[tokio::test]
async fn failed_test_sends_task_back_and_reuses_developer_session() {
    let harness = Harness::new().await;
    harness.register("shop", "Shop").await;
    harness.tracker("shop").add_task(3, "Checkout button", &["To Do"]);

    let scheduler = Scheduler::new(harness.services.clone());
    let pipeline = CompletionPipeline::new(harness.services.clone());

    scheduler.tick("shop", TickOptions::for_role("developer")).await.unwrap();
    pipeline
        .execute(CompletionRequest::new("shop", "developer", "done"))
        .await
        .unwrap();
    scheduler.tick("shop", TickOptions::for_role("tester")).await.unwrap();

    let fail = pipeline
        .execute(CompletionRequest::new("shop", "tester", "fail").with_summary("button overlaps footer"))
        .await
        .unwrap();
    assert!(fail.reopened);
    assert_eq!(fail.next_state, "developer queue");
    assert!(harness.tracker("shop").task(3).unwrap().has_label("To Improve"));

    let tick = scheduler.tick("shop", TickOptions::for_role("developer")).await.unwrap();
    assert_eq!(tick.pickups[0].mode, DispatchMode::Send);

    let requests = harness.dispatcher.requests();
    let developer: Vec<_> = requests.iter().filter(|r| r.role == "developer").collect();
    assert_eq!(developer.len(), 2);
    assert_eq!(developer[1].from_label, "To Improve");
    assert_eq!(developer[1].session_ref.as_deref(), Some("session-developer-medior"));
}

#[tokio::test]
async fn completion_for_wrong_result_changes_nothing() {
    let harness = Harness::new().await;
    harness.register("shop", "Shop").await;
    harness.tracker("shop").add_task(9, "Docs", &["To Do"]);
    Scheduler::new(harness.services.clone())
        .tick("shop", TickOptions::default())
        .await
        .unwrap();
    let calls_before = harness.tracker("shop").calls().len();

    let err = CompletionPipeline::new(harness.services.clone())
        .execute(CompletionRequest::new("shop", "developer", "pass"))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidCompletion { .. }));
    assert_eq!(harness.tracker("shop").calls().len(), calls_before);
    assert!(harness.store.get_worker("shop", "developer").await.unwrap().active);
}

#[tokio::test]
async fn failed_dispatch_leaves_queue_untouched() {
    let harness =
        Harness::with_dispatcher(WorkflowConfig::default(), FakeDispatcher::failing("gateway down")).await;
    harness.register("shop", "Shop").await;
    harness.tracker("shop").add_task(1, "Anything", &["To Do"]);

    let tick = Scheduler::new(harness.services.clone())
        .tick("shop", TickOptions::default())
        .await
        .unwrap();

    assert!(tick.pickups.is_empty());
    assert_eq!(tick.skip_reason("developer"), Some("dispatch failed: gateway down"));
    assert!(harness.tracker("shop").task(1).unwrap().has_label("To Do"));
    assert!(harness.tracker("shop").transitions().is_empty());
    assert!(!harness.store.get_worker("shop", "developer").await.unwrap().active);
    assert!(harness.audit.names().is_empty());
}
