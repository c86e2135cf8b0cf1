//! `execute_parallel` end to end.

use std::time::Duration;

use tokio_test::assert_ok;

use crew::config::OrchestratorConfig;
use crew::core::{Role, Task};
use crew::orchestration::OrchestratorEvent;
use crew::Error;

use crate::fixtures::{
    fake_orchestrator, fan_out_tasks, independent_tasks, scripted_orchestrator, two_cycle,
    FakeFactory,
};

const DELAY: Duration = Duration::from_millis(20);

#[tokio::test]
async fn test_fan_out_results_in_order_with_inferred_roles() {
    let (orch, _backend) = scripted_orchestrator(5, DELAY);

    let results = assert_ok!(orch.execute_parallel(&fan_out_tasks()).await);

    let summary: Vec<(&str, Role, bool)> = results
        .iter()
        .map(|r| (r.task_id.as_str(), r.role, r.success))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("A", Role::Analysis, true),
            ("B", Role::Testing, true),
            ("C", Role::Documentation, true),
        ]
    );
    assert_eq!(results[0].output, "A as analysis");
}

#[tokio::test]
async fn test_batches_run_strictly_in_sequence() {
    let (orch, backend) = scripted_orchestrator(5, DELAY);

    orch.execute_parallel(&fan_out_tasks()).await.unwrap();

    let timeline = backend.timeline();
    let a_end = timeline
        .iter()
        .position(|e| *e == ("A".to_string(), "end"))
        .unwrap();
    for later in ["B", "C"] {
        let start = timeline
            .iter()
            .position(|e| *e == (later.to_string(), "start"))
            .unwrap();
        assert!(start > a_end, "{later} started before A finished");
    }
}

#[tokio::test]
async fn test_tasks_in_a_batch_overlap() {
    let (orch, backend) = scripted_orchestrator(5, DELAY);
    orch.execute_parallel(&independent_tasks(4)).await.unwrap();
    assert!(backend.peak() > 1, "independent tasks should run concurrently");
}

#[tokio::test]
async fn test_one_failure_does_not_affect_siblings() {
    let (orch, _backend) = scripted_orchestrator(5, DELAY);
    let tasks = vec![
        Task::new("one", "first job"),
        Task::new("two", "this one should fail"),
        Task::new("three", "third job"),
    ];

    let results = orch.execute_parallel(&tasks).await.unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(!results[1].error.as_deref().unwrap_or_default().is_empty());
    assert!(results[2].success);
    assert_eq!(orch.subagent_count(), 0);
}

#[tokio::test]
async fn test_failed_result_measures_elapsed_time() {
    let (orch, _backend) = scripted_orchestrator(5, DELAY);

    let results = orch
        .execute_parallel(&[Task::new("X", "fail slowly")])
        .await
        .unwrap();

    assert!(!results[0].success);
    assert!(results[0].execution_time >= DELAY);
    assert!(results[0].status.is_some());
}

#[tokio::test]
async fn test_panicking_task_becomes_failed_result() {
    let (orch, _backend) = scripted_orchestrator(5, DELAY);
    let tasks = vec![Task::new("ok", "fine"), Task::new("boom", "panic now")];

    let results = orch.execute_parallel(&tasks).await.unwrap();

    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(results[1].task_id, "boom");
    assert_eq!(orch.subagent_count(), 0);
    assert_eq!(orch.active_count(), 0);
}

#[tokio::test]
async fn test_failed_dependency_does_not_block_dependents() {
    let (orch, _backend) = scripted_orchestrator(5, DELAY);
    let tasks = vec![
        Task::new("A", "fail first"),
        Task::new("B", "then this").depends_on(["A"]),
    ];

    let results = orch.execute_parallel(&tasks).await.unwrap();

    assert!(!results[0].success);
    assert!(results[1].success);
}

#[tokio::test]
async fn test_cycle_spawns_nothing() {
    let factory = FakeFactory::new();
    let orch = fake_orchestrator(OrchestratorConfig::default(), &factory);
    let mut rx = orch.subscribe();

    let err = orch.execute_parallel(&two_cycle()).await.unwrap_err();

    assert!(matches!(err, Error::CircularDependency { .. }));
    assert!(factory.created().is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_reference_spawns_nothing() {
    let factory = FakeFactory::new();
    let orch = fake_orchestrator(OrchestratorConfig::default(), &factory);
    let tasks = vec![Task::new("A", "a").depends_on(["ghost"])];

    let err = orch.execute_parallel(&tasks).await.unwrap_err();

    assert!(matches!(err, Error::UnknownTaskReference { .. }));
    assert!(factory.created().is_empty());
}

#[tokio::test]
async fn test_large_batch_throttled_to_capacity() {
    let (orch, backend) = scripted_orchestrator(2, DELAY);

    let results = orch.execute_parallel(&independent_tasks(7)).await.unwrap();

    assert_eq!(results.len(), 7);
    assert!(results.iter().all(|r| r.success));
    assert!(backend.peak() <= 2);
}

#[tokio::test]
async fn test_stats_over_accumulated_results() {
    let (orch, _backend) = scripted_orchestrator(5, DELAY);
    let tasks = vec![
        Task::new("a", "ok"),
        Task::new("b", "fail"),
        Task::new("c", "ok"),
        Task::new("d", "ok"),
    ];

    orch.execute_parallel(&tasks).await.unwrap();
    let stats = orch.get_stats();

    assert_eq!(stats.total, 4);
    assert_eq!(stats.successful, 3);
    assert_eq!(stats.failed, 1);
    assert!((stats.success_rate - 0.75).abs() < 1e-9);
    assert!(stats.average_execution_time >= DELAY);
    assert!(orch.result("b").is_some_and(|r| !r.success));
}

#[tokio::test]
async fn test_event_stream_for_one_task() {
    let (orch, _backend) = scripted_orchestrator(5, DELAY);
    let mut rx = orch.subscribe();

    orch.execute_parallel(&[Task::new("A", "do it")]).await.unwrap();

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let OrchestratorEvent::BatchStarted { index, task_ids } = &event {
            assert_eq!(*index, 0);
            assert_eq!(task_ids, &vec!["A".to_string()]);
        }
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            "batch-started",
            "spawn",
            "started",
            "tool-call",
            "progress",
            "completed",
            "terminate",
        ]
    );
}

#[tokio::test]
async fn test_explicit_role_wins_over_inference() {
    let (orch, _backend) = scripted_orchestrator(5, DELAY);
    let task = Task::new("A", "write tests").with_role(Role::Performance);

    let results = orch.execute_parallel(&[task]).await.unwrap();

    assert_eq!(results[0].role, Role::Performance);
}

#[tokio::test]
async fn test_dropped_submission_still_cleans_up() {
    let (orch, _backend) = scripted_orchestrator(2, Duration::from_millis(100));
    let tasks = vec![Task::new("A", "first"), Task::new("B", "second")];

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), orch.execute_parallel(&tasks)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(orch.subagent_count(), 0);
    assert_eq!(orch.active_count(), 0);

    let results = orch
        .execute_parallel(&[Task::new("C", "after the drop")])
        .await
        .unwrap();
    assert!(results[0].success, "{:?}", results[0].error);
}
