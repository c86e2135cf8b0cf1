//! Dependency validation and batch layering through the public API.

use std::collections::{HashMap, HashSet};

use crew::core::{check_dependencies, resolve_dependencies, validate_dependencies, Task};
use crew::Error;

use crate::fixtures::{fan_out_tasks, two_cycle};

/// Every task is placed exactly once, strictly after all of its dependencies.
fn assert_valid_layering(tasks: &[Task], batches: &[Vec<String>]) {
    let placed: Vec<&String> = batches.iter().flatten().collect();
    let unique: HashSet<&String> = placed.iter().copied().collect();
    assert_eq!(placed.len(), unique.len(), "no task may appear twice");
    let expected: HashSet<&String> = tasks.iter().map(|t| &t.id).collect();
    assert_eq!(unique, expected, "every task must be placed");

    let batch_of: HashMap<&str, usize> = batches
        .iter()
        .enumerate()
        .flat_map(|(i, batch)| batch.iter().map(move |id| (id.as_str(), i)))
        .collect();
    for task in tasks {
        for dep in &task.dependencies {
            assert!(
                batch_of[dep.as_str()] < batch_of[task.id.as_str()],
                "{} must run after {}",
                task.id,
                dep
            );
        }
    }
}

/// Deterministic pseudo-random DAG: edges only point from lower to higher index.
fn layered_dag(size: usize, seed: u64) -> Vec<Task> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        state >> 33
    };
    (0..size)
        .map(|i| {
            let deps: Vec<String> = (0..i)
                .filter(|_| next() % 4 == 0)
                .map(|j| format!("t{j}"))
                .collect();
            Task::new(format!("t{i}"), format!("step {i}")).depends_on(deps)
        })
        .collect()
}

#[test]
fn test_fan_out_resolves_to_two_batches() {
    let tasks = fan_out_tasks();
    assert!(validate_dependencies(&tasks));
    assert_eq!(
        resolve_dependencies(&tasks),
        vec![vec!["A".to_string()], vec!["B".to_string(), "C".to_string()]]
    );
}

#[test]
fn test_random_dags_layer_correctly() {
    for seed in 1..=25 {
        let tasks = layered_dag(30, seed);
        assert!(validate_dependencies(&tasks), "seed {seed}");
        let batches = resolve_dependencies(&tasks);
        assert_valid_layering(&tasks, &batches);
    }
}

#[test]
fn test_reversed_input_still_layers_correctly() {
    let mut tasks = layered_dag(20, 7);
    tasks.reverse();
    let batches = resolve_dependencies(&tasks);
    assert_valid_layering(&tasks, &batches);
}

#[test]
fn test_batch_keeps_input_order() {
    let tasks = vec![
        Task::new("z", "z"),
        Task::new("m", "m"),
        Task::new("a", "a"),
    ];
    assert_eq!(
        resolve_dependencies(&tasks),
        vec![vec!["z".to_string(), "m".to_string(), "a".to_string()]]
    );
}

#[test]
fn test_two_cycle_is_invalid() {
    let tasks = two_cycle();
    assert!(!validate_dependencies(&tasks));
    match check_dependencies(&tasks) {
        Err(Error::CircularDependency { path }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"A".to_string()));
            assert!(path.contains(&"B".to_string()));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn test_missing_reference_is_invalid() {
    let tasks = vec![Task::new("A", "a"), Task::new("B", "b").depends_on(["Z"])];
    assert!(!validate_dependencies(&tasks));
    assert!(matches!(
        check_dependencies(&tasks),
        Err(Error::UnknownTaskReference { ref task_id, ref reference })
            if task_id == "B" && reference == "Z"
    ));
}

#[test]
fn test_empty_submission_is_valid() {
    assert!(validate_dependencies(&[]));
    assert!(resolve_dependencies(&[]).is_empty());
}
