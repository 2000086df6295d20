// ABOUTME: Task dependency graph and the topological level schedule derived from it.
// ABOUTME: Tasks are grouped by dependency depth; each level runs concurrently, levels run in order.

use std::collections::{BTreeMap, BTreeSet};

use crate::definition::TaskDefinition;
use crate::loader::ConfigError;

/// The level schedule for a set of tasks. Level 0 holds tasks with no
/// dependencies; level N holds tasks whose dependencies all live in
/// levels below N. The classic "one design agent, then everyone else"
/// pipeline is the special case of a star graph: one task at level 0,
/// the rest at level 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskGraph {
    levels: Vec<Vec<String>>,
}

impl TaskGraph {
    /// Group tasks into topological levels. Fails with UnresolvedReference
    /// if a dependency names an unknown task, or DependencyCycle if no
    /// valid schedule exists.
    pub fn build(tasks: &BTreeMap<String, TaskDefinition>) -> Result<Self, ConfigError> {
        for task in tasks.values() {
            for dep in &task.depends_on {
                if !tasks.contains_key(dep) {
                    return Err(ConfigError::UnresolvedReference {
                        task: task.name.clone(),
                        kind: "task",
                        reference: dep.clone(),
                    });
                }
            }
        }

        let mut remaining: BTreeMap<&str, &TaskDefinition> =
            tasks.iter().map(|(name, task)| (name.as_str(), task)).collect();
        let mut placed: BTreeSet<String> = BTreeSet::new();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            // BTreeMap iteration keeps each level's task order deterministic.
            let ready: Vec<String> = remaining
                .values()
                .filter(|task| task.depends_on.iter().all(|dep| placed.contains(dep)))
                .map(|task| task.name.clone())
                .collect();

            if ready.is_empty() {
                let stuck: Vec<&str> = remaining.keys().copied().collect();
                return Err(ConfigError::DependencyCycle(stuck.join(", ")));
            }

            for name in &ready {
                remaining.remove(name.as_str());
                placed.insert(name.clone());
            }

            levels.push(ready);
        }

        Ok(Self { levels })
    }

    /// The schedule, outermost index = level.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Total number of scheduled tasks.
    pub fn task_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, depends_on: &[&str]) -> (String, TaskDefinition) {
        (
            name.to_string(),
            TaskDefinition {
                name: name.to_string(),
                description: format!("do {}", name),
                expected_output: "output".to_string(),
                agent: "someone".to_string(),
                depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
                output_file: None,
            },
        )
    }

    fn graph(specs: &[(&str, &[&str])]) -> Result<TaskGraph, ConfigError> {
        let tasks: BTreeMap<String, TaskDefinition> =
            specs.iter().map(|(name, deps)| task(name, deps)).collect();
        TaskGraph::build(&tasks)
    }

    #[test]
    fn star_graph_yields_two_levels() {
        let g = graph(&[
            ("design_task", &[]),
            ("code_task", &["design_task"]),
            ("frontend_task", &["design_task"]),
            ("test_task", &["design_task"]),
        ])
        .unwrap();

        assert_eq!(g.levels().len(), 2);
        assert_eq!(g.levels()[0], vec!["design_task"]);
        assert_eq!(
            g.levels()[1],
            vec!["code_task", "frontend_task", "test_task"]
        );
        assert_eq!(g.task_count(), 4);
    }

    #[test]
    fn chain_yields_one_task_per_level() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]).unwrap();
        assert_eq!(
            g.levels(),
            &[
                vec!["a".to_string()],
                vec!["b".to_string()],
                vec!["c".to_string()]
            ]
        );
    }

    #[test]
    fn independent_tasks_share_level_zero() {
        let g = graph(&[("a", &[]), ("b", &[]), ("c", &[])]).unwrap();
        assert_eq!(g.levels().len(), 1);
        assert_eq!(g.levels()[0], vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_places_join_after_both_branches() {
        let g = graph(&[
            ("root", &[]),
            ("left", &["root"]),
            ("right", &["root"]),
            ("join", &["left", "right"]),
        ])
        .unwrap();

        assert_eq!(g.levels().len(), 3);
        assert_eq!(g.levels()[1], vec!["left", "right"]);
        assert_eq!(g.levels()[2], vec!["join"]);
    }

    #[test]
    fn cycle_is_detected() {
        let err = graph(&[("a", &["b"]), ("b", &["a"])]).unwrap_err();
        match err {
            ConfigError::DependencyCycle(tasks) => {
                assert!(tasks.contains('a') && tasks.contains('b'));
            }
            other => panic!("expected DependencyCycle, got: {}", other),
        }
    }

    #[test]
    fn unknown_dependency_is_detected() {
        let err = graph(&[("a", &["ghost"])]).unwrap_err();
        assert!(
            matches!(err, ConfigError::UnresolvedReference { .. }),
            "expected UnresolvedReference, got: {}",
            err
        );
    }

    #[test]
    fn empty_task_set_yields_empty_schedule() {
        let g = graph(&[]).unwrap();
        assert!(g.levels().is_empty());
        assert_eq!(g.task_count(), 0);
    }
}
