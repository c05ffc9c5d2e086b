//! Plan step type and dependency-wave construction.
//!
//! Grounded on `examples/original_source/gpt/parallel_tool_manager.py`:
//! `_analyze_dependencies` builds a name -> index map and resolves each
//! step's declared `dependencies` to indices; `_get_execution_groups`
//! repeatedly collects the maximal set of not-yet-run steps whose
//! dependencies are already satisfied ("ready set") as one concurrent
//! wave. If no step is ready (a dependency cycle, or a dependency on a
//! name that never appears in the plan) the remaining steps run as a
//! single forced wave, ordered by descending `priority`, so the plan
//! still makes progress instead of deadlocking.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved tool name meaning "no tool call needed, answer directly".
/// Never dispatched through the tool registry.
pub const DIRECTLY_ANSWER: &str = "directly_answer";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPlanStep {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ToolPlanStep {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

pub fn directly_answer_plan() -> Vec<ToolPlanStep> {
    vec![ToolPlanStep {
        tool_name: DIRECTLY_ANSWER.to_string(),
        parameters: Value::Null,
        dependencies: Vec::new(),
        priority: 0,
        timeout_secs: None,
    }]
}

/// Build concurrent execution waves over plan step indices. Each returned
/// `Vec<usize>` is one wave: all its steps are safe to run concurrently
/// because every step they depend on finished in an earlier wave.
pub fn build_execution_groups(plan: &[ToolPlanStep]) -> Vec<Vec<usize>> {
    if plan.is_empty() {
        return Vec::new();
    }

    let name_to_index: HashMap<&str, usize> = plan
        .iter()
        .enumerate()
        .map(|(idx, step)| (step.tool_name.as_str(), idx))
        .collect();

    // Resolve declared dependency names to indices. A name with no match
    // in the plan (typo, or a step name used twice) is simply not a
    // constraint: it can never block readiness.
    let deps: Vec<Vec<usize>> = plan
        .iter()
        .map(|step| {
            step.dependencies
                .iter()
                .filter_map(|dep_name| name_to_index.get(dep_name.as_str()).copied())
                .collect()
        })
        .collect();

    let mut done = vec![false; plan.len()];
    let mut groups = Vec::new();

    while done.iter().any(|&d| !d) {
        let ready: Vec<usize> = (0..plan.len())
            .filter(|&idx| !done[idx] && deps[idx].iter().all(|&dep| done[dep]))
            .collect();

        if ready.is_empty() {
            // Cycle or unsatisfiable dependency: force every remaining step
            // through in one wave, highest priority first, rather than loop
            // forever.
            let mut remaining: Vec<usize> = (0..plan.len()).filter(|&idx| !done[idx]).collect();
            remaining.sort_by_key(|&idx| std::cmp::Reverse(plan[idx].priority));
            for &idx in &remaining {
                done[idx] = true;
            }
            groups.push(remaining);
            break;
        }

        for &idx in &ready {
            done[idx] = true;
        }
        groups.push(ready);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, deps: &[&str], priority: i32) -> ToolPlanStep {
        ToolPlanStep {
            tool_name: name.to_string(),
            parameters: Value::Null,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            priority,
            timeout_secs: None,
        }
    }

    #[test]
    fn independent_steps_form_a_single_wave() {
        let plan = vec![step("internet_search", &[], 0), step("calculate", &[], 0)];
        let groups = build_execution_groups(&plan);
        assert_eq!(groups, vec![vec![0, 1]]);
    }

    #[test]
    fn dependent_step_waits_for_its_wave() {
        let plan = vec![step("fetch", &[], 0), step("summarize", &["fetch"], 0)];
        let groups = build_execution_groups(&plan);
        assert_eq!(groups, vec![vec![0], vec![1]]);
    }

    #[test]
    fn cycle_falls_back_to_priority_ordered_forced_wave() {
        let plan = vec![step("a", &["b"], 1), step("b", &["a"], 5)];
        let groups = build_execution_groups(&plan);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0], vec![1, 0], "higher priority step must be ordered first");
    }

    #[test]
    fn dependency_on_unknown_name_is_ignored() {
        let plan = vec![step("solo", &["nonexistent"], 0)];
        let groups = build_execution_groups(&plan);
        assert_eq!(groups, vec![vec![0]]);
    }

    #[test]
    fn empty_plan_yields_no_groups() {
        assert!(build_execution_groups(&[]).is_empty());
    }
}
