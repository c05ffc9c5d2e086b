use super::*;
use async_trait::async_trait;
use std::time::Duration as StdDuration;

use crate::agent::tools::base::{Tool, ToolResult};

struct EchoTool {
    name: String,
    delay: StdDuration,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, params: serde_json::Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
        if self.delay > StdDuration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ToolResult::new(format!("{}:{}", self.name, params)))
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing"
    }
    fn description(&self) -> &str {
        "always fails"
    }
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _params: serde_json::Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::error("boom"))
    }
}

fn test_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool {
        name: "internet_search".to_string(),
        delay: StdDuration::ZERO,
    }));
    registry.register(Arc::new(EchoTool {
        name: "calculate".to_string(),
        delay: StdDuration::ZERO,
    }));
    registry.register(Arc::new(FailingTool));
    Arc::new(registry)
}

fn test_ctx() -> ExecutionContext {
    ExecutionContext::default()
}

#[tokio::test]
async fn independent_tools_in_a_plan_execute_concurrently_and_succeed() {
    let tools = test_registry();
    let plan = vec![
        ToolPlanStep {
            tool_name: "internet_search".to_string(),
            parameters: serde_json::json!({"q": "rust"}),
            dependencies: Vec::new(),
            priority: 0,
            timeout_secs: None,
        },
        ToolPlanStep {
            tool_name: "calculate".to_string(),
            parameters: serde_json::json!({"expr": "1+1"}),
            dependencies: Vec::new(),
            priority: 0,
            timeout_secs: None,
        },
    ];

    let groups = build_execution_groups(&plan);
    assert_eq!(groups, vec![vec![0, 1]], "independent steps must land in a single wave");

    let outcomes = execute_group(&tools, 4, &groups[0], &plan, &test_ctx()).await;
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(outcome.status, ToolExecutionStatus::Completed);
        assert!(outcome.result.is_some());
    }
}

#[tokio::test]
async fn tool_error_surfaces_as_failed_status() {
    let tools = test_registry();
    let plan = vec![ToolPlanStep {
        tool_name: "failing".to_string(),
        parameters: serde_json::Value::Null,
        dependencies: Vec::new(),
        priority: 0,
        timeout_secs: None,
    }];

    let outcome = execute_one(&tools, &plan[0], &test_ctx()).await;
    assert_eq!(outcome.status, ToolExecutionStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn slow_tool_times_out_per_step_override() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool {
        name: "slow".to_string(),
        delay: StdDuration::from_millis(200),
    }));
    let tools = Arc::new(registry);

    let step = ToolPlanStep {
        tool_name: "slow".to_string(),
        parameters: serde_json::Value::Null,
        dependencies: Vec::new(),
        priority: 0,
        timeout_secs: Some(0),
    };
    // timeout_secs: Some(0) rounds to a zero duration, which must elapse
    // before the 200ms sleep completes.
    let outcome = execute_one(&tools, &step, &test_ctx()).await;
    assert_eq!(outcome.status, ToolExecutionStatus::Timeout);
}

#[test]
fn directly_answer_plan_is_a_single_reserved_step() {
    let plan = plan::directly_answer_plan();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].tool_name, DIRECTLY_ANSWER);
}

#[test]
fn render_result_embeds_status_for_non_completed_outcomes() {
    let outcome = ToolExecutionResult {
        tool_name: "calculate".to_string(),
        status: ToolExecutionStatus::Timeout,
        result: None,
        error: Some("timed out".to_string()),
        execution_time: Duration::from_millis(5),
    };
    let rendered = render_result(&outcome);
    assert!(rendered.contains("timeout"));
    assert!(rendered.contains("timed out"));
}

#[test]
fn render_result_returns_raw_content_for_completed_outcomes() {
    let outcome = ToolExecutionResult {
        tool_name: "calculate".to_string(),
        status: ToolExecutionStatus::Completed,
        result: Some("4".to_string()),
        error: None,
        execution_time: Duration::from_millis(5),
    };
    assert_eq!(render_result(&outcome), "4");
}
