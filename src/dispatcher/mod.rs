//! Action Dispatcher (spec.md §4.L): parses a structured tool plan from an
//! LLM, builds dependency-aware execution waves, runs each wave
//! concurrently through the existing tool registry, feeds results back as
//! `function`-role history, then asks the Gateway for the final reply.
//!
//! Grounded on `examples/original_source/gpt/parallel_tool_manager.py`
//! (`_analyze_dependencies`/`_get_execution_groups`'s maximal-ready-set
//! wave construction with priority-ordered forced execution on cycle
//! detection) and `examples/original_source/gpt/core/action_dispatcher.py`
//! (`_get_action_list`'s parse-failure fallback to `directly_answer`,
//! `format_tool_result`'s function-role conversion). Concurrent execution
//! generalizes `crate::agent::agent_loop::AgentLoop::execute_tools`'s
//! `tokio::spawn` + `join_all` pattern to one wave at a time, reusing
//! `crate::agent::tools::registry::ToolRegistry` as the uniform sync/async
//! executor.

mod plan;

pub use plan::{build_execution_groups, ToolPlanStep, DIRECTLY_ANSWER};

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::tools::base::ExecutionContext;
use crate::agent::tools::registry::ToolRegistry;
use crate::llm_gateway::{function_result_message, Gateway, GenerateRequest};
use crate::providers::base::Message;

const DEFAULT_HISTORY_WINDOW: usize = 10;
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

const PLANNER_SYSTEM_PROMPT: &str = "You decide which tools to call to answer the user. \
Respond with a JSON array of steps, each shaped as \
{\"tool_name\": string, \"parameters\": object, \"dependencies\": [string]?, \"priority\": integer?, \"timeout_secs\": integer?}. \
If no tool is needed, respond with a single step naming \"directly_answer\". Respond with JSON only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolExecutionStatus {
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    pub tool_name: String,
    pub status: ToolExecutionStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub execution_time: Duration,
}

pub struct ActionDispatcher {
    gateway: Arc<Gateway>,
    tools: Arc<ToolRegistry>,
    max_parallel_workers: usize,
}

impl ActionDispatcher {
    pub fn new(gateway: Arc<Gateway>, tools: Arc<ToolRegistry>, max_parallel_workers: usize) -> Self {
        Self {
            gateway,
            tools,
            max_parallel_workers: max_parallel_workers.max(1),
        }
    }

    /// Run the full dispatch cycle and return the final user-visible reply.
    pub async fn dispatch(
        &self,
        prompt: &str,
        history: &[Message],
        ctx: &ExecutionContext,
        planner_priority: Vec<(String, String)>,
        response_priority: Vec<(String, String)>,
    ) -> String {
        let plan = self.build_plan(prompt, history, planner_priority).await;

        if plan.len() == 1 && plan[0].tool_name == DIRECTLY_ANSWER {
            return self.generate_response(prompt, history, &[], response_priority).await;
        }

        let groups = build_execution_groups(&plan);
        let mut results = vec![None; plan.len()];
        for group in groups {
            let outcomes = execute_group(&self.tools, self.max_parallel_workers, &group, &plan, ctx).await;
            for (idx, outcome) in group.into_iter().zip(outcomes) {
                results[idx] = Some(outcome);
            }
        }

        let function_entries: Vec<(String, String)> = plan
            .iter()
            .zip(results)
            .filter(|(step, _)| step.tool_name != DIRECTLY_ANSWER)
            .map(|(step, outcome)| {
                let outcome = outcome.expect("every non-directly_answer step is assigned a result");
                (step.tool_name.clone(), render_result(&outcome))
            })
            .collect();

        self.generate_response(prompt, history, &function_entries, response_priority).await
    }

    async fn build_plan(
        &self,
        prompt: &str,
        history: &[Message],
        planner_priority: Vec<(String, String)>,
    ) -> Vec<ToolPlanStep> {
        let windowed: Vec<Message> = history
            .iter()
            .rev()
            .take(DEFAULT_HISTORY_WINDOW)
            .rev()
            .cloned()
            .collect();

        let mut request = GenerateRequest::new(prompt);
        request.system_prompt = Some(PLANNER_SYSTEM_PROMPT.to_string());
        request.history = windowed;

        match self.gateway.generate_structured::<Vec<ToolPlanStep>>(request, planner_priority).await {
            Ok(steps) if !steps.is_empty() => steps,
            Ok(_) => plan::directly_answer_plan(),
            Err(e) => {
                warn!(error = %e, "action dispatcher: plan parse failure, defaulting to directly_answer");
                plan::directly_answer_plan()
            }
        }
    }


    async fn generate_response(
        &self,
        prompt: &str,
        history: &[Message],
        function_entries: &[(String, String)],
        response_priority: Vec<(String, String)>,
    ) -> String {
        let mut combined_history = history.to_vec();
        for (name, content) in function_entries {
            combined_history.push(function_result_message(name, content, true));
        }

        let mut request = GenerateRequest::new(prompt);
        request.history = combined_history;

        let mut stream = self.gateway.generate_stream(request, response_priority).await;
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk);
        }
        output
    }
}

/// Run one execution wave concurrently, bounded by `max_parallel_workers`.
/// A standalone function (rather than a method) so it can be exercised
/// against a real `ToolRegistry` in tests without constructing a `Gateway`.
async fn execute_group(
    tools: &Arc<ToolRegistry>,
    max_parallel_workers: usize,
    group: &[usize],
    plan: &[ToolPlanStep],
    ctx: &ExecutionContext,
) -> Vec<ToolExecutionResult> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(max_parallel_workers));
    let handles: Vec<_> = group
        .iter()
        .map(|&idx| {
            let step = plan[idx].clone();
            let tools = tools.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                execute_one(&tools, &step, &ctx).await
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (handle, idx) in handles.into_iter().zip(group.iter().copied()) {
        let tool_name = plan[idx].tool_name.clone();
        let outcome = match handle.await {
            Ok(result) => result,
            Err(join_err) => ToolExecutionResult {
                tool_name: tool_name.clone(),
                status: if join_err.is_cancelled() {
                    ToolExecutionStatus::Cancelled
                } else {
                    ToolExecutionStatus::Failed
                },
                result: None,
                error: Some(join_err.to_string()),
                execution_time: Duration::ZERO,
            },
        };
        outcomes.push(outcome);
    }
    outcomes
}

async fn execute_one(tools: &ToolRegistry, step: &ToolPlanStep, ctx: &ExecutionContext) -> ToolExecutionResult {
    let started = Instant::now();
    let timeout = step.timeout().unwrap_or(DEFAULT_TOOL_TIMEOUT);

    let outcome = tokio::time::timeout(timeout, tools.execute(&step.tool_name, step.parameters.clone(), ctx)).await;
    let execution_time = started.elapsed();

    match outcome {
        Ok(Ok(result)) => ToolExecutionResult {
            tool_name: step.tool_name.clone(),
            status: if result.is_error {
                ToolExecutionStatus::Failed
            } else {
                ToolExecutionStatus::Completed
            },
            error: result.is_error.then(|| result.content.clone()),
            result: Some(result.content),
            execution_time,
        },
        Ok(Err(e)) => ToolExecutionResult {
            tool_name: step.tool_name.clone(),
            status: ToolExecutionStatus::Failed,
            result: None,
            error: Some(e.to_string()),
            execution_time,
        },
        Err(_) => ToolExecutionResult {
            tool_name: step.tool_name.clone(),
            status: ToolExecutionStatus::Timeout,
            result: None,
            error: Some(format!("tool '{}' timed out after {:?}", step.tool_name, timeout)),
            execution_time,
        },
    }
}

/// Serialize a tool outcome into the `function`-role content (spec.md §4.L
/// step 5). Binary/non-JSON artifacts are represented by a placeholder;
/// this dispatcher's tools already return plain text via `ToolResult`, so
/// there is no binary branch to special-case here.
fn render_result(outcome: &ToolExecutionResult) -> String {
    match outcome.status {
        ToolExecutionStatus::Completed => outcome.result.clone().unwrap_or_default(),
        _ => serde_json::json!({
            "status": outcome.status,
            "error": outcome.error,
        })
        .to_string(),
    }
}

#[cfg(test)]
mod tests;
