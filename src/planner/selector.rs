//! Tool selection: decompose further, or execute - and with which backend.

use std::sync::Arc;

use crate::gateway::ModelGateway;
use crate::task::{TaskDraft, ToolChoice};

/// Asks the model to choose one of the four outcomes for a task.
///
/// The depth limit is stated declaratively in the instruction; the
/// orchestrator re-enforces it mechanically afterwards, so a model that
/// ignores the instruction still cannot grow the tree past `max_depth`.
pub struct ToolSelector {
    gateway: Arc<ModelGateway>,
    max_retries: u32,
}

impl ToolSelector {
    pub fn new(gateway: Arc<ModelGateway>, max_retries: u32) -> Self {
        Self {
            gateway,
            max_retries,
        }
    }

    /// Select a tool for `task` at `depth`.
    ///
    /// Any reply that does not parse to one of A/B/C/D consumes an attempt;
    /// `None` after the ceiling means the caller drops this branch.
    pub async fn select(
        &self,
        task: &TaskDraft,
        depth: usize,
        max_depth: usize,
    ) -> Option<ToolChoice> {
        let user = selection_prompt(task, depth, max_depth);

        for attempt in 1..=self.max_retries {
            match self.attempt(&user).await {
                Ok(choice) => {
                    tracing::debug!(
                        "task {} selected tool {} at depth {}",
                        task.task_id,
                        choice,
                        depth
                    );
                    return Some(choice);
                }
                Err(reason) => {
                    tracing::warn!(
                        "tool selection attempt {}/{} for task {} failed: {}",
                        attempt,
                        self.max_retries,
                        task.task_id,
                        reason
                    );
                }
            }
        }
        tracing::warn!(
            "tool selection for task {} failed after {} attempts, dropping branch",
            task.task_id,
            self.max_retries
        );
        None
    }

    async fn attempt(&self, user: &str) -> Result<ToolChoice, String> {
        let reply = self
            .gateway
            .request_action(None, user)
            .await
            .map_err(|e| e.to_string())?;
        let letter = normalize_letter(&reply.action);
        ToolChoice::from_letter(&letter)
            .ok_or_else(|| format!("invalid tool selection '{}'", reply.action.trim()))
    }
}

/// Strip decoration the model tends to wrap around the letter ("**A**",
/// "A)", "[B]").
fn normalize_letter(action: &str) -> String {
    action
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

fn selection_prompt(task: &TaskDraft, depth: usize, max_depth: usize) -> String {
    format!(
        r#"Given the task JSON:
{task_json}

Current depth: {depth}
Maximum depth: {max_depth}

**Part 1: Initial Assessment and Decomposition**

1. **Task Complexity & Depth Limit:**
   - Is this task inherently complex, requiring multiple steps or diverse information sources?
   - Is the current depth less than the maximum allowed depth ({max_depth})?
   - IF YES to both: Choose "D) Mix of Tools" and explain how to decompose.
     (Decomposition Strategy: Aim to isolate components best suited for computer use agents, LLM reasoning, and deterministic code.)
   - IF NO to either: Proceed to Part 2.

**Part 2: Tool Selection for Non-Decomposed (or Leaf) Tasks**

Select ONE of the following for the task as a whole:

   A) **Deterministic Code:** precise, rule-based operations - data transformation, file manipulation, calculations, well-defined API calls. Not suitable for nuanced language understanding or unpredictable environments.

   B) **LLM Search & Reasoning:** knowledge-intensive work - research, synthesis, summarization, creative generation, inference. Not suitable for precise calculation or interacting with applications.

   C) **Computer Use Agent:** interactive work - websites, forms, applications with visual interfaces, anything reachable only through interactive steps. Select this by default if the task is complex but the maximum depth has been reached.

Provide your reasoning for selecting the best approach. Then, output only the selected option letter.

Format your response as follows:
Reasoning: [Your reasoning here]
Action: [Selected option letter]

Only output the reasoning and selected option letter as described above."#,
        task_json = task.to_prompt_json(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_decorated_letters() {
        assert_eq!(normalize_letter(" A "), "A");
        assert_eq!(normalize_letter("**B**"), "B");
        assert_eq!(normalize_letter("[C]"), "C");
        assert_eq!(normalize_letter("D)"), "D");
        assert_eq!(normalize_letter("A and B"), "A and B");
    }
}
