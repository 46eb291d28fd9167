//! Decomposition of one task into child drafts.

use std::sync::Arc;

use crate::config::SubtaskOverflow;
use crate::gateway::{protocol, ModelGateway};
use crate::task::{parse_subtask_list, TaskDraft};

use super::TASK_SHAPE;

const SYSTEM: &str = "You are an AI assistant specialized in task decomposition.";

/// Asks the model for an ordered, bounded list of child task drafts.
pub struct Decomposer {
    gateway: Arc<ModelGateway>,
    max_retries: u32,
    max_subtasks: usize,
    overflow: SubtaskOverflow,
}

impl Decomposer {
    pub fn new(
        gateway: Arc<ModelGateway>,
        max_retries: u32,
        max_subtasks: usize,
        overflow: SubtaskOverflow,
    ) -> Self {
        Self {
            gateway,
            max_retries,
            max_subtasks,
            overflow,
        }
    }

    /// Decompose `task` into up to `max_subtasks` validated child drafts.
    ///
    /// A list longer than the maximum is handled per the configured overflow
    /// policy: `Retry` counts it as a failed attempt (surfacing model
    /// misbehavior), `Truncate` keeps the leading entries. `None` after the
    /// ceiling leaves the task as a degraded childless leaf.
    pub async fn decompose(
        &self,
        task: &TaskDraft,
        parent_context: &str,
    ) -> Option<Vec<TaskDraft>> {
        let user = format!(
            "Given the task JSON:\n{task_json}\n\
             Return a list of independent subtasks (maximum {max}). \
             Avoid overly detailed steps; keep instructions general but actionable. \
             Each subtask should be JSON formatted as follows:\n{TASK_SHAPE}\n\n\
             Parent context: {parent_context}\n\n\
             Name links consistently: when one subtask needs a value another subtask produces, \
             use the same link_id and link_name in both.\n\n\
             First, provide your reasoning for how you'll approach breaking down this task. \
             Then, output the list of subtasks in JSON format. \
             Each subtask JSON should have 'subtasks' set to [] (empty list).\n\n\
             Format your response as follows:\n\
             Reasoning: [Your reasoning here]\n\
             Action: [JSON list of up to {max} subtasks]\n\n\
             Only output the reasoning and JSON list of subtasks as described above.",
            task_json = task.to_prompt_json(),
            max = self.max_subtasks,
        );

        for attempt in 1..=self.max_retries {
            match self.attempt(&user).await {
                Ok(drafts) => return Some(drafts),
                Err(reason) => {
                    tracing::warn!(
                        "decomposition attempt {}/{} for task {} failed: {}",
                        attempt,
                        self.max_retries,
                        task.task_id,
                        reason
                    );
                }
            }
        }
        tracing::warn!(
            "decomposition of task {} failed after {} attempts, leaving it a leaf",
            task.task_id,
            self.max_retries
        );
        None
    }

    async fn attempt(&self, user: &str) -> Result<Vec<TaskDraft>, String> {
        let reply = self
            .gateway
            .request_action(Some(SYSTEM), user)
            .await
            .map_err(|e| e.to_string())?;
        let payload =
            protocol::extract_json(&reply.action).ok_or("action carries no JSON payload")?;
        let mut drafts = parse_subtask_list(&payload).map_err(|e| e.to_string())?;

        if drafts.len() > self.max_subtasks {
            match self.overflow {
                SubtaskOverflow::Retry => {
                    return Err(format!(
                        "more than {} subtasks generated ({})",
                        self.max_subtasks,
                        drafts.len()
                    ));
                }
                SubtaskOverflow::Truncate => {
                    tracing::warn!(
                        "truncating decomposition from {} to {} subtasks",
                        drafts.len(),
                        self.max_subtasks
                    );
                    drafts.truncate(self.max_subtasks);
                }
            }
        }
        Ok(drafts)
    }
}
