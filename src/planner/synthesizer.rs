//! Prompt-to-task synthesis.

use std::sync::Arc;

use crate::gateway::{protocol, ModelGateway};
use crate::task::{parse_task_draft, TaskDraft};

use super::TASK_SHAPE;

const SYSTEM: &str =
    "You are an AI assistant specialized in creating clear, concise JSON objects following a schema.";

/// Turns a free-text prompt (plus optional parent context) into one
/// validated [`TaskDraft`] via the gateway.
pub struct TaskSynthesizer {
    gateway: Arc<ModelGateway>,
    max_retries: u32,
}

impl TaskSynthesizer {
    pub fn new(gateway: Arc<ModelGateway>, max_retries: u32) -> Self {
        Self {
            gateway,
            max_retries,
        }
    }

    /// Synthesize a task draft from `prompt`.
    ///
    /// Resubmits the same request on any protocol failure (missing action,
    /// unextractable or invalid JSON, failed validation) up to the attempt
    /// ceiling. `None` means the caller should drop this branch; it is never
    /// fatal to the rest of the tree.
    pub async fn synthesize(&self, prompt: &str, parent_context: &str) -> Option<TaskDraft> {
        let user = format!(
            "Convert the following prompt into a task: {prompt}\n\n\
             Following the JSON shape:\n{TASK_SHAPE}\n\n\
             Parent context: {parent_context}\n\n\
             First, provide your reasoning for how you'll approach this task conversion. \
             Then, output the JSON representation of the task. Set subtasks to [] (empty list).\n\n\
             Format your response as follows:\n\
             Reasoning: [Your reasoning here]\n\
             Action: [JSON representation of the task]\n\n\
             Only output the reasoning and JSON representation of the task as described above."
        );

        for attempt in 1..=self.max_retries {
            match self.attempt(&user).await {
                Ok(draft) => return Some(draft),
                Err(reason) => {
                    tracing::warn!(
                        "task synthesis attempt {}/{} failed: {}",
                        attempt,
                        self.max_retries,
                        reason
                    );
                }
            }
        }
        tracing::warn!(
            "task synthesis failed after {} attempts, dropping branch",
            self.max_retries
        );
        None
    }

    async fn attempt(&self, user: &str) -> Result<TaskDraft, String> {
        let reply = self
            .gateway
            .request_action(Some(SYSTEM), user)
            .await
            .map_err(|e| e.to_string())?;
        let payload =
            protocol::extract_json(&reply.action).ok_or("action carries no JSON payload")?;
        parse_task_draft(&payload).map_err(|e| e.to_string())
    }
}
