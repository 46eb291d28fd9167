//! Model-reasoning execution: have the gateway write a tailored prompt,
//! submit it, and publish the structured answer.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::gateway::{protocol, ModelGateway};

use super::{publish_outputs, shape_of, ExecTask, PublishError};

enum AttemptError {
    /// Worth resubmitting: bad generation, unparsable answer, missing field.
    Retryable(String),
    /// Pointless to resubmit: a produce link is already set.
    Fatal(String),
}

/// Reasoning strategy. The whole generate-prompt / submit / parse cycle is
/// retried as a unit on malformed output.
pub struct ReasoningStrategy {
    gateway: Arc<ModelGateway>,
    max_retries: u32,
}

impl ReasoningStrategy {
    pub fn new(gateway: Arc<ModelGateway>, max_retries: u32) -> Self {
        Self {
            gateway,
            max_retries,
        }
    }

    pub async fn run(
        &self,
        task: &ExecTask,
        inputs: &Map<String, Value>,
    ) -> Result<String, String> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            match self.attempt(task, inputs).await {
                Ok(answer) => return Ok(answer),
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Retryable(error)) => {
                    tracing::warn!(
                        "reasoning attempt {}/{} for task {} failed: {}",
                        attempt,
                        self.max_retries,
                        task.task_id,
                        error
                    );
                    last_error = error;
                }
            }
        }
        Err(format!(
            "reasoning execution failed after {} attempts: {}",
            self.max_retries, last_error
        ))
    }

    async fn attempt(
        &self,
        task: &ExecTask,
        inputs: &Map<String, Value>,
    ) -> Result<String, AttemptError> {
        let request = format!(
            "Write a single prompt for a language model that will accomplish this task:\n\
             {description}\n\n\
             Available inputs (name: value):\n{inputs}\n\n\
             The model's answer must be exactly one JSON object with this shape:\n\
             {output_shape}\n\n\
             Output only the prompt.",
            description = task.task_description,
            inputs = Value::Object(inputs.clone()),
            output_shape = shape_of(&task.produces),
        );

        let prompt = self
            .gateway
            .complete(None, &request)
            .await
            .map_err(|e| AttemptError::Retryable(format!("prompt generation failed: {}", e)))?;

        let answer = self
            .gateway
            .complete(None, &prompt)
            .await
            .map_err(|e| AttemptError::Retryable(format!("reasoning call failed: {}", e)))?;

        let payload_text = protocol::extract_json(&answer)
            .ok_or_else(|| AttemptError::Retryable("answer carries no JSON payload".to_string()))?;
        let payload: Value = serde_json::from_str(&payload_text)
            .map_err(|e| AttemptError::Retryable(format!("answer is not valid JSON: {}", e)))?;

        match publish_outputs(&task.produces, &payload) {
            Ok(()) => Ok(answer),
            Err(e @ PublishError::MissingField(_)) => Err(AttemptError::Retryable(e.to_string())),
            Err(e @ PublishError::AlreadySet(_)) => Err(AttemptError::Fatal(e.to_string())),
        }
    }
}
