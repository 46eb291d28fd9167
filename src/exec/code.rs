//! Deterministic-code execution: generate a Python snippet, run it in an
//! isolated subprocess under a hard wall-clock timeout, and publish its
//! single JSON output onto the produce links.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::gateway::{protocol, ModelGateway};

use super::{publish_outputs, shape_of, ExecTask};

/// Generated-code strategy.
///
/// The generated snippet's contract: a dict named `inputs` is in scope, and
/// the snippet prints exactly one JSON object - the declared output shape -
/// to stdout, nothing else.
pub struct CodeStrategy {
    gateway: Arc<ModelGateway>,
    python_bin: String,
    timeout: Duration,
}

impl CodeStrategy {
    pub fn new(gateway: Arc<ModelGateway>, python_bin: String, timeout: Duration) -> Self {
        Self {
            gateway,
            python_bin,
            timeout,
        }
    }

    pub async fn run(
        &self,
        task: &ExecTask,
        inputs: &Map<String, Value>,
    ) -> Result<String, String> {
        let request = format!(
            "Write a self-contained Python snippet that performs this task:\n{description}\n\n\
             A dict named `inputs` is already defined with this shape:\n{input_shape}\n\n\
             The snippet must print exactly one JSON object (via json.dumps) to stdout \
             with this shape, and nothing else:\n{output_shape}\n\n\
             Do not prompt for input. Output only the code.",
            description = task.task_description,
            input_shape = shape_of(&task.ingests),
            output_shape = shape_of(&task.produces),
        );

        let completion = self
            .gateway
            .complete(None, &request)
            .await
            .map_err(|e| format!("code generation failed: {}", e))?;
        let snippet = protocol::extract_code(&completion);
        if snippet.is_empty() {
            return Err("code generation returned an empty snippet".to_string());
        }

        let stdout = self.execute_snippet(&snippet, inputs).await?;

        let payload_text = protocol::extract_json(&stdout)
            .ok_or_else(|| format!("generated code printed no JSON object: {}", stdout.trim()))?;
        let payload: Value = serde_json::from_str(&payload_text)
            .map_err(|e| format!("generated code output is not valid JSON: {}", e))?;
        publish_outputs(&task.produces, &payload).map_err(|e| e.to_string())?;

        Ok(stdout.trim().to_string())
    }

    /// Run the snippet in a subprocess, inputs serialized over stdin.
    ///
    /// The child is not part of the trusted supervision tree: on timeout the
    /// wait future is dropped and `kill_on_drop` reaps it.
    async fn execute_snippet(
        &self,
        snippet: &str,
        inputs: &Map<String, Value>,
    ) -> Result<String, String> {
        let program = format!("import sys, json\ninputs = json.load(sys.stdin)\n{}", snippet);

        let mut child = Command::new(&self.python_bin)
            .arg("-c")
            .arg(&program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", self.python_bin, e))?;

        let payload = serde_json::to_vec(&Value::Object(inputs.clone()))
            .map_err(|e| format!("failed to serialize inputs: {}", e))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| format!("failed to write inputs: {}", e))?;
        }

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("code execution error: {}", e)),
            Err(_) => {
                return Err(format!(
                    "code execution timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
        };

        if !output.status.success() {
            return Err(format!(
                "generated code exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok()
    }

    fn strategy(secs: u64) -> CodeStrategy {
        // The gateway is unused by execute_snippet; a dead client keeps the
        // constructor honest.
        struct NoLlm;
        #[async_trait::async_trait]
        impl crate::llm::LlmClient for NoLlm {
            async fn chat_completion(
                &self,
                _model: &str,
                _messages: &[crate::llm::ChatMessage],
                _options: crate::llm::ChatOptions,
            ) -> anyhow::Result<crate::llm::ChatResponse> {
                anyhow::bail!("not used")
            }
        }
        CodeStrategy::new(
            Arc::new(ModelGateway::new(Arc::new(NoLlm), "test")),
            "python3".to_string(),
            Duration::from_secs(secs),
        )
    }

    #[tokio::test]
    async fn snippet_sees_inputs_and_prints_json() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let mut inputs = Map::new();
        inputs.insert("x".to_string(), serde_json::json!(40));
        let stdout = strategy(10)
            .execute_snippet("print(json.dumps({\"result\": inputs[\"x\"] + 2}))", &inputs)
            .await
            .unwrap();
        assert_eq!(stdout.trim(), "{\"result\": 42}");
    }

    #[tokio::test]
    async fn hung_snippet_is_killed_on_timeout() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let err = strategy(1)
            .execute_snippet("import time\ntime.sleep(30)", &Map::new())
            .await
            .unwrap_err();
        assert!(err.contains("timed out"), "got: {}", err);
    }

    #[tokio::test]
    async fn failing_snippet_reports_stderr() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let err = strategy(10)
            .execute_snippet("raise ValueError('boom')", &Map::new())
            .await
            .unwrap_err();
        assert!(err.contains("boom"), "got: {}", err);
    }
}
