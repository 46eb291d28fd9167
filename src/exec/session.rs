//! Interactive computer-use execution.
//!
//! A leaf task on this strategy drives a stateful remote session through an
//! explicit state machine:
//!
//! ```text
//! Initializing -> Ready -> Processing -> WaitingForInput -+-> Terminated
//!        \                     ^              |           |
//!         \                    +--------------+           |
//!          +-> Error <------------------------------------+
//! ```
//!
//! Each turn submits the pending input together with a bounded window of the
//! conversation so far. When a turn contains a JSON payload matching the
//! task's output shape, it is published and the session ends; otherwise an
//! input policy supplies the next message. The session is torn down on every
//! exit path.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::gateway::protocol;

use super::{publish_outputs, shape_of, ExecTask, PublishError};

/// States of the session driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready,
    Processing,
    WaitingForInput,
    Error,
    Terminated,
}

/// How the first submission's content is sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// The task prompt alone.
    Text,
    /// Prefix the prompt with a local file's content.
    File,
    /// Prefix the prompt with a starting URL.
    Url,
}

/// One live remote session.
#[async_trait]
pub trait AgentSession: Send {
    /// Submit input and return the agent's turn.
    async fn submit(&mut self, prompt: &str) -> anyhow::Result<String>;

    /// Tear the session down. Idempotent, best-effort.
    async fn terminate(&mut self);
}

/// Opens remote sessions.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn open(&self, mode: InputMode) -> anyhow::Result<Box<dyn AgentSession>>;
}

/// Supplies the next input when a turn carried no structured result.
///
/// `None` abandons the session. Implementations may be automated or bridge
/// to a human operator.
#[async_trait]
pub trait InputPolicy: Send + Sync {
    async fn next_input(&self, last_turn: &str) -> Option<String>;
}

/// Default automated policy: nudge the agent back toward the output format.
pub struct NudgePolicy;

#[async_trait]
impl InputPolicy for NudgePolicy {
    async fn next_input(&self, _last_turn: &str) -> Option<String> {
        Some(
            "That reply did not include the result. Reply with exactly one JSON object \
             matching the requested shape and nothing else."
                .to_string(),
        )
    }
}

/// Bounded window over the most recent interaction turns.
pub struct ConversationWindow {
    turns: VecDeque<(String, String)>,
    cap: usize,
}

impl ConversationWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            cap,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Record one request/response pair, evicting the oldest beyond the cap.
    pub fn push(&mut self, request: String, response: String) {
        self.turns.push_back((request, response));
        while self.turns.len() > self.cap {
            self.turns.pop_front();
        }
    }

    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|(request, response)| format!("Request: {}\nAgent: {}", request, response))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Computer-use strategy: opens a session and drives the state machine.
pub struct SessionStrategy {
    backend: Arc<dyn SessionBackend>,
    policy: Arc<dyn InputPolicy>,
    max_turns: usize,
    history_window: usize,
    input_mode: InputMode,
    input_source: Option<PathBuf>,
}

impl SessionStrategy {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        policy: Arc<dyn InputPolicy>,
        max_turns: usize,
        history_window: usize,
    ) -> Self {
        Self {
            backend,
            policy,
            max_turns,
            history_window,
            input_mode: InputMode::Text,
            input_source: None,
        }
    }

    /// Use file or URL input sourcing for the first submission.
    pub fn with_input(mut self, mode: InputMode, source: Option<PathBuf>) -> Self {
        self.input_mode = mode;
        self.input_source = source;
        self
    }

    pub async fn run(
        &self,
        task: &ExecTask,
        inputs: &Map<String, Value>,
    ) -> Result<String, String> {
        let mut state = SessionState::Initializing;
        tracing::debug!(
            "computer-use session for task {}: {:?}",
            task.task_id,
            state
        );

        let mut session = match self.backend.open(self.input_mode).await {
            Ok(session) => {
                state = SessionState::Ready;
                session
            }
            Err(e) => {
                return Err(format!("session initialization failed: {}", e));
            }
        };

        let outcome = self
            .drive(session.as_mut(), &mut state, task, inputs)
            .await;

        // Teardown runs on every exit path, success or not.
        session.terminate().await;
        if outcome.is_ok() {
            debug_assert_eq!(state, SessionState::Terminated);
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn AgentSession,
        state: &mut SessionState,
        task: &ExecTask,
        inputs: &Map<String, Value>,
    ) -> Result<String, String> {
        let mut window = ConversationWindow::new(self.history_window);
        let mut pending = self.initial_prompt(task, inputs).await?;

        for _ in 0..self.max_turns {
            match *state {
                SessionState::Ready | SessionState::WaitingForInput => {
                    *state = SessionState::Processing;
                    let submission = if window.is_empty() {
                        pending.clone()
                    } else {
                        format!("{}\n\nCurrent request: {}", window.render(), pending)
                    };

                    let turn = match session.submit(&submission).await {
                        Ok(turn) => turn,
                        Err(e) => {
                            *state = SessionState::Error;
                            return Err(format!("session error: {}", e));
                        }
                    };
                    window.push(std::mem::take(&mut pending), turn.clone());
                    *state = SessionState::WaitingForInput;

                    // A structured payload in the latest turn ends the session.
                    if let Some(payload) = extract_payload(&turn) {
                        match publish_outputs(&task.produces, &payload) {
                            Ok(()) => {
                                *state = SessionState::Terminated;
                                return Ok(turn);
                            }
                            Err(PublishError::AlreadySet(e)) => {
                                *state = SessionState::Error;
                                return Err(e.to_string());
                            }
                            Err(PublishError::MissingField(field)) => {
                                tracing::debug!(
                                    "session turn for task {} lacked field '{}', soliciting more input",
                                    task.task_id,
                                    field
                                );
                            }
                        }
                    }

                    match self.policy.next_input(&turn).await {
                        Some(next) => pending = next,
                        None => break,
                    }
                }
                _ => break,
            }
        }

        Err("session ended without a structured result".to_string())
    }

    async fn initial_prompt(
        &self,
        task: &ExecTask,
        inputs: &Map<String, Value>,
    ) -> Result<String, String> {
        let base = format!(
            "Complete this task using the computer:\n{description}\n\n\
             Inputs (name: value):\n{inputs}\n\n\
             When the task is done, reply with exactly one JSON object with this shape \
             and nothing else:\n{output_shape}",
            description = task.task_description,
            inputs = Value::Object(inputs.clone()),
            output_shape = shape_of(&task.produces),
        );

        match (self.input_mode, &self.input_source) {
            (InputMode::File, Some(path)) => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| format!("failed to read input file {}: {}", path.display(), e))?;
                Ok(format!(
                    "Content from file {}:\n\n{}\n\n{}",
                    path.display(),
                    content,
                    base
                ))
            }
            (InputMode::Url, Some(url)) => {
                Ok(format!("Start from this URL: {}\n\n{}", url.display(), base))
            }
            _ => Ok(base),
        }
    }
}

fn extract_payload(turn: &str) -> Option<Value> {
    let text = protocol::extract_json(turn)?;
    serde_json::from_str(&text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{DataSource, Link, ToolChoice};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct FakeSession {
        turns: Mutex<VecDeque<anyhow::Result<String>>>,
        terminated: Arc<AtomicBool>,
        submissions: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl AgentSession for FakeSession {
        async fn submit(&mut self, prompt: &str) -> anyhow::Result<String> {
            self.submissions.lock().unwrap().push(prompt.to_string());
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("nothing more to say".to_string()))
        }

        async fn terminate(&mut self) {
            self.terminated.store(true, Ordering::SeqCst);
        }
    }

    struct FakeBackend {
        turns: Mutex<Option<VecDeque<anyhow::Result<String>>>>,
        terminated: Arc<AtomicBool>,
        submissions: Arc<Mutex<Vec<String>>>,
    }

    impl FakeBackend {
        fn new(turns: Vec<anyhow::Result<String>>) -> Self {
            Self {
                turns: Mutex::new(Some(turns.into_iter().collect())),
                terminated: Arc::new(AtomicBool::new(false)),
                submissions: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl SessionBackend for FakeBackend {
        async fn open(&self, _mode: InputMode) -> anyhow::Result<Box<dyn AgentSession>> {
            let turns = self
                .turns
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("backend exhausted"))?;
            Ok(Box::new(FakeSession {
                turns: Mutex::new(turns),
                terminated: Arc::clone(&self.terminated),
                submissions: Arc::clone(&self.submissions),
            }))
        }
    }

    fn exec_task(produces: Vec<Arc<Link>>) -> ExecTask {
        ExecTask {
            task_id: "t1".to_string(),
            task_name: "browse".to_string(),
            task_description: "find the number".to_string(),
            tool: ToolChoice::ComputerUse,
            ingests: Vec::new(),
            produces,
        }
    }

    fn strategy(backend: Arc<FakeBackend>) -> SessionStrategy {
        SessionStrategy::new(backend, Arc::new(NudgePolicy), 4, 2)
    }

    #[tokio::test]
    async fn structured_result_ends_the_session() {
        let link = Arc::new(Link::new("l1", "total", "", "number", DataSource::Text));
        let backend = Arc::new(FakeBackend::new(vec![
            Ok("still looking around".to_string()),
            Ok("found it: {\"total\": 42}".to_string()),
        ]));
        let result = strategy(Arc::clone(&backend))
            .run(&exec_task(vec![Arc::clone(&link)]), &Map::new())
            .await
            .unwrap();
        assert!(result.contains("42"));
        assert_eq!(link.value(), Some(json!(42)));
        assert!(backend.terminated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn session_error_tears_down() {
        let backend = Arc::new(FakeBackend::new(vec![Err(anyhow::anyhow!("lost the VM"))]));
        let err = strategy(Arc::clone(&backend))
            .run(&exec_task(Vec::new()), &Map::new())
            .await
            .unwrap_err();
        assert!(err.contains("lost the VM"));
        assert!(backend.terminated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn turn_limit_ends_without_result() {
        let link = Arc::new(Link::new("l1", "total", "", "number", DataSource::Text));
        let backend = Arc::new(FakeBackend::new(vec![
            Ok("no json here".to_string()),
            Ok("nor here".to_string()),
            Ok("still nothing".to_string()),
            Ok("sorry".to_string()),
        ]));
        let err = strategy(Arc::clone(&backend))
            .run(&exec_task(vec![link]), &Map::new())
            .await
            .unwrap_err();
        assert!(err.contains("without a structured result"));
        assert!(backend.terminated.load(Ordering::SeqCst));
        // Later submissions carry bounded history, not the whole transcript.
        let submissions = backend.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 4);
        let last = submissions.last().unwrap();
        assert!(last.contains("Current request:"));
        assert!(!last.contains("find the number"), "oldest turn should be evicted");
    }

    #[test]
    fn window_evicts_oldest() {
        let mut window = ConversationWindow::new(2);
        window.push("a".into(), "1".into());
        window.push("b".into(), "2".into());
        window.push("c".into(), "3".into());
        assert_eq!(window.len(), 2);
        let rendered = window.render();
        assert!(!rendered.contains("Request: a"));
        assert!(rendered.contains("Request: b"));
        assert!(rendered.contains("Agent: 3"));
    }
}
