//! Leaf task execution.
//!
//! The executor resolves a task's ingests (suspending until every upstream
//! producer has published), then dispatches on the selected tool. Failures
//! of any kind come back as error-string results - one failing leaf never
//! unwinds the rest of the tree.

mod code;
mod reasoning;
mod remote;
mod session;

pub use code::CodeStrategy;
pub use reasoning::ReasoningStrategy;
pub use remote::RemoteSessionBackend;
pub use session::{
    AgentSession, ConversationWindow, InputMode, InputPolicy, NudgePolicy, SessionBackend,
    SessionState, SessionStrategy,
};

use std::sync::Arc;

use futures::future;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::Config;
use crate::gateway::ModelGateway;
use crate::task::{AlreadySetError, Link, ToolChoice};

/// Everything the executor needs about one leaf task, detached from the
/// arena so execution can be spawned.
#[derive(Debug, Clone)]
pub struct ExecTask {
    pub task_id: String,
    pub task_name: String,
    pub task_description: String,
    pub tool: ToolChoice,
    pub ingests: Vec<Arc<Link>>,
    pub produces: Vec<Arc<Link>>,
}

/// Dispatches leaf tasks to the configured strategies.
pub struct Executor {
    code: CodeStrategy,
    reasoning: ReasoningStrategy,
    session: SessionStrategy,
}

impl Executor {
    /// Build an executor from config, with the remote computer-use backend
    /// and the automated input policy.
    pub fn new(gateway: Arc<ModelGateway>, config: &Config) -> Self {
        let backend = Arc::new(RemoteSessionBackend::new(
            config.session_endpoint.clone(),
            config.session_api_key.clone(),
        ));
        Self::with_session_backend(gateway, config, backend, Arc::new(NudgePolicy))
    }

    /// Build an executor with a custom session backend and input policy
    /// (tests, operator-driven sessions).
    pub fn with_session_backend(
        gateway: Arc<ModelGateway>,
        config: &Config,
        backend: Arc<dyn SessionBackend>,
        policy: Arc<dyn InputPolicy>,
    ) -> Self {
        Self {
            code: CodeStrategy::new(
                Arc::clone(&gateway),
                config.python_bin.clone(),
                config.code_timeout,
            ),
            reasoning: ReasoningStrategy::new(gateway, config.max_retries),
            session: SessionStrategy::new(
                backend,
                policy,
                config.session_max_turns,
                config.session_history_window,
            ),
        }
    }

    /// Execute a leaf task and return its result.
    ///
    /// Suspends until every ingest is ready, then runs the selected
    /// strategy. Errors are returned as the result string, never raised.
    pub async fn execute(&self, task: ExecTask) -> String {
        tracing::info!(
            "executing task {} ({}) with tool {}",
            task.task_id,
            task.task_name,
            task.tool
        );
        let inputs = resolve_ingests(&task.ingests).await;

        let outcome = match task.tool {
            ToolChoice::Code => self.code.run(&task, &inputs).await,
            ToolChoice::Reasoning => self.reasoning.run(&task, &inputs).await,
            ToolChoice::ComputerUse => self.session.run(&task, &inputs).await,
            // The orchestrator never hands a decompose-tagged task over;
            // covered so the dispatch stays exhaustive.
            ToolChoice::Decompose => Err("decompose is not an executable tool".to_string()),
        };

        match outcome {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!("task {} failed: {}", task.task_id, error);
                error
            }
        }
    }
}

/// Await every ingest and collect values keyed by link name.
///
/// This is the synchronization point that makes the tree a dataflow graph:
/// execution cannot begin until all upstream producers have published.
async fn resolve_ingests(links: &[Arc<Link>]) -> Map<String, Value> {
    let values = future::join_all(links.iter().map(|link| link.await_ready())).await;
    links
        .iter()
        .zip(values)
        .map(|(link, value)| (link.link_name().to_string(), value))
        .collect()
}

/// `{link_name: data_type}` shape of a link list, for prompts.
fn shape_of(links: &[Arc<Link>]) -> Value {
    Value::Object(
        links
            .iter()
            .map(|link| {
                (
                    link.link_name().to_string(),
                    Value::String(link.data_type().to_string()),
                )
            })
            .collect(),
    )
}

#[derive(Debug, Error)]
enum PublishError {
    #[error("output payload is missing field '{0}'")]
    MissingField(String),

    #[error(transparent)]
    AlreadySet(#[from] AlreadySetError),
}

/// Distribute a result payload onto the produce links, by link name.
///
/// All fields are checked before any value is set, so a partially-matching
/// payload publishes nothing and can be retried safely.
fn publish_outputs(produces: &[Arc<Link>], payload: &Value) -> Result<(), PublishError> {
    for link in produces {
        if payload.get(link.link_name()).is_none() {
            return Err(PublishError::MissingField(link.link_name().to_string()));
        }
    }
    for link in produces {
        if let Some(value) = payload.get(link.link_name()) {
            link.set_value(value.clone())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::DataSource;
    use serde_json::json;

    fn link(id: &str, name: &str) -> Arc<Link> {
        Arc::new(Link::new(id, name, "", "number", DataSource::Text))
    }

    #[tokio::test]
    async fn resolves_ready_ingests_by_name() {
        let a = link("l1", "a");
        let b = link("l2", "b");
        a.set_value(json!(1)).unwrap();
        b.set_value(json!(2)).unwrap();
        let inputs = resolve_ingests(&[a, b]).await;
        assert_eq!(inputs["a"], json!(1));
        assert_eq!(inputs["b"], json!(2));
    }

    #[test]
    fn publish_is_all_or_nothing() {
        let a = link("l1", "a");
        let b = link("l2", "b");
        let err = publish_outputs(
            &[Arc::clone(&a), Arc::clone(&b)],
            &json!({"a": 1}),
        )
        .unwrap_err();
        assert!(matches!(err, PublishError::MissingField(_)));
        // Nothing was set, so a complete payload still succeeds.
        assert!(!a.is_ready());
        publish_outputs(&[a.clone(), b.clone()], &json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(a.value(), Some(json!(1)));
        assert_eq!(b.value(), Some(json!(2)));
    }

    #[test]
    fn shape_lists_types_by_name() {
        let a = link("l1", "total");
        assert_eq!(shape_of(&[a]), json!({"total": "number"}));
    }
}
