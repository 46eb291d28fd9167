//! Planning components: the three gateway protocols that grow the tree.
//!
//! - [`TaskSynthesizer`] turns a prompt into one validated task draft.
//! - [`ToolSelector`] decides decompose-or-execute and picks the backend.
//! - [`Decomposer`] splits a task into a bounded list of child drafts.
//!
//! All three resubmit the same request on parse or validation failure, up to
//! the configured attempt ceiling, then report failure to the orchestrator -
//! which drops the branch and moves on.

mod decomposer;
mod selector;
mod synthesizer;

pub use decomposer::Decomposer;
pub use selector::ToolSelector;
pub use synthesizer::TaskSynthesizer;

/// Model-facing description of the task JSON shape.
///
/// Stands in for the JSON schema the model is asked to follow; the actual
/// enforcement is the typed draft layer in [`crate::task`].
pub(crate) const TASK_SHAPE: &str = r#"{
  "task_id": "<string, unique>",
  "task_name": "<short name>",
  "task_description": "<what to do, in natural language>",
  "ingests": [
    {
      "link_id": "<string, unique>",
      "link_name": "<key used to look the value up>",
      "link_description": "<what the value is>",
      "data_type": "<expected value shape, e.g. string, number, list[string]>",
      "data_source_type": "<one of: text, file, database, api, url, console>"
    }
  ],
  "produces": [ <same shape as ingests> ],
  "subtasks": []
}"#;
