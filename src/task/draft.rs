//! Typed translation layer for untrusted model output.
//!
//! The gateway hands back free text; this module turns its JSON payload into
//! validated draft records. Drafts are the wire shape of a task before it is
//! admitted into the tree - serde does the structural checks a JSON-schema
//! validator would, and `validate` adds the semantic ones (non-empty
//! identifiers, unique link ids, no pre-filled subtasks).

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::link::DataSource;

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("payload is not valid task JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task_id must be non-empty")]
    EmptyTaskId,

    #[error("task_name must be non-empty")]
    EmptyTaskName,

    #[error("task_description must be non-empty")]
    EmptyTaskDescription,

    #[error("subtasks must be empty at synthesis time, got {0}")]
    SubtasksNotEmpty(usize),

    #[error("link '{0}' has an empty id or name")]
    EmptyLinkField(String),

    #[error("duplicate link id '{0}' within one task")]
    DuplicateLinkId(String),
}

/// Wire shape of one dataflow link inside a task draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDraft {
    #[serde(deserialize_with = "lenient_id")]
    pub link_id: String,
    pub link_name: String,
    #[serde(default)]
    pub link_description: String,
    pub data_type: String,
    pub data_source_type: DataSource,
}

/// Wire shape of one task as the model emits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    #[serde(deserialize_with = "lenient_id")]
    pub task_id: String,
    pub task_name: String,
    pub task_description: String,
    #[serde(default)]
    pub ingests: Vec<LinkDraft>,
    #[serde(default)]
    pub produces: Vec<LinkDraft>,
    #[serde(default)]
    pub subtasks: Vec<serde_json::Value>,
}

impl TaskDraft {
    /// Semantic checks beyond JSON shape.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.task_id.trim().is_empty() {
            return Err(DraftError::EmptyTaskId);
        }
        if self.task_name.trim().is_empty() {
            return Err(DraftError::EmptyTaskName);
        }
        if self.task_description.trim().is_empty() {
            return Err(DraftError::EmptyTaskDescription);
        }
        if !self.subtasks.is_empty() {
            return Err(DraftError::SubtasksNotEmpty(self.subtasks.len()));
        }

        let mut seen = std::collections::HashSet::new();
        for link in self.ingests.iter().chain(self.produces.iter()) {
            if link.link_id.trim().is_empty() || link.link_name.trim().is_empty() {
                return Err(DraftError::EmptyLinkField(link.link_name.clone()));
            }
            if !seen.insert(link.link_id.as_str()) {
                return Err(DraftError::DuplicateLinkId(link.link_id.clone()));
            }
        }
        Ok(())
    }

    /// Model-facing JSON of this draft, for embedding into prompts.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Parse and validate one task draft from payload text.
pub fn parse_task_draft(payload: &str) -> Result<TaskDraft, DraftError> {
    let draft: TaskDraft = serde_json::from_str(payload)?;
    draft.validate()?;
    Ok(draft)
}

/// Parse a list of task drafts from payload text; each is validated.
pub fn parse_subtask_list(payload: &str) -> Result<Vec<TaskDraft>, DraftError> {
    let drafts: Vec<TaskDraft> = serde_json::from_str(payload)?;
    for draft in &drafts {
        draft.validate()?;
    }
    Ok(drafts)
}

/// Models sometimes emit numeric ids; accept them as strings.
fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "task_id": "t1",
        "task_name": "fetch prices",
        "task_description": "Fetch the closing prices",
        "ingests": [],
        "produces": [{
            "link_id": "l1",
            "link_name": "prices",
            "link_description": "closing prices",
            "data_type": "list[number]",
            "data_source_type": "api"
        }],
        "subtasks": []
    }"#;

    #[test]
    fn parses_valid_draft() {
        let draft = parse_task_draft(VALID).unwrap();
        assert_eq!(draft.task_id, "t1");
        assert_eq!(draft.produces.len(), 1);
        assert_eq!(draft.produces[0].data_source_type, DataSource::Api);
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let payload = r#"{"task_id": 3, "task_name": "n", "task_description": "d"}"#;
        let draft = parse_task_draft(payload).unwrap();
        assert_eq!(draft.task_id, "3");
    }

    #[test]
    fn prefilled_subtasks_are_rejected() {
        let payload = r#"{
            "task_id": "t1", "task_name": "n", "task_description": "d",
            "subtasks": [{"task_id": "t2"}]
        }"#;
        assert!(matches!(
            parse_task_draft(payload),
            Err(DraftError::SubtasksNotEmpty(1))
        ));
    }

    #[test]
    fn duplicate_link_ids_are_rejected() {
        let payload = r#"{
            "task_id": "t1", "task_name": "n", "task_description": "d",
            "ingests": [{"link_id": "l1", "link_name": "a", "data_type": "string", "data_source_type": "text"}],
            "produces": [{"link_id": "l1", "link_name": "b", "data_type": "string", "data_source_type": "text"}]
        }"#;
        assert!(matches!(
            parse_task_draft(payload),
            Err(DraftError::DuplicateLinkId(_))
        ));
    }

    #[test]
    fn unknown_source_type_is_a_json_error() {
        let payload = r#"{
            "task_id": "t1", "task_name": "n", "task_description": "d",
            "produces": [{"link_id": "l1", "link_name": "a", "data_type": "string", "data_source_type": "carrier-pigeon"}]
        }"#;
        assert!(matches!(parse_task_draft(payload), Err(DraftError::Json(_))));
    }

    #[test]
    fn empty_description_is_rejected() {
        let payload = r#"{"task_id": "t1", "task_name": "n", "task_description": "  "}"#;
        assert!(matches!(
            parse_task_draft(payload),
            Err(DraftError::EmptyTaskDescription)
        ));
    }

    #[test]
    fn list_parse_validates_every_entry() {
        let payload = format!(
            "[{}, {{\"task_id\": \"\", \"task_name\": \"n\", \"task_description\": \"d\"}}]",
            VALID
        );
        assert!(matches!(
            parse_subtask_list(&payload),
            Err(DraftError::EmptyTaskId)
        ));
    }
}
