//! Run reporting: console rendering and the JSON artifact.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::orchestrator::TaskTree;
use crate::task::TaskSnapshot;

/// The document written at the end of a run.
#[derive(Debug, Serialize)]
pub struct RunArtifact<'a> {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub prompt: &'a str,
    #[serde(flatten)]
    pub tree: &'a TaskTree,
}

impl<'a> RunArtifact<'a> {
    pub fn new(prompt: &'a str, tree: &'a TaskTree) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            prompt,
            tree,
        }
    }

    /// Serialize to pretty JSON and write to `path`.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Per-depth listing of the tasks in a finished tree.
pub fn depth_listing(tree: &TaskTree) -> String {
    let mut out = String::new();
    for (depth, entries) in &tree.tasks_by_depth {
        out.push_str(&format!("\nTasks at depth {}:\n", depth));
        for entry in entries {
            out.push_str(&format!(
                "  - {}: {} (tool: {})\n",
                entry.task_name, entry.task_description, entry.selected_tool
            ));
        }
    }
    out
}

/// Indented rendering of the task tree.
pub fn render_tree(tree: &TaskTree) -> String {
    let mut out = String::new();
    render_node(&tree.root, "", &mut out);
    out
}

fn render_node(task: &TaskSnapshot, indent: &str, out: &mut String) {
    out.push_str(&format!(
        "{}Task: {} (tool: {})\n",
        indent, task.task_name, task.selected_tool
    ));
    if !task.subtasks.is_empty() {
        for subtask in &task.subtasks {
            render_node(subtask, &format!("{}  ", indent), out);
        }
    } else if let Some(result) = &task.result {
        out.push_str(&format!("{}  Result: {}\n", indent, result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::DepthEntry;
    use crate::task::ToolChoice;
    use std::collections::BTreeMap;

    fn leaf(name: &str, depth: usize, tool: ToolChoice, result: Option<&str>) -> TaskSnapshot {
        TaskSnapshot {
            task_id: format!("id-{}", name),
            task_name: name.to_string(),
            task_description: format!("do {}", name),
            ingests: Vec::new(),
            produces: Vec::new(),
            selected_tool: tool,
            depth,
            completed: result.is_some(),
            result: result.map(String::from),
            subtasks: Vec::new(),
        }
    }

    fn sample_tree() -> TaskTree {
        let mut root = leaf("root", 0, ToolChoice::Decompose, None);
        root.subtasks = vec![
            leaf("fetch", 1, ToolChoice::Code, Some("{\"n\": 4}")),
            leaf("summarize", 1, ToolChoice::Reasoning, None),
        ];
        let mut by_depth = BTreeMap::new();
        by_depth.insert(
            0,
            vec![DepthEntry {
                task_id: "id-root".to_string(),
                task_name: "root".to_string(),
                task_description: "do root".to_string(),
                selected_tool: ToolChoice::Decompose,
            }],
        );
        TaskTree {
            root,
            tasks_by_depth: by_depth,
            admitted: 3,
        }
    }

    #[test]
    fn renders_nested_tasks_and_results() {
        let rendered = render_tree(&sample_tree());
        assert!(rendered.contains("Task: root (tool: decompose)"));
        assert!(rendered.contains("  Task: fetch (tool: code)"));
        assert!(rendered.contains("    Result: {\"n\": 4}"));
    }

    #[test]
    fn depth_listing_mentions_every_entry() {
        let listing = depth_listing(&sample_tree());
        assert!(listing.contains("Tasks at depth 0:"));
        assert!(listing.contains("- root: do root (tool: decompose)"));
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let tree = sample_tree();
        let artifact = RunArtifact::new("compute 2+2", &tree);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        artifact.write(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["prompt"], "compute 2+2");
        assert_eq!(written["admitted"], 3);
        assert_eq!(written["root"]["task_name"], "root");
        assert_eq!(written["root"]["subtasks"][0]["task_name"], "fetch");
        assert_eq!(written["tasks_by_depth"]["0"][0]["task_id"], "id-root");
    }
}
