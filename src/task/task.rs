//! Task nodes of the decomposition tree.
//!
//! # Invariants
//! - A child's `depth` is exactly its parent's `depth + 1`.
//! - `task_id` values are unique across the whole tree (enforced at
//!   admission by the orchestrator).
//! - `children` is non-empty only when `selected_tool` is `Decompose`; a
//!   `Decompose` node whose decomposition failed stays a childless,
//!   result-less leaf.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::link::{Link, LinkSnapshot};

/// How a task is handled: one of three execution backends, or further
/// decomposition. Closed set - the orchestrator and executor match on it
/// exhaustively, so an unknown tool cannot reach dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Deterministic generated code in a subprocess.
    Code,
    /// Model search and reasoning.
    Reasoning,
    /// Interactive remote computer-use session.
    ComputerUse,
    /// Split into subtasks instead of executing.
    Decompose,
}

impl ToolChoice {
    /// Parse the single-letter wire form (A/B/C/D, case-insensitive).
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter.trim() {
            "A" | "a" => Some(Self::Code),
            "B" | "b" => Some(Self::Reasoning),
            "C" | "c" => Some(Self::ComputerUse),
            "D" | "d" => Some(Self::Decompose),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Self::Code => 'A',
            Self::Reasoning => 'B',
            Self::ComputerUse => 'C',
            Self::Decompose => 'D',
        }
    }

    /// Whether this choice hands the task to the executor.
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::Decompose)
    }
}

impl std::fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Code => "code",
            Self::Reasoning => "reasoning",
            Self::ComputerUse => "computer_use",
            Self::Decompose => "decompose",
        };
        write!(f, "{}", name)
    }
}

/// One node of the task tree.
///
/// Nodes live in the orchestrator's arena; `children` holds arena indices in
/// admission order. Links are shared references - the same `Arc<Link>` sits
/// in the producer's `produces` and every consumer's `ingests`.
#[derive(Debug)]
pub struct TaskNode {
    task_id: String,
    task_name: String,
    task_description: String,
    ingests: Vec<Arc<Link>>,
    produces: Vec<Arc<Link>>,
    depth: usize,
    selected_tool: ToolChoice,
    completed: bool,
    result: Option<String>,
    children: Vec<usize>,
}

impl TaskNode {
    pub fn new(
        task_id: String,
        task_name: String,
        task_description: String,
        ingests: Vec<Arc<Link>>,
        produces: Vec<Arc<Link>>,
        depth: usize,
        selected_tool: ToolChoice,
    ) -> Self {
        Self {
            task_id,
            task_name,
            task_description,
            ingests,
            produces,
            depth,
            selected_tool,
            completed: false,
            result: None,
            children: Vec::new(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn task_description(&self) -> &str {
        &self.task_description
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn selected_tool(&self) -> ToolChoice {
        self.selected_tool
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn ingests(&self) -> &[Arc<Link>] {
        &self.ingests
    }

    pub fn produces(&self) -> &[Arc<Link>] {
        &self.produces
    }

    /// Append a child arena index (during decomposition only).
    pub fn push_child(&mut self, index: usize) {
        self.children.push(index);
    }

    /// Record the executor's outcome and mark the node completed.
    ///
    /// Error strings are legitimate results; a failing leaf still counts as
    /// executed.
    pub fn finish(&mut self, result: String) {
        self.result = Some(result);
        self.completed = true;
    }

    /// Serializable nested view of the subtree rooted at `index`.
    pub fn snapshot(nodes: &[TaskNode], index: usize) -> TaskSnapshot {
        let node = &nodes[index];
        TaskSnapshot {
            task_id: node.task_id.clone(),
            task_name: node.task_name.clone(),
            task_description: node.task_description.clone(),
            ingests: node.ingests.iter().map(|l| l.snapshot()).collect(),
            produces: node.produces.iter().map(|l| l.snapshot()).collect(),
            selected_tool: node.selected_tool,
            depth: node.depth,
            completed: node.completed,
            result: node.result.clone(),
            subtasks: node
                .children
                .iter()
                .map(|&child| TaskNode::snapshot(nodes, child))
                .collect(),
        }
    }
}

/// Serializable view of a task subtree for the run artifact.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub task_name: String,
    pub task_description: String,
    pub ingests: Vec<LinkSnapshot>,
    pub produces: Vec<LinkSnapshot>,
    pub selected_tool: ToolChoice,
    pub depth: usize,
    pub completed: bool,
    pub result: Option<String>,
    pub subtasks: Vec<TaskSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_round_trip() {
        for tool in [
            ToolChoice::Code,
            ToolChoice::Reasoning,
            ToolChoice::ComputerUse,
            ToolChoice::Decompose,
        ] {
            let letter = tool.letter().to_string();
            assert_eq!(ToolChoice::from_letter(&letter), Some(tool));
        }
        assert_eq!(ToolChoice::from_letter(" b "), Some(ToolChoice::Reasoning));
        assert_eq!(ToolChoice::from_letter("E"), None);
        assert_eq!(ToolChoice::from_letter("AB"), None);
    }

    #[test]
    fn decompose_is_not_a_leaf() {
        assert!(ToolChoice::Code.is_leaf());
        assert!(ToolChoice::Reasoning.is_leaf());
        assert!(ToolChoice::ComputerUse.is_leaf());
        assert!(!ToolChoice::Decompose.is_leaf());
    }

    #[test]
    fn finish_sets_result_and_completed() {
        let mut node = TaskNode::new(
            "t1".into(),
            "add".into(),
            "add the numbers".into(),
            Vec::new(),
            Vec::new(),
            0,
            ToolChoice::Code,
        );
        assert!(!node.completed());
        node.finish("{\"result\": 4}".into());
        assert!(node.completed());
        assert_eq!(node.result(), Some("{\"result\": 4}"));
    }

    #[test]
    fn snapshot_nests_children() {
        let mut root = TaskNode::new(
            "t1".into(),
            "root".into(),
            "the root".into(),
            Vec::new(),
            Vec::new(),
            0,
            ToolChoice::Decompose,
        );
        root.push_child(1);
        let child = TaskNode::new(
            "t2".into(),
            "child".into(),
            "the child".into(),
            Vec::new(),
            Vec::new(),
            1,
            ToolChoice::Reasoning,
        );
        let nodes = vec![root, child];
        let snapshot = TaskNode::snapshot(&nodes, 0);
        assert_eq!(snapshot.subtasks.len(), 1);
        assert_eq!(snapshot.subtasks[0].task_id, "t2");
        assert_eq!(snapshot.subtasks[0].depth, snapshot.depth + 1);
    }
}
