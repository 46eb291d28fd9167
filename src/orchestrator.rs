//! Breadth-first expansion of the task tree.
//!
//! The orchestrator owns the work queue and the two structural limits: the
//! global task budget and the depth ceiling. FIFO order guarantees shallow
//! tasks are tool-selected (and, for leaves, started) before deeper ones are
//! synthesized, so the budget cutoff prunes the frontier in a predictable,
//! shallow-first order.
//!
//! Failure policy: a branch that cannot be synthesized, selected, or
//! decomposed is dropped or degraded in place; nothing originating inside
//! one branch ever aborts another. The only fatal outcome is ending up with
//! no root at all.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::budget::TaskBudget;
use crate::config::Config;
use crate::exec::{ExecTask, Executor};
use crate::gateway::ModelGateway;
use crate::planner::{Decomposer, TaskSynthesizer, ToolSelector};
use crate::task::{Link, LinkDraft, TaskDraft, TaskNode, TaskSnapshot, ToolChoice};

#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error("failed to generate a root task from the prompt")]
    NoRoot,
}

/// One line of the depth-indexed log, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct DepthEntry {
    pub task_id: String,
    pub task_name: String,
    pub task_description: String,
    pub selected_tool: ToolChoice,
}

/// The finished run: the root subtree plus the depth-indexed log.
#[derive(Debug, Serialize)]
pub struct TaskTree {
    pub root: TaskSnapshot,
    pub tasks_by_depth: BTreeMap<usize, Vec<DepthEntry>>,
    pub admitted: usize,
}

/// A pending unit of work: the root prompt still needs synthesis, child
/// drafts were already validated by the decomposer.
enum Work {
    Prompt(String),
    Draft(TaskDraft),
}

struct QueueItem {
    work: Work,
    depth: usize,
    parent: Option<usize>,
    context: String,
}

/// Drives the whole run: synthesize, select, decompose or execute.
pub struct Orchestrator {
    synthesizer: TaskSynthesizer,
    selector: ToolSelector,
    decomposer: Decomposer,
    executor: Arc<Executor>,
    max_depth: usize,
    exec_deadline: Duration,
}

impl Orchestrator {
    pub fn new(gateway: Arc<ModelGateway>, executor: Arc<Executor>, config: &Config) -> Self {
        Self {
            synthesizer: TaskSynthesizer::new(Arc::clone(&gateway), config.max_retries),
            selector: ToolSelector::new(Arc::clone(&gateway), config.max_retries),
            decomposer: Decomposer::new(
                gateway,
                config.max_retries,
                config.max_subtasks,
                config.subtask_overflow,
            ),
            executor,
            max_depth: config.max_depth,
            exec_deadline: config.exec_deadline,
        }
    }

    /// Build and execute the task tree for `prompt`.
    ///
    /// Leaf executions are spawned as they are admitted and joined after the
    /// queue drains; the expansion loop itself is sequential. Returns
    /// [`OrchestrateError::NoRoot`] when no task at all made it into the
    /// tree - partial trees are success, an empty one is not.
    pub async fn run(
        &self,
        prompt: &str,
        budget: &TaskBudget,
    ) -> Result<TaskTree, OrchestrateError> {
        let mut queue = VecDeque::new();
        queue.push_back(QueueItem {
            work: Work::Prompt(prompt.to_string()),
            depth: 0,
            parent: None,
            context: String::new(),
        });

        let mut nodes: Vec<TaskNode> = Vec::new();
        let mut root: Option<usize> = None;
        let mut by_depth: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut links: HashMap<String, Arc<Link>> = HashMap::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut executions: JoinSet<(usize, String)> = JoinSet::new();

        loop {
            // The budget prunes the whole frontier, not just one branch.
            if budget.is_full() {
                tracing::info!("task budget reached, stopping expansion");
                break;
            }
            let Some(item) = queue.pop_front() else {
                break;
            };
            let QueueItem {
                work,
                depth,
                parent,
                context,
            } = item;

            let draft = match work {
                Work::Prompt(prompt) => {
                    match self.synthesizer.synthesize(&prompt, &context).await {
                        Some(draft) => draft,
                        None => continue,
                    }
                }
                Work::Draft(draft) => draft,
            };

            if !seen_ids.insert(draft.task_id.clone()) {
                tracing::warn!("duplicate task id '{}', dropping branch", draft.task_id);
                continue;
            }

            let Some(selected) = self.selector.select(&draft, depth, self.max_depth).await
            else {
                continue;
            };

            // Mechanical backstop: the depth limit holds regardless of the
            // model's answer. Coerce to the selection prompt's own default
            // for deep complex tasks.
            let tool = if selected == ToolChoice::Decompose && depth >= self.max_depth {
                tracing::debug!(
                    "task {} at max depth {}, coercing decompose to computer use",
                    draft.task_id,
                    self.max_depth
                );
                ToolChoice::ComputerUse
            } else {
                selected
            };

            // Hard global ceiling: losing the admission race stops the loop
            // entirely, not just this branch.
            if !budget.try_admit(&draft.task_id) {
                tracing::info!("task budget exhausted at task {}, stopping", draft.task_id);
                break;
            }

            let index = nodes.len();
            nodes.push(materialize(&draft, depth, tool, &mut links));
            if root.is_none() {
                root = Some(index);
            }
            if let Some(parent) = parent {
                nodes[parent].push_child(index);
            }
            by_depth.entry(depth).or_default().push(index);

            if tool == ToolChoice::Decompose {
                match self.decomposer.decompose(&draft, &context).await {
                    Some(children) if !children.is_empty() => {
                        let child_context =
                            format!("{}\nParent task: {}", context, draft.task_description);
                        for child in children {
                            queue.push_back(QueueItem {
                                work: Work::Draft(child),
                                depth: depth + 1,
                                parent: Some(index),
                                context: child_context.clone(),
                            });
                        }
                    }
                    // An empty decomposition degrades the same way a failed
                    // one does: the task stays a childless, result-less leaf.
                    _ => {
                        tracing::warn!(
                            "task {} kept as a leaf with no children",
                            draft.task_id
                        );
                    }
                }
            } else {
                let exec_task = exec_view(&nodes[index]);
                let executor = Arc::clone(&self.executor);
                executions.spawn(async move {
                    let result = executor.execute(exec_task).await;
                    (index, result)
                });
            }
        }

        self.drain(&mut executions, &mut nodes).await;

        let root = root.ok_or(OrchestrateError::NoRoot)?;
        Ok(TaskTree {
            root: TaskNode::snapshot(&nodes, root),
            tasks_by_depth: by_depth
                .into_iter()
                .map(|(depth, indices)| {
                    let entries = indices
                        .into_iter()
                        .map(|i| DepthEntry {
                            task_id: nodes[i].task_id().to_string(),
                            task_name: nodes[i].task_name().to_string(),
                            task_description: nodes[i].task_description().to_string(),
                            selected_tool: nodes[i].selected_tool(),
                        })
                        .collect();
                    (depth, entries)
                })
                .collect(),
            admitted: budget.admitted_count(),
        })
    }

    /// Join spawned leaf executions under the configured deadline.
    ///
    /// A leaf still blocked at the deadline - typically awaiting a link
    /// whose producer was never admitted - is aborted and recorded with an
    /// error-string result.
    async fn drain(&self, executions: &mut JoinSet<(usize, String)>, nodes: &mut [TaskNode]) {
        let drained = tokio::time::timeout(self.exec_deadline, async {
            while let Some(joined) = executions.join_next().await {
                match joined {
                    Ok((index, result)) => nodes[index].finish(result),
                    Err(e) => tracing::error!("leaf execution task failed: {}", e),
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "execution deadline reached, aborting {} leaf task(s)",
                executions.len()
            );
            executions.abort_all();
            while let Some(joined) = executions.join_next().await {
                if let Ok((index, result)) = joined {
                    nodes[index].finish(result);
                }
            }
            for node in nodes.iter_mut() {
                if node.selected_tool().is_leaf() && node.result().is_none() {
                    node.finish(
                        "execution aborted: deadline reached while awaiting inputs".to_string(),
                    );
                }
            }
        }
    }
}

/// Turn a validated draft into an arena node, interning its links.
///
/// Links are shared by id across the whole run, so a consumer's ingest and a
/// producer's produce with the same `link_id` resolve to the same slot. The
/// first task to list a link under `produces` is stamped as its producer.
fn materialize(
    draft: &TaskDraft,
    depth: usize,
    tool: ToolChoice,
    links: &mut HashMap<String, Arc<Link>>,
) -> TaskNode {
    let ingests = draft.ingests.iter().map(|l| intern(links, l)).collect();
    let produces: Vec<Arc<Link>> = draft.produces.iter().map(|l| intern(links, l)).collect();
    for link in &produces {
        link.stamp_producer(&draft.task_id, &draft.task_name);
    }
    TaskNode::new(
        draft.task_id.clone(),
        draft.task_name.clone(),
        draft.task_description.clone(),
        ingests,
        produces,
        depth,
        tool,
    )
}

fn intern(links: &mut HashMap<String, Arc<Link>>, draft: &LinkDraft) -> Arc<Link> {
    Arc::clone(links.entry(draft.link_id.clone()).or_insert_with(|| {
        Arc::new(Link::new(
            &draft.link_id,
            &draft.link_name,
            &draft.link_description,
            &draft.data_type,
            draft.data_source_type,
        ))
    }))
}

fn exec_view(node: &TaskNode) -> ExecTask {
    ExecTask {
        task_id: node.task_id().to_string(),
        task_name: node.task_name().to_string(),
        task_description: node.task_description().to_string(),
        tool: node.selected_tool(),
        ingests: node.ingests().to_vec(),
        produces: node.produces().to_vec(),
    }
}
