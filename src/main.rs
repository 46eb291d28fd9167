//! tasktree - CLI entry point.
//!
//! Reads a prompt (first argument, or interactively from stdin), generates
//! the task tree, prints the per-depth listing and tree rendering, and
//! writes the run artifact.

use std::io::{BufRead, Write};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tasktree::exec::Executor;
use tasktree::llm::OpenRouterClient;
use tasktree::report::{self, RunArtifact};
use tasktree::{Config, ModelGateway, Orchestrator, TaskBudget};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasktree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration: model={}", config.model);

    let prompt = match std::env::args().nth(1) {
        Some(prompt) => prompt,
        None => read_prompt()?,
    };
    if prompt.trim().is_empty() {
        anyhow::bail!("empty prompt");
    }

    let llm = Arc::new(OpenRouterClient::new(config.api_key.clone()));
    let gateway = Arc::new(ModelGateway::new(llm, config.model.clone()));
    let executor = Arc::new(Executor::new(Arc::clone(&gateway), &config));
    let orchestrator = Orchestrator::new(gateway, executor, &config);
    let budget = TaskBudget::new(config.max_tasks);

    let tree = match orchestrator.run(&prompt, &budget).await {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!("{}", e);
            anyhow::bail!("task generation failed");
        }
    };

    print!("{}", report::depth_listing(&tree));
    println!("\nTask tree:");
    print!("{}", report::render_tree(&tree));

    let artifact = RunArtifact::new(&prompt, &tree);
    artifact.write(&config.output_path)?;
    info!(
        "Wrote run artifact to {} ({} task(s) admitted)",
        config.output_path.display(),
        tree.admitted
    );

    Ok(())
}

fn read_prompt() -> anyhow::Result<String> {
    print!("Enter a prompt: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
