use anyhow::Result;
use clap::{Parser, Subcommand};
use loomcore::{EventBus, NodeDefinition, NodeType, WorkflowData, WorkflowGraph};
use loomruntime::{
    builtin_templates, timeline_entries, HttpRunner, Orchestrator, RemoteRunner, Simulator,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "Loom workflow CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Execution runtime URL (defaults to $LOOM_RUNNER_URL)
        #[arg(short, long)]
        runner: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List the built-in node catalog
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            runner,
            verbose,
        } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::WARN
            };
            tracing_subscriber::fmt().with_max_level(level).init();

            run_workflow(file, runner).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

async fn run_workflow(file: PathBuf, runner_url: Option<String>) -> Result<()> {
    println!("Loading workflow from: {}", file.display());

    let payload = std::fs::read_to_string(&file)?;
    let data: WorkflowData = serde_json::from_str(&payload)?;

    println!("   Nodes: {}", data.nodes.len());
    println!("   Connections: {}", data.connections.len());
    println!();

    let runner_url = runner_url.or_else(|| std::env::var("LOOM_RUNNER_URL").ok());
    let runner = runner_url
        .filter(|url| !url.is_empty())
        .map(|url| Arc::new(HttpRunner::new(url)) as Arc<dyn RemoteRunner>);

    let orchestrator = Orchestrator::new(runner, Simulator::new(), Arc::new(EventBus::new(100)));
    let report = orchestrator.execute(None, &data).await?;

    for entry in timeline_entries(&report.outcome, &data, report.completed_at) {
        let timing = entry
            .execution_time_seconds
            .map(|secs| format!(" ({secs:.2}s)"))
            .unwrap_or_default();
        println!("  {} {}{}", entry.glyph(), entry.node_title, timing);
        if let Some(stdout) = entry.stdout.as_deref().filter(|s| !s.is_empty()) {
            for line in stdout.lines() {
                println!("      {line}");
            }
        }
        if let Some(error) = &entry.error {
            println!("      error: {error}");
        }
    }

    println!();
    println!("Execution summary:");
    println!("   Execution ID: {}", report.execution_id);
    println!("   Duration: {:.3}s", report.duration_seconds);
    if report.simulated {
        let reason = report.diagnostic.as_deref().unwrap_or("unknown");
        println!("   Mode: simulated ({reason})");
    } else {
        println!("   Mode: remote");
    }

    Ok(())
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("Validating workflow: {}", file.display());

    let payload = std::fs::read_to_string(&file)?;
    let data: WorkflowData = serde_json::from_str(&payload)?;
    let graph = WorkflowGraph::new(&data)?;

    println!("Workflow is valid:");
    println!("   Nodes: {}", graph.node_count());
    println!("   Connections: {}", data.connections.len());

    Ok(())
}

fn list_nodes() {
    println!("Available node types:");
    println!();

    for template in builtin_templates() {
        println!("  • {} ({})", template.name, template.category);
        if let Some(description) = &template.description {
            println!("    {description}");
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut data = WorkflowData::default();
    data.add_node("start", NodeDefinition::new(NodeType::Start, "Start"));
    data.add_node(
        "double",
        NodeDefinition::new(NodeType::Python, "Double input")
            .with_code("def run(input):\n  return input*2"),
    );
    data.add_node("end", NodeDefinition::new(NodeType::End, "End"));
    data.connect("start", "out", "double", "in");
    data.connect("double", "out", "end", "in");

    let json = serde_json::to_string_pretty(&data)?;
    std::fs::write(&output, json)?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  loom run --file {}", output.display());

    Ok(())
}
