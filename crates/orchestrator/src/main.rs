//! Orchestrator CLI: wires every crate in the workspace into a running
//! fix-session service and exposes the operator control surface over it.
//!
//! `serve` is the long-running mode: it spawns the [`engine::Dispatcher`]
//! and a stdin command loop so an operator can submit issues, inspect
//! sessions, and resolve pending approvals without a second process. The
//! other subcommands are one-shot reads against the same SQLite store file
//! and don't require `serve` to be running.

mod repl;
mod view;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Options;
use engine::{Dispatcher, EngineContext};
use issues::{Issue, RawIssue};
use llm::AnthropicClient;
use notify::Notifier;
use safety::{CostTracker, RateLimiter};
use scm::GhCliGateway;
use store::Store;
use verify::{DockerComposeDeployer, NoopDeployer, Verifier};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Autonomous fix-session orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the orchestrator's TOML config file.
    #[arg(long, default_value = "orchestrator.toml", global = true)]
    config: PathBuf,

    /// Path to the SQLite database file.
    #[arg(long, default_value = "orchestrator.db", global = true)]
    db: PathBuf,

    /// Enable verbose (debug-level) tracing.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher and an interactive operator control loop.
    Serve,

    /// Submit one issue and run it to a terminal status before exiting.
    Submit {
        /// Read the issue as a `RawIssue` JSON document from this file
        /// instead of the individual flags below.
        #[arg(long, conflicts_with_all = ["title", "description"])]
        file: Option<PathBuf>,

        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        reporter: Option<String>,
        #[arg(long)]
        steps: Option<String>,
        #[arg(long)]
        expected: Option<String>,
        #[arg(long)]
        actual: Option<String>,
    },

    /// Show one session's current state.
    Status {
        session_id: uuid::Uuid,
    },

    /// List sessions, optionally narrowed to one status.
    List {
        #[arg(long)]
        status: Option<String>,
    },

    /// Show a session's associated pull request, if any.
    PrStatus {
        session_id: uuid::Uuid,
    },

    /// Show today's API spend against the configured daily budget.
    Cost,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "orchestrator=debug,engine=debug" } else { "orchestrator=info,engine=info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = Options::load(Some(&cli.config)).context("failed to load configuration")?;
    let store = Arc::new(Store::open(&cli.db).context("failed to open session store")?);

    match cli.command {
        Commands::Serve => serve(options, store).await,
        Commands::Submit {
            file,
            title,
            description,
            severity,
            category,
            reporter,
            steps,
            expected,
            actual,
        } => {
            let raw: RawIssue = match file {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str(&text).context("issue file is not valid RawIssue JSON")?
                }
                None => RawIssue {
                    title,
                    description,
                    severity,
                    category,
                    reporter,
                    steps,
                    expected,
                    actual,
                },
            };
            submit_and_wait(options, store, Issue::normalize(raw)).await
        }
        Commands::Status { session_id } => view::print_status(&store, session_id),
        Commands::List { status } => view::print_list(&store, status.as_deref()),
        Commands::PrStatus { session_id } => view::print_pr_status(&store, session_id),
        Commands::Cost => view::print_cost(&store, options.daily_cost_limit),
    }
}

/// Builds the full [`EngineContext`] from loaded options and an open store.
fn build_context(options: Options, store: Arc<Store>) -> EngineContext {
    let options = Arc::new(options);

    let llm: Arc<dyn llm::LlmClient> = match AnthropicClient::from_env(options.llm_default_model.clone()) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            tracing::warn!(%error, "ANTHROPIC_API_KEY not set; LLM calls will fail until one is configured");
            Arc::new(AnthropicClient::new(String::new(), options.llm_default_model.clone()))
        }
    };

    let deployer: Arc<dyn verify::Deployer> = if options.auto_deploy_enabled {
        Arc::new(DockerComposeDeployer::new(PathBuf::from(&options.repository_path)))
    } else {
        Arc::new(NoopDeployer)
    };

    EngineContext::new(
        options.clone(),
        store.clone(),
        llm,
        Arc::new(Notifier::from_env()),
        Arc::new(GhCliGateway::new()),
        Arc::new(Verifier::default()),
        deployer,
        Arc::new(CostTracker::new(store.clone(), options.daily_cost_limit)),
        Arc::new(RateLimiter::new(options.rate_limits.clone())),
        Arc::new(engine::issue_source::NullIssueSource),
    )
}

async fn serve(options: Options, store: Arc<Store>) -> Result<()> {
    let daily_cost_limit = options.daily_cost_limit;
    let ctx = build_context(options, store.clone());
    let notifier = ctx.notifier.clone();
    let dispatcher = Dispatcher::spawn(ctx);

    println!("{}", "orchestrator serving; type `help` for commands".green());
    tokio::select! {
        () = repl::run(dispatcher, notifier, store, daily_cost_limit) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            println!("\n{}", "shutting down".yellow());
        }
    }
    Ok(())
}

async fn submit_and_wait(options: Options, store: Arc<Store>, issue: Issue) -> Result<()> {
    let timeout = options.fix_timeout();
    let ctx = build_context(options, store.clone());
    let dispatcher = Dispatcher::spawn(ctx);
    let id = dispatcher.submit(issue);
    println!("submitted session {id}");

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(session) = dispatcher.get_session(id) {
            if session.status.is_terminal() {
                view::print_session(&session);
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            println!("{}", "session did not reach a terminal status within fix_timeout_minutes".yellow());
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    }
}
