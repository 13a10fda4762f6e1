// ABOUTME: switchyard CLI - drive conversations across graph, session, and thread runtimes
// ABOUTME: Loads config, sets up logging and storage, then runs one subcommand against the coordinator

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use switchyard::app::{current_dir, App, Storage};
use switchyard::config::AppConfig;
use switchyard::logging;
use switchyard::terminal::{render, Rendered, TerminalApproval};
use switchyard_agent::{HitlDecision, InterruptArgs, ResumeArgs, RuntimeKind, TurnInput};
use switchyard_core::{RunHandle, RunRequest};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(version)]
#[command(about = "Route agent conversations across interchangeable runtimes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: SWITCHYARD_CONFIG_PATH, ./switchyard.toml, ~/.config/switchyard/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep conversations in memory for this invocation only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Force every run in this invocation onto one runtime
    #[arg(long, global = true, value_name = "KIND")]
    runtime: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the reply
    Chat {
        conversation: String,
        message: String,
        /// Working directory (default: the conversation's)
        #[arg(long)]
        cwd: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Continue a paused run with a backend-specific JSON payload
    Resume {
        conversation: String,
        #[arg(long)]
        payload: String,
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Answer a pending interrupt
    Respond {
        conversation: String,
        decision: DecisionArg,
        /// Replacement arguments (JSON), required for `edit`
        #[arg(long)]
        args: Option<String>,
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Show or change which runtime a conversation uses
    Runtime {
        conversation: String,
        #[command(subcommand)]
        action: Option<RuntimeAction>,
    },
    /// List conversations
    Conversations,
    /// Register a conversation
    New {
        conversation: String,
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Delete a conversation and its native session ids
    Delete { conversation: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum DecisionArg {
    Approve,
    Reject,
    Edit,
}

#[derive(Subcommand)]
enum RuntimeAction {
    /// Resolved runtime and where it came from
    Get,
    /// Pin the conversation to a runtime
    Set { kind: String },
    /// Remove the conversation's pin
    Clear,
    /// Set the global default runtime
    Default { kind: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\nswitchyard panicked: {}", panic_info);
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let _log_guard = logging::init(&config.logging)?;

    if let Some(runtime) = &cli.runtime {
        runtime.parse::<RuntimeKind>()?;
    }

    let storage = Storage::open(&config, cli.ephemeral)?;
    let app = App::build(
        &config,
        storage,
        Arc::new(TerminalApproval::new()),
        cli.runtime.clone(),
    )?;

    match cli.command {
        Commands::Chat {
            conversation,
            message,
            cwd,
            model,
        } => {
            let record = app.storage.conversation(&conversation, cwd.as_deref()).await?;
            let request = RunRequest::Turn(TurnInput {
                conversation_id: conversation,
                message,
                working_directory: cwd.unwrap_or(record.working_directory),
                model_id: model,
            });
            stream(&app, request).await
        }
        Commands::Resume {
            conversation,
            payload,
            cwd,
        } => {
            let payload: Value =
                serde_json::from_str(&payload).context("--payload must be valid JSON")?;
            let record = app.storage.conversation(&conversation, cwd.as_deref()).await?;
            let request = RunRequest::Resume(ResumeArgs {
                conversation_id: conversation,
                working_directory: cwd.unwrap_or(record.working_directory),
                payload,
            });
            stream(&app, request).await
        }
        Commands::Respond {
            conversation,
            decision,
            args,
            cwd,
        } => {
            let decision = match (decision, args) {
                (DecisionArg::Approve, _) => HitlDecision::Approve,
                (DecisionArg::Reject, _) => HitlDecision::Reject,
                (DecisionArg::Edit, Some(args)) => HitlDecision::Edit {
                    args: serde_json::from_str(&args).context("--args must be valid JSON")?,
                },
                (DecisionArg::Edit, None) => anyhow::bail!("`edit` requires --args <JSON>"),
            };
            let record = app.storage.conversation(&conversation, cwd.as_deref()).await?;
            let request = RunRequest::Interrupt(InterruptArgs {
                conversation_id: conversation,
                working_directory: cwd.unwrap_or(record.working_directory),
                decision,
            });
            stream(&app, request).await
        }
        Commands::Runtime {
            conversation,
            action,
        } => runtime_command(&app, &conversation, action.unwrap_or(RuntimeAction::Get)).await,
        Commands::Conversations => {
            if cli.ephemeral {
                println!("(no conversations persist in --ephemeral mode)");
                return Ok(());
            }
            for conversation in app.storage.list()? {
                let pinned = conversation
                    .metadata
                    .get(switchyard_core::RUNTIME_KEY)
                    .and_then(|v| v.as_str())
                    .unwrap_or("-");
                println!(
                    "{}\t{}\t{}",
                    conversation.id,
                    pinned,
                    conversation.working_directory.display()
                );
            }
            Ok(())
        }
        Commands::New { conversation, cwd } => {
            let dir = match cwd {
                Some(dir) => dir,
                None => current_dir()?,
            };
            let created = app.storage.create(&conversation, &dir)?;
            println!("Created {} in {}", created.id, created.working_directory.display());
            Ok(())
        }
        Commands::Delete { conversation } => {
            app.coordinator.cancel(&conversation);
            if app.storage.delete(&conversation)? {
                println!("Deleted {}", conversation);
            } else {
                println!("No conversation named {}", conversation);
            }
            Ok(())
        }
    }
}

async fn runtime_command(app: &App, conversation: &str, action: RuntimeAction) -> Result<()> {
    let selector = app.coordinator.selector();
    match action {
        RuntimeAction::Get => {
            let (kind, source) = selector.resolve_with_source(conversation).await;
            println!("{} ({})", kind, source);
        }
        RuntimeAction::Set { kind } => {
            let kind: RuntimeKind = kind.parse()?;
            app.storage.conversation(conversation, None).await?;
            selector.set_conversation_runtime(conversation, kind).await?;
            println!("{} now runs on {}", conversation, kind);
        }
        RuntimeAction::Clear => {
            app.storage.conversation(conversation, None).await?;
            selector.clear_conversation_runtime(conversation).await?;
            println!("{} follows the default runtime", conversation);
        }
        RuntimeAction::Default { kind } => {
            let kind: RuntimeKind = kind.parse()?;
            selector.set_default_runtime(kind).await?;
            println!("Default runtime is now {}", kind);
        }
    }
    Ok(())
}

/// Print a run's events until it ends. Ctrl-C tears every run down.
async fn stream(app: &App, request: RunRequest) -> Result<()> {
    let RunHandle {
        run_id,
        conversation_id,
        runtime,
        mut events,
    } = app.coordinator.submit(request).await;
    tracing::info!(%conversation_id, %run_id, %runtime, "Run submitted");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stdout = std::io::stdout();

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = &mut ctrl_c => {
                let cancelled = app.coordinator.cancel_all();
                eprintln!("\nInterrupted; cancelled {} run(s)", cancelled);
                return Ok(());
            }
        };
        let Some(event) = event else {
            // Channel closed without a terminal event: the run was cancelled
            eprintln!("\nRun cancelled");
            return Ok(());
        };

        match render(&event) {
            Some(Rendered::Text(text)) => {
                print!("{}", text);
                let _ = stdout.flush();
            }
            Some(Rendered::Paused(actions)) => {
                println!("\n⏸ Paused, waiting on:");
                for action in actions {
                    println!("  - {}", action);
                }
                println!(
                    "Answer with `switchyard respond {} approve|reject|edit --args <JSON>`",
                    conversation_id
                );
            }
            Some(Rendered::Done) => {
                println!();
                return Ok(());
            }
            Some(Rendered::Failed(message)) => {
                println!();
                anyhow::bail!("{} run failed: {}", runtime, message);
            }
            None => {}
        }
    }
}
