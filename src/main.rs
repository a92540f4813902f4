//! # cluster-progress-monitor
//!
//! Command-line front end for the progress monitor.
//!
//! ## Usage
//!
//! ```bash
//! # Print the current progress of a ClusterDeployment once
//! cluster-progress-monitor state --namespace kcm-system --name prod-eu-1
//!
//! # Stream progress as JSON lines until provisioning ends
//! cluster-progress-monitor watch kcm-system/prod-eu-1?timeout=1800
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cluster_progress_monitor::constants::{DEFAULT_CALLER, DEFAULT_SINK_CAPACITY};
use cluster_progress_monitor::monitor::{ChannelSink, SubscriptionRequest, SubscriptionTarget};
use cluster_progress_monitor::progress::{ProgressUpdate, ProvisioningPhase};
use cluster_progress_monitor::runtime::{init_logging, initialize};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Streams provisioning progress for ClusterDeployment resources
#[derive(Parser)]
#[command(name = "cluster-progress-monitor")]
#[command(about = "Streams provisioning progress for ClusterDeployment resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current progress of a ClusterDeployment
    State {
        /// Namespace of the ClusterDeployment
        #[arg(short, long)]
        namespace: String,

        /// Name of the ClusterDeployment
        #[arg(long)]
        name: String,
    },
    /// Stream progress updates until a terminal update or Ctrl-C
    Watch {
        /// Target as <namespace>/<name>, optionally with ?timeout=<seconds>
        target: String,

        /// Caller identity used for quota accounting
        #[arg(long, default_value = DEFAULT_CALLER)]
        caller: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::State { namespace, name } => state_command(namespace, name, cli.pretty).await,
        Commands::Watch { target, caller } => watch_command(&target, &caller, cli.pretty).await,
    }
}

fn render(update: &ProgressUpdate, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(update)
    } else {
        serde_json::to_string(update)
    };
    rendered.context("Failed to serialize progress update")
}

/// Failed provisioning exits non-zero so scripts can branch on it
fn exit_code(update: &ProgressUpdate) -> ExitCode {
    if update.phase == ProvisioningPhase::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn state_command(namespace: String, name: String, pretty: bool) -> Result<ExitCode> {
    let runtime = initialize(false).await?;
    let target = SubscriptionTarget::new(namespace, name);
    let update = runtime
        .manager
        .get_state(&target)
        .await
        .with_context(|| format!("Failed to read progress for {target}"))?;
    println!("{}", render(&update, pretty)?);
    Ok(exit_code(&update))
}

async fn watch_command(raw_target: &str, caller: &str, pretty: bool) -> Result<ExitCode> {
    let request: SubscriptionRequest = raw_target
        .parse()
        .with_context(|| format!("Invalid watch target '{raw_target}'"))?;

    let runtime = initialize(true).await?;
    let (sink, mut updates) = ChannelSink::new(DEFAULT_SINK_CAPACITY);
    runtime.manager.bind(Arc::new(sink));
    runtime
        .manager
        .subscribe(caller, &request.target, request.timeout)
        .await
        .with_context(|| format!("Failed to subscribe to {}", request.target))?;

    // Catches a worker that ended without its terminal update reaching us
    let mut liveness = tokio::time::interval(Duration::from_secs(1));
    let mut code = ExitCode::SUCCESS;

    loop {
        tokio::select! {
            received = updates.recv() => {
                let Some((_, update)) = received else {
                    break;
                };
                println!("{}", render(&update, pretty)?);
                if update.terminal {
                    code = exit_code(&update);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, unsubscribing from {}", request.target);
                runtime.manager.unsubscribe(&request.target).await;
                break;
            }
            _ = liveness.tick() => {
                if !runtime.manager.is_subscribed(&request.target) && updates.is_empty() {
                    info!("Subscription to {} ended", request.target);
                    break;
                }
            }
        }
    }

    runtime.server_state.mark_not_ready();
    if let Some(handle) = runtime.server_handle {
        handle.abort();
    }
    Ok(code)
}
