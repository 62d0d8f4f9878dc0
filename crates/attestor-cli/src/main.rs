use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use attestor_core::app::Agent;
use attestor_core::config::AgentConfig;
use attestor_core::domain::{ClaimRecord, OperatorAddress, TaskStatus};
use attestor_core::impls::{InMemoryLedger, StaticProofService};
use attestor_core::ports::SystemClock;

#[derive(Debug, Parser)]
#[command(name = "attestor")]
#[command(about = "Runs the validator agent against an in-memory ledger")]
struct Args {
    /// TOML config. Without it a short-interval demo config is used.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "0x00000000000000000000000000000000000000a1")]
    operator: String,

    #[arg(long, default_value = "info")]
    log: String,
}

fn demo_config(operator: OperatorAddress) -> AgentConfig {
    AgentConfig {
        poll_interval_ms: 1_000,
        grace_window_ms: 200,
        ..AgentConfig::for_operator(operator)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log))
        .init();

    let config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => demo_config(OperatorAddress::new(args.operator)),
    };

    let ledger = InMemoryLedger::default();
    ledger
        .insert_claim(ClaimRecord {
            issue_id: "demo-issue".to_string(),
            claim_index: 0,
            pr_link: "https://github.com/acme/app/pull/1".to_string(),
            is_merged: true,
            developer: "0x00000000000000000000000000000000000000d3".to_string(),
            is_validated: false,
            timestamp: Utc::now(),
            access_token: None,
        })
        .await;

    let operator = config.operator.clone();
    let agent = Agent::start(
        config,
        Arc::new(ledger.client(operator.clone())),
        Arc::new(StaticProofService::merged_by("octocat", "583231")),
        Arc::new(SystemClock),
    )?;

    let task_id = ledger
        .create_task(
            "demo-issue",
            0,
            "https://github.com/acme/app/pull/1",
            "0x00000000000000000000000000000000000000d3",
        )
        .await;
    ledger.assign(task_id, &operator).await?;
    tracing::info!(%task_id, %operator, "demo task assigned");

    let done = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let validated = ledger
                .task_snapshot(task_id)
                .await
                .is_some_and(|t| t.status == TaskStatus::Validated);
            if validated {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if done.is_err() {
        tracing::warn!(%task_id, "demo task was not validated in time");
    }

    println!("{}", serde_json::to_string_pretty(&agent.status())?);
    for submission in ledger.submissions().await {
        println!(
            "submitted: task={} operator={} is_valid={}",
            submission.task_id, submission.operator, submission.is_valid
        );
    }

    agent.stop().await;
    Ok(())
}

