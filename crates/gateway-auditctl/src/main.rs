//! Offline audit/approval inspection CLI (ambient tooling, not in
//! spec.md's tool catalog, but the kind of operational surface every
//! sibling crate in this workspace ships). Grounded directly on
//! `replay-cli`'s `clap` derive `Cli`/`Command` skeleton and
//! `Cli::parse()` dispatch; the WAL-replay domain logic is replaced with
//! reads against `gateway-store`'s `audits`/`approvals` trees.

#![deny(unsafe_code)]

use clap::{Parser, Subcommand};
use gateway_audit::{Filters, Status};
use gateway_store::Store;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "gateway-auditctl", about = "Inspect a trust gateway's audit log and approval requests offline")]
struct Cli {
    /// Path to the sled store (defaults to `DATABASE_URL`).
    #[arg(long, global = true)]
    database_url: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List recent audit entries, optionally filtered.
    Query {
        #[arg(long)]
        plugin_id: Option<String>,
        #[arg(long)]
        tool_name: Option<String>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long)]
        agent_name: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Fetch one audit entry by id.
    Get { id: String },
    /// Print aggregate stats (by action/status/plugin/agent).
    Stats {
        #[arg(long)]
        since_ms: Option<u64>,
        #[arg(long)]
        until_ms: Option<u64>,
    },
    /// Delete audit entries older than `retention_days`.
    Cleanup {
        #[arg(long)]
        retention_days: u64,
    },
    /// List approval requests, optionally filtered by status.
    Approvals {
        #[arg(long, value_enum)]
        status: Option<ApprovalStatusArg>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum StatusArg {
    Success,
    Denied,
    Error,
}

impl From<StatusArg> for Status {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Success => Status::Success,
            StatusArg::Denied => Status::Denied,
            StatusArg::Error => Status::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ApprovalStatusArg {
    Pending,
    Approved,
    Denied,
}

impl From<ApprovalStatusArg> for gateway_policy::approval::ApprovalStatus {
    fn from(s: ApprovalStatusArg) -> Self {
        match s {
            ApprovalStatusArg::Pending => gateway_policy::approval::ApprovalStatus::Pending,
            ApprovalStatusArg::Approved => gateway_policy::approval::ApprovalStatus::Approved,
            ApprovalStatusArg::Denied => gateway_policy::approval::ApprovalStatus::Denied,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let database_url = cli
        .database_url
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "./data/gateway.sled".to_string());

    let store = match Store::open(&database_url) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to open store at {database_url}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.cmd {
        Command::Query { plugin_id, tool_name, status, agent_name, limit } => {
            cmd_query(&store, plugin_id, tool_name, status.map(Status::from), agent_name, limit)
        }
        Command::Get { id } => cmd_get(&store, &id),
        Command::Stats { since_ms, until_ms } => cmd_stats(&store, since_ms, until_ms),
        Command::Cleanup { retention_days } => cmd_cleanup(&store, retention_days),
        Command::Approvals { status } => cmd_approvals(&store, status.map(gateway_policy::approval::ApprovalStatus::from)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_query(
    store: &Store,
    plugin_id: Option<String>,
    tool_name: Option<String>,
    status: Option<Status>,
    agent_name: Option<String>,
    limit: usize,
) -> Result<(), String> {
    let filters = Filters { plugin_id, tool_name, status, agent_name, limit: Some(limit), ..Default::default() };
    let entries = gateway_audit::query(store, &filters).map_err(|e| e.to_string())?;
    for entry in &entries {
        println!("{}", serde_json::to_string(entry).map_err(|e| e.to_string())?);
    }
    eprintln!("{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    Ok(())
}

fn cmd_get(store: &Store, id: &str) -> Result<(), String> {
    match gateway_audit::get_by_id(store, id).map_err(|e| e.to_string())? {
        Some(entry) => {
            println!("{}", serde_json::to_string_pretty(&entry).map_err(|e| e.to_string())?);
            Ok(())
        }
        None => Err(format!("no audit entry with id {id}")),
    }
}

fn cmd_stats(store: &Store, since_ms: Option<u64>, until_ms: Option<u64>) -> Result<(), String> {
    let stats = gateway_audit::get_stats(store, since_ms, until_ms).map_err(|e| e.to_string())?;
    println!("{}", serde_json::to_string_pretty(&stats).map_err(|e| e.to_string())?);
    Ok(())
}

fn cmd_cleanup(store: &Store, retention_days: u64) -> Result<(), String> {
    let removed = gateway_audit::cleanup(store, retention_days).map_err(|e| e.to_string())?;
    eprintln!("removed {removed} entries older than {retention_days} day(s)");
    Ok(())
}

fn cmd_approvals(store: &Store, status: Option<gateway_policy::approval::ApprovalStatus>) -> Result<(), String> {
    let approvals = gateway_policy::approval::list(store, status).map_err(|e| e.to_string())?;
    for approval in &approvals {
        println!("{}", serde_json::to_string(approval).map_err(|e| e.to_string())?);
    }
    eprintln!("{} approval request(s)", approvals.len());
    Ok(())
}
