use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "hacoord",
    about = "High-availability coordinator for a virtualization management plane",
    version
)]
pub struct Cli {
    /// Path to the HA config YAML file. Missing file loads all defaults.
    #[arg(long, env = "HACOORD_CONFIG", default_value = "hacoord.yml", global = true)]
    pub config: PathBuf,

    /// Work item store backing.
    #[arg(long, env = "HACOORD_STORE", value_enum, default_value = "memory", global = true)]
    pub store: StoreBackend,

    /// Path to the redb database file, when `--store redb`.
    #[arg(long, env = "HACOORD_STORE_PATH", default_value = "hacoord.redb", global = true)]
    pub store_path: PathBuf,

    /// This peer's identity, used for lease ownership.
    #[arg(long, env = "HACOORD_SERVER_ID", default_value = "hacoord-local", global = true)]
    pub server_id: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum StoreBackend {
    Memory,
    Redb,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the worker pool, cleanup task, and peer coordinator; blocks until signalled.
    Run,

    /// Submit one work item via the Scheduler API.
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },

    /// Run a synchronous investigation and print the result.
    Investigate {
        /// Host id to investigate.
        host: String,
    },

    /// Summarize WorkItem counts by step and work type.
    Status,

    /// Run one cleanup pass immediately.
    Cleanup,
}

#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    /// Schedule a restart for a VM.
    Restart {
        vm: String,
        host: String,
        #[arg(long)]
        investigate: bool,
    },

    /// Schedule stop-family work for a VM.
    Stop {
        vm: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long, value_enum, default_value = "stop")]
        work_type: StopWorkTypeArg,
    },

    /// Schedule a migration for a VM.
    Migration { vm: String, host: String },

    /// Schedule destruction of a VM.
    Destroy {
        vm: String,
        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Debug, Clone, ValueEnum)]
pub enum StopWorkTypeArg {
    Stop,
    CheckStop,
    ForceStop,
}
