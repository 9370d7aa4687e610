//! Dockwatch CLI - Command-line client for the scan-control server
//!
//! Requests image and container scans, starts and stops runtime monitoring
//! sessions, and lists recorded scan history. Every command prints the server's
//! JSON reply and exits with a status derived from the HTTP status code.

pub mod client;
mod commands;

pub use client::{ApiReply, ClientError, DockwatchClient, MonitorAction};

use clap::{ArgGroup, Args, Parser, Subcommand};

/// Dockwatch - container scan admission and monitoring from the command line
#[derive(Parser, Debug)]
#[command(
    name = "dockwatch-cli",
    version,
    about = "Request container security scans and runtime monitoring",
    long_about = "Dockwatch CLI talks to a running dockwatch server to request image and \
                  container scans, start or stop runtime behaviour monitoring, and list \
                  recorded scan history."
)]
pub struct Cli {
    /// Base URL of the dockwatch server
    #[arg(
        long,
        global = true,
        env = "DOCKWATCH_SERVER",
        default_value = "http://127.0.0.1:5000"
    )]
    pub server: String,

    /// Request timeout in seconds (image pulls happen inside the request)
    #[arg(long, global = true, default_value_t = 600)]
    pub timeout: u64,

    /// Log requests and responses to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Request a vulnerability scan of an image or a running container
    Check(CheckArgs),

    /// Start or stop runtime behaviour monitoring of a container
    Monitor(MonitorArgs),

    /// List recorded scans of an image
    History(HistoryArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(subcommand)]
    pub target: CheckTarget,
}

#[derive(Subcommand, Debug)]
pub enum CheckTarget {
    /// Scan an image, pulling it when it is not present locally
    Image {
        /// Image reference, e.g. `redis` or `library/nginx:1.27`
        image_name: String,
    },
    /// Scan the image a running container was created from
    Container {
        /// Docker container id
        container_id: String,
    },
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["start", "stop"])
))]
pub struct MonitorArgs {
    /// Docker container id
    pub container_id: String,

    /// Start a monitoring session
    #[arg(long)]
    pub start: bool,

    /// Stop the active monitoring session and print its record
    #[arg(long)]
    pub stop: bool,
}

impl MonitorArgs {
    pub fn action(&self) -> MonitorAction {
        if self.stop {
            MonitorAction::Stop
        } else {
            MonitorAction::Start
        }
    }
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Image reference the scans were recorded under
    pub image_name: String,

    /// Only show the scan with this id
    #[arg(long)]
    pub id: Option<String>,
}

/// Run the parsed command and return the process exit code
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    commands::run(cli).await
}

/// Exit codes for scripting
pub mod exit_codes {
    /// Server answered with a 2xx status
    pub const SUCCESS: i32 = 0;
    /// Server rejected the request (4xx)
    pub const CLIENT_ERROR: i32 = 2;
    /// Server could not be reached
    pub const NETWORK_ERROR: i32 = 3;
    /// Server error or unexpected failure
    pub const INTERNAL_ERROR: i32 = 99;
}
