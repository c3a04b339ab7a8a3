//! Command line interface for the `scenario-sim` binary.
//!
//! Flags map onto [`SimulatorConfig`](scenario_sim::config::SimulatorConfig)
//! fields; the same definition drives man page generation in `build.rs`.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `scenario-sim` binary.
#[derive(Debug, Parser)]
#[command(
    name = "scenario-sim",
    version,
    about = "Scenario simulator reading inbound messages as JSON lines on stdin"
)]
pub struct Cli {
    /// Maximum number of scenarios running at once.
    #[arg(short, long, default_value_t = 10)]
    pub workers: usize,

    /// Default correlation wait, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub correlation_timeout_ms: u64,

    /// Time granted to running scenarios on shutdown, in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub shutdown_grace_ms: u64,

    /// Scenario launched for messages nothing else claims.
    #[arg(short, long)]
    pub default_scenario: Option<String>,

    /// Header naming the scenario an inbound message wants.
    #[arg(long, default_value = "scenario")]
    pub scenario_header: String,

    /// Delay between fax status updates, in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    pub fax_delay_ms: u64,

    /// Address serving Prometheus metrics.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
