//! chashd entry point.
//!
//! Builds the engine from command-line configuration and runs the
//! reconciliation scheduler until interrupted.

use clap::Parser;
use log::{info, warn};
use std::process::ExitCode;
use std::time::Duration;

use chashd::{
    ChashDaemon, ChashDaemonConfig, ChashOrchConfig, ConsistentHashOrch, CostModel, PoolConfig,
    ResourcePool,
};

/// Consistent-hash ECMP group manager daemon
#[derive(Parser, Debug)]
#[command(name = "chashd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Group-table budget in abstract resource units
    #[arg(long, default_value = "1024")]
    capacity: u64,

    /// Flat cost of a consistent-hash group
    #[arg(long, default_value = "64")]
    consistent_cost: u64,

    /// Per-member cost of a plain group
    #[arg(long, default_value = "1")]
    member_cost: u64,

    /// Reconciliation tick interval in milliseconds
    #[arg(long, default_value = "1000")]
    tick_interval: u64,

    /// Seconds the system must stay resolved before the sharing shortcut
    /// is trusted
    #[arg(long, default_value = "120")]
    stable_hysteresis: u64,

    /// Allocate plain (per-member cost) groups instead of consistent-hash
    /// groups
    #[arg(long)]
    plain_groups: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Dump the final state snapshot as JSON on shutdown
    #[arg(long)]
    dump_state: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("====================================================================");
    info!("Starting chashd");
    info!("====================================================================");
    info!("Pool capacity: {} units", args.capacity);
    info!(
        "Cost model: consistent={} per-member={}",
        args.consistent_cost, args.member_cost
    );
    info!("Tick interval: {}ms", args.tick_interval);
    info!("Stable hysteresis: {}s", args.stable_hysteresis);
    info!(
        "Admin mode: {}",
        if args.plain_groups { "plain" } else { "consistent" }
    );

    let pool = ResourcePool::new(PoolConfig {
        capacity: args.capacity,
        cost_model: CostModel {
            consistent_cost: args.consistent_cost,
            member_cost: args.member_cost,
        },
    });

    let engine = ConsistentHashOrch::new(
        ChashOrchConfig {
            stable_hysteresis: Duration::from_secs(args.stable_hysteresis),
            admin_consistent: !args.plain_groups,
        },
        pool,
    );

    let mut daemon = ChashDaemon::new(
        engine,
        ChashDaemonConfig {
            tick_interval: Duration::from_millis(args.tick_interval),
        },
    );

    daemon.run();
    info!("Scheduler running; waiting for shutdown signal");

    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("Received SIGINT, shutting down"),
        Err(err) => {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    daemon.stop();

    if args.dump_state {
        let snapshot = daemon.snapshot().await;
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{}", json),
            Err(err) => warn!("Failed to serialize state snapshot: {}", err),
        }
    }

    info!("chashd shutdown complete");
    ExitCode::SUCCESS
}
