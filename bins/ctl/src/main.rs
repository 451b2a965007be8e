//! tcflowctl - traffic-control policy tool
//!
//! Compiles declarative bandwidth policies into HTB topologies and runs
//! them through the event-sourced pipeline against the in-memory kernel
//! adapter (dry-run / simulation; the netlink transport plugs in behind
//! the same adapter trait).

use clap::{Parser, Subcommand};
use tcflow::Result;

mod commands;

use commands::apply::ApplyCmd;
use commands::plan::PlanCmd;

#[derive(Parser)]
#[command(name = "tcflowctl")]
#[command(about = "Traffic-control policy tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Output JSON
    #[arg(short = 'j', long, global = true)]
    json: bool,

    /// Pretty print JSON
    #[arg(short = 'p', long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a policy and print the resulting command sequence
    #[command(visible_alias = "p")]
    Plan(PlanCmd),

    /// Run a policy through the pipeline and show the materialized topology
    #[command(visible_alias = "a")]
    Apply(ApplyCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Plan(cmd) => cmd.run(cli.json, cli.pretty),
        Command::Apply(cmd) => cmd.run(cli.json, cli.pretty).await,
    }
}
