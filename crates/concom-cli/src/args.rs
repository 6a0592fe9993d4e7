use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "concom",
    version,
    about = "Continuous compliance agent: evaluates policy controls against plugin-collected data"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Long running agent for continuously checking policies against
    /// plugin data
    Agent(AgentArgs),
}

#[derive(clap::Args)]
pub struct AgentArgs {
    /// Location of config file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Run as a long running daemon
    #[arg(short, long)]
    pub daemon: bool,

    /// Enable verbose output (repeatable)
    #[arg(short, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
