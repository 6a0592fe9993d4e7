use clap::Parser;

mod args;
mod commands;
mod exit_codes;
mod logging;

use args::{Cli, Command};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Agent(agent_args) => commands::agent::run(agent_args).await,
    };
    std::process::exit(code);
}
