use tracing::error;

use concom_agent::{Agent, AgentError, AgentOptions};
use concom_config::{AgentConfig, CliOverrides};

use crate::args::AgentArgs;
use crate::exit_codes;
use crate::logging;

pub async fn run(args: AgentArgs) -> i32 {
    let overrides = CliOverrides {
        daemon: args.daemon.then_some(true),
        verbosity: (args.verbose > 0).then_some(args.verbose),
    };

    // The effective verbosity lives in the merged config, so peek at it
    // before installing the subscriber. A broken config still gets a
    // logger (from the flag alone) so the failure is visible.
    let verbosity = AgentConfig::load(&args.config)
        .map(|mut config| {
            config.merge_overrides(&overrides);
            config.verbosity
        })
        .unwrap_or(args.verbose);
    logging::init(verbosity);

    let mut options = AgentOptions::new(&args.config);
    options.overrides = overrides;

    match Agent::new(options).run().await {
        Ok(()) => exit_codes::SUCCESS,
        Err(err @ AgentError::Config(_)) => {
            error!("{err}");
            exit_codes::CONFIG_ERROR
        }
        Err(err) => {
            error!("error running agent: {err}");
            exit_codes::RUNTIME_ERROR
        }
    }
}
