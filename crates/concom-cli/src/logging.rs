use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Each `-v` lowers the threshold one
/// level; an explicit `RUST_LOG` wins over the flag.
pub fn init(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
