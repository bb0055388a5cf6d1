use tracing_subscriber::EnvFilter;

pub fn init_logging(verbose: bool) {
    let fallback = if verbose {
        "billing_monitor=debug"
    } else {
        "billing_monitor=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
