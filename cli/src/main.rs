use clap::Parser;
use faultline_cli::FaultlineCli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = FaultlineCli::parse();
    init_logging(cli.verbose);
    cli.run().await
}

/// Log to stderr so stdout stays machine readable. Records from the library
/// crates' `log` macros are forwarded into the subscriber.
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
