use clap::Parser;
use inkbird2mqtt::app::{self, Options, Outcome};
use inkbird2mqtt::publish::mqtt::MqttPublisher;
use inkbird2mqtt::sensor::BleSensorReader;
use std::panic::{self, PanicHookInfo};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Log to stderr. `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

/// Perform one read-and-publish cycle and map the result to an exit code.
///
/// Meant to be invoked periodically by an external scheduler (cron, systemd
/// timer); every invocation is independent.
async fn run(options: Options) -> i32 {
    let config = match options.config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return EXIT_ERROR;
        }
    };

    let sensor = BleSensorReader::new(options.backend, options.timeout);
    let publisher = MqttPublisher::new(options.timeout);
    let now = chrono::Local::now().naive_local();

    match app::run_once(&config, &sensor, &publisher, now).await {
        Ok(Outcome::Published(_)) | Ok(Outcome::Skipped) => EXIT_SUCCESS,
        Err(_) => EXIT_ERROR,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for schedulers
    // (e.g., cron, systemd timers) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    init_logging(options.verbose);

    std::process::exit(run(options).await);
}
