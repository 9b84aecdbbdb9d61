pub mod commands;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::cli_commands::{self, Cli};

pub use commands::rename_pipeline::{RunController, RunOptions};
pub use error::AppError;
pub use models::input_file::InputFile;
pub use services::rename_service::RenameEngine;
pub use state::{RunSnapshot, RunStatus};

const DEFAULT_LOG_FILTER: &str = "structor_lib=warn";

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let _guard = std::env::var("SENTRY_DSN")
        .ok()
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    send_default_pii: false,
                    ..Default::default()
                },
            ))
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(cli_commands::dispatch(cli));
    // stdin reads park a blocking thread that would otherwise hold shutdown
    runtime.shutdown_background();
    result
}
