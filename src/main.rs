use color_eyre::eyre::{
    Result,
    eyre,
};
use dao_dashboard::config::{
    self,
    Command,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod client;
mod ui;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "dao-dashboard.log";

/// The terminal belongs to the UI, so diagnostics go to a daily log file.
fn init_tracing() -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(LOG_DIR, LOG_FILE));
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _log_guard = init_tracing();
    tracing::info!("starting dao-dashboard");
    deployments::ensure_structure().map_err(|e| eyre!("{e:#}"))?;
    let app_config = match config::parse_args(std::env::args().skip(1))? {
        Command::Help => {
            println!("{}", config::usage());
            return Ok(());
        }
        Command::Run(app_config) => app_config,
    };
    client::run_app(app_config).await
}
