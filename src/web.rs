#![cfg(not(tarpaulin_include))]

use fintrack::{app, config::Config};

/// Starts the FinTrack REST API.
///
/// Settings come from `FINTRACK_*` environment variables, logging from
/// `RUST_LOG` (default `info`).
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    log::info!(
        "data in {}, static files from {}, sessions last {}s",
        config.data_dir.display(),
        config.static_dir.display(),
        config.session_ttl.as_secs()
    );
    app::run(config).await
}
