//! Student roster terminal client

use std::io::read_to_string;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use roster::{AuthGateway, RosterGateway, SessionCache};
use tokio::io::BufReader;
use tracing::{error, info};

use crate::backend::Backend;
use crate::config::{Config, LogFormat};
use crate::opt::Opt;
use crate::shell::Shell;
use crate::store::TomlStore;

mod backend;
mod config;
mod opt;
mod shell;
mod store;

/// Initializes tracing collection
///
/// Logs go to stderr, stdout belongs to the shell output.
fn setup_tracing(config: config::Logging) {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let filter_layer = config
        .filters
        .into_iter()
        .fold(filter_layer, |layer, filter| layer.add_directive(filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "Cannot listen for interrupts");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let Opt {
        config: mut config_file,
        command,
    } = Opt::parse();

    let config = read_to_string(&mut config_file)?;
    let config: Config = toml::from_str(&config)?;

    setup_tracing(config.logging);
    color_eyre::install()?;

    info!(
        config = ?config_file.path().path(),
        "Tracing initialized, connecting the backend"
    );

    let backend = Backend::with_config(config.backend).await?;
    let cache = SessionCache::new(Arc::new(TomlStore::open(config.session.path)));
    let auth = AuthGateway::new(backend.identity(), cache);
    let roster = RosterGateway::new(backend.documents());

    let mut shell = Shell::new(
        auth,
        roster,
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
    );

    match shell.run(command, interrupted()).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
