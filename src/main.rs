//! relay-server
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI flags / env ──▶ config (TOML + overrides + validation)
//!                              │
//!                              ▼
//!   credentials ─▶ identity ─▶ backends (standalone | clustered)
//!                              │
//!                              ▼
//!                        ServiceGraph::build
//!        routing · webhooks · rooms · egress · ingress · sip · agents · http
//!                              │
//!                              ▼
//!   signals ─▶ LifecycleManager ─▶ start ─▶ serve ─▶ stop(graceful | forced)
//! ```

use std::io;
use std::process::ExitCode;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use relay_server::cli::{commands, Cli, Command};
use relay_server::config::{load_config, ServerConfig};
use relay_server::lifecycle::{run_server, ServerError};
use relay_server::observability::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let conf = match load(&cli) {
        Ok(conf) => conf,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    if let Err(e) = init_logging(&conf.logging) {
        eprintln!("{}", ServerError::from(e));
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Some(Command::GenerateKeys) => {
            commands::generate_keys(&mut StdRng::from_entropy(), &mut io::stdout())
                .map_err(ServerError::Output)
        }
        Some(Command::Ports) => commands::ports(&conf, &mut io::stdout()).map_err(ServerError::Output),
        Some(Command::ListNodes) => commands::list_nodes(&conf, &mut io::stdout()).await,
        None => return serve(conf).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn load(cli: &Cli) -> Result<ServerConfig, ServerError> {
    let overrides = cli.overrides()?;
    Ok(load_config(
        cli.config.as_deref(),
        &cli.config_body,
        cli.strict_config(),
        &overrides,
    )?)
}

/// Run the server on its own task so a panic surfaces as a join error.
async fn serve(conf: ServerConfig) -> ExitCode {
    let server = tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        run_server(conf, &mut rng).await
    });

    match server.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Server exited with error");
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
        Err(e) if e.is_panic() => {
            tracing::error!(error = %e, "Server crashed");
            ExitCode::from(1)
        }
        Err(e) => {
            tracing::error!(error = %e, "Server task cancelled");
            ExitCode::FAILURE
        }
    }
}
