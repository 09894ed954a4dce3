use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing_flush_sink::app::App;
use tracing_flush_sink::config::ServiceConfig;
use tracing_flush_sink::init::{init_tracing, stdout_dispatch};

#[tokio::main]
async fn main() -> ExitCode {
    // Until the sink is connected, events only go to stdout.
    let startup = tracing::dispatcher::set_default(&stdout_dispatch());

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let app = match App::bootstrap(&config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "could not start");
            return ExitCode::FAILURE;
        }
    };

    drop(startup);
    if let Err(e) = init_tracing(app.telemetry(), &config.layer) {
        eprintln!("could not install tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    let listener = match TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.listen_addr, "server died");
            if let Err(e) = app.telemetry().flush().await {
                eprintln!("final telemetry flush failed: {}", e);
            }
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(addr = %config.listen_addr, "api is listening");

    // Telemetry is closed by now; stderr is all that is left.
    if let Err(e) = app.serve(listener).await {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
