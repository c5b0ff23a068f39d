use clap::Parser;
use meetbot_probe::cli::Cli;
use meetbot_probe::client::HttpTransport;
use meetbot_probe::commands;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "meetbot_probe=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FAILED: could not start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let code = rt.block_on(async {
        let transport = match HttpTransport::new() {
            Ok(t) => t,
            Err(e) => {
                eprintln!("FAILED: {e}");
                return 1;
            }
        };

        let cancel_token = CancellationToken::new();
        spawn_signal_handler(cancel_token.clone());

        let mut stdout = std::io::stdout();
        commands::run(cli, transport, cancel_token, &mut stdout).await
    });

    ExitCode::from(code)
}

fn spawn_signal_handler(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!("Failed to register SIGTERM handler: {e}");
                        return;
                    }
                };
            tokio::select! {
                result = ctrl_c => {
                    if let Err(e) = result {
                        tracing::warn!("Failed to listen for Ctrl+C: {e}");
                        return;
                    }
                    tracing::info!("Received SIGINT, cancelling...");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, cancelling...");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = ctrl_c.await {
                tracing::warn!("Failed to listen for Ctrl+C: {e}");
                return;
            }
            tracing::info!("Received Ctrl+C, cancelling...");
        }
        cancel_token.cancel();
    });
}
