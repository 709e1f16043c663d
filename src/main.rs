// external
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

// internal
use bet_uplink::cli::Cli;
use bet_uplink::config::ClientConfig;
use bet_uplink::shutdown::ShutdownToken;
use bet_uplink::source::BetReader;
use bet_uplink::uplink::UplinkClient;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::resolve(cli)?;
    tracing::info!(
        action = "resolve_config",
        result = "success",
        agency = config.agency,
        server = %config.server_addr,
        loop_period_ms = config.loop_period.as_millis() as u64,
        batch_max = config.batch_max,
    );

    let token = ShutdownToken::new();
    spawn_signal_listener(token.clone());

    let file = match tokio::fs::File::open(&config.data_file).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(
                action = "open_file",
                result = "fail",
                path = %config.data_file.display(),
                error = %e,
            );
            return Ok(());
        }
    };
    let source = BetReader::new(tokio::io::BufReader::new(file), config.agency);

    let client = UplinkClient::new(config, token);
    if let Err(e) = client.run(source).await {
        // a fatal loop error is reported through the log, not the exit code
        tracing::error!(action = "client_loop", result = "fail", error = %e);
    }
    Ok(())
}

/// SIGINT or SIGTERM flips the shutdown token; the loop does the rest.
fn spawn_signal_listener(token: ShutdownToken) {
    tokio::spawn(async move {
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
        tracing::info!(action = "signal_received", result = "success");
        token.cancel();
    });
}
