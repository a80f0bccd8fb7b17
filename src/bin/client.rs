//! rgpst Client Binary
//!
//! Brings up a GPST tunnel to a GlobalProtect gateway using a cookie from a
//! prior login, then services it until interrupted.

use log::{debug, error, info, warn};
use rgpst::{
    config::Config,
    crypto::TlsConnector,
    error::{GpstError, Result},
    GpstClient, Wake,
};
use std::env;
use std::process;
use std::time::Duration;
use tokio::signal;

const WAKE_INTERVAL: Duration = Duration::from_millis(10);

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 2 && args[1] == "--config" {
        args[2].as_str()
    } else if args.len() > 1 && !args[1].starts_with("--") {
        args[1].as_str()
    } else if args.len() > 1 {
        print_usage();
        return;
    } else {
        "config.toml"
    };

    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();
    info!("Starting rgpst client v{}", rgpst::VERSION);
    info!("Loaded configuration from: {config_path}");

    if let Err(e) = run(&config).await {
        error!("{e}");
        error!("Quit reason: {}", e.quit_reason());
        process::exit(1);
    }
}

async fn run(config: &Config) -> Result<()> {
    let cookie = match &config.auth.cookie {
        Some(cookie) => cookie.clone(),
        None => env::var("GPST_COOKIE").map_err(|_| {
            GpstError::Config("no cookie in [auth] and GPST_COOKIE is not set".to_string())
        })?,
    };

    let connector = TlsConnector::from_server_config(&config.server)?;
    let mut client = GpstClient::new(config, &cookie, connector)?;

    info!(
        "Connecting to {}:{}...",
        config.server.hostname, config.server.port
    );
    let tunnel = client.connect()?;
    info!(
        "Tunnel up: address {} netmask {} mtu {}",
        tunnel.addr, tunnel.netmask, tunnel.mtu
    );

    let mut shutdown = Box::pin(shutdown_signal());
    let mut ticker = tokio::time::interval(WAKE_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("Client is running. Press Ctrl+C to disconnect.");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                match client.wake()? {
                    Wake::NoWork => {}
                    Wake::WorkDone => {
                        while let Some(packet) = client.recv_packet() {
                            debug!("Inbound packet, {} bytes", packet.len());
                        }
                    }
                    Wake::MustReconnect => warn!("Tunnel re-established"),
                }
            }
        }
    }

    client.disconnect();
    info!("Disconnected");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {e}");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => debug!("Received Ctrl+C"),
            _ = sigterm.recv() => debug!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        debug!("Received Ctrl+C");
    }
}

fn print_usage() {
    println!("rgpst client v{}", rgpst::VERSION);
    println!();
    println!("USAGE:");
    println!("    rgpst-client [--config] [CONFIG_FILE]");
    println!();
    println!("ARGS:");
    println!("    CONFIG_FILE    Path to configuration file (default: config.toml)");
    println!();
    println!("The login cookie is read from [auth] cookie, or from GPST_COOKIE.");
}
