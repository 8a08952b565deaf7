//! ADS-B fan-out relay
//!
//! Run with: adsb-router [CONFIG_PATH]
//!
//! Without a config path the relay listens on 0.0.0.0:30004 with no outputs.
//! See `adsb-router.json` for a config feeding the public aggregators.
//!
//! Point the feeder at the relay, e.g. with readsb:
//!   --net-connector <relay-host>,30004,beast_out

use std::sync::Arc;

use adsb_router::{shutdown, RouterConfig, RouterManager, RouterService};

fn print_usage() {
    eprintln!("Usage: adsb-router [CONFIG_PATH]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  CONFIG_PATH    JSON config file (default: listen on 0.0.0.0:30004, no outputs)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG       Log filter (default: info)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match args.get(1) {
        Some(path) => RouterConfig::from_json_file(path)?,
        None => RouterConfig::default(),
    };

    let (trigger, signal) = shutdown::channel();
    let manager = Arc::new(RouterManager::new(
        config.input.clone(),
        config.output.clone(),
        signal.clone(),
    ));
    let added = manager.add_targets(&config.outputs).await;
    tracing::info!(outputs = added, bind = %config.input.bind_addr, "Router configured");

    let service = RouterService::new(Arc::clone(&manager));
    let mut running = tokio::spawn(async move { service.run(signal).await });

    let result = tokio::select! {
        result = &mut running => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            trigger.trigger();
            running.await
        }
    };

    manager.close().await;
    result??;
    Ok(())
}
