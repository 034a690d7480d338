//! # Membership Expiry Sweeper
//!
//! Expires or renews lapsed memberships.
//!
//! ## Usage
//! ```bash
//! # Run on the configured interval until Ctrl-C
//! cargo run -p meeple-services --bin meeple-sweep
//!
//! # One sweep, then exit (for cron)
//! cargo run -p meeple-services --bin meeple-sweep -- --once
//!
//! # Explicit config file
//! cargo run -p meeple-services --bin meeple-sweep -- --config ./meeple.toml
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use meeple_db::Database;
use meeple_services::{init_tracing, ExpirySweeper, MembershipService, ServiceConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut once = false;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" => once = true,
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Meeple POS Membership Sweeper");
                println!();
                println!("Usage: meeple-sweep [OPTIONS]");
                println!();
                println!("Options:");
                println!("      --once           Run a single sweep and exit");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let config = Arc::new(ServiceConfig::load(config_path)?);
    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(Database::new(config.database.db_config()).await?);
    info!(path = ?config.database.path, "Database connected and migrations applied");

    let memberships = MembershipService::new(db.clone(), config.clone());
    let (sweeper, handle) = ExpirySweeper::new(memberships, config.sweeper.interval());

    if once {
        let processed = sweeper.run_once().await?;
        info!(processed, "Single sweep complete");
        db.close().await;
        return Ok(());
    }

    if !config.sweeper.enabled {
        info!("Sweeper disabled in configuration; nothing to do");
        db.close().await;
        return Ok(());
    }

    let task = tokio::spawn(sweeper.run());

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received");
    handle.shutdown().await?;
    task.await?;

    db.close().await;
    Ok(())
}
