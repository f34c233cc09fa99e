//! `backfill`: encrypts plaintext columns of an existing SQLite table in place.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from `FIELDCRYPT_*` environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Register the configured keys in the process-wide [`KeyRegistry`].
//! 4. Open the database and re-encrypt every configured column.
//! 5. Print a JSON [`migrate::BackfillReport`] to stdout.

mod config;
mod migrate;
mod telemetry;

use anyhow::{Context, Result};
use fieldcrypt::KeyRegistry;
use rusqlite::Connection;
use tracing::info;

use config::Config;

fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: backfill configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        table = %cfg.table,
        dry_run = cfg.dry_run,
        "backfill starting"
    );

    // -----------------------------------------------------------------------
    // 3. Keys
    // -----------------------------------------------------------------------
    let registry = KeyRegistry::global();
    if let Some(hex_key) = &cfg.default_key {
        registry
            .init_default_key(hex_key)
            .context("failed to register DEFAULT_KEY")?;
    }
    let named = cfg.named_keys()?;
    if !named.is_empty() {
        registry
            .init_keys(named)
            .context("failed to register NAMED_KEYS")?;
    }
    if !registry.contains(&cfg.key_name) {
        anyhow::bail!("KEY_NAME {:?} is not among the registered keys", cfg.key_name);
    }

    // -----------------------------------------------------------------------
    // 4. Backfill
    // -----------------------------------------------------------------------
    let mut conn = Connection::open(&cfg.database_path)
        .with_context(|| format!("failed to open database {}", cfg.database_path))?;
    let report = migrate::run(&mut conn, &cfg, registry)?;

    // -----------------------------------------------------------------------
    // 5. Report
    // -----------------------------------------------------------------------
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
