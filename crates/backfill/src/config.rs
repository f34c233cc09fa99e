//! Configuration loading and validation for the backfill binary.
//!
//! All values are read from `FIELDCRYPT_*` environment variables at startup.
//! The process exits with a clear error message if any required variable is
//! missing or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated backfill configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Path to the SQLite database file. **Required.**
    pub database_path: String,

    /// Table whose columns are encrypted in place. **Required.**
    pub table: String,

    /// Column that identifies a row for the write-back.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Comma-separated text columns to encrypt.
    #[serde(default)]
    pub string_columns: String,

    /// Comma-separated integer columns to encrypt.
    #[serde(default)]
    pub int_columns: String,

    /// Hex-encoded key registered under the default key name.
    #[serde(default)]
    pub default_key: Option<String>,

    /// Additional keys as `name=hex,name=hex`.
    #[serde(default)]
    pub named_keys: Option<String>,

    /// Name of the key used to encrypt every configured column.
    #[serde(default = "default_key_name")]
    pub key_name: String,

    /// Scan and re-encrypt without writing anything back.
    #[serde(default)]
    pub dry_run: bool,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_id_column() -> String {
    "id".into()
}
fn default_key_name() -> String {
    fieldcrypt::DEFAULT_KEY_NAME.into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("FIELDCRYPT"))
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Text columns, in configuration order.
    pub fn string_columns(&self) -> Vec<&str> {
        split_list(&self.string_columns)
    }

    /// Integer columns, in configuration order.
    pub fn int_columns(&self) -> Vec<&str> {
        split_list(&self.int_columns)
    }

    /// Parse `named_keys` into `(name, hex)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry has no `=` or an empty name.
    pub fn named_keys(&self) -> Result<Vec<(String, String)>> {
        let Some(raw) = &self.named_keys else {
            return Ok(Vec::new());
        };
        split_list(raw)
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                // The entry may be bare key material; report its position only.
                let (name, key) = entry
                    .split_once('=')
                    .with_context(|| format!("NAMED_KEYS entry {} has no '='", i + 1))?;
                let name = name.trim();
                if name.is_empty() {
                    anyhow::bail!("NAMED_KEYS contains an entry with an empty name");
                }
                Ok((name.to_owned(), key.trim().to_owned()))
            })
            .collect()
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.database_path, "DATABASE_PATH")?;
        ensure_identifier(&self.table, "TABLE")?;
        ensure_identifier(&self.id_column, "ID_COLUMN")?;
        ensure_non_empty(&self.key_name, "KEY_NAME")?;

        let strings = self.string_columns();
        let ints = self.int_columns();
        if strings.is_empty() && ints.is_empty() {
            anyhow::bail!("at least one of STRING_COLUMNS or INT_COLUMNS must be set");
        }
        for column in strings.iter().chain(&ints) {
            ensure_identifier(column, "column name")?;
            if *column == self.id_column {
                anyhow::bail!("ID_COLUMN {column} cannot also be encrypted");
            }
        }
        if let Some(column) = strings.iter().find(|c| ints.contains(*c)) {
            anyhow::bail!("column {column} is listed in both STRING_COLUMNS and INT_COLUMNS");
        }

        if self.default_key.is_none() && self.named_keys.is_none() {
            anyhow::bail!("at least one of DEFAULT_KEY or NAMED_KEYS must be set");
        }
        self.named_keys()?;
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

/// Table and column names are interpolated into SQL, so only plain
/// identifiers are accepted.
fn ensure_identifier(value: &str, name: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("{name} {value:?} is not a plain SQL identifier");
    }
    Ok(())
}
