//! Plaintext → ciphertext column backfill.
//!
//! Every row of the configured table is read, each configured column is
//! scanned through its field wrapper, and the wrapper's storage value is
//! written back. Because scanning tolerates plaintext, the same pass handles
//! rows that were never encrypted, rows that already were, and reruns.
//!
//! All updates run in one transaction. An encryption failure rolls back the
//! whole run.

use anyhow::{Context, Result};
use common::DbValue;
use fieldcrypt::{EncryptInt, EncryptString, FieldCodec, KeyRegistry, ValueError};
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Summary printed at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Rows read from the table.
    pub rows_scanned: u64,
    /// Column values encrypted (and written, unless `dry_run`).
    pub values_written: u64,
    /// Column values that were `NULL` and left as is.
    pub nulls: u64,
    /// Column values that could not be scanned and were left unchanged.
    pub skipped: u64,
    /// Whether writes were suppressed.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    Text,
    Integer,
}

#[derive(Debug)]
struct Column<'a> {
    name: &'a str,
    kind: ColumnKind,
}

/// Re-encrypt every configured column of `cfg.table` with `cfg.key_name`.
///
/// # Errors
///
/// Returns an error if the table cannot be read or written, or if any value
/// fails to encrypt. Nothing is written in that case.
pub fn run(conn: &mut Connection, cfg: &Config, registry: &KeyRegistry) -> Result<BackfillReport> {
    let columns: Vec<Column<'_>> = cfg
        .string_columns()
        .into_iter()
        .map(|name| Column {
            name,
            kind: ColumnKind::Text,
        })
        .chain(cfg.int_columns().into_iter().map(|name| Column {
            name,
            kind: ColumnKind::Integer,
        }))
        .collect();

    let rows = read_rows(conn, cfg, &columns)
        .with_context(|| format!("failed to read rows from {}", cfg.table))?;
    info!(table = %cfg.table, rows = rows.len(), columns = columns.len(), "rows loaded");

    let mut report = BackfillReport {
        dry_run: cfg.dry_run,
        ..Default::default()
    };

    let tx = conn.transaction().context("failed to begin transaction")?;
    {
        let mut update = tx
            .prepare(&update_sql(cfg, &columns))
            .context("failed to prepare update statement")?;

        for (id, values) in rows {
            report.rows_scanned += 1;
            let mut next = Vec::with_capacity(values.len() + 1);

            for (column, original) in columns.iter().zip(values) {
                if original.is_null() {
                    report.nulls += 1;
                    next.push(original);
                    continue;
                }
                match reencrypt(column, &original, registry, &cfg.key_name)
                    .with_context(|| format!("failed to encrypt column {} of row {id:?}", column.name))?
                {
                    Some(ciphertext) => {
                        report.values_written += 1;
                        next.push(ciphertext);
                    }
                    None => {
                        report.skipped += 1;
                        next.push(original);
                    }
                }
            }

            if !cfg.dry_run {
                next.push(id);
                update
                    .execute(params_from_iter(next.iter()))
                    .context("failed to write encrypted row")?;
            }
        }
    }
    tx.commit().context("failed to commit backfill")?;

    info!(
        rows = report.rows_scanned,
        written = report.values_written,
        skipped = report.skipped,
        dry_run = report.dry_run,
        "backfill complete"
    );
    Ok(report)
}

fn read_rows(
    conn: &Connection,
    cfg: &Config,
    columns: &[Column<'_>],
) -> rusqlite::Result<Vec<(DbValue, Vec<DbValue>)>> {
    let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    let sql = format!(
        "SELECT {}, {} FROM {}",
        cfg.id_column,
        names.join(", "),
        cfg.table
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        let id: DbValue = row.get(0)?;
        let values = (1..=columns.len())
            .map(|i| row.get::<_, DbValue>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((id, values))
    })?;
    let rows = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn update_sql(cfg: &Config, columns: &[Column<'_>]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", c.name, i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        cfg.table,
        assignments.join(", "),
        cfg.id_column,
        columns.len() + 1
    )
}

/// Scan `original` through the column's wrapper and return its ciphertext.
///
/// `Ok(None)` means the value could not be scanned and should stay as is.
fn reencrypt(
    column: &Column<'_>,
    original: &DbValue,
    registry: &KeyRegistry,
    key_name: &str,
) -> Result<Option<DbValue>, ValueError> {
    match column.kind {
        ColumnKind::Text => {
            let mut field = EncryptString::with_registry(registry.clone(), key_name, None);
            if !scan_into(&mut field, original, column.name) {
                return Ok(None);
            }
            field.value().map(Some)
        }
        ColumnKind::Integer => {
            let mut field = EncryptInt::with_registry(registry.clone(), key_name, None);
            match original {
                // An unmigrated integer column hands us the plain number.
                DbValue::Integer(n) => field.set_raw(Some(*n)),
                other => {
                    if !scan_into(&mut field, other, column.name) {
                        return Ok(None);
                    }
                }
            }
            field.value().map(Some)
        }
    }
}

/// Returns `true` when the wrapper holds a usable value after scanning.
fn scan_into<C: FieldCodec>(field: &mut C, original: &DbValue, column: &str) -> bool {
    match field.scan(original.clone()) {
        Ok(()) => true,
        Err(e) if !e.is_fatal() => {
            debug!(column, reason = %e.kind(), "plaintext value will be encrypted");
            true
        }
        Err(e) => {
            warn!(column, reason = %e.kind(), source_type = original.type_name(), "value skipped");
            false
        }
    }
}
