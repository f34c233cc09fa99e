//! Typed column wrappers that encrypt on write and decrypt on read.
//!
//! Each wrapper holds an optional plaintext value and the name of the key it
//! is bound to. The storage layer drives it through [`FieldCodec`]:
//! - [`FieldCodec::scan`] takes the raw column value read from storage.
//! - [`FieldCodec::value`] produces the raw column value to write back.
//!
//! # Plaintext tolerance
//!
//! `scan` treats a value that fails to decrypt as plaintext that has not been
//! encrypted yet. This lets a column switch from plaintext to ciphertext
//! without a separate migration: old rows still read correctly, and the next
//! write stores them encrypted. Faults raised while decrypting are contained
//! at the `scan` boundary and take the same path.

pub mod int;
pub mod string;

pub use int::EncryptInt;
pub use string::EncryptString;

use std::any::Any;
use std::num::ParseIntError;
use std::panic::{self, AssertUnwindSafe};

use common::{DbValue, ErrorKind};
use thiserror::Error;
use tracing::warn;

use crate::crypto::CipherError;

/// Scan-from-storage / produce-for-storage contract shared by all wrappers.
pub trait FieldCodec {
    /// Populate the wrapper from a raw storage value.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`]; check [`ScanError::is_fatal`] before treating
    /// it as a failure, since some wrappers report recovered values.
    fn scan(&mut self, src: DbValue) -> Result<(), ScanError>;

    /// Produce the raw value to store: ciphertext text, or `Null`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValueError`] carrying the plaintext fallback when encryption
    /// fails. The caller decides whether to store the fallback or abort.
    fn value(&self) -> Result<DbValue, ValueError>;

    /// Name of the registry key this wrapper encrypts with.
    fn key_name(&self) -> &str;
}

/// Errors reported by [`FieldCodec::scan`].
#[derive(Debug, Error)]
pub enum ScanError {
    /// The storage value is neither null nor text.
    #[error("incompatible type for scan: {0}")]
    IncompatibleSourceType(&'static str),

    /// The plaintext is not a decimal integer.
    #[error("value is not an integer: {0}")]
    NotAnInteger(#[source] ParseIntError),

    /// The value did not decrypt but was recovered as plaintext.
    #[error("value was read as plaintext: {0}")]
    Decrypt(#[from] CipherError),
}

impl ScanError {
    /// Classify this error in the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::IncompatibleSourceType(_) => ErrorKind::IncompatibleSourceType,
            ScanError::NotAnInteger(_) => ErrorKind::NotAnInteger,
            ScanError::Decrypt(e) => e.kind(),
        }
    }

    /// Returns `false` when the wrapper still holds a usable value.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ScanError::Decrypt(_))
    }
}

/// Error reported by [`FieldCodec::value`] when encryption fails.
#[derive(Debug, Error)]
#[error("failed to encrypt field value: {source}")]
pub struct ValueError {
    /// The plaintext value, in storage form.
    pub fallback: DbValue,
    /// Why encryption failed.
    #[source]
    pub source: CipherError,
}

impl ValueError {
    /// Classify this error in the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Take the plaintext fallback value.
    pub fn into_fallback(self) -> DbValue {
        self.fallback
    }
}

/// Extract text from a storage value.
///
/// `Ok(None)` is SQL `NULL`. Byte sequences must hold UTF-8 text.
fn source_text(src: DbValue) -> Result<Option<String>, ScanError> {
    match src {
        DbValue::Null => Ok(None),
        DbValue::Text(s) => Ok(Some(s)),
        DbValue::Bytes(b) => String::from_utf8(b)
            .map(Some)
            .map_err(|_| ScanError::IncompatibleSourceType("non-UTF-8 bytes")),
        other => Err(ScanError::IncompatibleSourceType(other.type_name())),
    }
}

/// Run a decrypt attempt, turning any panic into [`CipherError::RuntimeFault`].
fn contain_faults<T>(attempt: impl FnOnce() -> Result<T, CipherError>) -> Result<T, CipherError> {
    panic::catch_unwind(AssertUnwindSafe(attempt)).unwrap_or_else(|payload| {
        let reason = panic_reason(&*payload);
        warn!(%reason, "fault while decrypting field; treating value as plaintext");
        Err(CipherError::RuntimeFault(reason))
    })
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
