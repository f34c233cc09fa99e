//! [`EncryptInt`]: an encrypted integer column (enums, flags, small codes).

use common::DbValue;
use tracing::debug;

use super::{contain_faults, source_text, FieldCodec, ScanError, ValueError};
use crate::crypto::{decrypt, encrypt};
use crate::keys::{KeyRegistry, DEFAULT_KEY_NAME};

/// An integer column stored as the ciphertext of its decimal text.
///
/// On [`scan`](FieldCodec::scan), a value that does not decrypt is parsed as a
/// plaintext integer. When that succeeds the wrapper holds the integer and the
/// scan reports the decrypt error as non-fatal ([`ScanError::is_fatal`]).
#[derive(Clone)]
pub struct EncryptInt {
    key_name: String,
    raw: Option<i64>,
    registry: KeyRegistry,
}

impl EncryptInt {
    /// Wrap `raw` using the default key of the process-wide registry.
    pub fn new(raw: Option<i64>) -> Self {
        Self::with_key_name(DEFAULT_KEY_NAME, raw)
    }

    /// Wrap `raw` using the named key of the process-wide registry.
    pub fn with_key_name(key_name: impl Into<String>, raw: Option<i64>) -> Self {
        Self::with_registry(KeyRegistry::global().clone(), key_name, raw)
    }

    /// Wrap `raw` using the named key of `registry`.
    pub fn with_registry(
        registry: KeyRegistry,
        key_name: impl Into<String>,
        raw: Option<i64>,
    ) -> Self {
        Self {
            key_name: key_name.into(),
            raw,
            registry,
        }
    }

    /// The integer, or `0` when the value is null.
    pub fn get(&self) -> i64 {
        self.raw.unwrap_or(0)
    }

    /// The integer, or `None` when the value is null.
    pub fn raw(&self) -> Option<i64> {
        self.raw
    }

    /// Rebind the wrapper to another key.
    pub fn set_key_name(&mut self, key_name: impl Into<String>) {
        self.key_name = key_name.into();
    }

    /// Set the plaintext directly, e.g. from an unencrypted integer column.
    pub fn set_raw(&mut self, raw: Option<i64>) {
        self.raw = raw;
    }
}

impl FieldCodec for EncryptInt {
    fn scan(&mut self, src: DbValue) -> Result<(), ScanError> {
        let source = match source_text(src) {
            Ok(Some(source)) => source,
            Ok(None) => {
                self.raw = None;
                return Ok(());
            }
            Err(e) => {
                self.raw = None;
                return Err(e);
            }
        };

        let block = self.registry.lookup(&self.key_name);
        match contain_faults(|| decrypt(&source, block.as_deref())) {
            Ok(plaintext) => match plaintext.parse::<i64>() {
                Ok(n) => {
                    self.raw = Some(n);
                    Ok(())
                }
                Err(e) => {
                    self.raw = None;
                    Err(ScanError::NotAnInteger(e))
                }
            },
            Err(decrypt_err) => match source.parse::<i64>() {
                Ok(n) => {
                    debug!(
                        key = %self.key_name,
                        reason = %decrypt_err.kind(),
                        "value did not decrypt; read as plaintext integer"
                    );
                    self.raw = Some(n);
                    Err(ScanError::Decrypt(decrypt_err))
                }
                Err(e) => {
                    self.raw = None;
                    Err(ScanError::NotAnInteger(e))
                }
            },
        }
    }

    fn value(&self) -> Result<DbValue, ValueError> {
        let Some(n) = self.raw else {
            return Ok(DbValue::Null);
        };
        let plaintext = n.to_string();
        let block = self.registry.lookup(&self.key_name);
        match encrypt(&plaintext, block.as_deref()) {
            Ok(ciphertext) => Ok(DbValue::Text(ciphertext)),
            Err(source) => Err(ValueError {
                fallback: DbValue::Text(plaintext),
                source,
            }),
        }
    }

    fn key_name(&self) -> &str {
        &self.key_name
    }
}

impl std::fmt::Debug for EncryptInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptInt")
            .field("key_name", &self.key_name)
            .field("raw", &self.raw.map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::test_support::test_registry;
    use common::ErrorKind;
    use proptest::prelude::*;

    fn wrapper(raw: Option<i64>) -> EncryptInt {
        EncryptInt::with_registry(test_registry(), "test", raw)
    }

    #[test]
    fn scans_recorded_ciphertext() {
        let mut ei = wrapper(None);
        ei.scan("mBYP/b2SJ/uQjUjW16FWT4xNvLS2a1Q+gBc8Y8pc8TM=".into()).unwrap();
        assert_eq!(ei.get(), 12345);
    }

    #[test]
    fn value_then_scan_round_trip() {
        let stored = wrapper(Some(12345)).value().unwrap();
        assert!(stored.as_text().is_some());
        let mut read = wrapper(None);
        read.scan(stored).unwrap();
        assert_eq!(read.raw(), Some(12345));
    }

    #[test]
    fn plaintext_integer_recovered_with_non_fatal_error() {
        let mut ei = wrapper(None);
        let err = ei.scan("42".into()).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::DecodeError);
        assert_eq!(ei.raw(), Some(42));

        let err = ei.scan("-7".into()).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(ei.get(), -7);
    }

    #[test]
    fn non_integer_plaintext_is_fatal() {
        let mut ei = wrapper(Some(1));
        let err = ei.scan("abc".into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAnInteger);
        assert!(err.is_fatal());
        assert_eq!(ei.raw(), None);
        assert_eq!(ei.get(), 0);
    }

    #[test]
    fn decrypted_non_integer_is_fatal() {
        // Recorded ciphertext of "I am plain text".
        let mut ei = wrapper(Some(1));
        let err = ei
            .scan("BFpTEtSThsjeCnt7wDbTLGFBmbdgGHATtsDb5Fty9Rs=".into())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAnInteger);
        assert_eq!(ei.raw(), None);
    }

    #[test]
    fn malformed_padding_takes_plaintext_path() {
        let mut ei = wrapper(Some(1));
        let err = ei.scan("AAAAAAAAAAAAAAAAAAAAAA==".into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAnInteger);
        assert_eq!(ei.raw(), None);
    }

    #[test]
    fn null_round_trip() {
        let mut ei = wrapper(Some(3));
        ei.scan(DbValue::Null).unwrap();
        assert_eq!(ei.raw(), None);
        assert_eq!(ei.value().unwrap(), DbValue::Null);
    }

    #[test]
    fn integer_storage_value_is_incompatible() {
        let mut ei = wrapper(Some(3));
        let err = ei.scan(DbValue::Integer(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleSourceType);
        assert_eq!(ei.raw(), None);
    }

    #[test]
    fn setters_rebind_key_and_value() {
        let registry = test_registry();
        registry
            .init_keys([("other", "fedcba9876543210fedcba9876543210")])
            .unwrap();
        let mut ei = EncryptInt::with_registry(registry.clone(), "test", None);
        ei.set_key_name("other");
        ei.set_raw(Some(2));
        assert_eq!(ei.key_name(), "other");
        let stored = ei.value().unwrap();

        let mut read = EncryptInt::with_registry(registry, "other", None);
        read.scan(stored).unwrap();
        assert_eq!(read.get(), 2);
    }

    #[test]
    fn value_without_key_returns_decimal_fallback() {
        let ei = EncryptInt::with_registry(test_registry(), "missing", Some(99));
        let err = ei.value().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyNotInitialized);
        assert_eq!(err.fallback, DbValue::Text("99".into()));
    }

    proptest! {
        #[test]
        fn round_trip_any_integer(n in any::<i64>()) {
            let stored = wrapper(Some(n)).value().unwrap();
            let mut read = wrapper(None);
            read.scan(stored).unwrap();
            prop_assert_eq!(read.raw(), Some(n));
        }
    }
}
