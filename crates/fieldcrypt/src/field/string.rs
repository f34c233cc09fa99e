//! [`EncryptString`]: an encrypted text column.

use common::DbValue;
use tracing::debug;

use super::{contain_faults, source_text, FieldCodec, ScanError, ValueError};
use crate::crypto::{decrypt, encrypt};
use crate::keys::{KeyRegistry, DEFAULT_KEY_NAME};

/// A text column stored as ciphertext.
///
/// The key name is fixed at construction. A value that does not decrypt on
/// [`scan`](FieldCodec::scan) is kept verbatim as plaintext.
#[derive(Clone)]
pub struct EncryptString {
    key_name: String,
    raw: Option<String>,
    registry: KeyRegistry,
}

impl EncryptString {
    /// Wrap `raw` using the default key of the process-wide registry.
    pub fn new(raw: Option<String>) -> Self {
        Self::with_key_name(DEFAULT_KEY_NAME, raw)
    }

    /// Wrap `raw` using the named key of the process-wide registry.
    pub fn with_key_name(key_name: impl Into<String>, raw: Option<String>) -> Self {
        Self::with_registry(KeyRegistry::global().clone(), key_name, raw)
    }

    /// Wrap `raw` using the named key of `registry`.
    pub fn with_registry(
        registry: KeyRegistry,
        key_name: impl Into<String>,
        raw: Option<String>,
    ) -> Self {
        Self {
            key_name: key_name.into(),
            raw,
            registry,
        }
    }

    /// The plaintext, or `""` when the value is null.
    pub fn as_str(&self) -> &str {
        self.raw.as_deref().unwrap_or("")
    }

    /// The plaintext, or `None` when the value is null.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn into_raw(self) -> Option<String> {
        self.raw
    }
}

impl FieldCodec for EncryptString {
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
            Ok(plaintext) => self.raw = Some(plaintext),
            Err(e) => {
                debug!(
                    key = %self.key_name,
                    reason = %e.kind(),
                    "value did not decrypt; keeping it as plaintext"
                );
                self.raw = Some(source);
            }
        }
        Ok(())
    }

    fn value(&self) -> Result<DbValue, ValueError> {
        let Some(raw) = &self.raw else {
            return Ok(DbValue::Null);
        };
        let block = self.registry.lookup(&self.key_name);
        encrypt(raw, block.as_deref())
            .map(DbValue::Text)
            .map_err(|source| ValueError {
                fallback: DbValue::Text(raw.clone()),
                source,
            })
    }

    fn key_name(&self) -> &str {
        &self.key_name
    }
}

impl std::fmt::Debug for EncryptString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Plaintext column values stay out of logs.
        f.debug_struct("EncryptString")
            .field("key_name", &self.key_name)
            .field("raw", &self.raw.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::test_support::test_registry;
    use common::ErrorKind;

    fn wrapper(raw: Option<&str>) -> EncryptString {
        EncryptString::with_registry(test_registry(), "test", raw.map(str::to_owned))
    }

    #[test]
    fn scans_recorded_ciphertext() {
        let mut es = wrapper(None);
        es.scan("BFpTEtSThsjeCnt7wDbTLGFBmbdgGHATtsDb5Fty9Rs=".into()).unwrap();
        assert_eq!(es.as_str(), "I am plain text");
    }

    #[test]
    fn scans_ciphertext_bytes() {
        let mut es = wrapper(None);
        es.scan(DbValue::Bytes(
            b"BFpTEtSThsjeCnt7wDbTLGFBmbdgGHATtsDb5Fty9Rs=".to_vec(),
        ))
        .unwrap();
        assert_eq!(es.as_str(), "I am plain text");
    }

    #[test]
    fn null_scans_to_none() {
        let mut es = wrapper(Some("previous"));
        es.scan(DbValue::Null).unwrap();
        assert_eq!(es.raw(), None);
        assert_eq!(es.as_str(), "");
        assert_eq!(es.value().unwrap(), DbValue::Null);
    }

    #[test]
    fn plaintext_falls_back_to_source() {
        let mut es = wrapper(None);
        es.scan("abc".into()).unwrap();
        assert_eq!(es.as_str(), "abc");

        // Valid base64 of the wrong shape is still plaintext.
        es.scan("john".into()).unwrap();
        assert_eq!(es.as_str(), "john");
    }

    #[test]
    fn malformed_padding_falls_back_to_source() {
        // An IV with no body decrypts to nothing and cannot be unpadded.
        let iv_only = "AAAAAAAAAAAAAAAAAAAAAA==";
        let mut es = wrapper(None);
        es.scan(iv_only.into()).unwrap();
        assert_eq!(es.as_str(), iv_only);
    }

    #[test]
    fn unregistered_key_falls_back_on_scan() {
        let mut es = EncryptString::with_registry(test_registry(), "missing", None);
        es.scan("BFpTEtSThsjeCnt7wDbTLGFBmbdgGHATtsDb5Fty9Rs=".into()).unwrap();
        assert_eq!(es.as_str(), "BFpTEtSThsjeCnt7wDbTLGFBmbdgGHATtsDb5Fty9Rs=");
    }

    #[test]
    fn incompatible_source_clears_value() {
        let mut es = wrapper(Some("previous"));
        let err = es.scan(DbValue::Integer(7)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleSourceType);
        assert!(err.is_fatal());
        assert_eq!(es.raw(), None);
    }

    #[test]
    fn value_then_scan_round_trip() {
        let es = wrapper(Some("I am plain text"));
        let stored = es.value().unwrap();
        let ciphertext = stored.as_text().unwrap();
        assert_ne!(ciphertext, "I am plain text");

        let mut read = wrapper(None);
        read.scan(stored.clone()).unwrap();
        assert_eq!(read.as_str(), "I am plain text");
    }

    #[test]
    fn empty_string_round_trip() {
        let stored = wrapper(Some("")).value().unwrap();
        let mut read = wrapper(None);
        read.scan(stored).unwrap();
        assert_eq!(read.raw(), Some(""));
    }

    #[test]
    fn value_without_key_returns_plaintext_fallback() {
        let es = EncryptString::with_registry(test_registry(), "missing", Some("secret".into()));
        let err = es.value().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyNotInitialized);
        assert_eq!(err.into_fallback(), DbValue::Text("secret".into()));
    }

    #[test]
    fn default_constructor_uses_default_key_name() {
        let es = EncryptString::new(None);
        assert_eq!(es.key_name(), DEFAULT_KEY_NAME);
        let es = EncryptString::with_key_name("named", None);
        assert_eq!(es.key_name(), "named");
    }

    #[test]
    fn debug_redacts_plaintext() {
        let dbg = format!("{:?}", wrapper(Some("hunter2")));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("REDACTED"));
    }
}
