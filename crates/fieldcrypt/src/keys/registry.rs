//! [`KeyRegistry`]: write-once map from key name to AES key schedule.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use arc_swap::ArcSwap;
use common::ErrorKind;
use thiserror::Error;
use tracing::info;

use crate::crypto::{CipherError, KeyBlock};

/// Name under which [`KeyRegistry::init_default_key`] registers its key, and
/// the key name used by the default field wrapper constructors.
pub const DEFAULT_KEY_NAME: &str = "default";

/// Errors produced while registering keys.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The key material is not valid hex.
    #[error("key {name:?} is not valid hex: {source}")]
    InvalidHexEncoding {
        name: String,
        #[source]
        source: hex::FromHexError,
    },

    /// The decoded key material is not 16, 24 or 32 bytes.
    #[error("key {name:?} has invalid length: expected 16, 24 or 32 bytes, got {len}")]
    InvalidKeyLength { name: String, len: usize },

    /// The name is already registered, or appears twice in one batch.
    #[error("key {0:?} is already registered")]
    DuplicateKey(String),
}

impl KeyError {
    /// Classify this error in the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeyError::InvalidHexEncoding { .. } => ErrorKind::InvalidHexEncoding,
            KeyError::InvalidKeyLength { .. } => ErrorKind::InvalidKeyLength,
            KeyError::DuplicateKey(_) => ErrorKind::DuplicateKey,
        }
    }
}

/// Thread-safe registry of named key schedules.
///
/// Cloning is cheap; all clones share the same keys. Reads go through an
/// [`ArcSwap`] snapshot and never block. Writers serialise on a mutex, build
/// the next snapshot, and publish it with a single store, so:
/// - the duplicate check and the insert are atomic per name, and
/// - a batch from [`KeyRegistry::init_keys`] becomes visible all at once.
#[derive(Clone)]
pub struct KeyRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    keys: ArcSwap<HashMap<String, Arc<KeyBlock>>>,
    write_lock: Mutex<()>,
}

impl KeyRegistry {
    /// Create a new, empty [`KeyRegistry`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                keys: ArcSwap::from_pointee(HashMap::new()),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// The process-wide registry used by the default wrapper constructors.
    pub fn global() -> &'static KeyRegistry {
        static GLOBAL: OnceLock<KeyRegistry> = OnceLock::new();
        GLOBAL.get_or_init(KeyRegistry::new)
    }

    /// Decode `hex_key` and register it under [`DEFAULT_KEY_NAME`].
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidHexEncoding`] or [`KeyError::InvalidKeyLength`]
    /// for bad key material, and [`KeyError::DuplicateKey`] if the default key
    /// is already registered.
    pub fn init_default_key(&self, hex_key: &str) -> Result<(), KeyError> {
        self.init_keys([(DEFAULT_KEY_NAME, hex_key)])
    }

    /// Decode and register a batch of `(name, hex_key)` pairs.
    ///
    /// All entries are validated before any is published. If one fails, none
    /// of the batch is registered.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::DuplicateKey`] if any name is already registered or
    /// repeats within the batch, otherwise the first key material error.
    pub fn init_keys<I, K, V>(&self, keys: I) -> Result<(), KeyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut next = HashMap::clone(&self.inner.keys.load());
        let mut added = Vec::new();
        for (name, hex_key) in keys {
            let name = name.into();
            if next.contains_key(&name) {
                return Err(KeyError::DuplicateKey(name));
            }
            let block = build_block(&name, hex_key.as_ref())?;
            added.push((name.clone(), block.key_bits()));
            next.insert(name, Arc::new(block));
        }

        self.inner.keys.store(Arc::new(next));
        for (name, bits) in added {
            info!(key = %name, bits, "encryption key registered");
        }
        Ok(())
    }

    /// Register an already built key schedule under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::DuplicateKey`] if `name` is already registered.
    pub fn register(&self, name: impl Into<String>, block: KeyBlock) -> Result<(), KeyError> {
        let name = name.into();
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.inner.keys.load();
        if current.contains_key(&name) {
            return Err(KeyError::DuplicateKey(name));
        }
        let mut next = HashMap::clone(&current);
        let bits = block.key_bits();
        next.insert(name.clone(), Arc::new(block));
        self.inner.keys.store(Arc::new(next));

        info!(key = %name, bits, "encryption key registered");
        Ok(())
    }

    /// Look up the key schedule registered under `name`.
    ///
    /// This is a lock-free read; safe to call on every encrypt/decrypt.
    pub fn lookup(&self, name: &str) -> Option<Arc<KeyBlock>> {
        self.inner.keys.load().get(name).cloned()
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.keys.load().contains_key(name)
    }

    /// Registered key names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.keys.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.inner.keys.load().len()
    }

    /// Returns `true` if no keys are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.keys.load().is_empty()
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("names", &self.names())
            .finish()
    }
}

fn build_block(name: &str, hex_key: &str) -> Result<KeyBlock, KeyError> {
    let key_bytes = hex::decode(hex_key).map_err(|source| KeyError::InvalidHexEncoding {
        name: name.to_owned(),
        source,
    })?;
    KeyBlock::new(&key_bytes).map_err(|e| match e {
        CipherError::InvalidKeyLength(len) => KeyError::InvalidKeyLength {
            name: name.to_owned(),
            len,
        },
        _ => KeyError::InvalidKeyLength {
            name: name.to_owned(),
            len: key_bytes.len(),
        },
    })
}
