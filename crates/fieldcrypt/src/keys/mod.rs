//! Named encryption keys: registration, lookup, and the process-wide registry.
//!
//! # Lifecycle
//!
//! 1. At startup the application calls [`init_default_key`] and/or
//!    [`init_keys`] with hex-encoded key material.
//! 2. Each key is decoded, turned into an AES key schedule, and published in
//!    the [`KeyRegistry`] under its name. A name can be registered only once.
//! 3. Field wrappers resolve their key name through [`KeyRegistry::lookup`] on
//!    every encrypt/decrypt. An unknown name is not an error until then.
//!
//! # Security invariants
//!
//! - Key material is held only in memory and is never logged or persisted.
//! - There is no removal or replacement of a registered key.

pub mod registry;

pub use registry::{KeyError, KeyRegistry, DEFAULT_KEY_NAME};

use std::sync::Arc;

use crate::crypto::KeyBlock;

/// Register the default key in the process-wide registry.
///
/// # Errors
///
/// See [`KeyRegistry::init_default_key`].
pub fn init_default_key(hex_key: &str) -> Result<(), KeyError> {
    KeyRegistry::global().init_default_key(hex_key)
}

/// Register a batch of named keys in the process-wide registry.
///
/// # Errors
///
/// See [`KeyRegistry::init_keys`].
pub fn init_keys<I, K, V>(keys: I) -> Result<(), KeyError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: AsRef<str>,
{
    KeyRegistry::global().init_keys(keys)
}

/// Look up a key in the process-wide registry.
pub fn lookup(name: &str) -> Option<Arc<KeyBlock>> {
    KeyRegistry::global().lookup(name)
}
