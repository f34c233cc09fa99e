//! # fieldcrypt
//!
//! Transparent field-level encryption for database columns.
//!
//! A column is modelled as a typed wrapper ([`EncryptString`], [`EncryptInt`])
//! bound to a key name. The storage layer calls [`FieldCodec::value`] to get
//! ciphertext to persist and [`FieldCodec::scan`] with whatever it read back.
//! Keys are registered once at startup in a [`KeyRegistry`], either the
//! process-wide one ([`keys::init_default_key`], [`keys::init_keys`]) or an
//! injected instance.
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |:-------|:---------------|
//! | [`crypto`] | AES-CBC encrypt/decrypt, padding, base64 framing |
//! | [`keys`] | Named key registry with write-once semantics |
//! | [`field`] | Column wrappers and the [`FieldCodec`] contract |

pub mod crypto;
pub mod field;
pub mod keys;

pub use common::{DbValue, ErrorKind};
pub use crypto::{CipherError, KeyBlock};
pub use field::{EncryptInt, EncryptString, FieldCodec, ScanError, ValueError};
pub use keys::{KeyError, KeyRegistry, DEFAULT_KEY_NAME};
