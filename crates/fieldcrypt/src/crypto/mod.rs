//! AES-CBC field encryption primitives.
//!
//! This module is free of registry and storage concerns. It provides the
//! low-level encrypt/decrypt operations used by the field wrappers.
//!
//! # Ciphertext format
//!
//! ```text
//! base64_standard( IV[16] || AES-CBC(pkcs7(plaintext))[N * 16] ),  N >= 1
//! ```
//!
//! The format carries no version prefix and no authentication tag, so values
//! written by existing deployments stay readable.

pub mod cipher;
pub mod padding;

pub use cipher::{decrypt, encrypt, CipherError, KeyBlock, BLOCK_SIZE};
