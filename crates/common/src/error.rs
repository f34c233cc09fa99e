//! Stable error taxonomy shared across crates.

use std::fmt;

/// Classification of every failure the field encryption layer can report.
///
/// Module-level error types map onto these kinds so callers can branch on a
/// stable value instead of matching on each crate's error enum:
/// - registry setup: [`ErrorKind::InvalidHexEncoding`], [`ErrorKind::InvalidKeyLength`],
///   [`ErrorKind::DuplicateKey`]
/// - cipher: [`ErrorKind::KeyNotInitialized`] through [`ErrorKind::RandomSourceError`],
///   plus [`ErrorKind::RuntimeFault`]
/// - field wrappers: [`ErrorKind::IncompatibleSourceType`], [`ErrorKind::NotAnInteger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Key material was not valid hex.
    InvalidHexEncoding,
    /// Decoded key material is not 16, 24 or 32 bytes.
    InvalidKeyLength,
    /// A key name was registered more than once.
    DuplicateKey,
    /// No key is registered under the requested name.
    KeyNotInitialized,
    /// Ciphertext was not valid standard base64.
    DecodeError,
    /// Decoded ciphertext is shorter than one block.
    TooShort,
    /// Ciphertext body is not a whole number of blocks.
    MisalignedCiphertext,
    /// The OS random source failed while generating an IV.
    RandomSourceError,
    /// The storage value has a shape the wrapper cannot scan.
    IncompatibleSourceType,
    /// The value could not be parsed as an integer.
    NotAnInteger,
    /// An unexpected fault while decoding malformed data.
    RuntimeFault,
}

impl ErrorKind {
    /// Short machine-readable code, e.g. `"duplicate_key"`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidHexEncoding => "invalid_hex_encoding",
            ErrorKind::InvalidKeyLength => "invalid_key_length",
            ErrorKind::DuplicateKey => "duplicate_key",
            ErrorKind::KeyNotInitialized => "key_not_initialized",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::TooShort => "too_short",
            ErrorKind::MisalignedCiphertext => "misaligned_ciphertext",
            ErrorKind::RandomSourceError => "random_source_error",
            ErrorKind::IncompatibleSourceType => "incompatible_source_type",
            ErrorKind::NotAnInteger => "not_an_integer",
            ErrorKind::RuntimeFault => "runtime_fault",
        }
    }

    /// Returns `true` for errors that indicate a startup misconfiguration
    /// rather than a problem with an individual row.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidHexEncoding
                | ErrorKind::InvalidKeyLength
                | ErrorKind::DuplicateKey
                | ErrorKind::KeyNotInitialized
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
