//! Common types shared across `fieldcrypt` crates: the storage value model and
//! the error taxonomy.

pub mod error;
pub mod value;

pub use error::ErrorKind;
pub use value::DbValue;
