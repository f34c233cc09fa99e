//! AES-CBC encryption and decryption of individual string fields.
//!
//! **Algorithm:** AES in CBC mode with a random 128-bit IV per call and
//! PKCS#7-style padding. The key size (128/192/256 bits) follows the length of
//! the supplied key material.
//!
//! CBC without a MAC provides confidentiality only. A wrong key or a tampered
//! value is not detected reliably; it usually surfaces as a padding or UTF-8
//! fault, but may also decrypt to garbage.

use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{
    block_padding::NoPadding, BlockCipher, BlockDecryptMut, BlockEncryptMut, InnerIvInit,
    KeyInit,
};
use common::ErrorKind;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use super::padding::{pad, unpad};

/// Byte length of an AES block, and of the IV that prefixes every ciphertext.
pub const BLOCK_SIZE: usize = 16;

/// Accepted key lengths in bytes (AES-128, AES-192, AES-256).
pub const KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key material is not 16, 24 or 32 bytes long.
    #[error("invalid key length: expected 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// No key schedule was supplied (the key name is not registered).
    #[error("encryption key is not initialised")]
    KeyNotInitialized,

    /// The ciphertext is not valid standard base64.
    #[error("ciphertext is not valid base64: {0}")]
    DecodeError(#[from] base64::DecodeError),

    /// The decoded ciphertext is shorter than one IV.
    #[error("ciphertext is too short: {0} bytes")]
    TooShort(usize),

    /// The ciphertext body is not a whole number of blocks.
    #[error("ciphertext is not a multiple of the block size")]
    MisalignedCiphertext,

    /// The OS CSPRNG could not produce an IV.
    #[error("secure random source unavailable: {0}")]
    RandomSourceError(#[source] rand::Error),

    /// Decrypted data was malformed (bad pad length, invalid UTF-8) or
    /// decryption faulted unexpectedly.
    #[error("runtime fault during decryption: {0}")]
    RuntimeFault(String),
}

impl CipherError {
    /// Classify this error in the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CipherError::InvalidKeyLength(_) => ErrorKind::InvalidKeyLength,
            CipherError::KeyNotInitialized => ErrorKind::KeyNotInitialized,
            CipherError::DecodeError(_) => ErrorKind::DecodeError,
            CipherError::TooShort(_) => ErrorKind::TooShort,
            CipherError::MisalignedCiphertext => ErrorKind::MisalignedCiphertext,
            CipherError::RandomSourceError(_) => ErrorKind::RandomSourceError,
            CipherError::RuntimeFault(_) => ErrorKind::RuntimeFault,
        }
    }
}

/// An initialised AES key schedule.
///
/// Built once per registered key and shared by every encrypt/decrypt call that
/// uses it. The variant is chosen by the key length.
#[derive(Clone)]
pub enum KeyBlock {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl KeyBlock {
    /// Build a key schedule from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] unless `key` is 16, 24 or 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        let block = match key.len() {
            16 => Aes128::new_from_slice(key).map(KeyBlock::Aes128),
            24 => Aes192::new_from_slice(key).map(KeyBlock::Aes192),
            32 => Aes256::new_from_slice(key).map(KeyBlock::Aes256),
            n => return Err(CipherError::InvalidKeyLength(n)),
        };
        block.map_err(|_| CipherError::InvalidKeyLength(key.len()))
    }

    /// Key size in bits: 128, 192 or 256.
    pub fn key_bits(&self) -> usize {
        match self {
            KeyBlock::Aes128(_) => 128,
            KeyBlock::Aes192(_) => 192,
            KeyBlock::Aes256(_) => 256,
        }
    }

    fn encrypt_cbc(&self, iv: &[u8], buf: &mut [u8]) -> Result<(), CipherError> {
        match self {
            KeyBlock::Aes128(c) => cbc_encrypt(c, iv, buf),
            KeyBlock::Aes192(c) => cbc_encrypt(c, iv, buf),
            KeyBlock::Aes256(c) => cbc_encrypt(c, iv, buf),
        }
    }

    fn decrypt_cbc(&self, iv: &[u8], buf: &mut [u8]) -> Result<(), CipherError> {
        match self {
            KeyBlock::Aes128(c) => cbc_decrypt(c, iv, buf),
            KeyBlock::Aes192(c) => cbc_decrypt(c, iv, buf),
            KeyBlock::Aes256(c) => cbc_decrypt(c, iv, buf),
        }
    }
}

impl std::fmt::Debug for KeyBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        write!(f, "KeyBlock(AES-{}, [REDACTED])", self.key_bits())
    }
}

/// Encrypt a plaintext string field.
///
/// A fresh IV is drawn from the OS CSPRNG on every call, so encrypting the same
/// plaintext twice yields different ciphertexts.
///
/// # Errors
///
/// Returns [`CipherError::KeyNotInitialized`] if `block` is `None`, and
/// [`CipherError::RandomSourceError`] if no IV could be generated.
pub fn encrypt(plaintext: &str, block: Option<&KeyBlock>) -> Result<String, CipherError> {
    let block = block.ok_or(CipherError::KeyNotInitialized)?;

    let padded = pad(plaintext.as_bytes(), BLOCK_SIZE);
    let mut buf = vec![0u8; BLOCK_SIZE + padded.len()];
    let (iv, body) = buf.split_at_mut(BLOCK_SIZE);

    OsRng
        .try_fill_bytes(iv)
        .map_err(CipherError::RandomSourceError)?;
    body.copy_from_slice(&padded);
    block.encrypt_cbc(iv, body)?;

    Ok(STANDARD.encode(&buf))
}

/// Decrypt a base64 ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CipherError::KeyNotInitialized`] if `block` is `None`,
/// [`CipherError::DecodeError`] on bad base64, [`CipherError::TooShort`] when
/// the IV is incomplete, [`CipherError::MisalignedCiphertext`] when the body is
/// not block aligned, and [`CipherError::RuntimeFault`] when the decrypted data
/// has an impossible pad length or is not UTF-8.
pub fn decrypt(ciphertext: &str, block: Option<&KeyBlock>) -> Result<String, CipherError> {
    let block = block.ok_or(CipherError::KeyNotInitialized)?;

    let mut bytes = STANDARD.decode(ciphertext)?;
    if bytes.len() < BLOCK_SIZE {
        return Err(CipherError::TooShort(bytes.len()));
    }
    let (iv, body) = bytes.split_at_mut(BLOCK_SIZE);
    if body.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::MisalignedCiphertext);
    }

    block.decrypt_cbc(iv, body)?;

    let plaintext = unpad(body).ok_or_else(|| {
        CipherError::RuntimeFault("pad length exceeds decrypted payload".into())
    })?;
    String::from_utf8(plaintext.to_vec())
        .map_err(|_| CipherError::RuntimeFault("decrypted payload is not valid UTF-8".into()))
}

fn cbc_encrypt<C>(cipher: &C, iv: &[u8], buf: &mut [u8]) -> Result<(), CipherError>
where
    C: BlockEncryptMut + BlockCipher + Clone,
{
    let len = buf.len();
    cbc::Encryptor::<C>::inner_iv_slice_init(cipher.clone(), iv)
        .map_err(|_| CipherError::RuntimeFault("invalid IV length".into()))?
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| CipherError::MisalignedCiphertext)?;
    Ok(())
}

fn cbc_decrypt<C>(cipher: &C, iv: &[u8], buf: &mut [u8]) -> Result<(), CipherError>
where
    C: BlockDecryptMut + BlockCipher + Clone,
{
    cbc::Decryptor::<C>::inner_iv_slice_init(cipher.clone(), iv)
        .map_err(|_| CipherError::RuntimeFault("invalid IV length".into()))?
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| CipherError::MisalignedCiphertext)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TEST_KEY_HEX: &str = "0123456789abcdef0123456789abcdef";

    fn test_block() -> KeyBlock {
        KeyBlock::new(&hex::decode(TEST_KEY_HEX).unwrap()).unwrap()
    }

    fn random_block(len: usize) -> KeyBlock {
        let mut key = vec![0u8; len];
        OsRng.fill_bytes(&mut key);
        KeyBlock::new(&key).unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let block = test_block();
        let encrypted = encrypt("I am plain text", Some(&block)).unwrap();
        assert_eq!(decrypt(&encrypted, Some(&block)).unwrap(), "I am plain text");
    }

    #[test]
    fn decrypts_recorded_ciphertext() {
        let block = test_block();
        let plain = decrypt("BFpTEtSThsjeCnt7wDbTLGFBmbdgGHATtsDb5Fty9Rs=", Some(&block)).unwrap();
        assert_eq!(plain, "I am plain text");
        let plain = decrypt("mBYP/b2SJ/uQjUjW16FWT4xNvLS2a1Q+gBc8Y8pc8TM=", Some(&block)).unwrap();
        assert_eq!(plain, "12345");
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let block = test_block();
        let encrypted = encrypt("", Some(&block)).unwrap();
        // IV plus one full block of padding.
        assert_eq!(STANDARD.decode(&encrypted).unwrap().len(), 2 * BLOCK_SIZE);
        assert_eq!(decrypt(&encrypted, Some(&block)).unwrap(), "");
    }

    #[test]
    fn ciphertext_frame_is_block_aligned() {
        let block = test_block();
        for len in [1usize, 15, 16, 17, 31, 32, 100] {
            let plain = "x".repeat(len);
            let bytes = STANDARD.decode(encrypt(&plain, Some(&block)).unwrap()).unwrap();
            assert_eq!(bytes.len(), BLOCK_SIZE + (len / BLOCK_SIZE + 1) * BLOCK_SIZE);
        }
    }

    #[test]
    fn random_iv_per_call() {
        let block = test_block();
        let a = encrypt("same input", Some(&block)).unwrap();
        let b = encrypt("same input", Some(&block)).unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt(&a, Some(&block)).unwrap(), "same input");
        assert_eq!(decrypt(&b, Some(&block)).unwrap(), "same input");
    }

    #[test]
    fn all_key_sizes_round_trip() {
        for (len, bits) in [(16, 128), (24, 192), (32, 256)] {
            let block = random_block(len);
            assert_eq!(block.key_bits(), bits);
            let encrypted = encrypt("sized", Some(&block)).unwrap();
            assert_eq!(decrypt(&encrypted, Some(&block)).unwrap(), "sized");
        }
    }

    #[test]
    fn invalid_key_length_rejected() {
        for len in [0usize, 5, 15, 17, 31, 33, 64] {
            let err = KeyBlock::new(&vec![0u8; len]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidKeyLength);
        }
    }

    #[test]
    fn missing_key_rejected() {
        assert_eq!(encrypt("x", None).unwrap_err().kind(), ErrorKind::KeyNotInitialized);
        assert_eq!(decrypt("x", None).unwrap_err().kind(), ErrorKind::KeyNotInitialized);
    }

    #[test]
    fn bad_base64_rejected() {
        let block = test_block();
        assert_eq!(decrypt("abc", Some(&block)).unwrap_err().kind(), ErrorKind::DecodeError);
        assert_eq!(
            decrypt("john@gmail.com", Some(&block)).unwrap_err().kind(),
            ErrorKind::DecodeError
        );
    }

    #[test]
    fn short_ciphertext_rejected() {
        let block = test_block();
        let short = STANDARD.encode([0u8; BLOCK_SIZE - 1]);
        assert_eq!(decrypt(&short, Some(&block)).unwrap_err().kind(), ErrorKind::TooShort);
    }

    #[test]
    fn misaligned_ciphertext_rejected() {
        let block = test_block();
        let misaligned = STANDARD.encode([0u8; BLOCK_SIZE + 5]);
        assert_eq!(
            decrypt(&misaligned, Some(&block)).unwrap_err().kind(),
            ErrorKind::MisalignedCiphertext
        );
    }

    #[test]
    fn iv_only_ciphertext_is_a_fault() {
        let block = test_block();
        let iv_only = STANDARD.encode([0u8; BLOCK_SIZE]);
        assert_eq!(decrypt(&iv_only, Some(&block)).unwrap_err().kind(), ErrorKind::RuntimeFault);
    }

    #[test]
    fn wrong_key_never_returns_plaintext() {
        let plaintext = "wrong key check";
        for _ in 0..32 {
            let encrypted = encrypt(plaintext, Some(&random_block(32))).unwrap();
            match decrypt(&encrypted, Some(&random_block(32))) {
                Ok(decrypted) => assert_ne!(decrypted, plaintext),
                Err(e) => assert_eq!(e.kind(), ErrorKind::RuntimeFault),
            }
        }
    }

    #[test]
    fn key_block_redacted_in_debug() {
        let dbg = format!("{:?}", test_block());
        assert!(dbg.contains("REDACTED"));
        assert!(dbg.contains("AES-128"));
    }

    proptest! {
        #[test]
        fn round_trip_any_string(s in ".*") {
            let block = test_block();
            let encrypted = encrypt(&s, Some(&block)).unwrap();
            prop_assert_eq!(decrypt(&encrypted, Some(&block)).unwrap(), s);
        }
    }
}
