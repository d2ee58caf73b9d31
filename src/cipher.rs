//! AES-256-CBC chunk encryption.
//!
//! Every chunk is framed as `IV (16 bytes) || ciphertext`, with PKCS#7
//! padding and a fresh IV from the OS CSPRNG for each call. The frame carries
//! no authentication tag, sequence number or key epoch, so a failed decrypt
//! cannot tell a wrong key from corrupted data or a misaligned chunk boundary.

use std::sync::Arc;

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use log::trace;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{CryptoError, CryptoResult};
use crate::keystore::{CipherMode, EncryptionKey, KeyStore};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// IV length prefixed to every encrypted chunk
pub const IV_LEN: usize = 16;
/// AES block size
pub const BLOCK_LEN: usize = 16;

/// Ciphertext length for a plaintext of `plaintext_len` bytes.
/// PKCS#7 always adds between 1 and 16 bytes.
pub fn padded_len(plaintext_len: usize) -> usize {
    (plaintext_len / BLOCK_LEN + 1) * BLOCK_LEN
}

/// Full encrypted chunk length, IV included
pub fn sealed_len(plaintext_len: usize) -> usize {
    IV_LEN + padded_len(plaintext_len)
}

/// Encrypt one chunk under `key` with a freshly generated IV
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> CryptoResult<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CryptoError::CipherInit(format!("entropy source failed: {}", e)))?;

    let encryptor = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::CipherInit(e.to_string()))?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut chunk = Vec::with_capacity(IV_LEN + ciphertext.len());
    chunk.extend_from_slice(&iv);
    chunk.extend_from_slice(&ciphertext);
    Ok(chunk)
}

/// Decrypt one `IV || ciphertext` chunk under `key`
pub fn decrypt(chunk: &[u8], key: &EncryptionKey) -> CryptoResult<Vec<u8>> {
    if chunk.len() < IV_LEN {
        return Err(CryptoError::ChunkTooShort { len: chunk.len() });
    }

    let (iv, ciphertext) = chunk.split_at(IV_LEN);
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::MalformedCiphertext {
            len: ciphertext.len(),
        });
    }

    let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| CryptoError::CipherInit(e.to_string()))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Padding)
}

/// Chunk cipher bound to a shared key store.
///
/// The key is looked up on every call, so a key swap applies to the very
/// next chunk of an in-flight session.
#[derive(Debug, Clone)]
pub struct ChunkCipher {
    keys: Arc<KeyStore>,
}

impl ChunkCipher {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn mode(&self) -> CipherMode {
        self.keys.mode()
    }

    /// Encrypt with the current key, failing if there is none
    pub fn encrypt_current(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.keys.current().ok_or(CryptoError::MissingKey)?;
        encrypt(plaintext, &key)
    }

    /// Decrypt with the current key, failing if there is none
    pub fn decrypt_current(&self, chunk: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.keys.current().ok_or(CryptoError::MissingKey)?;
        decrypt(chunk, &key)
    }

    /// Prepare an outbound chunk: sealed when a key is set, unchanged otherwise
    pub fn seal(&self, pcm: &[u8]) -> CryptoResult<(CipherMode, Vec<u8>)> {
        match self.keys.current() {
            Some(key) => encrypt(pcm, &key).map(|chunk| (CipherMode::Encrypted, chunk)),
            None => {
                trace!("Plaintext mode, forwarding {} bytes unmodified", pcm.len());
                Ok((CipherMode::Plaintext, pcm.to_vec()))
            }
        }
    }

    /// Recover PCM from an inbound chunk: decrypted when a key is set,
    /// unchanged otherwise
    pub fn open(&self, chunk: &[u8]) -> CryptoResult<(CipherMode, Vec<u8>)> {
        match self.keys.current() {
            Some(key) => decrypt(chunk, &key).map(|pcm| (CipherMode::Encrypted, pcm)),
            None => Ok((CipherMode::Plaintext, chunk.to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(0), 16);
        assert_eq!(padded_len(15), 16);
        assert_eq!(padded_len(16), 32);
        assert_eq!(padded_len(320), 336);
        assert_eq!(sealed_len(320), 352);
    }

    #[test]
    fn test_chunk_length_matches_padded_len() {
        let key = EncryptionKey::generate();
        for len in [0usize, 1, 15, 16, 17, 100, 960] {
            let chunk = encrypt(&vec![0x55; len], &key).unwrap();
            assert_eq!(chunk.len(), sealed_len(len), "plaintext length {}", len);
        }
    }
}
