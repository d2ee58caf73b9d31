use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use log::{debug, info, warn};
use parking_lot::RwLock;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::KeyError;

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// 256-bit symmetric key used for every chunk in both directions
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Generate a fresh key from the OS entropy source
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Import a key from raw bytes, which must be exactly 32 long
    pub fn from_slice(raw: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|_| KeyError::InvalidLength {
            expected: KEY_LEN,
            actual: raw.len(),
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// First 8 bytes of SHA-256(key), hex encoded. Safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EncryptionKey").field(&self.fingerprint()).finish()
    }
}

/// Whether chunks are currently sealed or passed through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// A key is configured; chunks are `IV || ciphertext`
    Encrypted,
    /// No key is configured; chunks cross the boundary unmodified
    Plaintext,
}

/// Holder of the single current key.
///
/// Shared between the capture worker, the playback path and the controller.
/// Readers copy the key out, so the lock is never held across cipher work.
#[derive(Debug, Default)]
pub struct KeyStore {
    current: RwLock<Option<EncryptionKey>>,
}

impl KeyStore {
    /// Empty store (plaintext mode)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: EncryptionKey) -> Self {
        Self {
            current: RwLock::new(Some(key)),
        }
    }

    /// Generate a new key, make it current and return its raw bytes
    pub fn generate(&self) -> [u8; KEY_LEN] {
        let key = EncryptionKey::generate();
        *self.current.write() = Some(key);
        info!("Generated new E2EE key {}", key.fingerprint());
        *key.as_bytes()
    }

    /// Replace the current key. On error the previous key stays current.
    pub fn set(&self, raw: &[u8]) -> Result<(), KeyError> {
        let key = EncryptionKey::from_slice(raw).map_err(|e| {
            warn!("Rejected E2EE key import: {}", e);
            e
        })?;
        *self.current.write() = Some(key);
        info!("E2EE key replaced, now {}", key.fingerprint());
        Ok(())
    }

    pub fn current(&self) -> Option<EncryptionKey> {
        *self.current.read()
    }

    pub fn export(&self) -> Option<[u8; KEY_LEN]> {
        self.current().map(|key| *key.as_bytes())
    }

    pub fn export_base64(&self) -> Option<String> {
        self.export().map(|bytes| BASE64.encode(bytes))
    }

    pub fn import_base64(&self, encoded: &str) -> Result<(), KeyError> {
        let raw = BASE64.decode(encoded.trim())?;
        self.set(&raw)
    }

    /// Drop the current key and switch to plaintext mode
    pub fn clear(&self) {
        if self.current.write().take().is_some() {
            debug!("E2EE key cleared, plaintext mode");
        }
    }

    pub fn mode(&self) -> CipherMode {
        if self.current.read().is_some() {
            CipherMode::Encrypted
        } else {
            CipherMode::Plaintext
        }
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.current().map(|key| key.fingerprint())
    }
}
