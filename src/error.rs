use thiserror::Error;

/// Capture or render device failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no {0} device available")]
    NotAvailable(&'static str),

    #[error("failed to open {direction} device: {reason}")]
    Open { direction: &'static str, reason: String },

    #[error("device does not support {0}")]
    UnsupportedFormat(String),

    #[error("device read failed with code {0}")]
    Read(i32),

    #[error("device write failed: {0}")]
    Write(String),

    #[error("device is no longer available")]
    Disconnected,
}

/// Per-chunk cipher failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("no encryption key configured")]
    MissingKey,

    #[error("chunk of {len} bytes cannot hold a 16-byte IV")]
    ChunkTooShort { len: usize },

    #[error("ciphertext of {len} bytes is not a whole number of AES blocks")]
    MalformedCiphertext { len: usize },

    #[error("cipher initialisation failed: {0}")]
    CipherInit(String),

    #[error("padding check failed (wrong key or corrupted chunk)")]
    Padding,
}

/// Key import failures; the previous key stays current
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid key encoding: {0}")]
    InvalidEncoding(String),
}

impl From<base64::DecodeError> for KeyError {
    fn from(err: base64::DecodeError) -> Self {
        KeyError::InvalidEncoding(err.to_string())
    }
}

/// Magic Mic attachment failures. Never fatal to capture.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EffectError {
    #[error("{0} is not available on this device")]
    Unavailable(&'static str),

    #[error("failed to attach {effect}: {reason}")]
    Attach { effect: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported sample rate {0} Hz (expected 8000-192000)")]
    UnsupportedSampleRate(u32),

    #[error("unsupported channel count {0} (expected 1 or 2)")]
    UnsupportedChannelCount(u16),

    #[error("cannot reconfigure while capture or playback is active")]
    SessionActive,

    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialization failed: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors surfaced by `AudioSession` operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("microphone permission has not been granted")]
    PermissionDenied,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
pub type DeviceResult<T> = Result<T, DeviceError>;
pub type SessionResult<T> = Result<T, SessionError>;
