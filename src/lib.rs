//! # voxseal
//!
//! Live microphone streaming with per-chunk end-to-end encryption.
//!
//! ## Overview
//!
//! An [`AudioSession`] captures PCM from a microphone on a background worker,
//! seals every chunk with AES-256-CBC under a fresh random IV and hands it to
//! an [`AudioSink`]. Inbound chunks pushed by the caller are opened with the
//! same key and written to the speaker. Moving chunks between peers and
//! agreeing on the key are left to the host.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxseal::{AudioSession, ChannelSink, CpalBackend};
//!
//! fn main() -> anyhow::Result<()> {
//!     let (sink, chunks) = ChannelSink::new();
//!     let mut session = AudioSession::builder(Arc::new(CpalBackend::new()))
//!         .sink(Arc::new(sink))
//!         .build();
//!
//!     let key = session.generate_e2ee_key();
//!     // ...deliver `key` to the peer out of band...
//!
//!     session.start_recording()?;
//!     let chunk = chunks.recv()?; // IV(16) || ciphertext
//!     session.stop_recording();
//!     # let _ = (key, chunk);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`cipher`]: AES-256-CBC chunk framing (`IV || ciphertext`)
//! - [`keystore`]: the single current key, shared across threads
//! - [`capture`]: microphone read loop, effects, encryption, delivery
//! - [`playback`]: decryption and render-device writes
//! - [`session`]: the controller exposing the public operations
//! - [`device`] / [`platform`]: driver interfaces and the cpal backend
//! - [`effects`]: "Magic Mic" noise suppression and gain control
//! - [`config`]: persisted settings
//!
//! ## Security Model
//!
//! - **Confidentiality**: AES-256-CBC with PKCS#7 padding, one random IV per chunk
//! - **No integrity**: chunks carry no MAC, sequence number or key epoch. A
//!   failed decrypt cannot distinguish a wrong key from corruption; integrity
//!   and replay protection must come from the transport.
//! - **Plaintext mode**: with no key configured, chunks pass through unmodified

/// AudioConfig and PCM format helpers
pub mod audio;

/// AES-256-CBC per-chunk encryption
pub mod cipher;

/// Current-key storage
pub mod keystore;

/// Microphone capture pipeline
pub mod capture;

/// Speaker playback pipeline
pub mod playback;

/// Session controller
pub mod session;

/// Audio driver and permission interfaces
pub mod device;

/// cpal audio backend
pub mod platform;

/// Magic Mic effects
pub mod effects;

/// Outbound chunk delivery
pub mod sink;

/// Session counters
pub mod monitoring;

/// Persisted settings
pub mod config;

/// Error taxonomy
pub mod error;

#[cfg(test)]
pub mod tests;

// Re-export main types for convenience
pub use audio::{AudioConfig, AudioConfigRequest, ChannelLayout};
pub use cipher::{ChunkCipher, decrypt, encrypt};
pub use config::{ConfigManager, Settings};
pub use effects::{EffectKind, EffectsState, SoftwareEffects};
pub use error::{ConfigError, CryptoError, DeviceError, KeyError, SessionError};
pub use keystore::{CipherMode, EncryptionKey, KeyStore};
pub use monitoring::StatsSnapshot;
pub use platform::CpalBackend;
pub use session::{AudioSession, AudioSessionBuilder};
pub use sink::{AudioSink, ChannelSink};
