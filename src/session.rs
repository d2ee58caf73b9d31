use std::sync::Arc;

use log::{info, warn};
use uuid::Uuid;

use crate::audio::{AudioConfig, AudioConfigRequest};
use crate::capture::{CaptureContext, CapturePipeline};
use crate::cipher::ChunkCipher;
use crate::device::{AlwaysGranted, AudioBackend, CaptureRequest, Direction, PermissionProvider, RenderRequest};
use crate::effects::{EffectsProvider, EffectsState, NoEffects};
use crate::error::{ConfigError, KeyError, SessionResult};
use crate::keystore::{CipherMode, KEY_LEN, KeyStore};
use crate::monitoring::{SessionStats, StatsSnapshot};
use crate::playback::PlaybackPipeline;
use crate::sink::{AudioSink, NullSink};

/// Builder for [`AudioSession`]
pub struct AudioSessionBuilder {
    backend: Arc<dyn AudioBackend>,
    permissions: Arc<dyn PermissionProvider>,
    effects: Arc<dyn EffectsProvider>,
    sink: Arc<dyn AudioSink>,
    keys: Option<Arc<KeyStore>>,
    plaintext: bool,
    config: AudioConfig,
    magic_mic: bool,
    realtime_priority: bool,
}

impl AudioSessionBuilder {
    pub fn permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn effects(mut self, effects: Arc<dyn EffectsProvider>) -> Self {
        self.effects = effects;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share an existing key store instead of creating one
    pub fn key_store(mut self, keys: Arc<KeyStore>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Start without generating a key (plaintext mode until one is set)
    pub fn plaintext(mut self) -> Self {
        self.plaintext = true;
        self
    }

    pub fn audio_config(mut self, config: AudioConfig) -> Self {
        self.config = config;
        self
    }

    pub fn magic_mic(mut self, enabled: bool) -> Self {
        self.magic_mic = enabled;
        self
    }

    pub fn realtime_priority(mut self, enabled: bool) -> Self {
        self.realtime_priority = enabled;
        self
    }

    pub fn build(self) -> AudioSession {
        let id = Uuid::new_v4();
        let keys = self.keys.unwrap_or_else(|| Arc::new(KeyStore::new()));
        if !self.plaintext && keys.current().is_none() {
            keys.generate();
        }

        let stats = Arc::new(SessionStats::new());
        let cipher = ChunkCipher::new(Arc::clone(&keys));
        let capture = CapturePipeline::new(CaptureContext {
            cipher: cipher.clone(),
            sink: self.sink,
            stats: Arc::clone(&stats),
            realtime_priority: self.realtime_priority,
        });
        let playback = PlaybackPipeline::new(cipher, Arc::clone(&stats));
        let buffer_size = capture_buffer_size(self.backend.as_ref(), &self.config);

        info!(
            "[{}] Audio session created ({:?} mode, {} byte capture buffer)",
            id,
            keys.mode(),
            buffer_size
        );

        AudioSession {
            id,
            config: self.config,
            buffer_size,
            magic_mic: self.magic_mic,
            keys,
            backend: self.backend,
            permissions: self.permissions,
            effects: self.effects,
            stats,
            capture,
            playback,
        }
    }
}

/// Session controller: one capture and one playback pipeline sharing a key store.
///
/// Owned by the caller; independent sessions do not share state unless they
/// are given the same [`KeyStore`].
pub struct AudioSession {
    id: Uuid,
    config: AudioConfig,
    buffer_size: usize,
    magic_mic: bool,
    keys: Arc<KeyStore>,
    backend: Arc<dyn AudioBackend>,
    permissions: Arc<dyn PermissionProvider>,
    effects: Arc<dyn EffectsProvider>,
    stats: Arc<SessionStats>,
    capture: CapturePipeline,
    playback: PlaybackPipeline,
}

impl AudioSession {
    pub fn builder(backend: Arc<dyn AudioBackend>) -> AudioSessionBuilder {
        AudioSessionBuilder {
            backend,
            permissions: Arc::new(AlwaysGranted),
            effects: Arc::new(NoEffects),
            sink: Arc::new(NullSink),
            keys: None,
            plaintext: false,
            config: AudioConfig::default(),
            magic_mic: false,
            realtime_priority: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request_microphone_permission(&self) -> bool {
        self.permissions.microphone_granted()
    }

    pub fn start_recording(&mut self) -> SessionResult<()> {
        let effects: Option<&dyn EffectsProvider> = if self.magic_mic {
            Some(self.effects.as_ref())
        } else {
            None
        };
        let request = CaptureRequest {
            config: self.config,
            buffer_size: self.buffer_size,
        };

        self.capture
            .start(self.backend.as_ref(), self.permissions.as_ref(), effects, request)
            .map_err(|e| {
                warn!("[{}] startRecording failed: {}", self.id, e);
                e
            })
    }

    pub fn stop_recording(&mut self) {
        self.capture.stop();
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_active()
    }

    pub fn start_playing(&mut self) -> SessionResult<()> {
        let buffer_size = self
            .backend
            .min_buffer_size(&self.config, Direction::Render)
            .filter(|&size| size > 0)
            .unwrap_or_else(|| self.config.fallback_buffer_size());

        self.playback
            .start(self.backend.as_ref(), RenderRequest::voice(self.config, buffer_size))
            .map_err(|e| {
                warn!("[{}] startPlaying failed: {}", self.id, e);
                e.into()
            })
    }

    pub fn stop_playing(&mut self) {
        self.playback.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_active()
    }

    /// Play one inbound chunk. Ignored while not playing.
    pub fn play_audio_chunk(&mut self, chunk: &[u8]) -> SessionResult<()> {
        self.playback.submit(chunk).map_err(Into::into)
    }

    /// Replace the stream format. Rejected while capture or playback is active.
    pub fn set_audio_config(&mut self, request: AudioConfigRequest) -> Result<(), ConfigError> {
        if self.capture.is_active() || self.playback.is_active() {
            warn!("[{}] setAudioConfig rejected: session active", self.id);
            return Err(ConfigError::SessionActive);
        }

        let config = request.resolve()?;
        self.buffer_size = capture_buffer_size(self.backend.as_ref(), &config);
        self.config = config;
        info!(
            "[{}] Audio config: {} Hz, {} ch, {} bit/s, {} byte capture buffer",
            self.id,
            config.sample_rate(),
            config.channel_count(),
            config.bit_rate(),
            self.buffer_size
        );
        Ok(())
    }

    pub fn audio_config(&self) -> AudioConfig {
        self.config
    }

    /// Bytes per capture read for the current config
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Takes effect on the next `start_recording`
    pub fn set_magic_mic_enabled(&mut self, enabled: bool) {
        self.magic_mic = enabled;
    }

    pub fn magic_mic_enabled(&self) -> bool {
        self.magic_mic
    }

    pub fn effects_state(&self) -> EffectsState {
        self.capture.effects_state()
    }

    pub fn generate_e2ee_key(&self) -> [u8; KEY_LEN] {
        self.keys.generate()
    }

    pub fn set_e2ee_key(&self, raw: &[u8]) -> Result<(), KeyError> {
        self.keys.set(raw)
    }

    pub fn cipher_mode(&self) -> CipherMode {
        self.keys.mode()
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.capture.stop();
        self.playback.stop();
        info!("[{}] Audio session closed: {}", self.id, self.stats.snapshot());
    }
}

fn capture_buffer_size(backend: &dyn AudioBackend, config: &AudioConfig) -> usize {
    backend
        .min_buffer_size(config, Direction::Capture)
        .filter(|&size| size > 0)
        .unwrap_or_else(|| config.fallback_buffer_size())
}
