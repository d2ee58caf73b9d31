use std::sync::Arc;

use log::{debug, info, warn};

use crate::cipher::ChunkCipher;
use crate::device::{AudioBackend, RenderDevice, RenderRequest};
use crate::error::{DeviceError, DeviceResult};
use crate::monitoring::SessionStats;

enum PlaybackState {
    Idle,
    Active(Box<dyn RenderDevice>),
}

/// Speaker side of a session: `Idle -> start -> Active -> stop -> Idle`.
///
/// `submit` runs on the caller's thread, in call order.
pub struct PlaybackPipeline {
    state: PlaybackState,
    cipher: ChunkCipher,
    stats: Arc<SessionStats>,
}

impl PlaybackPipeline {
    pub fn new(cipher: ChunkCipher, stats: Arc<SessionStats>) -> Self {
        Self {
            state: PlaybackState::Idle,
            cipher,
            stats,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PlaybackState::Active(_))
    }

    /// Open the render device. A no-op if already active.
    pub fn start(&mut self, backend: &dyn AudioBackend, request: RenderRequest) -> DeviceResult<()> {
        if self.is_active() {
            debug!("Playback already active");
            return Ok(());
        }

        let device = backend.open_render(&request)?;
        info!(
            "Playback started: {} Hz, {} ch, {} byte buffer",
            request.config.sample_rate(),
            request.config.channel_count(),
            request.buffer_size
        );
        self.state = PlaybackState::Active(device);
        Ok(())
    }

    /// Decrypt (or pass through) one inbound chunk and write it to the device.
    ///
    /// Dropped without error when idle. Undecryptable chunks are dropped and
    /// counted as decode errors.
    pub fn submit(&mut self, chunk: &[u8]) -> DeviceResult<()> {
        let device = match &mut self.state {
            PlaybackState::Active(device) => device,
            PlaybackState::Idle => {
                self.stats.record_ignored();
                return Ok(());
            }
        };

        let pcm = match self.cipher.open(chunk) {
            Ok((_, pcm)) => pcm,
            Err(e) => {
                self.stats.record_decode_error();
                debug!("Dropping inbound chunk of {} bytes: {}", chunk.len(), e);
                return Ok(());
            }
        };

        if pcm.is_empty() {
            return Ok(());
        }

        match device.write(&pcm) {
            Ok(written) => {
                if written < pcm.len() {
                    debug!("Render device accepted {} of {} bytes", written, pcm.len());
                }
                self.stats.record_played();
                Ok(())
            }
            Err(DeviceError::Disconnected) => {
                self.stats.record_write_error();
                warn!("Render device disconnected");
                Err(DeviceError::Disconnected)
            }
            Err(e) => {
                self.stats.record_write_error();
                warn!("Render write failed: {}", e);
                Ok(())
            }
        }
    }

    /// Halt writes and release the device. A no-op if idle.
    pub fn stop(&mut self) {
        if let PlaybackState::Active(mut device) = std::mem::replace(&mut self.state, PlaybackState::Idle) {
            device.release();
            info!("Playback stopped");
        }
    }
}

impl Drop for PlaybackPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
