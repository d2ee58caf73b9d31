//! Interfaces to the audio driver and permission layer.
//!
//! The pipelines never talk to hardware directly. An [`AudioBackend`] opens
//! devices for them; [`crate::platform::CpalBackend`] is the cpal-based one.

use crate::audio::AudioConfig;
use crate::error::DeviceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Capture,
    Render,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Capture => "capture",
            Direction::Render => "render",
        }
    }
}

/// How the render device is fed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Caller pushes PCM continuously while the device plays
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageHint {
    VoiceCommunication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentHint {
    Speech,
}

/// Parameters for opening a capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub config: AudioConfig,
    /// Bytes per read
    pub buffer_size: usize,
}

/// Parameters for opening a render device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub config: AudioConfig,
    pub buffer_size: usize,
    pub transfer_mode: TransferMode,
    pub usage: UsageHint,
    pub content: ContentHint,
}

impl RenderRequest {
    pub fn voice(config: AudioConfig, buffer_size: usize) -> Self {
        Self {
            config,
            buffer_size,
            transfer_mode: TransferMode::Stream,
            usage: UsageHint::VoiceCommunication,
            content: ContentHint::Speech,
        }
    }
}

/// An opened, recording microphone
pub trait CaptureDevice: Send {
    /// Identifier effects attach to
    fn session_id(&self) -> u32;

    /// Fill `buf` with PCM, returning the number of bytes read.
    ///
    /// Must return within a bounded time, even with no input, so the read
    /// loop can observe a stop request. `DeviceError::Disconnected` ends the
    /// loop; any other error skips the read.
    fn read(&mut self, buf: &mut [u8]) -> DeviceResult<usize>;

    /// Stop recording and free the device. Called exactly once.
    fn release(&mut self);
}

/// An opened, playing output device
pub trait RenderDevice: Send {
    /// Queue PCM for playback. May block briefly on buffer space.
    fn write(&mut self, pcm: &[u8]) -> DeviceResult<usize>;

    /// Stop playback and free the device. Called exactly once.
    fn release(&mut self);
}

pub trait AudioBackend: Send + Sync {
    /// Smallest workable buffer in bytes for `config`, or `None` if the
    /// driver cannot tell
    fn min_buffer_size(&self, config: &AudioConfig, direction: Direction) -> Option<usize>;

    fn open_capture(&self, request: &CaptureRequest) -> DeviceResult<Box<dyn CaptureDevice>>;

    fn open_render(&self, request: &RenderRequest) -> DeviceResult<Box<dyn RenderDevice>>;
}

/// Microphone permission as granted by the host
pub trait PermissionProvider: Send + Sync {
    fn microphone_granted(&self) -> bool;
}

/// For hosts without a permission model (desktop)
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGranted;

impl PermissionProvider for AlwaysGranted {
    fn microphone_granted(&self) -> bool {
        true
    }
}
