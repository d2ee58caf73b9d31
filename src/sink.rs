use crossbeam::channel::{self, Receiver, Sender};
use log::warn;

/// Receiver of captured chunks (`onAudioData`).
///
/// Called once per chunk, in capture order, from the capture worker.
/// Implementations must hand the chunk off without waiting for the
/// consumer, or the read loop falls behind the device.
pub trait AudioSink: Send + Sync {
    fn deliver(&self, chunk: Vec<u8>);
}

impl<F> AudioSink for F
where
    F: Fn(Vec<u8>) + Send + Sync,
{
    fn deliver(&self, chunk: Vec<u8>) {
        self(chunk)
    }
}

/// Sink backed by an unbounded channel; the host drains the receiver on
/// whichever thread it needs.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Vec<u8>>) {
        let (sender, receiver) = channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl AudioSink for ChannelSink {
    fn deliver(&self, chunk: Vec<u8>) {
        if self.sender.send(chunk).is_err() {
            warn!("Audio sink receiver dropped, discarding chunk");
        }
    }
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn deliver(&self, _chunk: Vec<u8>) {}
}
