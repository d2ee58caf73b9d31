//! cpal implementation of [`AudioBackend`].
//!
//! cpal streams cannot move between threads on every host, so each open
//! device runs its stream on a small owner thread and talks to it through a
//! lock-free ring buffer. Capture reads drain the ring; render writes fill it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Host, SampleFormat, SampleRate, Stream, StreamConfig, SupportedBufferSize};
use crossbeam::channel::{self, Sender};
use log::{debug, error, info, warn};
use ringbuf::{HeapCons, HeapProd, HeapRb, traits::*};

use crate::audio::{AudioConfig, BYTES_PER_SAMPLE};
use crate::device::{AudioBackend, CaptureDevice, CaptureRequest, Direction, RenderDevice, RenderRequest};
use crate::error::{DeviceError, DeviceResult};

/// Target chunk length when the driver has no stronger opinion
const DEFAULT_CHUNK_MS: u32 = 20;
/// Ring capacity, in read buffers
const RING_BUFFERS: usize = 8;
/// Poll interval while waiting on the ring
const POLL_INTERVAL: Duration = Duration::from_millis(1);
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Cross-platform audio backend using CPAL
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
    next_session: AtomicU32,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    /// Use the host's default devices
    pub fn new() -> Self {
        Self {
            input_device: None,
            output_device: None,
            next_session: AtomicU32::new(1),
        }
    }

    /// Use devices by name; `None` selects the default
    pub fn with_devices(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
            next_session: AtomicU32::new(1),
        }
    }

    pub fn list_input_devices() -> Vec<String> {
        cpal::default_host()
            .input_devices()
            .map(|devices| devices.filter_map(|device| device.name().ok()).collect())
            .unwrap_or_else(|_| vec!["default".to_string()])
    }

    pub fn list_output_devices() -> Vec<String> {
        cpal::default_host()
            .output_devices()
            .map(|devices| devices.filter_map(|device| device.name().ok()).collect())
            .unwrap_or_else(|_| vec!["default".to_string()])
    }
}

impl AudioBackend for CpalBackend {
    fn min_buffer_size(&self, config: &AudioConfig, direction: Direction) -> Option<usize> {
        let host = cpal::default_host();
        let device = find_device(&host, direction, self.device_name(direction)).ok()?;
        let range = supported_range(&device, direction, config).ok()?;

        let chunk = config.bytes_for_millis(DEFAULT_CHUNK_MS);
        let driver_min = match range.buffer_size() {
            SupportedBufferSize::Range { min, .. } => *min as usize * config.frame_bytes(),
            SupportedBufferSize::Unknown => 0,
        };
        Some(chunk.max(driver_min))
    }

    fn open_capture(&self, request: &CaptureRequest) -> DeviceResult<Box<dyn CaptureDevice>> {
        let config = request.config;
        let samples_per_read = (request.buffer_size / BYTES_PER_SAMPLE).max(1);
        let ring = HeapRb::<i16>::new(samples_per_read * RING_BUFFERS);
        let (producer, consumer) = ring.split();

        let disconnected = Arc::new(AtomicBool::new(false));
        let device_name = self.input_device.clone();
        let stream_disconnected = Arc::clone(&disconnected);

        let owner = StreamOwner::spawn("voxseal-capture-stream", move || {
            let host = cpal::default_host();
            let device = find_device(&host, Direction::Capture, device_name.as_deref())?;
            info!("Input device: {}", device.name().unwrap_or("Unknown".to_string()));
            build_input_stream(&device, &config, producer, stream_disconnected)
        })?;

        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let read_timeout = (config.duration_of(request.buffer_size) * 2).max(MIN_READ_TIMEOUT);

        Ok(Box::new(CpalCaptureDevice {
            session_id,
            consumer,
            scratch: vec![0; samples_per_read],
            read_timeout,
            disconnected,
            owner: Some(owner),
        }))
    }

    fn open_render(&self, request: &RenderRequest) -> DeviceResult<Box<dyn RenderDevice>> {
        let config = request.config;
        let buffer_samples = (request.buffer_size / BYTES_PER_SAMPLE).max(1);
        let ring = HeapRb::<i16>::new(buffer_samples * RING_BUFFERS);
        let (producer, consumer) = ring.split();

        let disconnected = Arc::new(AtomicBool::new(false));
        let device_name = self.output_device.clone();
        let stream_disconnected = Arc::clone(&disconnected);

        let owner = StreamOwner::spawn("voxseal-render-stream", move || {
            let host = cpal::default_host();
            let device = find_device(&host, Direction::Render, device_name.as_deref())?;
            info!("Output device: {}", device.name().unwrap_or("Unknown".to_string()));
            build_output_stream(&device, &config, consumer, stream_disconnected)
        })?;

        Ok(Box::new(CpalRenderDevice {
            producer,
            write_timeout: config.duration_of(request.buffer_size).max(MIN_READ_TIMEOUT),
            disconnected,
            owner: Some(owner),
        }))
    }
}

impl CpalBackend {
    fn device_name(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Capture => self.input_device.as_deref(),
            Direction::Render => self.output_device.as_deref(),
        }
    }
}

fn find_device(host: &Host, direction: Direction, name: Option<&str>) -> DeviceResult<Device> {
    let device = match (direction, name) {
        (Direction::Capture, None) => host.default_input_device(),
        (Direction::Render, None) => host.default_output_device(),
        (Direction::Capture, Some(name)) => host
            .input_devices()
            .ok()
            .and_then(|mut devices| devices.find(|d| d.name().map(|n| n == name).unwrap_or(false))),
        (Direction::Render, Some(name)) => host
            .output_devices()
            .ok()
            .and_then(|mut devices| devices.find(|d| d.name().map(|n| n == name).unwrap_or(false))),
    };
    device.ok_or(DeviceError::NotAvailable(direction.as_str()))
}

fn supported_range(
    device: &Device,
    direction: Direction,
    config: &AudioConfig,
) -> DeviceResult<cpal::SupportedStreamConfigRange> {
    let open_error = |e: String| DeviceError::Open {
        direction: direction.as_str(),
        reason: e,
    };
    let mut ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Capture => device
            .supported_input_configs()
            .map_err(|e| open_error(e.to_string()))?
            .collect(),
        Direction::Render => device
            .supported_output_configs()
            .map_err(|e| open_error(e.to_string()))?
            .collect(),
    };

    let rate = config.sample_rate();
    ranges.retain(|c| {
        c.min_sample_rate().0 <= rate && c.max_sample_rate().0 >= rate && c.channels() == config.channel_count()
    });
    // Prefer native 16-bit so no conversion happens in the callback
    ranges.sort_by_key(|c| if c.sample_format() == SampleFormat::I16 { 0 } else { 1 });

    ranges.into_iter().next().ok_or_else(|| {
        DeviceError::UnsupportedFormat(format!(
            "{} Hz, {} ch, 16-bit PCM",
            rate,
            config.channel_count()
        ))
    })
}

fn stream_config(config: &AudioConfig) -> StreamConfig {
    StreamConfig {
        channels: config.channel_count(),
        sample_rate: SampleRate(config.sample_rate()),
        buffer_size: BufferSize::Default,
    }
}

fn stream_error_handler(direction: Direction, disconnected: Arc<AtomicBool>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| match err {
        cpal::StreamError::DeviceNotAvailable => {
            warn!("Audio {} device no longer available", direction.as_str());
            disconnected.store(true, Ordering::Release);
        }
        other => error!("Audio {} stream error: {}", direction.as_str(), other),
    }
}

fn build_input_stream(
    device: &Device,
    config: &AudioConfig,
    mut producer: HeapProd<i16>,
    disconnected: Arc<AtomicBool>,
) -> DeviceResult<Stream> {
    let range = supported_range(device, Direction::Capture, config)?;
    let stream_config = stream_config(config);
    let on_error = stream_error_handler(Direction::Capture, disconnected);
    let build_error = |e: cpal::BuildStreamError| DeviceError::Open {
        direction: "capture",
        reason: e.to_string(),
    };

    match range.sample_format() {
        SampleFormat::I16 => device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let written = producer.push_slice(data);
                    if written < data.len() {
                        debug!("Capture ring full, {} samples dropped", data.len() - written);
                    }
                },
                on_error,
                None,
            )
            .map_err(build_error),
        SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut dropped = 0;
                    for &sample in data {
                        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        if producer.try_push(sample_i16).is_err() {
                            dropped += 1;
                        }
                    }
                    if dropped > 0 {
                        debug!("Capture ring full, {} samples dropped", dropped);
                    }
                },
                on_error,
                None,
            )
            .map_err(build_error),
        other => Err(DeviceError::UnsupportedFormat(format!("sample format {:?}", other))),
    }
}

fn build_output_stream(
    device: &Device,
    config: &AudioConfig,
    mut consumer: HeapCons<i16>,
    disconnected: Arc<AtomicBool>,
) -> DeviceResult<Stream> {
    let range = supported_range(device, Direction::Render, config)?;
    let stream_config = stream_config(config);
    let on_error = stream_error_handler(Direction::Render, disconnected);
    let build_error = |e: cpal::BuildStreamError| DeviceError::Open {
        direction: "render",
        reason: e.to_string(),
    };

    match range.sample_format() {
        SampleFormat::I16 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let read = consumer.pop_slice(data);
                    // Silence on underrun
                    data[read..].fill(0);
                },
                on_error,
                None,
            )
            .map_err(build_error),
        SampleFormat::F32 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = match consumer.try_pop() {
                            Some(sample_i16) => sample_i16 as f32 / i16::MAX as f32,
                            None => 0.0,
                        };
                    }
                },
                on_error,
                None,
            )
            .map_err(build_error),
        other => Err(DeviceError::UnsupportedFormat(format!("sample format {:?}", other))),
    }
}

/// Thread that builds a cpal stream, keeps it playing, and drops it on shutdown
struct StreamOwner {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamOwner {
    fn spawn<F>(name: &str, build: F) -> DeviceResult<Self>
    where
        F: FnOnce() -> DeviceResult<Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = channel::bounded::<DeviceResult<()>>(1);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        let thread_name = name.to_string();

        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::Open {
                        direction: "stream",
                        reason: e.to_string(),
                    }));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Parks until release sends or drops the shutdown sender
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    debug!("Pausing stream on shutdown failed: {}", e);
                }
                drop(stream);
                debug!("{} exited", thread_name);
            })
            .map_err(|e| DeviceError::Open {
                direction: "stream",
                reason: format!("failed to spawn stream thread: {}", e),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DeviceError::Open {
                    direction: "stream",
                    reason: "stream thread exited before the stream started".to_string(),
                })
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio stream thread panicked");
            }
        }
    }
}

impl Drop for StreamOwner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct CpalCaptureDevice {
    session_id: u32,
    consumer: HeapCons<i16>,
    scratch: Vec<i16>,
    read_timeout: Duration,
    disconnected: Arc<AtomicBool>,
    owner: Option<StreamOwner>,
}

impl CaptureDevice for CpalCaptureDevice {
    fn session_id(&self) -> u32 {
        self.session_id
    }

    fn read(&mut self, buf: &mut [u8]) -> DeviceResult<usize> {
        if self.owner.is_none() || self.disconnected.load(Ordering::Acquire) {
            return Err(DeviceError::Disconnected);
        }

        let wanted = (buf.len() / BYTES_PER_SAMPLE).min(self.scratch.len());
        let deadline = Instant::now() + self.read_timeout;
        let mut filled = 0;

        while filled < wanted {
            filled += self.consumer.pop_slice(&mut self.scratch[filled..wanted]);
            if filled == wanted || Instant::now() >= deadline {
                break;
            }
            if self.disconnected.load(Ordering::Acquire) {
                return Err(DeviceError::Disconnected);
            }
            thread::sleep(POLL_INTERVAL);
        }

        for (i, sample) in self.scratch[..filled].iter().enumerate() {
            buf[i * BYTES_PER_SAMPLE..(i + 1) * BYTES_PER_SAMPLE].copy_from_slice(&sample.to_le_bytes());
        }
        Ok(filled * BYTES_PER_SAMPLE)
    }

    fn release(&mut self) {
        if let Some(mut owner) = self.owner.take() {
            owner.shutdown();
            debug!("Capture device {} released", self.session_id);
        }
    }
}

struct CpalRenderDevice {
    producer: HeapProd<i16>,
    write_timeout: Duration,
    disconnected: Arc<AtomicBool>,
    owner: Option<StreamOwner>,
}

impl RenderDevice for CpalRenderDevice {
    fn write(&mut self, pcm: &[u8]) -> DeviceResult<usize> {
        if self.owner.is_none() || self.disconnected.load(Ordering::Acquire) {
            return Err(DeviceError::Disconnected);
        }

        let samples = crate::audio::pcm_to_samples(pcm);
        let deadline = Instant::now() + self.write_timeout;
        let mut pushed = 0;

        while pushed < samples.len() {
            pushed += self.producer.push_slice(&samples[pushed..]);
            if pushed == samples.len() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        if pushed < samples.len() {
            debug!("Render ring full, {} samples dropped", samples.len() - pushed);
        }
        Ok(pushed * BYTES_PER_SAMPLE)
    }

    fn release(&mut self) {
        if let Some(mut owner) = self.owner.take() {
            owner.shutdown();
            debug!("Render device released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RenderRequest;

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_capture_device_reads() {
        let backend = CpalBackend::new();
        let config = AudioConfig::default();
        let buffer_size = backend
            .min_buffer_size(&config, Direction::Capture)
            .unwrap_or_else(|| config.fallback_buffer_size());
        let mut device = backend
            .open_capture(&CaptureRequest { config, buffer_size })
            .unwrap();

        let mut buf = vec![0u8; buffer_size];
        let read = device.read(&mut buf).unwrap();
        assert!(read <= buffer_size);
        assert_eq!(read % BYTES_PER_SAMPLE, 0);
        device.release();
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_render_device_writes() {
        let backend = CpalBackend::new();
        let config = AudioConfig::default();
        let mut device = backend
            .open_render(&RenderRequest::voice(config, config.bytes_for_millis(20)))
            .unwrap();
        let written = device.write(&vec![0u8; config.bytes_for_millis(20)]).unwrap();
        assert!(written > 0);
        device.release();
    }
}
