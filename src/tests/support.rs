//! Scripted devices and providers shared by the test modules

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::audio::AudioConfig;
use crate::device::{
    AudioBackend, CaptureDevice, CaptureRequest, Direction, PermissionProvider, RenderDevice,
    RenderRequest,
};
use crate::effects::{AudioEffect, EffectKind, EffectsProvider};
use crate::error::{DeviceError, DeviceResult, EffectError};

pub const MOCK_DEVICE_SESSION: u32 = 7;

/// Ordered record of device and effect lifecycle calls
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Backend whose capture devices read from a feed the test pushes into
pub struct MockBackend {
    pub min_buffer: Option<usize>,
    pub capture_open_error: Mutex<Option<DeviceError>>,
    pub capture_opens: AtomicUsize,
    pub render_opens: AtomicUsize,
    pub capture_requests: Mutex<Vec<CaptureRequest>>,
    pub render_requests: Mutex<Vec<RenderRequest>>,
    pub written: Arc<Mutex<Vec<Vec<u8>>>>,
    pub write_errors: Arc<Mutex<VecDeque<DeviceError>>>,
    pub events: EventLog,
    feed_tx: Sender<DeviceResult<Vec<u8>>>,
    feed_rx: Receiver<DeviceResult<Vec<u8>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_min_buffer(Some(640))
    }

    pub fn with_min_buffer(min_buffer: Option<usize>) -> Self {
        let (feed_tx, feed_rx) = channel::unbounded();
        Self {
            min_buffer,
            capture_open_error: Mutex::new(None),
            capture_opens: AtomicUsize::new(0),
            render_opens: AtomicUsize::new(0),
            capture_requests: Mutex::new(Vec::new()),
            render_requests: Mutex::new(Vec::new()),
            written: Arc::new(Mutex::new(Vec::new())),
            write_errors: Arc::new(Mutex::new(VecDeque::new())),
            events: Arc::new(Mutex::new(Vec::new())),
            feed_tx,
            feed_rx,
        }
    }

    /// Queue the result of one future capture read
    pub fn feed(&self, read: DeviceResult<Vec<u8>>) {
        self.feed_tx.send(read).unwrap();
    }

    /// Make the next render writes fail, in order
    pub fn fail_writes(&self, errors: impl IntoIterator<Item = DeviceError>) {
        self.write_errors.lock().unwrap().extend(errors);
    }

    pub fn capture_opens(&self) -> usize {
        self.capture_opens.load(Ordering::SeqCst)
    }

    pub fn render_opens(&self) -> usize {
        self.render_opens.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }
}

impl AudioBackend for MockBackend {
    fn min_buffer_size(&self, _config: &AudioConfig, _direction: Direction) -> Option<usize> {
        self.min_buffer
    }

    fn open_capture(&self, request: &CaptureRequest) -> DeviceResult<Box<dyn CaptureDevice>> {
        if let Some(e) = self.capture_open_error.lock().unwrap().take() {
            return Err(e);
        }
        self.capture_opens.fetch_add(1, Ordering::SeqCst);
        self.capture_requests.lock().unwrap().push(request.clone());
        self.events.lock().unwrap().push("device opened".to_string());

        Ok(Box::new(MockCaptureDevice {
            feed: self.feed_rx.clone(),
            events: Arc::clone(&self.events),
        }))
    }

    fn open_render(&self, request: &RenderRequest) -> DeviceResult<Box<dyn RenderDevice>> {
        self.render_opens.fetch_add(1, Ordering::SeqCst);
        self.render_requests.lock().unwrap().push(request.clone());

        Ok(Box::new(MockRenderDevice {
            written: Arc::clone(&self.written),
            errors: Arc::clone(&self.write_errors),
            events: Arc::clone(&self.events),
        }))
    }
}

pub struct MockCaptureDevice {
    feed: Receiver<DeviceResult<Vec<u8>>>,
    events: EventLog,
}

impl CaptureDevice for MockCaptureDevice {
    fn session_id(&self) -> u32 {
        MOCK_DEVICE_SESSION
    }

    fn read(&mut self, buf: &mut [u8]) -> DeviceResult<usize> {
        match self.feed.recv_timeout(Duration::from_millis(5)) {
            Ok(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(0),
        }
    }

    fn release(&mut self) {
        self.events.lock().unwrap().push("device released".to_string());
    }
}

pub struct MockRenderDevice {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    errors: Arc<Mutex<VecDeque<DeviceError>>>,
    events: EventLog,
}

impl RenderDevice for MockRenderDevice {
    fn write(&mut self, pcm: &[u8]) -> DeviceResult<usize> {
        if let Some(e) = self.errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.written.lock().unwrap().push(pcm.to_vec());
        Ok(pcm.len())
    }

    fn release(&mut self) {
        self.events.lock().unwrap().push("render released".to_string());
    }
}

pub struct StaticPermissions(pub bool);

impl PermissionProvider for StaticPermissions {
    fn microphone_granted(&self) -> bool {
        self.0
    }
}

/// Effects provider recording attach and release into the backend's log
pub struct MockEffects {
    pub available: Vec<EffectKind>,
    pub fail_attach: bool,
    pub events: EventLog,
}

impl MockEffects {
    pub fn all(events: &EventLog) -> Self {
        Self {
            available: EffectKind::ALL.to_vec(),
            fail_attach: false,
            events: Arc::clone(events),
        }
    }

    pub fn none(events: &EventLog) -> Self {
        Self {
            available: Vec::new(),
            fail_attach: false,
            events: Arc::clone(events),
        }
    }
}

impl EffectsProvider for MockEffects {
    fn is_available(&self, kind: EffectKind) -> bool {
        self.available.contains(&kind)
    }

    fn attach(
        &self,
        kind: EffectKind,
        session_id: u32,
        _config: &AudioConfig,
    ) -> Result<Box<dyn AudioEffect>, EffectError> {
        if self.fail_attach {
            return Err(EffectError::Attach {
                effect: kind.name(),
                reason: "driver refused".to_string(),
            });
        }
        self.events
            .lock()
            .unwrap()
            .push(format!("{} attached to {}", kind.name(), session_id));
        Ok(Box::new(MockEffect {
            kind,
            enabled: false,
            events: Arc::clone(&self.events),
        }))
    }
}

struct MockEffect {
    kind: EffectKind,
    enabled: bool,
    events: EventLog,
}

impl AudioEffect for MockEffect {
    fn kind(&self) -> EffectKind {
        self.kind
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn release(&mut self) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{} released", self.kind.name()));
    }
}
