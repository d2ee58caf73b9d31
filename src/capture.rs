use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::cipher::ChunkCipher;
use crate::device::{AudioBackend, CaptureDevice, CaptureRequest, PermissionProvider};
use crate::effects::{EffectsChain, EffectsProvider, EffectsState};
use crate::error::{DeviceError, SessionError, SessionResult};
use crate::monitoring::SessionStats;
use crate::sink::AudioSink;

/// Pause after a failed read so a persistently failing device does not spin
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(2);

/// Everything the read loop needs besides the device
#[derive(Clone)]
pub struct CaptureContext {
    pub cipher: ChunkCipher,
    pub sink: Arc<dyn AudioSink>,
    pub stats: Arc<SessionStats>,
    /// Try to raise the read loop to real-time scheduling
    pub realtime_priority: bool,
}

/// Device plus the effects bound to it. Released exactly once, effects
/// first, whether capture stops normally or the worker unwinds.
struct CaptureRig {
    device: Box<dyn CaptureDevice>,
    effects: EffectsChain,
    released: bool,
}

impl CaptureRig {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.effects.release_all();
        self.device.release();
    }
}

impl Drop for CaptureRig {
    fn drop(&mut self) {
        self.release();
    }
}

struct ActiveCapture {
    running: Arc<AtomicBool>,
    worker: JoinHandle<CaptureRig>,
    effects_state: EffectsState,
    device_session: u32,
}

enum CaptureState {
    Idle,
    Active(ActiveCapture),
}

/// Microphone side of a session: `Idle -> start -> Active -> stop -> Idle`
pub struct CapturePipeline {
    state: CaptureState,
    context: CaptureContext,
}

impl CapturePipeline {
    pub fn new(context: CaptureContext) -> Self {
        Self {
            state: CaptureState::Idle,
            context,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, CaptureState::Active(_))
    }

    /// Active and the read loop has not exited on its own
    pub fn is_running(&self) -> bool {
        match &self.state {
            CaptureState::Active(active) => !active.worker.is_finished(),
            CaptureState::Idle => false,
        }
    }

    pub fn effects_state(&self) -> EffectsState {
        match &self.state {
            CaptureState::Active(active) => active.effects_state.clone(),
            CaptureState::Idle => EffectsState::Disabled,
        }
    }

    /// Device session id of the running capture
    pub fn device_session(&self) -> Option<u32> {
        match &self.state {
            CaptureState::Active(active) => Some(active.device_session),
            CaptureState::Idle => None,
        }
    }

    /// Open the microphone and start the read loop.
    ///
    /// A no-op if already active. `effects` is `Some` when Magic Mic is on.
    pub fn start(
        &mut self,
        backend: &dyn AudioBackend,
        permissions: &dyn PermissionProvider,
        effects: Option<&dyn EffectsProvider>,
        request: CaptureRequest,
    ) -> SessionResult<()> {
        if self.is_active() {
            debug!("Capture already active");
            return Ok(());
        }

        if !permissions.microphone_granted() {
            warn!("Capture refused: microphone permission not granted");
            return Err(SessionError::PermissionDenied);
        }

        let device = backend.open_capture(&request)?;
        let device_session = device.session_id();

        let (effects, effects_state) = match effects {
            Some(provider) => EffectsChain::attach(provider, device_session, &request.config),
            None => (EffectsChain::empty(), EffectsState::Disabled),
        };

        let mut rig = CaptureRig {
            device,
            effects,
            released: false,
        };

        let running = Arc::new(AtomicBool::new(true));
        let loop_running = Arc::clone(&running);
        let context = self.context.clone();
        let buffer_size = request.buffer_size.max(1);

        let worker = thread::Builder::new()
            .name("voxseal-capture".to_string())
            .spawn(move || {
                if context.realtime_priority {
                    set_realtime_priority();
                }
                read_loop(&loop_running, &mut rig, buffer_size, &context);
                rig
            })
            .map_err(|e| DeviceError::Open {
                direction: "capture",
                reason: format!("failed to spawn read loop: {}", e),
            })?;

        info!(
            "Capture started: {} Hz, {} ch, {} byte reads, device session {}",
            request.config.sample_rate(),
            request.config.channel_count(),
            buffer_size,
            device_session
        );

        self.state = CaptureState::Active(ActiveCapture {
            running,
            worker,
            effects_state,
            device_session,
        });
        Ok(())
    }

    /// Stop the read loop, then release effects, then the device.
    /// Returns once the device is released. A no-op if idle.
    pub fn stop(&mut self) {
        let active = match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Active(active) => active,
            CaptureState::Idle => return,
        };

        active.running.store(false, Ordering::Release);

        match active.worker.join() {
            Ok(mut rig) => rig.release(),
            Err(e) => error!("Capture worker panicked, device released during unwind: {:?}", e),
        }

        info!("Capture stopped (device session {})", active.device_session);
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(running: &AtomicBool, rig: &mut CaptureRig, buffer_size: usize, context: &CaptureContext) {
    debug!("Capture read loop started");

    let mut buffer = vec![0u8; buffer_size];
    let mut read_errors = 0u64;

    while running.load(Ordering::Acquire) {
        let bytes_read = match rig.device.read(&mut buffer) {
            Ok(n) => n.min(buffer.len()),
            Err(DeviceError::Disconnected) => {
                warn!("Capture device disconnected, read loop exiting");
                break;
            }
            Err(e) => {
                read_errors += 1;
                context.stats.record_read_error();
                if read_errors == 1 || read_errors % 100 == 0 {
                    warn!("Capture read failed ({} so far): {}", read_errors, e);
                } else {
                    debug!("Capture read failed: {}", e);
                }
                thread::sleep(READ_ERROR_BACKOFF);
                continue;
            }
        };

        if bytes_read == 0 {
            continue;
        }
        context.stats.record_captured();

        let mut pcm = buffer[..bytes_read].to_vec();
        rig.effects.process(&mut pcm);

        match context.cipher.seal(&pcm) {
            Ok((_, chunk)) => {
                context.sink.deliver(chunk);
                context.stats.record_delivered();
            }
            Err(e) => {
                context.stats.record_encrypt_failure();
                warn!("Dropping captured chunk of {} bytes: {}", pcm.len(), e);
            }
        }
    }

    debug!("Capture read loop stopped");
}

/// Best-effort real-time scheduling for the read loop
fn set_realtime_priority() {
    #[cfg(target_os = "linux")]
    {
        let result = unsafe {
            let param = libc::sched_param { sched_priority: 80 };
            libc::sched_setscheduler(0, libc::SCHED_FIFO, &param)
        };

        if result == 0 {
            info!("Capture thread running with SCHED_FIFO priority 80");
        } else {
            warn!(
                "Failed to set real-time scheduling: {}. Running with normal priority.",
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        debug!("Real-time scheduling not implemented for this platform");
    }
}
