//! "Magic Mic": noise suppression and automatic gain control on capture.
//!
//! Effects are best effort. A provider that cannot attach an effect leaves
//! capture running without it, and the outcome is recorded as an
//! [`EffectsState`] so hosts can show why the mic is unprocessed.

use log::{debug, info, warn};

use crate::audio::{AudioConfig, pcm_to_samples, samples_to_pcm};
use crate::error::EffectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    NoiseSuppressor,
    AutomaticGainControl,
}

impl EffectKind {
    pub const ALL: [EffectKind; 2] = [EffectKind::NoiseSuppressor, EffectKind::AutomaticGainControl];

    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::NoiseSuppressor => "noise suppressor",
            EffectKind::AutomaticGainControl => "automatic gain control",
        }
    }
}

/// One effect bound to a capture session
pub trait AudioEffect: Send {
    fn kind(&self) -> EffectKind;

    fn set_enabled(&mut self, enabled: bool);

    /// Whether [`AudioEffect::process`] touches samples. Platform effects run
    /// inside the driver and return false.
    fn processes_pcm(&self) -> bool {
        false
    }

    fn process(&mut self, _samples: &mut [i16]) {}

    /// Detach from the capture session. Called exactly once, before the
    /// capture device is released.
    fn release(&mut self);
}

pub trait EffectsProvider: Send + Sync {
    fn is_available(&self, kind: EffectKind) -> bool;

    fn attach(
        &self,
        kind: EffectKind,
        session_id: u32,
        config: &AudioConfig,
    ) -> Result<Box<dyn AudioEffect>, EffectError>;
}

/// Provider for hosts with no effects at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEffects;

impl EffectsProvider for NoEffects {
    fn is_available(&self, _kind: EffectKind) -> bool {
        false
    }

    fn attach(
        &self,
        kind: EffectKind,
        _session_id: u32,
        _config: &AudioConfig,
    ) -> Result<Box<dyn AudioEffect>, EffectError> {
        Err(EffectError::Unavailable(kind.name()))
    }
}

/// Outcome of attaching Magic Mic for the current capture
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EffectsState {
    /// Magic Mic is switched off, or capture is idle
    #[default]
    Disabled,
    /// At least one effect is attached
    Attached(Vec<EffectKind>),
    /// Magic Mic is on but nothing could be attached
    Unavailable { reason: String },
}

/// Effects attached to one capture session
#[derive(Default)]
pub struct EffectsChain {
    effects: Vec<Box<dyn AudioEffect>>,
}

impl EffectsChain {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach every available effect to `session_id`.
    /// Failures are logged and reflected in the returned state.
    pub fn attach(
        provider: &dyn EffectsProvider,
        session_id: u32,
        config: &AudioConfig,
    ) -> (Self, EffectsState) {
        let mut effects: Vec<Box<dyn AudioEffect>> = Vec::new();
        let mut failures = Vec::new();

        for kind in EffectKind::ALL {
            if !provider.is_available(kind) {
                failures.push(EffectError::Unavailable(kind.name()).to_string());
                continue;
            }
            match provider.attach(kind, session_id, config) {
                Ok(mut effect) => {
                    effect.set_enabled(true);
                    debug!("Attached {} to capture session {}", kind.name(), session_id);
                    effects.push(effect);
                }
                Err(e) => {
                    warn!("Magic Mic: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        let state = if effects.is_empty() {
            EffectsState::Unavailable {
                reason: failures.join("; "),
            }
        } else {
            EffectsState::Attached(effects.iter().map(|e| e.kind()).collect())
        };
        info!("Magic Mic for capture session {}: {:?}", session_id, state);

        (Self { effects }, state)
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn kinds(&self) -> Vec<EffectKind> {
        self.effects.iter().map(|e| e.kind()).collect()
    }

    /// Run software effects over a PCM chunk in place
    pub fn process(&mut self, pcm: &mut Vec<u8>) {
        if !self.effects.iter().any(|e| e.processes_pcm()) {
            return;
        }

        let mut samples = pcm_to_samples(pcm);
        for effect in self.effects.iter_mut().filter(|e| e.processes_pcm()) {
            effect.process(&mut samples);
        }

        let tail = pcm.len() % 2;
        let odd_byte = if tail == 1 { pcm.last().copied() } else { None };
        pcm.clear();
        samples_to_pcm(&samples, pcm);
        pcm.extend(odd_byte);
    }

    pub fn release_all(&mut self) {
        for mut effect in self.effects.drain(..) {
            effect.release();
            debug!("Released {}", effect.kind().name());
        }
    }
}

impl Drop for EffectsChain {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Noise gate settings
#[derive(Debug, Clone)]
pub struct NoiseGateConfig {
    /// Attenuation applied when the gate is closed (0.0 = none, 1.0 = mute)
    pub strength: f32,
    /// Signal level below which the gate closes, in dBFS
    pub noise_floor_db: f32,
    pub attack_time_ms: f32,
    pub release_time_ms: f32,
}

impl Default for NoiseGateConfig {
    fn default() -> Self {
        Self {
            strength: 0.9,
            noise_floor_db: -50.0,
            attack_time_ms: 5.0,
            release_time_ms: 50.0,
        }
    }
}

/// Automatic gain control settings
#[derive(Debug, Clone)]
pub struct GainControlConfig {
    /// Desired RMS level, in dBFS
    pub target_level_db: f32,
    pub max_gain: f32,
    pub min_gain: f32,
    /// Fraction of the distance to the desired gain covered per chunk
    pub smoothing: f32,
    /// Chunks quieter than this (dBFS) keep the current gain
    pub silence_floor_db: f32,
}

impl Default for GainControlConfig {
    fn default() -> Self {
        Self {
            target_level_db: -18.0,
            max_gain: 8.0,
            min_gain: 0.25,
            smoothing: 0.2,
            silence_floor_db: -60.0,
        }
    }
}

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

fn time_coefficient(time_ms: f32, sample_rate: u32) -> f32 {
    let samples = (time_ms / 1000.0) * sample_rate as f32;
    if samples <= 1.0 {
        1.0
    } else {
        1.0 - (-1.0 / samples).exp()
    }
}

/// Time-domain noise gate with an envelope follower
pub struct SoftwareNoiseGate {
    enabled: bool,
    threshold: f32,
    closed_gain: f32,
    attack: f32,
    release: f32,
    envelope: f32,
    gain: f32,
}

impl SoftwareNoiseGate {
    pub fn new(config: &NoiseGateConfig, sample_rate: u32) -> Self {
        Self {
            enabled: false,
            threshold: db_to_linear(config.noise_floor_db),
            closed_gain: 1.0 - config.strength.clamp(0.0, 1.0),
            attack: time_coefficient(config.attack_time_ms, sample_rate),
            release: time_coefficient(config.release_time_ms, sample_rate),
            envelope: 0.0,
            gain: 1.0,
        }
    }
}

impl AudioEffect for SoftwareNoiseGate {
    fn kind(&self) -> EffectKind {
        EffectKind::NoiseSuppressor
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn processes_pcm(&self) -> bool {
        self.enabled
    }

    fn process(&mut self, samples: &mut [i16]) {
        for sample in samples.iter_mut() {
            let level = (*sample as f32 / i16::MAX as f32).abs();
            let coeff = if level > self.envelope { self.attack } else { self.release };
            self.envelope += (level - self.envelope) * coeff;

            let target = if self.envelope >= self.threshold { 1.0 } else { self.closed_gain };
            let coeff = if target > self.gain { self.attack } else { self.release };
            self.gain += (target - self.gain) * coeff;

            *sample = (*sample as f32 * self.gain) as i16;
        }
    }

    fn release(&mut self) {
        self.enabled = false;
    }
}

/// Block-RMS automatic gain control
pub struct SoftwareGainControl {
    enabled: bool,
    config: GainControlConfig,
    target_rms: f32,
    silence_rms: f32,
    gain: f32,
}

impl SoftwareGainControl {
    pub fn new(config: GainControlConfig) -> Self {
        Self {
            enabled: false,
            target_rms: db_to_linear(config.target_level_db),
            silence_rms: db_to_linear(config.silence_floor_db),
            config,
            gain: 1.0,
        }
    }

    pub fn current_gain(&self) -> f32 {
        self.gain
    }
}

impl AudioEffect for SoftwareGainControl {
    fn kind(&self) -> EffectKind {
        EffectKind::AutomaticGainControl
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn processes_pcm(&self) -> bool {
        self.enabled
    }

    fn process(&mut self, samples: &mut [i16]) {
        if samples.is_empty() {
            return;
        }

        let energy: f32 = samples
            .iter()
            .map(|&s| {
                let x = s as f32 / i16::MAX as f32;
                x * x
            })
            .sum();
        let rms = (energy / samples.len() as f32).sqrt();

        if rms > self.silence_rms {
            let desired = (self.target_rms / rms).clamp(self.config.min_gain, self.config.max_gain);
            self.gain += (desired - self.gain) * self.config.smoothing;
        }

        for sample in samples.iter_mut() {
            let scaled = *sample as f32 * self.gain;
            *sample = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }
    }

    fn release(&mut self) {
        self.enabled = false;
    }
}

/// Magic Mic implemented in software, for hosts without platform DSP
#[derive(Debug, Clone, Default)]
pub struct SoftwareEffects {
    pub noise_gate: NoiseGateConfig,
    pub gain_control: GainControlConfig,
}

impl EffectsProvider for SoftwareEffects {
    fn is_available(&self, _kind: EffectKind) -> bool {
        true
    }

    fn attach(
        &self,
        kind: EffectKind,
        _session_id: u32,
        config: &AudioConfig,
    ) -> Result<Box<dyn AudioEffect>, EffectError> {
        Ok(match kind {
            EffectKind::NoiseSuppressor => {
                Box::new(SoftwareNoiseGate::new(&self.noise_gate, config.sample_rate()))
            }
            EffectKind::AutomaticGainControl => {
                Box::new(SoftwareGainControl::new(self.gain_control.clone()))
            }
        })
    }
}
