use crate::error::ConfigError;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_BIT_RATE: u32 = 64_000;
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;
/// Samples are always signed 16-bit little-endian PCM
pub const BYTES_PER_SAMPLE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn from_count(count: u16) -> Result<Self, ConfigError> {
        match count {
            1 => Ok(ChannelLayout::Mono),
            2 => Ok(ChannelLayout::Stereo),
            other => Err(ConfigError::UnsupportedChannelCount(other)),
        }
    }

    pub fn count(&self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Stream format shared by capture and playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    sample_rate: u32,
    channels: ChannelLayout,
    bit_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: ChannelLayout::Mono,
            bit_rate: DEFAULT_BIT_RATE,
        }
    }
}

impl AudioConfig {
    pub fn new(sample_rate: u32, channels: ChannelLayout) -> Result<Self, ConfigError> {
        validate_sample_rate(sample_rate)?;
        Ok(Self {
            sample_rate,
            channels,
            bit_rate: DEFAULT_BIT_RATE,
        })
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> ChannelLayout {
        self.channels
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.count()
    }

    /// Accepted and stored, but not used by the pipeline (no codec)
    pub fn bit_rate(&self) -> u32 {
        self.bit_rate
    }

    pub fn bits_per_sample(&self) -> u16 {
        (BYTES_PER_SAMPLE * 8) as u16
    }

    /// Bytes per interleaved sample frame
    pub fn frame_bytes(&self) -> usize {
        BYTES_PER_SAMPLE * self.channel_count() as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.frame_bytes()
    }

    /// Bytes covering `ms` milliseconds of audio
    pub fn bytes_for_millis(&self, ms: u32) -> usize {
        self.sample_rate as usize * ms as usize / 1000 * self.frame_bytes()
    }

    /// Buffer size used when the backend cannot report a minimum
    pub fn fallback_buffer_size(&self) -> usize {
        self.sample_rate as usize * BYTES_PER_SAMPLE
    }

    /// Playback duration of a PCM chunk
    pub fn duration_of(&self, bytes: usize) -> std::time::Duration {
        let micros = bytes as u64 * 1_000_000 / self.bytes_per_second().max(1) as u64;
        std::time::Duration::from_micros(micros)
    }
}

/// Reconfiguration request. Missing fields take the defaults
/// (48 kHz, mono, 64 kbit/s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioConfigRequest {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub bit_rate: Option<u32>,
}

impl AudioConfigRequest {
    pub fn resolve(&self) -> Result<AudioConfig, ConfigError> {
        let channels = ChannelLayout::from_count(self.channels.unwrap_or(1))?;
        let config = AudioConfig::new(self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE), channels)?;
        Ok(config.with_bit_rate(self.bit_rate.unwrap_or(DEFAULT_BIT_RATE)))
    }
}

fn validate_sample_rate(sample_rate: u32) -> Result<(), ConfigError> {
    if (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedSampleRate(sample_rate))
    }
}

/// Decode little-endian 16-bit PCM bytes into samples. A trailing odd byte is ignored.
pub fn pcm_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub fn samples_to_pcm(samples: &[i16], out: &mut Vec<u8>) {
    out.reserve(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate(), 48_000);
        assert_eq!(config.channels(), ChannelLayout::Mono);
        assert_eq!(config.bit_rate(), 64_000);
        assert_eq!(config.bits_per_sample(), 16);
    }

    #[test]
    fn test_frame_math() {
        let config = AudioConfig::new(16_000, ChannelLayout::Mono).unwrap();
        assert_eq!(config.bytes_for_millis(10), 320);
        assert_eq!(config.fallback_buffer_size(), 32_000);
        assert_eq!(config.duration_of(320).as_millis(), 10);

        let stereo = AudioConfig::new(48_000, ChannelLayout::Stereo).unwrap();
        assert_eq!(stereo.frame_bytes(), 4);
        assert_eq!(stereo.bytes_for_millis(20), 3840);
    }

    #[test]
    fn test_request_validation() {
        assert!(AudioConfigRequest { sample_rate: Some(4000), ..Default::default() }.resolve().is_err());
        assert!(AudioConfigRequest { channels: Some(6), ..Default::default() }.resolve().is_err());

        let resolved = AudioConfigRequest {
            sample_rate: Some(16_000),
            channels: Some(2),
            bit_rate: Some(32_000),
        }
        .resolve()
        .unwrap();
        assert_eq!(resolved.sample_rate(), 16_000);
        assert_eq!(resolved.channel_count(), 2);
        assert_eq!(resolved.bit_rate(), 32_000);
    }

    #[test]
    fn test_pcm_conversion() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN];
        let mut bytes = Vec::new();
        samples_to_pcm(&samples, &mut bytes);
        assert_eq!(bytes.len(), 10);
        assert_eq!(pcm_to_samples(&bytes), samples);
        assert_eq!(pcm_to_samples(&[1, 0, 9]), vec![1]);
    }
}
