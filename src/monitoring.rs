use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one `AudioSession`, shared with the capture worker
#[derive(Debug, Default)]
pub struct SessionStats {
    chunks_captured: AtomicU64,
    chunks_delivered: AtomicU64,
    read_errors: AtomicU64,
    encrypt_failures: AtomicU64,
    chunks_played: AtomicU64,
    chunks_ignored: AtomicU64,
    decode_errors: AtomicU64,
    write_errors: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_captured(&self) {
        self.chunks_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.chunks_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encrypt_failure(&self) {
        self.encrypt_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_played(&self) {
        self.chunks_played.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.chunks_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_captured: self.chunks_captured.load(Ordering::Relaxed),
            chunks_delivered: self.chunks_delivered.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            encrypt_failures: self.encrypt_failures.load(Ordering::Relaxed),
            chunks_played: self.chunks_played.load(Ordering::Relaxed),
            chunks_ignored: self.chunks_ignored.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub chunks_captured: u64,
    pub chunks_delivered: u64,
    pub read_errors: u64,
    pub encrypt_failures: u64,
    pub chunks_played: u64,
    pub chunks_ignored: u64,
    pub decode_errors: u64,
    pub write_errors: u64,
}

impl StatsSnapshot {
    /// Fraction of inbound chunks that failed to decrypt
    pub fn decode_error_rate(&self) -> f64 {
        let inbound = self.chunks_played + self.decode_errors;
        if inbound == 0 {
            0.0
        } else {
            self.decode_errors as f64 / inbound as f64
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "captured={} delivered={} read_errors={} encrypt_failures={} played={} ignored={} decode_errors={} write_errors={}",
            self.chunks_captured,
            self.chunks_delivered,
            self.read_errors,
            self.encrypt_failures,
            self.chunks_played,
            self.chunks_ignored,
            self.decode_errors,
            self.write_errors,
        )
    }
}
