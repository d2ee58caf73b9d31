#[cfg(test)]
mod playback_tests {
    use crate::audio::AudioConfig;
    use crate::cipher::{ChunkCipher, encrypt};
    use crate::device::{ContentHint, RenderRequest, TransferMode, UsageHint};
    use crate::error::DeviceError;
    use crate::keystore::{EncryptionKey, KeyStore};
    use crate::monitoring::SessionStats;
    use crate::playback::PlaybackPipeline;
    use crate::tests::support::*;
    use std::sync::Arc;

    fn key() -> EncryptionKey {
        EncryptionKey::from_bytes([0x3C; 32])
    }

    fn pipeline(keys: KeyStore) -> (PlaybackPipeline, Arc<SessionStats>) {
        let stats = Arc::new(SessionStats::new());
        let pipeline = PlaybackPipeline::new(ChunkCipher::new(Arc::new(keys)), Arc::clone(&stats));
        (pipeline, stats)
    }

    fn voice_request() -> RenderRequest {
        RenderRequest::voice(AudioConfig::default(), 640)
    }

    #[test]
    fn test_submit_while_idle_is_ignored() {
        let backend = MockBackend::new();
        let (mut playback, stats) = pipeline(KeyStore::with_key(key()));

        let chunk = encrypt(&[1u8; 320], &key()).unwrap();
        playback.submit(&chunk).unwrap();

        assert!(backend.written().is_empty());
        assert_eq!(stats.snapshot().chunks_ignored, 1);
        assert_eq!(stats.snapshot().chunks_played, 0);
    }

    #[test]
    fn test_start_requests_voice_stream() {
        let backend = MockBackend::new();
        let (mut playback, _) = pipeline(KeyStore::new());
        playback.start(&backend, voice_request()).unwrap();
        playback.start(&backend, voice_request()).unwrap();

        assert!(playback.is_active());
        assert_eq!(backend.render_opens(), 1);
        let requests = backend.render_requests.lock().unwrap().clone();
        assert_eq!(requests[0].transfer_mode, TransferMode::Stream);
        assert_eq!(requests[0].usage, UsageHint::VoiceCommunication);
        assert_eq!(requests[0].content, ContentHint::Speech);
        assert_eq!(requests[0].buffer_size, 640);
    }

    #[test]
    fn test_encrypted_chunk_is_decrypted_and_written() {
        let backend = MockBackend::new();
        let (mut playback, stats) = pipeline(KeyStore::with_key(key()));
        playback.start(&backend, voice_request()).unwrap();

        let pcm: Vec<u8> = (0..320).map(|i| i as u8).collect();
        playback.submit(&encrypt(&pcm, &key()).unwrap()).unwrap();

        assert_eq!(backend.written(), vec![pcm]);
        assert_eq!(stats.snapshot().chunks_played, 1);
    }

    #[test]
    fn test_undecryptable_chunks_are_dropped_and_counted() {
        let backend = MockBackend::new();
        let (mut playback, stats) = pipeline(KeyStore::with_key(key()));
        playback.start(&backend, voice_request()).unwrap();

        // Too short, partial block, and an IV with no ciphertext
        playback.submit(&[0u8; 10]).unwrap();
        playback.submit(&[0u8; 40]).unwrap();
        playback.submit(&[0u8; 16]).unwrap();

        assert!(backend.written().is_empty());
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.decode_errors, 3);
        assert_eq!(snapshot.chunks_played, 0);
        assert!((snapshot.decode_error_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_plaintext_mode_writes_chunk_unchanged() {
        let backend = MockBackend::new();
        let (mut playback, _) = pipeline(KeyStore::new());
        playback.start(&backend, voice_request()).unwrap();

        playback.submit(&[9u8; 64]).unwrap();
        assert_eq!(backend.written(), vec![vec![9u8; 64]]);
    }

    #[test]
    fn test_empty_chunk_writes_nothing() {
        let backend = MockBackend::new();
        let (mut playback, _) = pipeline(KeyStore::new());
        playback.start(&backend, voice_request()).unwrap();

        playback.submit(&[]).unwrap();
        assert!(backend.written().is_empty());
    }

    #[test]
    fn test_disconnected_device_surfaces_error() {
        let backend = MockBackend::new();
        let (mut playback, stats) = pipeline(KeyStore::new());
        playback.start(&backend, voice_request()).unwrap();

        backend.fail_writes([DeviceError::Disconnected]);
        assert_eq!(playback.submit(&[1u8; 32]), Err(DeviceError::Disconnected));
        assert_eq!(stats.snapshot().write_errors, 1);
    }

    #[test]
    fn test_transient_write_error_is_not_fatal() {
        let backend = MockBackend::new();
        let (mut playback, stats) = pipeline(KeyStore::new());
        playback.start(&backend, voice_request()).unwrap();

        backend.fail_writes([DeviceError::Write("underrun".to_string())]);
        playback.submit(&[1u8; 32]).unwrap();
        playback.submit(&[2u8; 32]).unwrap();

        assert_eq!(backend.written(), vec![vec![2u8; 32]]);
        assert_eq!(stats.snapshot().write_errors, 1);
        assert_eq!(stats.snapshot().chunks_played, 1);
    }

    #[test]
    fn test_stop_releases_device_and_ignores_later_chunks() {
        let backend = MockBackend::new();
        let (mut playback, stats) = pipeline(KeyStore::new());
        playback.start(&backend, voice_request()).unwrap();
        playback.stop();
        playback.stop();

        assert!(!playback.is_active());
        assert_eq!(events(&backend.events), vec!["render released".to_string()]);

        playback.submit(&[1u8; 32]).unwrap();
        assert!(backend.written().is_empty());
        assert_eq!(stats.snapshot().chunks_ignored, 1);
    }
}
