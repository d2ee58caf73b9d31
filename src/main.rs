use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{info, warn};

use voxseal::{AudioSession, ChannelSink, ConfigManager, CpalBackend, KeyStore, SoftwareEffects};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let matches = Command::new("voxseal")
        .version(env!("CARGO_PKG_VERSION"))
        .about("End-to-end encrypted microphone streaming")
        .subcommand_required(true)
        .subcommand(
            Command::new("loopback")
                .about("Capture, encrypt, decrypt and play back through local devices")
                .arg(
                    Arg::new("seconds")
                        .long("seconds")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds (0 waits for Ctrl+C)")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10")
                )
                .arg(
                    Arg::new("sample-rate")
                        .long("sample-rate")
                        .value_name("HZ")
                        .help("Override the configured sample rate")
                        .value_parser(clap::value_parser!(u32))
                )
                .arg(
                    Arg::new("channels")
                        .long("channels")
                        .value_name("COUNT")
                        .help("Override the configured channel count (1 or 2)")
                        .value_parser(clap::value_parser!(u16))
                )
                .arg(
                    Arg::new("magic-mic")
                        .long("magic-mic")
                        .help("Enable noise suppression and gain control")
                        .action(ArgAction::SetTrue)
                )
                .arg(
                    Arg::new("plaintext")
                        .long("plaintext")
                        .help("Stream without encryption")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("key")
                )
                .arg(
                    Arg::new("key")
                        .long("key")
                        .value_name("BASE64")
                        .help("Use this 32-byte key instead of generating one")
                )
                .arg(
                    Arg::new("realtime")
                        .long("realtime")
                        .help("Request real-time scheduling for the capture thread")
                        .action(ArgAction::SetTrue)
                )
        )
        .subcommand(Command::new("keygen").about("Print a fresh base64 key and its fingerprint"))
        .subcommand(Command::new("devices").about("List audio input and output devices"))
        .get_matches();

    match matches.subcommand() {
        Some(("loopback", args)) => run_loopback(args).await,
        Some(("keygen", _)) => {
            let keys = KeyStore::new();
            keys.generate();
            let encoded = keys.export_base64().context("Key generation failed")?;
            let fingerprint = keys.fingerprint().unwrap_or_default();
            println!("{}", encoded);
            println!("fingerprint: {}", fingerprint);
            Ok(())
        }
        Some(("devices", _)) => {
            println!("Input devices:");
            for name in CpalBackend::list_input_devices() {
                println!("  • {}", name);
            }
            println!("Output devices:");
            for name in CpalBackend::list_output_devices() {
                println!("  • {}", name);
            }
            Ok(())
        }
        _ => unreachable!(),
    }
}

async fn run_loopback(args: &ArgMatches) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let settings = config_manager.settings().clone();
    info!("Using configuration at {:?}", config_manager.path());

    let mut request = settings.audio_request();
    if let Some(rate) = args.get_one::<u32>("sample-rate") {
        request.sample_rate = Some(*rate);
    }
    if let Some(channels) = args.get_one::<u16>("channels") {
        request.channels = Some(*channels);
    }
    let config = request.resolve()?;

    let keys = Arc::new(KeyStore::new());
    if let Some(encoded) = args.get_one::<String>("key") {
        keys.import_base64(encoded).context("Invalid --key")?;
    }
    let plaintext = args.get_flag("plaintext") || !settings.security.encryption_enabled;

    let backend = Arc::new(CpalBackend::with_devices(
        settings.audio.input_device.clone(),
        settings.audio.output_device.clone(),
    ));
    let (sink, chunks) = ChannelSink::new();

    let mut builder = AudioSession::builder(backend.clone())
        .sink(Arc::new(sink))
        .effects(Arc::new(SoftwareEffects::default()))
        .key_store(Arc::clone(&keys))
        .audio_config(config)
        .magic_mic(args.get_flag("magic-mic") || settings.capture.magic_mic)
        .realtime_priority(args.get_flag("realtime") || settings.capture.realtime_priority);
    if plaintext {
        builder = builder.plaintext();
    }
    let mut sender = builder.build();

    let mut receiver = AudioSession::builder(backend)
        .key_store(Arc::clone(&keys))
        .plaintext()
        .audio_config(config)
        .build();

    match keys.fingerprint() {
        Some(fingerprint) => println!("🔒 Encrypted, key fingerprint {}", fingerprint),
        None => println!("⚠️  Plaintext mode, audio is not encrypted"),
    }

    if settings.playback.enabled {
        receiver.start_playing()?;
    }

    let playback = tokio::task::spawn_blocking(move || {
        // Ends once the sender session drops its sink
        while let Ok(chunk) = chunks.recv() {
            if let Err(e) = receiver.play_audio_chunk(&chunk) {
                warn!("Playback stopped: {}", e);
                break;
            }
        }
        receiver.stop_playing();
        receiver.stats()
    });

    sender.start_recording()?;
    println!("🎤 Recording ({:?}). Press Ctrl+C to stop...", sender.effects_state());

    let seconds = *args.get_one::<u64>("seconds").unwrap_or(&10);
    if seconds == 0 {
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        }
    }

    println!("\n🛑 Stopping...");
    sender.stop_recording();
    let capture_stats = sender.stats();
    drop(sender);

    let playback_stats = playback.await.context("Playback task failed")?;
    println!("capture:  {}", capture_stats);
    println!("playback: {}", playback_stats);
    Ok(())
}
