use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use audio_chunk_recorder::audio::device_factory;
use audio_chunk_recorder::{
    create_router, AppState, AudioChunkRecorder, AudioSource, ChunkFile, ChunkFileWriter, Config,
    RecorderEvent, StartOptions,
};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "audio-chunk-recorder", version, about = "Chunked audio recorder")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/audio-chunk-recorder")]
    config: String,

    /// Debug logging
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP bridge
    Serve {
        /// Use a generated tone instead of the microphone
        #[arg(long)]
        synthetic: bool,
    },
    /// Record for a fixed time, logging every event
    Record {
        /// Seconds to record before stopping
        #[arg(long)]
        duration: f64,
        #[arg(long)]
        chunk_seconds: Option<f64>,
        #[arg(long)]
        max_duration: Option<f64>,
        #[arg(long)]
        synthetic: bool,
    },
    /// Print the format of a chunk file
    Inspect { file: String },
    /// Delete every chunk file in the storage directory
    Clear,
}

fn source(synthetic: bool) -> AudioSource {
    if synthetic {
        AudioSource::Synthetic
    } else {
        AudioSource::Microphone
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let cfg = Config::load(&cli.config)?;

    info!("Audio Chunk Recorder v{}", env!("CARGO_PKG_VERSION"));
    info!("Chunk directory: {}", cfg.storage.directory_path().display());

    match cli.command {
        Command::Serve { synthetic } => serve(cfg, source(synthetic)).await,
        Command::Record {
            duration,
            chunk_seconds,
            max_duration,
            synthetic,
        } => {
            let options = StartOptions {
                chunk_seconds,
                max_recording_duration: max_duration,
                ..StartOptions::default()
            };
            record(cfg, source(synthetic), options, duration).await
        }
        Command::Inspect { file } => {
            let chunk = ChunkFile::open(&file)?;
            println!("{}", chunk.path);
            if let Some(sequence) = chunk.sequence {
                println!("  sequence:    {}", sequence);
            }
            println!("  duration:    {:.3}s", chunk.duration_seconds);
            println!("  sample rate: {} Hz", chunk.sample_rate);
            println!("  channels:    {}", chunk.channels);
            println!("  bit depth:   {}", chunk.bits_per_sample);
            println!("  samples:     {}", chunk.samples.len());
            Ok(())
        }
        Command::Clear => {
            let writer = ChunkFileWriter::new(
                cfg.storage.directory_path(),
                cfg.timing.encoded_flush_delay(),
            )?;
            let deleted = writer.clear_all_chunk_files()?;
            println!("Deleted {} chunk files", deleted);
            Ok(())
        }
    }
}

async fn serve(cfg: Config, source: AudioSource) -> Result<()> {
    let (events, _) = broadcast::channel::<RecorderEvent>(256);
    let addr = format!("{}:{}", cfg.server.bind, cfg.server.port);

    let recorder = AudioChunkRecorder::builder(cfg)
        .device_factory(Arc::from(device_factory(source)))
        .event_sink(Arc::new(events.clone()))
        .spawn()?;

    let app = create_router(AppState::new(recorder, events));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP bridge listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn record(cfg: Config, source: AudioSource, options: StartOptions, seconds: f64) -> Result<()> {
    let (events, mut received) = mpsc::unbounded_channel::<RecorderEvent>();

    let recorder = AudioChunkRecorder::builder(cfg)
        .device_factory(Arc::from(device_factory(source)))
        .event_sink(Arc::new(events))
        .spawn()?;

    recorder.start_recording(options).await?;

    let deadline = tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0)));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                if recorder.is_recording() {
                    recorder.stop_recording().await?;
                }
                break;
            }
            Some(event) = received.recv() => {
                log_event(&event);
                if matches!(event, RecorderEvent::MaxDurationReached(_)) {
                    break;
                }
            }
        }
    }

    // Drain what the final stop emitted
    while let Ok(event) = received.try_recv() {
        log_event(&event);
    }

    Ok(())
}

fn log_event(event: &RecorderEvent) {
    match event {
        RecorderEvent::AudioLevel(_) => {}
        RecorderEvent::Error(e) => warn!("{}: {}", event.name(), e.message),
        _ => match event.payload_json() {
            Ok(payload) => info!("{} {}", event.name(), payload),
            Err(e) => warn!("{} (unserializable: {})", event.name(), e),
        },
    }
}
