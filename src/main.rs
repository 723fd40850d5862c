use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;

use audio_dispatch::audio_system::rodio_output;
use audio_dispatch::audio_system::PlaylistDefinition;
use audio_dispatch::logging::initialize_tracing;
use audio_dispatch::{
    AppResult, AudioCategory, AudioClip, AudioEngine, AudioError, CancelBehaviour, EngineConfig,
    EngineEvent, Frame, Playlist,
};

const USAGE: &str = "\
Usage: audio-dispatch [OPTIONS] [FILES...]

Options:
  --shuffle             Play in random order
  --repeat              Start over after the last track
  --playlist <FILE>     Load a playlist definition (JSON)
  --config <FILE>       Use this config file instead of the default
  --volume <0.0-1.0>    Music volume
  -h, --help            Show this help";

#[derive(Debug, Default)]
struct CliOptions {
    shuffle: bool,
    repeat: bool,
    playlist: Option<PathBuf>,
    config: Option<PathBuf>,
    volume: Option<f32>,
    files: Vec<PathBuf>,
    help: bool,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> AppResult<Self> {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--shuffle" => options.shuffle = true,
                "--repeat" => options.repeat = true,
                "-h" | "--help" => options.help = true,
                "--playlist" => {
                    let value = args.next().context("--playlist needs a file")?;
                    options.playlist = Some(PathBuf::from(value));
                }
                "--config" => {
                    let value = args.next().context("--config needs a file")?;
                    options.config = Some(PathBuf::from(value));
                }
                "--volume" => {
                    let value = args.next().context("--volume needs a value")?;
                    let volume: f32 = value
                        .parse()
                        .with_context(|| format!("Invalid volume: {}", value))?;
                    options.volume = Some(volume);
                }
                flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
                file => options.files.push(PathBuf::from(file)),
            }
        }

        Ok(options)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let options = CliOptions::parse(std::env::args().skip(1))?;
    if options.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = match &options.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::load_or_create(),
    }
    .context("Failed to load configuration")?;
    if let Some(volume) = options.volume {
        config.set_category_volume(AudioCategory::Music, volume);
    }

    initialize_tracing(&config);

    let (_output, backend) = rodio_output::open_default().context("Failed to open audio output")?;
    let engine = AudioEngine::new(backend);
    engine.apply_config(&config);

    let playlist = build_playlist(&engine, &options)?;
    if playlist.is_empty() {
        println!("{}", USAGE);
        bail!("No audio files to play");
    }
    println!(
        "✓ Playlist '{}' ready ({} tracks)",
        playlist.name(),
        playlist.len()
    );

    report_tracks(&engine);

    let stop_ticker = CancellationToken::new();
    let ticker = tokio::spawn(drive_engine(
        engine.clone(),
        config.tick_interval(),
        stop_ticker.clone(),
    ));

    let interrupt = CancellationToken::new();
    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });
    }

    if options.shuffle {
        playlist.play_shuffle(options.repeat)?;
    } else {
        playlist.play(0, options.repeat)?;
    }

    match playlist
        .wait_for_completion(interrupt, CancelBehaviour::Stop)
        .await
    {
        Ok(()) => println!("✓ Playlist finished"),
        Err(AudioError::Cancelled) => println!("\n✓ Stopped"),
        Err(e) => return Err(e.into()),
    }

    stop_ticker.cancel();
    let _ = ticker.await;
    engine.shutdown();
    Ok(())
}

fn build_playlist(engine: &AudioEngine, options: &CliOptions) -> AppResult<Playlist> {
    let mut playlist = match &options.playlist {
        Some(path) => {
            let definition = PlaylistDefinition::load(path)
                .with_context(|| format!("Failed to read playlist {}", path.display()))?;
            let base = path.parent().map(PathBuf::from).unwrap_or_default();
            Playlist::from_definition(engine, &definition, |key| AudioClip::load(base.join(key)))?
        }
        None => Playlist::new(engine, "Command line", AudioCategory::Music),
    };

    let mut clips = Vec::with_capacity(options.files.len());
    for file in &options.files {
        let clip = AudioClip::load(file)
            .with_context(|| format!("Failed to load {}", file.display()))?;
        let duration = rodio_output::probe_clip(&clip)
            .with_context(|| format!("Unsupported audio format: {}", file.display()))?;
        match duration {
            Some(duration) => println!("✓ {} ({:.1}s)", clip.name(), duration.as_secs_f32()),
            None => println!("✓ {}", clip.name()),
        }
        clips.push(clip);
    }
    playlist = playlist.with_clips(clips);

    Ok(playlist)
}

/// Print each track as it starts
fn report_tracks(engine: &AudioEngine) {
    let (events, _id) = engine.subscribe();
    std::thread::spawn(move || {
        while let Ok(event) = events.recv() {
            if let EngineEvent::HandleStarted {
                clip: Some(clip), ..
            } = event
            {
                println!("▶ {}", clip);
            }
        }
    });
}

/// Tick the engine at a fixed interval with the measured frame delta
async fn drive_engine(engine: AudioEngine, interval: std::time::Duration, stop: CancellationToken) {
    let mut interval = tokio::time::interval(interval);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                let now = Instant::now();
                engine.tick(Frame::new(now - last));
                last = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_flags_and_files() {
        let options =
            CliOptions::parse(args(&["--shuffle", "a.mp3", "--repeat", "b.mp3"])).unwrap();
        assert!(options.shuffle);
        assert!(options.repeat);
        assert_eq!(
            options.files,
            vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")]
        );
    }

    #[test]
    fn test_parse_values() {
        let options =
            CliOptions::parse(args(&["--volume", "0.5", "--playlist", "set.json"])).unwrap();
        assert_eq!(options.volume, Some(0.5));
        assert_eq!(options.playlist, Some(PathBuf::from("set.json")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(CliOptions::parse(args(&["--bogus"])).is_err());
        assert!(CliOptions::parse(args(&["--volume"])).is_err());
        assert!(CliOptions::parse(args(&["--volume", "loud"])).is_err());
    }
}
