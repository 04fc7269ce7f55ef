use std::path::{Path, PathBuf};

use choreo_sync_core::{
    AppConfig, ChoreoError, LyricSegment, LyricTrack, ManualClock, MediaClock, MoveCatalog,
    PlaybackDriver, PlaybackSynchronizer, RandomSelector, RoutineBuilder, SimilarityAligner,
    SongSession, SongSnapshot, StructureSegmenter, TranscriptResponse,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Seconds simulated after the last move or lyric when the song length is unknown.
const TAIL_SECONDS: f64 = 10.0;

fn main() -> choreo_sync_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Align {
            lyrics,
            transcript,
            config,
        } => run_align(&lyrics, &transcript, &load_config(config.as_deref())?),
        Commands::Segment {
            lyrics,
            duration,
            lyric_offset,
            config,
        } => run_segment(&lyrics, duration, lyric_offset, &load_config(config.as_deref())?),
        Commands::Play {
            song,
            media_duration,
            lyric_offset,
            seed,
            speed,
            config,
        } => run_play(
            &song,
            PlayOptions {
                media_duration,
                lyric_offset,
                seed,
                speed,
            },
            load_config(config.as_deref())?,
        ),
    }
}

fn load_config(path: Option<&Path>) -> choreo_sync_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::load(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn run_align(lyrics: &Path, transcript: &Path, config: &AppConfig) -> choreo_sync_core::Result<()> {
    let pasted = std::fs::read_to_string(lyrics)?;
    let response: TranscriptResponse = serde_json::from_str(&std::fs::read_to_string(transcript)?)?;

    let lines = SimilarityAligner::split_lines(&pasted);
    let aligner = SimilarityAligner::new(config.alignment.clone());
    let alignment = aligner.align(&lines, &response.into_segments());

    println!("{}", serde_json::to_string_pretty(&alignment)?);
    Ok(())
}

fn run_segment(
    lyrics: &Path,
    duration: Option<f64>,
    lyric_offset: f64,
    config: &AppConfig,
) -> choreo_sync_core::Result<()> {
    let segments: Vec<LyricSegment> = serde_json::from_str(&std::fs::read_to_string(lyrics)?)?;
    let mut track = LyricTrack::repaired(segments)?;
    if lyric_offset != 0.0 {
        track = track.shifted(lyric_offset)?;
    }

    let segmenter = StructureSegmenter::new(config.structure.clone());
    let segmentation = segmenter.segment(track.segments(), duration);

    println!("{}", serde_json::to_string_pretty(&segmentation)?);
    Ok(())
}

/// Knobs of a simulated playback run.
struct PlayOptions {
    media_duration: Option<f64>,
    lyric_offset: f64,
    seed: Option<u64>,
    speed: f64,
}

fn run_play(song: &Path, options: PlayOptions, config: AppConfig) -> choreo_sync_core::Result<()> {
    let PlayOptions {
        media_duration,
        lyric_offset,
        seed,
        speed,
    } = options;
    if !speed.is_finite() || speed <= 0.0 {
        return Err(ChoreoError::msg(format!(
            "playback speed must be positive, got {speed}"
        )));
    }

    let builder = RoutineBuilder::new(MoveCatalog::builtin(), &config.routine)?;
    let mut session = SongSession::build(SongSnapshot::load(song)?, &builder, &config)?
        .with_lyric_offset(lyric_offset)?;
    session.enrich_sections(&StructureSegmenter::new(config.structure.clone()));
    if let Some(actual) = media_duration {
        session = session.with_media_duration(actual, &config.routine);
    }

    for region in session.instrumental_regions(&config) {
        tracing::info!(
            kind = ?region.kind,
            start = region.start,
            end = region.end,
            "instrumental region"
        );
    }

    let end = session.duration().unwrap_or_else(|| {
        let last_move = session.routine().moves().last().map_or(0.0, |m| m.start_time);
        let last_lyric = session.lyrics().last_end().unwrap_or(0.0);
        last_move.max(last_lyric) + TAIL_SECONDS
    });

    let probability = config.playback.encourage_probability;
    let selector = match seed {
        Some(seed) => RandomSelector::seeded(seed, probability),
        None => RandomSelector::from_entropy(probability),
    };
    let mut sync =
        PlaybackSynchronizer::with_selector(config.playback.clone(), Box::new(selector));
    sync.begin_loading()?;
    sync.load(session)?;

    let step = sync.poll_interval();
    let mut driver = PlaybackDriver::new(sync)?;
    let mut clock = ManualClock::with_rate(speed);

    tracing::info!(end, speed, "starting simulated playback");
    let mut report = driver.play(&clock)?;
    loop {
        for transition in report.drain(..) {
            tracing::debug!(time = clock.current_time(), ?transition);
            println!("{}", serde_json::to_string(&transition)?);
        }
        if clock.current_time() >= end {
            break;
        }
        clock.advance(step.as_secs_f64());
        report = driver.advance(step, &clock);
    }
    driver.end()?;

    tracing::info!(time = clock.current_time(), "playback ended");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Dance routine, lyric and section synchronizer",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Time pasted lyric lines against a speech transcript.
    Align {
        /// Plain text file with one lyric line per line.
        #[arg(short, long)]
        lyrics: PathBuf,
        /// Transcript JSON (`{"segments": [...]}` or `{"error": ...}`).
        #[arg(short, long)]
        transcript: PathBuf,
        /// Optional JSON file overriding the default heuristics.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Label verses, choruses and the rest of a timed lyric file.
    Segment {
        /// JSON array of timed lyric segments.
        #[arg(short, long)]
        lyrics: PathBuf,
        /// Track length in seconds; enables outro detection.
        #[arg(short, long)]
        duration: Option<f64>,
        /// Seconds added to every lyric timestamp, negative to move lines earlier.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        lyric_offset: f64,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Replay a song against a simulated clock and print every transition.
    Play {
        /// Song snapshot or cache entry JSON.
        #[arg(short, long)]
        song: PathBuf,
        /// Real media length in seconds, used to rescale the routine.
        #[arg(short, long)]
        media_duration: Option<f64>,
        /// Seconds added to every lyric timestamp, negative to move lines earlier.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        lyric_offset: f64,
        /// Seed for reproducible coaching messages.
        #[arg(long)]
        seed: Option<u64>,
        /// Playback rate of the simulated media.
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
