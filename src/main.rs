use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use pitchmatch::analysis::LIVE_CHUNK_SIZE;
use pitchmatch::audio::{pcm16_to_f32, read_all_mono};
use pitchmatch::pitch::{FRAME_SIZE, HOP_SIZE, MAX_F0, MIN_F0, YIN_THRESHOLD};
use pitchmatch::score::{self, nearest_note_name};
use pitchmatch::{
    AnalysisConfig, AnalysisEvent, AudioFrameSource, CancelToken, CaptureSource, Contour,
    EstimatorKind, LiveConfig, LivePitch, LiveTracker, MemoryCapture, PitchMatch,
    ReferenceAnalyzer, SessionScore, WavSource, YinParams, analyze_signal,
};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pitchmatch", version, about = "Pitch tracking for singing practice")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the pitch contour of a recording
    Analyze {
        wav: PathBuf,
        /// Print a summary instead of every point
        #[arg(long)]
        summary: bool,
        /// Decode fully and analyse frames in parallel
        #[arg(long)]
        parallel: bool,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Score a recorded performance against a reference
    Compare {
        reference: PathBuf,
        performance: PathBuf,
        /// Replay the performance in real time
        #[arg(long)]
        realtime: bool,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Score the default microphone against a reference until Ctrl-C
    #[cfg(feature = "microphone")]
    Live {
        reference: PathBuf,
        #[command(flatten)]
        tuning: TuningArgs,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct TuningArgs {
    #[arg(long, default_value_t = FRAME_SIZE)]
    frame_size: usize,
    #[arg(long, default_value_t = HOP_SIZE)]
    hop_size: usize,
    /// Samples per live read
    #[arg(long, default_value_t = LIVE_CHUNK_SIZE)]
    chunk_size: usize,
    /// yin or pyin
    #[arg(long, default_value_t = EstimatorKind::Yin)]
    estimator: EstimatorKind,
    #[arg(long, default_value_t = YIN_THRESHOLD)]
    threshold: f32,
    #[arg(long, default_value_t = MIN_F0)]
    min_freq: f32,
    #[arg(long, default_value_t = MAX_F0)]
    max_freq: f32,
}

impl TuningArgs {
    fn params(&self) -> YinParams {
        YinParams {
            threshold: self.threshold,
            min_freq: self.min_freq,
            max_freq: self.max_freq,
        }
    }

    fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            frame_size: self.frame_size,
            hop_size: self.hop_size,
            estimator: self.estimator,
            params: self.params(),
        }
    }

    fn live_config(&self) -> LiveConfig {
        LiveConfig {
            chunk_size: self.chunk_size,
            estimator: self.estimator,
            params: self.params(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze {
            wav,
            summary,
            parallel,
            tuning,
        } => {
            let config = tuning.analysis_config();
            let contour = if parallel {
                analyze_parallel(wav, config).await?
            } else {
                analyze_streaming(&wav, config).await?
            };
            if summary {
                print_summary(&contour);
            } else {
                for p in &contour {
                    let note = nearest_note_name(p.frequency_hz).unwrap_or_else(|| "-".into());
                    println!("{:.3}\t{:.2}\t{}", p.time_sec, p.frequency_hz, note);
                }
            }
        }
        Command::Compare {
            reference,
            performance,
            realtime,
            tuning,
        } => {
            let contour = analyze_streaming(&reference, tuning.analysis_config()).await?;
            compare(&contour, &performance, realtime, tuning.live_config()).await?;
        }
        #[cfg(feature = "microphone")]
        Command::Live { reference, tuning } => {
            let contour = analyze_streaming(&reference, tuning.analysis_config()).await?;
            live(&contour, tuning.live_config()).await?;
        }
    }
    Ok(())
}

async fn analyze_streaming(path: &Path, config: AnalysisConfig) -> anyhow::Result<Contour> {
    let source = WavSource::open(path)?;
    let analyzer = ReferenceAnalyzer::new(config)?;
    let mut events = analyzer.analyze(source, CancelToken::new())?;

    let mut last_logged = 0;
    while let Some(event) = events.recv().await {
        match event {
            AnalysisEvent::Progress(percent) => {
                if percent >= last_logged + 10 {
                    info!("Analysing {}: {percent}%", path.display());
                    last_logged = percent;
                }
            }
            AnalysisEvent::Completed(contour) => return Ok(contour),
            AnalysisEvent::Failed(e) => return Err(e.into()),
        }
    }
    Err(anyhow!("Analysis ended without a result"))
}

async fn analyze_parallel(path: PathBuf, config: AnalysisConfig) -> anyhow::Result<Contour> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<Contour> {
        let mut source = WavSource::open(&path)?;
        let sample_rate = source.meta().sample_rate;
        let signal: Vec<f32> = read_all_mono(&mut source)?
            .into_iter()
            .map(pcm16_to_f32)
            .collect();
        debug!(samples = signal.len(), sample_rate, "Decoded reference");
        Ok(analyze_signal(&signal, sample_rate, &config)?)
    })
    .await?
}

fn print_summary(contour: &Contour) {
    let voiced: Vec<f32> = contour
        .iter()
        .filter(|p| p.is_voiced())
        .map(|p| p.frequency_hz)
        .collect();
    println!("Points:      {}", contour.len());
    println!("Duration:    {:.2} s", contour.duration_sec());
    println!("Voiced:      {:.1}%", contour.voiced_ratio() * 100.0);
    if !voiced.is_empty() {
        let mut sorted = voiced.clone();
        sorted.sort_by(f32::total_cmp);
        let median = sorted[sorted.len() / 2];
        println!(
            "Range:       {:.1} - {:.1} Hz",
            sorted[0],
            sorted[sorted.len() - 1]
        );
        println!(
            "Median:      {:.1} Hz ({})",
            median,
            nearest_note_name(median).unwrap_or_default()
        );
    }
}

fn print_match(m: &PitchMatch) {
    println!(
        "{:8.3}s  ref {:7.1} Hz  live {:7.1} Hz  {:>4}  {:+8.1} cents  {:3.0}%",
        m.time_sec,
        m.reference_hz,
        m.live_hz,
        m.note.as_deref().unwrap_or("-"),
        m.cents,
        m.similarity * 100.0
    );
}

enum Replay {
    Pitch(LivePitch),
    Finished,
}

/// Reports the end of a replayed recording once the tracker has asked for
/// more samples after the last chunk.
struct ReplayCapture {
    inner: MemoryCapture,
    events: mpsc::UnboundedSender<Replay>,
    finished: bool,
}

impl CaptureSource for ReplayCapture {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn read(&mut self, buf: &mut [i16]) -> pitchmatch::Result<usize> {
        if self.inner.is_exhausted() && !self.finished {
            self.finished = true;
            let _ = self.events.send(Replay::Finished);
        }
        self.inner.read(buf)
    }
}

async fn compare(
    contour: &Contour,
    performance: &Path,
    realtime: bool,
    config: LiveConfig,
) -> anyhow::Result<()> {
    let mut source = WavSource::open(performance)?;
    let sample_rate = source.meta().sample_rate;
    let samples = read_all_mono(&mut source)?;
    let mut capture = MemoryCapture::new(samples, sample_rate);
    if realtime {
        capture = capture.paced();
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let pitch_tx = tx.clone();
    let mut tracker = LiveTracker::new(config)?;
    tracker.start(
        ReplayCapture {
            inner: capture,
            events: tx,
            finished: false,
        },
        move |pitch| {
            let _ = pitch_tx.send(Replay::Pitch(pitch));
        },
    )?;

    let mut session = SessionScore::new();
    while let Some(event) = rx.recv().await {
        match event {
            Replay::Pitch(pitch) => {
                if let Some(m) = score::score(contour, &pitch) {
                    print_match(&m);
                    session.add(&m);
                }
            }
            Replay::Finished => break,
        }
    }
    tracker.stop();
    tracker.join();
    print_session(&session);
    Ok(())
}

#[cfg(feature = "microphone")]
async fn live(contour: &Contour, config: LiveConfig) -> anyhow::Result<()> {
    let (stream, capture) = pitchmatch::audio::capture::open_default_input()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tracker = LiveTracker::new(config)?;
    tracker.start(capture, move |pitch| {
        let _ = tx.send(pitch);
    })?;
    info!("Listening, press Ctrl-C to stop");

    let mut session = SessionScore::new();
    loop {
        tokio::select! {
            pitch = rx.recv() => {
                let Some(pitch) = pitch else { break };
                if let Some(m) = score::score(contour, &pitch) {
                    print_match(&m);
                    session.add(&m);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    tracker.stop();
    drop(stream);
    print_session(&session);
    Ok(())
}

fn print_session(session: &SessionScore) {
    println!(
        "{} matches, mean similarity {:.1}%",
        session.matches(),
        session.mean_similarity() * 100.0
    );
    if let Some(cents) = session.mean_abs_cents() {
        println!("Mean deviation {cents:.1} cents");
    }
}
