use crate::analysis::{AnalysisConfig, AnalysisEvent, CancelToken, Contour};
use crate::audio::{AudioFrameSource, downmix_to_mono, pcm16_to_f32};
use crate::error::{PitchError, Result};
use crate::pitch::{Estimator, Framer};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Upper bound on contour points reserved up front from a reported duration.
const MAX_PREALLOCATED_POINTS: usize = 1 << 16;

/// Runs the framer and an estimator over a finite source.
pub struct ContourBuilder {
    config: AnalysisConfig,
    estimator: Box<dyn Estimator>,
}

impl ContourBuilder {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            estimator: config.estimator.build(config.params),
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyse `source` to exhaustion.
    ///
    /// `on_progress` receives non-decreasing percentages and always ends
    /// with 100 on success. Source errors abort the run immediately and no
    /// partial contour is returned.
    pub fn build<S, P>(
        &mut self,
        source: &mut S,
        cancel: &CancelToken,
        on_progress: P,
    ) -> Result<Contour>
    where
        S: AudioFrameSource + ?Sized,
        P: FnMut(u8),
    {
        self.run(source, || cancel.is_cancelled(), on_progress)
    }

    /// `should_stop` is polled between chunks and between frames; a stop
    /// surfaces as [`PitchError::Cancelled`].
    fn run<S, C, P>(&mut self, source: &mut S, should_stop: C, mut on_progress: P) -> Result<Contour>
    where
        S: AudioFrameSource + ?Sized,
        C: Fn() -> bool,
        P: FnMut(u8),
    {
        let meta = source.meta();
        if meta.channel_count == 0 {
            return Err(PitchError::NoAudioTrack(
                "source reports no audio channels".into(),
            ));
        }
        if meta.sample_rate == 0 {
            return Err(PitchError::Source("source reports a sample rate of 0".into()));
        }
        let sample_rate = meta.sample_rate;
        let channels = meta.channel_count as usize;
        let duration_us = meta.duration_us.filter(|&d| d > 0);

        let mut framer = Framer::new(self.config.frame_size, self.config.hop_size, sample_rate)?;
        self.estimator.reset();
        info!(
            sample_rate,
            channels,
            ?duration_us,
            frame_size = self.config.frame_size,
            hop_size = self.config.hop_size,
            estimator = %self.config.estimator,
            "Starting contour analysis"
        );

        // Reported durations may be bogus, so the reservation is capped.
        let expected_points = duration_us.map_or(0, |d| {
            let frames = (d as u64).saturating_mul(sample_rate as u64) / 1_000_000;
            usize::try_from(frames / self.config.hop_size as u64 + 1)
                .unwrap_or(usize::MAX)
                .min(MAX_PREALLOCATED_POINTS)
        });
        let mut contour = Contour::with_capacity(expected_points);
        let mut mono: Vec<f32> = Vec::new();
        let mut last_progress: Option<u8> = None;
        let estimator = &mut self.estimator;

        while let Some(chunk) = source.next_chunk()? {
            if should_stop() {
                return Err(PitchError::Cancelled);
            }
            mono.clear();
            mono.extend(downmix_to_mono(&chunk, channels).into_iter().map(pcm16_to_f32));

            framer.push(&mono, |frame| {
                if should_stop() {
                    return;
                }
                let f0 = estimator.estimate(frame.samples, sample_rate);
                contour.push(frame.time_sec, f0);
            });

            if let Some(total_us) = duration_us {
                let consumed_us = framer.consumed() as f64 * 1_000_000.0 / sample_rate as f64;
                let percent = (100.0 * consumed_us / total_us as f64).clamp(0.0, 100.0) as u8;
                if last_progress.is_none_or(|p| percent > p) {
                    last_progress = Some(percent);
                    on_progress(percent);
                }
            }
        }
        if should_stop() {
            return Err(PitchError::Cancelled);
        }

        if let Some(frame) = framer.flush() {
            let f0 = estimator.estimate(frame.samples, sample_rate);
            contour.push(frame.time_sec, f0);
        }
        on_progress(100);

        debug!(
            samples = framer.consumed(),
            points = contour.len(),
            voiced_ratio = contour.voiced_ratio(),
            "Contour analysis finished"
        );
        Ok(contour)
    }
}

/// Clears the single-flight flag however the run ends.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Background reference analysis, one run at a time.
#[derive(Debug, Clone, Default)]
pub struct ReferenceAnalyzer {
    config: AnalysisConfig,
    active: Arc<AtomicBool>,
}

impl ReferenceAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            active: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start analysing `source` on the blocking pool.
    ///
    /// Events arrive on the returned receiver: progress, then exactly one
    /// `Completed` or `Failed`, after which the channel closes. Must be
    /// called from within a tokio runtime.
    pub fn analyze<S>(
        &self,
        source: S,
        cancel: CancelToken,
    ) -> Result<mpsc::UnboundedReceiver<AnalysisEvent>>
    where
        S: AudioFrameSource + Send + 'static,
    {
        let mut builder = ContourBuilder::new(self.config)?;
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PitchError::AlreadyRunning);
        }
        let guard = ActiveGuard(Arc::clone(&self.active));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::task::spawn_blocking(move || {
            let mut source = source;
            // Nobody is left to hear the outcome once the receiver is gone.
            let result = builder.run(
                &mut source,
                || cancel.is_cancelled() || tx.is_closed(),
                |percent| {
                    let _ = tx.send(AnalysisEvent::Progress(percent));
                },
            );
            let event = match result {
                Ok(contour) => {
                    info!(points = contour.len(), "Reference analysis complete");
                    AnalysisEvent::Completed(contour)
                }
                Err(e) => {
                    warn!("Reference analysis failed: {e}");
                    AnalysisEvent::Failed(e)
                }
            };
            // Free the slot before the caller can observe the outcome.
            drop(guard);
            if tx.send(event).is_err() {
                debug!("Analysis receiver dropped before completion");
            }
        });
        Ok(rx)
    }
}

/// Contour of a fully decoded mono signal.
///
/// Gives the same result as streaming the signal through a
/// [`ContourBuilder`]. Frame-independent estimators are run in parallel;
/// stateful ones fall back to the sequential framer.
pub fn analyze_signal(signal: &[f32], sample_rate: u32, config: &AnalysisConfig) -> Result<Contour> {
    config.validate()?;
    if sample_rate == 0 {
        return Err(PitchError::InvalidConfig("sample rate must be > 0".into()));
    }
    let frame_size = config.frame_size;
    let hop_size = config.hop_size;

    if !config.estimator.is_frame_independent() {
        let mut estimator = config.estimator.build(config.params);
        let mut framer = Framer::new(frame_size, hop_size, sample_rate)?;
        let mut contour = Contour::default();
        framer.push(signal, |frame| {
            contour.push(frame.time_sec, estimator.estimate(frame.samples, sample_rate));
        });
        if let Some(frame) = framer.flush() {
            contour.push(frame.time_sec, estimator.estimate(frame.samples, sample_rate));
        }
        return Ok(contour);
    }

    let n_full = if signal.len() >= frame_size {
        (signal.len() - frame_size) / hop_size + 1
    } else {
        0
    };
    debug!(n_full, len = signal.len(), "Parallel contour analysis");

    let estimates: Vec<(u64, f32)> = (0..n_full)
        .into_par_iter()
        .map_init(
            || config.estimator.build(config.params),
            |estimator, i| {
                let start = i * hop_size;
                let f0 = estimator.estimate(&signal[start..start + frame_size], sample_rate);
                (start as u64, f0)
            },
        )
        .collect();

    let mut contour = Contour::with_capacity(n_full + 1);
    for (start, f0) in estimates {
        contour.push(start as f64 / sample_rate as f64, f0);
    }

    let tail_start = n_full * hop_size;
    let fill = signal.len() - tail_start;
    if fill > frame_size / 4 {
        let mut frame = vec![0.0; frame_size];
        frame[..fill].copy_from_slice(&signal[tail_start..]);
        let mut estimator = config.estimator.build(config.params);
        contour.push(
            tail_start as f64 / sample_rate as f64,
            estimator.estimate(&frame, sample_rate),
        );
    }
    Ok(contour)
}
