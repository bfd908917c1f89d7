use crate::analysis::LiveConfig;
use crate::audio::capture::CaptureSource;
use crate::audio::pcm16_to_f32;
use crate::error::{PitchError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// One voiced live estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivePitch {
    /// Start of the chunk, counted in samples captured since `start`.
    pub time_sec: f64,
    pub frequency_hz: f32,
}

/// Estimates the pitch of a capture stream on a worker thread.
///
/// Every blocking read of `chunk_size` samples is estimated on its own, with
/// no overlap, and voiced results are handed to the callback before the next
/// read.
pub struct LiveTracker {
    config: LiveConfig,
    running: Option<Arc<AtomicBool>>,
    handle: Option<JoinHandle<()>>,
}

impl LiveTracker {
    pub fn new(config: LiveConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            running: None,
            handle: None,
        })
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Start tracking `capture`. Returns `Ok(false)` if already running.
    pub fn start<C, F>(&mut self, mut capture: C, mut on_pitch: F) -> Result<bool>
    where
        C: CaptureSource + 'static,
        F: FnMut(LivePitch) + Send + 'static,
    {
        if self.is_running() {
            debug!("Live tracker already running");
            return Ok(false);
        }
        let sample_rate = capture.sample_rate();
        if sample_rate == 0 {
            return Err(PitchError::InvalidConfig(
                "capture sample rate must be > 0".into(),
            ));
        }

        // A fresh flag per session: a previous worker still blocked in a read
        // keeps watching its own, already cleared, flag.
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let chunk_size = self.config.chunk_size;
        let mut estimator = self.config.estimator.build(self.config.params);
        info!(
            sample_rate,
            chunk_size,
            estimator = %self.config.estimator,
            "Starting live pitch tracking"
        );

        let handle = thread::Builder::new()
            .name("live-pitch".into())
            .spawn(move || {
                let mut pcm = vec![0i16; chunk_size];
                let mut frame: Vec<f32> = Vec::with_capacity(chunk_size);
                let mut captured: u64 = 0;
                let mut voiced: u64 = 0;

                while flag.load(Ordering::Acquire) {
                    let n = match capture.read(&mut pcm) {
                        Ok(0) => continue,
                        Ok(n) => n.min(chunk_size),
                        Err(e) => {
                            error!("Live capture read failed: {e}");
                            flag.store(false, Ordering::Release);
                            break;
                        }
                    };
                    let time_sec = captured as f64 / sample_rate as f64;
                    captured += n as u64;

                    frame.clear();
                    frame.extend(pcm[..n].iter().copied().map(pcm16_to_f32));
                    let frequency_hz = estimator.estimate(&frame, sample_rate);
                    if frequency_hz > 0.0 && flag.load(Ordering::Acquire) {
                        voiced += 1;
                        on_pitch(LivePitch {
                            time_sec,
                            frequency_hz,
                        });
                    }
                }
                debug!(captured, voiced, "Live pitch tracking stopped");
            })
            .map_err(|e| PitchError::Capture(format!("failed to spawn live tracker: {e}")))?;

        self.running = Some(running);
        // The old worker, if any, has been told to stop and exits on its own.
        self.handle = Some(handle);
        Ok(true)
    }

    /// Ask the worker to stop. It exits once its current read returns.
    pub fn stop(&mut self) {
        if let Some(flag) = &self.running {
            flag.store(false, Ordering::Release);
        }
    }

    /// Wait for the worker thread to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Live tracker thread panicked");
            }
        }
    }
}

impl Drop for LiveTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::MemoryCapture;
    use crate::audio::f32_to_pcm16;
    use std::sync::mpsc;
    use std::time::Duration;

    const SR: u32 = 44100;

    fn sine_pcm(freq: f32, len: usize) -> Vec<i16> {
        (0..len)
            .map(|n| f32_to_pcm16(0.6 * (2.0 * std::f32::consts::PI * freq * n as f32 / SR as f32).sin()))
            .collect()
    }

    struct BrokenCapture;

    impl CaptureSource for BrokenCapture {
        fn sample_rate(&self) -> u32 {
            SR
        }

        fn read(&mut self, _buf: &mut [i16]) -> Result<usize> {
            Err(PitchError::Capture("device unplugged".into()))
        }
    }

    #[test]
    fn reports_only_voiced_chunks() -> anyhow::Result<()> {
        let chunk = 2048;
        let mut samples = sine_pcm(220.0, chunk);
        samples.extend(vec![0i16; chunk]);
        samples.extend(sine_pcm(330.0, chunk));

        let (tx, rx) = mpsc::channel();
        let mut tracker = LiveTracker::new(LiveConfig::default())?;
        assert!(tracker.start(MemoryCapture::new(samples, SR), move |p| {
            let _ = tx.send(p);
        })?);

        let first = rx.recv_timeout(Duration::from_secs(5))?;
        let second = rx.recv_timeout(Duration::from_secs(5))?;
        assert_eq!(first.time_sec, 0.0);
        assert!((first.frequency_hz - 220.0).abs() < 2.2);
        assert!((second.time_sec - (2 * chunk) as f64 / SR as f64).abs() < 1e-9);
        assert!((second.frequency_hz - 330.0).abs() < 3.3);
        // The silent chunk produced nothing, and the exhausted capture idles
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        tracker.stop();
        tracker.join();
        assert!(!tracker.is_running());
        Ok(())
    }

    #[test]
    fn second_start_is_a_no_op() -> anyhow::Result<()> {
        let mut tracker = LiveTracker::new(LiveConfig::default())?;
        assert!(tracker.start(MemoryCapture::new(vec![], SR), |_| {})?);
        assert!(!tracker.start(MemoryCapture::new(vec![], SR), |_| {})?);
        assert!(tracker.is_running());
        tracker.stop();
        tracker.join();
        Ok(())
    }

    #[test]
    fn stop_ends_the_loop_and_allows_restart() -> anyhow::Result<()> {
        let mut tracker = LiveTracker::new(LiveConfig::default())?;
        tracker.start(MemoryCapture::new(vec![], SR), |_| {})?;
        tracker.stop();
        assert!(!tracker.is_running());
        tracker.join();

        let (tx, rx) = mpsc::channel();
        assert!(tracker.start(MemoryCapture::new(sine_pcm(440.0, 2048), SR), move |p| {
            let _ = tx.send(p);
        })?);
        let pitch = rx.recv_timeout(Duration::from_secs(5))?;
        assert!((pitch.frequency_hz - 440.0).abs() < 4.4);
        tracker.stop();
        tracker.join();
        Ok(())
    }

    #[test]
    fn read_error_ends_the_session() -> anyhow::Result<()> {
        let mut tracker = LiveTracker::new(LiveConfig::default())?;
        assert!(tracker.start(BrokenCapture, |_| {})?);
        tracker.join();
        assert!(!tracker.is_running());
        Ok(())
    }

    #[test]
    fn rejects_zero_sample_rate() -> anyhow::Result<()> {
        let mut tracker = LiveTracker::new(LiveConfig::default())?;
        let result = tracker.start(MemoryCapture::new(vec![], 0), |_| {});
        assert!(matches!(result, Err(PitchError::InvalidConfig(_))));
        assert!(!tracker.is_running());
        Ok(())
    }
}
