use crate::error::Result;
use std::time::{Duration, Instant};

/// A live mono PCM16 input with blocking reads.
///
/// The device lifecycle (start, stop, release) belongs to whoever created
/// the capture; the tracker only reads from it.
pub trait CaptureSource: Send {
    fn sample_rate(&self) -> u32;

    /// Block until samples are available and copy up to `buf.len()` of them.
    ///
    /// Returns the number of samples written. `Ok(0)` means nothing was
    /// available this time, not end of input.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize>;
}

impl<C: CaptureSource + ?Sized> CaptureSource for Box<C> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        (**self).read(buf)
    }
}

/// Replays a recorded mono buffer as if it were a microphone.
///
/// Once the buffer is exhausted reads return `Ok(0)` forever, like a muted
/// device; the tracker must be stopped by its owner.
pub struct MemoryCapture {
    samples: Vec<i16>,
    sample_rate: u32,
    position: usize,
    paced: Option<Instant>,
}

impl MemoryCapture {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            position: 0,
            paced: None,
        }
    }

    /// Deliver samples no faster than real time.
    pub fn paced(mut self) -> Self {
        self.paced = Some(Instant::now());
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.samples.len()
    }
}

impl CaptureSource for MemoryCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        if self.is_exhausted() {
            // Behave like an idle device instead of spinning.
            std::thread::sleep(Duration::from_millis(1));
            return Ok(0);
        }
        let end = (self.position + buf.len()).min(self.samples.len());
        let n = end - self.position;
        buf[..n].copy_from_slice(&self.samples[self.position..end]);
        self.position = end;

        if let Some(started) = self.paced {
            if self.sample_rate > 0 {
                let due =
                    Duration::from_secs_f64(self.position as f64 / self.sample_rate as f64);
                let elapsed = started.elapsed();
                if due > elapsed {
                    std::thread::sleep(due - elapsed);
                }
            }
        }
        Ok(n)
    }
}

#[cfg(feature = "microphone")]
pub use mic::{MicCapture, open_default_input};

#[cfg(feature = "microphone")]
mod mic {
    use super::CaptureSource;
    use crate::audio::f32_to_pcm16;
    use crate::error::{PitchError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::collections::VecDeque;
    use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
    use tracing::{debug, error, info, warn};

    /// Blocks handed from the audio callback to the reader before samples
    /// start being dropped.
    const PENDING_BLOCKS: usize = 64;

    /// Reader half of the default input device.
    ///
    /// The cpal stream callback downmixes to mono PCM16 and pushes blocks
    /// through a bounded channel; `read` pulls from it.
    pub struct MicCapture {
        receiver: Receiver<Vec<i16>>,
        pending: VecDeque<i16>,
        sample_rate: u32,
    }

    /// Open and start the default input device.
    ///
    /// The returned stream must be kept alive for as long as the capture is
    /// read; dropping it stops the device.
    pub fn open_default_input() -> Result<(cpal::Stream, MicCapture)> {
        let host = cpal::default_host();
        debug!(audio_host = ?host.id(), "Using audio host");
        let device = host
            .default_input_device()
            .ok_or_else(|| PitchError::Capture("No input device available".into()))?;
        if let Ok(name) = device.name() {
            info!(device = %name, "Using audio input device");
        }
        let supported_config = device
            .default_input_config()
            .map_err(|e| PitchError::Capture(e.to_string()))?;
        debug!("Default input config: {:?}", supported_config);
        let sample_format = supported_config.sample_format();
        let config: cpal::StreamConfig = supported_config.config();
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        let (sender, receiver) = sync_channel::<Vec<i16>>(PENDING_BLOCKS);
        let err_fn = |err: cpal::StreamError| error!("CPAL input stream error: {err}");

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let block = data
                        .chunks_exact(channels)
                        .map(|frame| f32_to_pcm16(frame.iter().sum::<f32>() / channels as f32))
                        .collect();
                    forward(&sender, block);
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let block = crate::audio::downmix_to_mono(data, channels);
                    forward(&sender, block);
                },
                err_fn,
                None,
            ),
            other => {
                return Err(PitchError::Capture(format!(
                    "Unsupported input sample format: {other:?}"
                )));
            }
        }
        .map_err(|e| PitchError::Capture(e.to_string()))?;

        stream
            .play()
            .map_err(|e| PitchError::Capture(e.to_string()))?;
        info!(sample_rate, channels, "Microphone capture started");

        Ok((
            stream,
            MicCapture {
                receiver,
                pending: VecDeque::new(),
                sample_rate,
            },
        ))
    }

    fn forward(sender: &SyncSender<Vec<i16>>, block: Vec<i16>) {
        match sender.try_send(block) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => warn!("Capture reader is behind, dropping input block"),
        }
    }

    impl CaptureSource for MicCapture {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
            while self.pending.len() < buf.len() {
                let block = self
                    .receiver
                    .recv()
                    .map_err(|_| PitchError::Capture("Input stream closed".into()))?;
                self.pending.extend(block);
            }
            for (slot, sample) in buf.iter_mut().zip(self.pending.drain(..buf.len())) {
                *slot = sample;
            }
            Ok(buf.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_capture_reads_in_order_then_idles() -> anyhow::Result<()> {
        let mut capture = MemoryCapture::new((0..10).collect(), 8000);
        let mut buf = [0i16; 4];

        assert_eq!(capture.read(&mut buf)?, 4);
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(capture.read(&mut buf)?, 4);
        assert_eq!(capture.read(&mut buf)?, 2);
        assert_eq!(&buf[..2], &[8, 9]);
        assert!(capture.is_exhausted());
        assert_eq!(capture.read(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn paced_capture_does_not_run_ahead_of_real_time() -> anyhow::Result<()> {
        let mut capture = MemoryCapture::new(vec![0; 400], 8000).paced();
        let started = Instant::now();
        let mut buf = [0i16; 400];
        capture.read(&mut buf)?;
        // 400 samples at 8 kHz is 50 ms.
        assert!(started.elapsed() >= Duration::from_millis(45));
        Ok(())
    }
}
