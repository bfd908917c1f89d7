use crate::error::{PitchError, Result};

/// One analysis window lent out by the [`Framer`].
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub samples: &'a [f32],
    /// Index of the frame's first sample in the whole stream.
    pub start_sample: u64,
    pub time_sec: f64,
}

/// Sliding-window framer.
///
/// Samples accumulate until a full `frame_size` window is available; the
/// window is lent to the caller, then the oldest `hop_size` samples are
/// dropped and the rest stay as overlap for the next window.
#[derive(Debug, Clone)]
pub struct Framer {
    frame_size: usize,
    hop_size: usize,
    sample_rate: u32,
    buffer: Vec<f32>,
    fill: usize,
    consumed: u64,
}

impl Framer {
    pub fn new(frame_size: usize, hop_size: usize, sample_rate: u32) -> Result<Self> {
        if frame_size == 0 {
            return Err(PitchError::InvalidConfig("frame size must be > 0".into()));
        }
        if hop_size == 0 || hop_size > frame_size {
            return Err(PitchError::InvalidConfig(format!(
                "hop size {hop_size} must be in 1..={frame_size}"
            )));
        }
        if sample_rate == 0 {
            return Err(PitchError::InvalidConfig("sample rate must be > 0".into()));
        }
        Ok(Self {
            frame_size,
            hop_size,
            sample_rate,
            buffer: vec![0.0; frame_size],
            fill: 0,
            consumed: 0,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Samples currently buffered.
    pub fn fill(&self) -> usize {
        self.fill
    }

    /// Samples pushed since the session started.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Feed samples, handing every completed window to `on_frame`.
    pub fn push<F>(&mut self, chunk: &[f32], mut on_frame: F)
    where
        F: FnMut(Frame<'_>),
    {
        let mut src = 0;
        while src < chunk.len() {
            let n = (self.frame_size - self.fill).min(chunk.len() - src);
            self.buffer[self.fill..self.fill + n].copy_from_slice(&chunk[src..src + n]);
            self.fill += n;
            self.consumed += n as u64;
            src += n;

            if self.fill == self.frame_size {
                let start_sample = self.consumed - self.frame_size as u64;
                on_frame(Frame {
                    samples: &self.buffer,
                    start_sample,
                    time_sec: start_sample as f64 / self.sample_rate as f64,
                });
                self.buffer.copy_within(self.hop_size.., 0);
                self.fill = self.frame_size - self.hop_size;
            }
        }
    }

    /// End of stream. Tails longer than a quarter frame are zero-padded into
    /// one last window; shorter tails are dropped.
    pub fn flush(&mut self) -> Option<Frame<'_>> {
        let fill = std::mem::take(&mut self.fill);
        if fill <= self.frame_size / 4 {
            return None;
        }
        self.buffer[fill..].fill(0.0);
        let start_sample = self.consumed - fill as u64;
        Some(Frame {
            samples: &self.buffer,
            start_sample,
            time_sec: start_sample as f64 / self.sample_rate as f64,
        })
    }

    /// Start a new session.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.fill = 0;
        self.consumed = 0;
    }
}
