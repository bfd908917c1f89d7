//! Audio ports for the pitch-tracking core.
//!
//! The core never touches a platform decoder or device directly. Finite
//! recordings come in through [`AudioFrameSource`], live input through
//! [`capture::CaptureSource`]. Both speak interleaved PCM16.

pub mod capture;
pub mod file;

use crate::error::Result;

/// Format of one analysis run's input. Fixed for the lifetime of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMeta {
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Total duration in microseconds, when the container knows it.
    pub duration_us: Option<i64>,
}

impl SourceMeta {
    pub fn new(sample_rate: u32, channel_count: u16, duration_us: Option<i64>) -> Self {
        Self {
            sample_rate,
            channel_count,
            duration_us,
        }
    }
}

/// A finite stream of interleaved little-endian PCM16 chunks.
///
/// `next_chunk` returns `Ok(None)` once at end of stream. Chunk sizes are
/// arbitrary; a chunk may even be empty.
pub trait AudioFrameSource {
    fn meta(&self) -> SourceMeta;
    fn next_chunk(&mut self) -> Result<Option<Vec<i16>>>;
}

impl<S: AudioFrameSource + ?Sized> AudioFrameSource for Box<S> {
    fn meta(&self) -> SourceMeta {
        (**self).meta()
    }

    fn next_chunk(&mut self) -> Result<Option<Vec<i16>>> {
        (**self).next_chunk()
    }
}

/// Scale a PCM16 sample into `[-1, 1)`.
#[inline]
pub fn pcm16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Clamp to `[-1, 1]` and scale to PCM16. Inverse of [`pcm16_to_f32`];
/// `1.0` saturates to `i16::MAX`.
#[inline]
pub fn f32_to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32768.0) as i16
}

/// Collapse interleaved PCM16 into mono.
///
/// Each output sample is the integer mean of one frame's channels, truncated
/// toward zero. A trailing partial frame is dropped.
pub fn downmix_to_mono(interleaved: &[i16], channels: usize) -> Vec<i16> {
    match channels {
        0 => Vec::new(),
        1 => interleaved.to_vec(),
        2 => interleaved
            .chunks_exact(2)
            .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
            .collect(),
        n => interleaved
            .chunks_exact(n)
            .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / n as i32) as i16)
            .collect(),
    }
}

/// Drain a source completely into one mono PCM16 buffer.
pub fn read_all_mono<S: AudioFrameSource + ?Sized>(source: &mut S) -> Result<Vec<i16>> {
    let channels = source.meta().channel_count as usize;
    let mut mono = Vec::new();
    while let Some(chunk) = source.next_chunk()? {
        mono.extend(downmix_to_mono(&chunk, channels));
    }
    Ok(mono)
}

/// Default number of sample frames handed out per [`MemorySource`] chunk.
pub const MEMORY_CHUNK_FRAMES: usize = 1024;

/// In-memory PCM16 source, served in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct MemorySource {
    meta: SourceMeta,
    samples: Vec<i16>,
    chunk_frames: usize,
    position: usize,
}

impl MemorySource {
    /// `samples` are interleaved with `channel_count` channels.
    pub fn new(samples: Vec<i16>, sample_rate: u32, channel_count: u16) -> Self {
        let frames = if channel_count == 0 {
            0
        } else {
            samples.len() / channel_count as usize
        };
        let duration_us =
            (sample_rate > 0).then(|| frames as i64 * 1_000_000 / sample_rate as i64);
        Self {
            meta: SourceMeta::new(sample_rate, channel_count, duration_us),
            samples,
            chunk_frames: MEMORY_CHUNK_FRAMES,
            position: 0,
        }
    }

    /// Build from float samples, clamped and scaled to PCM16.
    pub fn from_f32(samples: &[f32], sample_rate: u32, channel_count: u16) -> Self {
        let pcm = samples.iter().copied().map(f32_to_pcm16).collect();
        Self::new(pcm, sample_rate, channel_count)
    }

    pub fn with_chunk_frames(mut self, chunk_frames: usize) -> Self {
        self.chunk_frames = chunk_frames.max(1);
        self
    }

    /// Pretend the container does not report a duration.
    pub fn without_duration(mut self) -> Self {
        self.meta.duration_us = None;
        self
    }
}

impl AudioFrameSource for MemorySource {
    fn meta(&self) -> SourceMeta {
        self.meta
    }

    fn next_chunk(&mut self) -> Result<Option<Vec<i16>>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }
        let step = self.chunk_frames * self.meta.channel_count.max(1) as usize;
        let end = (self.position + step).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(Some(chunk))
    }
}
