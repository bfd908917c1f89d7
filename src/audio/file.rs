use crate::audio::{AudioFrameSource, SourceMeta, f32_to_pcm16};
use crate::error::{PitchError, Result};
use hound::{WavIntoSamples, WavReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Sample frames read per chunk.
pub const WAV_CHUNK_FRAMES: usize = 4096;

enum SampleStream {
    Int {
        samples: WavIntoSamples<BufReader<File>, i32>,
        bits: u16,
    },
    Float(WavIntoSamples<BufReader<File>, f32>),
}

/// WAV file adapter for [`AudioFrameSource`].
///
/// Integer samples of any width are rescaled to 16 bits, float samples are
/// clamped to `[-1, 1]` first. The whole file is never held in memory.
pub struct WavSource {
    meta: SourceMeta,
    stream: SampleStream,
    chunk_frames: usize,
    finished: bool,
}

impl WavSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(io) => {
                PitchError::Source(format!("failed to open {}: {io}", path.display()))
            }
            hound::Error::FormatError(msg) => {
                PitchError::NoAudioTrack(format!("{}: {msg}", path.display()))
            }
            other => PitchError::Source(format!("{}: {other}", path.display())),
        })?;

        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(PitchError::NoAudioTrack(format!(
                "{} reports 0 channels",
                path.display()
            )));
        }
        if spec.sample_rate == 0 {
            return Err(PitchError::Source(format!(
                "{} reports a sample rate of 0",
                path.display()
            )));
        }

        let frames = reader.duration() as i64;
        let duration_us = Some(frames * 1_000_000 / spec.sample_rate as i64);
        debug!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            frames,
            "Opened WAV source"
        );

        let stream = match spec.sample_format {
            hound::SampleFormat::Int => SampleStream::Int {
                samples: reader.into_samples::<i32>(),
                bits: spec.bits_per_sample,
            },
            hound::SampleFormat::Float => SampleStream::Float(reader.into_samples::<f32>()),
        };

        Ok(Self {
            meta: SourceMeta::new(spec.sample_rate, spec.channels, duration_us),
            stream,
            chunk_frames: WAV_CHUNK_FRAMES,
            finished: false,
        })
    }

    pub fn with_chunk_frames(mut self, chunk_frames: usize) -> Self {
        self.chunk_frames = chunk_frames.max(1);
        self
    }
}

fn int_to_pcm16(sample: i32, bits: u16) -> i16 {
    if bits >= 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}

impl AudioFrameSource for WavSource {
    fn meta(&self) -> SourceMeta {
        self.meta
    }

    fn next_chunk(&mut self) -> Result<Option<Vec<i16>>> {
        if self.finished {
            return Ok(None);
        }
        let wanted = self.chunk_frames * self.meta.channel_count as usize;
        let mut chunk = Vec::with_capacity(wanted);

        let decode_err = |e: hound::Error| PitchError::Decode(e.to_string());
        match &mut self.stream {
            SampleStream::Int { samples, bits } => {
                for sample in samples.by_ref().take(wanted) {
                    chunk.push(int_to_pcm16(sample.map_err(decode_err)?, *bits));
                }
            }
            SampleStream::Float(samples) => {
                for sample in samples.by_ref().take(wanted) {
                    chunk.push(f32_to_pcm16(sample.map_err(decode_err)?));
                }
            }
        }

        if chunk.len() < wanted {
            self.finished = true;
        }
        if chunk.is_empty() {
            return Ok(None);
        }
        Ok(Some(chunk))
    }
}
