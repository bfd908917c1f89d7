//! Integration tests for the offline path: WAV files written with hound,
//! read back through `WavSource` and analysed into contours.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use pitchmatch::audio::{pcm16_to_f32, read_all_mono};
use pitchmatch::{
    AnalysisConfig, AnalysisEvent, AudioFrameSource, CancelToken, ContourBuilder, EstimatorKind,
    PitchError, ReferenceAnalyzer, WavSource, analyze_signal,
};

fn output_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("tests");
    p.push("out");
    fs::create_dir_all(&p).expect("failed to create tests/out directory");
    p.push(name);
    p
}

fn sine(freq: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
    let len = (sample_rate as f32 * seconds) as usize;
    (0..len)
        .map(|n| 0.5 * (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate as f32).sin())
        .collect()
}

fn write_pcm16(name: &str, signal: &[f32], sample_rate: u32, channels: u16) -> anyhow::Result<PathBuf> {
    let path = output_path(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &s in signal {
        let v = (s * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(v)?;
        }
    }
    writer.finalize()?;
    Ok(path)
}

#[test]
fn wav_source_reports_format_and_duration() -> anyhow::Result<()> {
    let path = write_pcm16("meta_stereo.wav", &sine(220.0, 22050, 1.0), 22050, 2)?;
    let mut source = WavSource::open(&path)?.with_chunk_frames(1000);
    let meta = source.meta();
    assert_eq!(meta.sample_rate, 22050);
    assert_eq!(meta.channel_count, 2);
    assert_eq!(meta.duration_us, Some(1_000_000));

    let mono = read_all_mono(&mut source)?;
    assert_eq!(mono.len(), 22050);
    Ok(())
}

#[test]
fn float_and_24_bit_files_match_16_bit() -> anyhow::Result<()> {
    let sr = 16000;
    let signal = sine(300.0, sr, 0.25);
    let pcm16 = write_pcm16("width_16.wav", &signal, sr, 1)?;

    let float_path = output_path("width_float.wav");
    let mut writer = hound::WavWriter::create(
        &float_path,
        hound::WavSpec {
            channels: 1,
            sample_rate: sr,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
    )?;
    for &s in &signal {
        writer.write_sample(s)?;
    }
    writer.finalize()?;

    let wide_path = output_path("width_24.wav");
    let mut writer = hound::WavWriter::create(
        &wide_path,
        hound::WavSpec {
            channels: 1,
            sample_rate: sr,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        },
    )?;
    for &s in &signal {
        writer.write_sample(((s * i16::MAX as f32) as i32) << 8)?;
    }
    writer.finalize()?;

    let reference = read_all_mono(&mut WavSource::open(&pcm16)?)?;
    let wide = read_all_mono(&mut WavSource::open(&wide_path)?)?;
    let float = read_all_mono(&mut WavSource::open(&float_path)?)?;
    assert_eq!(reference, wide);
    assert_eq!(reference.len(), float.len());
    // Float scaling may differ from the integer path by one step
    assert!(reference.iter().zip(&float).all(|(a, b)| (a - b).abs() <= 1));
    Ok(())
}

#[test]
fn opening_nonexistent_file_is_a_source_error() {
    let bogus = output_path("this_file_should_not_exist_12345.wav");
    let result = WavSource::open(&bogus);
    assert!(
        matches!(result, Err(PitchError::Source(_))),
        "expected source error for missing file"
    );
}

#[test]
fn opening_non_audio_file_fails() -> anyhow::Result<()> {
    let path = output_path("not_audio.txt");
    {
        let mut f = fs::File::create(&path)?;
        writeln!(f, "this is definitely not a RIFF/WAVE file, just some text")?;
    }
    let result = WavSource::open(&path);
    assert!(
        matches!(
            result,
            Err(PitchError::NoAudioTrack(_)) | Err(PitchError::Source(_))
        ),
        "expected open failure for text file"
    );
    Ok(())
}

#[test]
fn streaming_contour_of_wav_tracks_the_tone() -> anyhow::Result<()> {
    let sr = 44100;
    let path = write_pcm16("tone_330.wav", &sine(330.0, sr, 0.75), sr, 2)?;
    let mut builder = ContourBuilder::new(AnalysisConfig::default())?;
    let mut progress = Vec::new();
    let contour = builder.build(&mut WavSource::open(&path)?, &CancelToken::new(), |p| {
        progress.push(p)
    })?;

    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(contour.voiced_ratio() > 0.95);
    for p in contour.iter().filter(|p| p.is_voiced()) {
        assert!((p.frequency_hz - 330.0).abs() < 3.3, "{} Hz", p.frequency_hz);
    }
    Ok(())
}

#[test]
fn parallel_and_streaming_agree_on_wav_input() -> anyhow::Result<()> {
    let sr = 22050;
    let mut signal = sine(196.0, sr, 0.4);
    signal.extend(vec![0.0; 4000]);
    signal.extend(sine(392.0, sr, 0.4));
    let path = write_pcm16("two_notes.wav", &signal, sr, 1)?;

    let config = AnalysisConfig::default();
    let streamed = ContourBuilder::new(config)?.build(
        &mut WavSource::open(&path)?,
        &CancelToken::new(),
        |_| {},
    )?;
    let decoded: Vec<f32> = read_all_mono(&mut WavSource::open(&path)?)?
        .into_iter()
        .map(pcm16_to_f32)
        .collect();
    let parallel = analyze_signal(&decoded, sr, &config)?;
    assert_eq!(streamed, parallel);
    assert!(streamed.iter().any(|p| !p.is_voiced()));
    Ok(())
}

#[tokio::test]
async fn reference_analyzer_over_wav() -> anyhow::Result<()> {
    let sr = 44100;
    let path = write_pcm16("analyzer_440.wav", &sine(440.0, sr, 0.5), sr, 1)?;
    let analyzer = ReferenceAnalyzer::new(AnalysisConfig {
        estimator: EstimatorKind::ProbabilisticYin,
        ..Default::default()
    })?;
    let mut events = analyzer.analyze(WavSource::open(&path)?, CancelToken::new())?;

    let mut contour = None;
    while let Some(event) = events.recv().await {
        match event {
            AnalysisEvent::Progress(p) => assert!(p <= 100),
            AnalysisEvent::Completed(c) => contour = Some(c),
            AnalysisEvent::Failed(e) => return Err(e.into()),
        }
    }
    let contour = contour.ok_or_else(|| anyhow::anyhow!("no contour"))?;
    assert!(contour.voiced_ratio() > 0.9);
    let voiced: Vec<f32> = contour
        .iter()
        .filter(|p| p.is_voiced())
        .map(|p| p.frequency_hz)
        .collect();
    let mean = voiced.iter().sum::<f32>() / voiced.len() as f32;
    assert!((mean - 440.0).abs() < 4.4, "mean {} Hz", mean);
    Ok(())
}
