//! Offline segmentation CLI: run a WAV file through the segmenter and
//! print the utterances it would dispatch.
//!
//! ```text
//! cargo run -p lectern-core --bin segment_wav -- --input speech.wav
//! cargo run -p lectern-core --features onnx --bin segment_wav -- \
//!   --input speech.wav --model models/silero_vad.onnx
//! ```

use std::path::{Path, PathBuf};

use lectern_core::audio::resample::RateConverter;
use lectern_core::segment::{Segmenter, SegmenterConfig, SegmenterEvent, SpeechSegment};
use lectern_core::vad::{EnergyScorer, SpeechScorer};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        eprintln!("segment_wav failed: {e}");
        std::process::exit(1);
    }
}

#[derive(Debug)]
struct Args {
    input: PathBuf,
    model: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut input: Option<PathBuf> = None;
    let mut model: Option<PathBuf> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--input" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --input".into());
                };
                input = Some(PathBuf::from(v));
            }
            "--model" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --model".into());
                };
                model = Some(PathBuf::from(v));
            }
            "--help" | "-h" => {
                println!(
                    "Usage: segment_wav --input <file.wav> [--model <silero_vad.onnx>]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    let input = input.ok_or_else(|| "--input is required".to_string())?;
    Ok(Args { input, model })
}

fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32), String> {
    let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max).map_err(|e| e.to_string()))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }
    let mono: Vec<f32> = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

fn build_scorer(model: &Option<PathBuf>) -> Result<Box<dyn SpeechScorer>, String> {
    match model {
        #[cfg(feature = "onnx")]
        Some(path) => {
            let scorer =
                lectern_core::vad::SileroScorer::new(path).map_err(|e| e.to_string())?;
            Ok(Box::new(scorer))
        }
        #[cfg(not(feature = "onnx"))]
        Some(_) => Err("--model requires building with the 'onnx' feature".into()),
        None => Ok(Box::new(EnergyScorer::default())),
    }
}

fn print_segment(segment: &SpeechSegment, sample_rate: u32) {
    let secs = |s: u64| s as f64 / sample_rate as f64;
    println!(
        "{:>8.3}s .. {:>8.3}s  ({:>6.3}s, {} samples, {:?})",
        secs(segment.start_sample),
        secs(segment.end_sample),
        secs(segment.end_sample) - secs(segment.start_sample),
        segment.samples.len(),
        segment.trigger,
    );
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let (samples, wav_rate) = read_wav_mono_f32(&args.input)?;
    println!(
        "{}: {} samples at {} Hz",
        args.input.display(),
        samples.len(),
        wav_rate
    );

    let config = SegmenterConfig::default();
    let engine_rate = config.sample_rate;
    let mut converter =
        RateConverter::new(wav_rate, engine_rate, 960).map_err(|e| e.to_string())?;

    let scorer = build_scorer(&args.model)?;
    let mut segmenter = Segmenter::new(config, scorer);

    let mut events = Vec::new();
    let mut segment_count = 0usize;

    for chunk in samples.chunks(960) {
        let converted = converter.process(chunk);
        if converted.is_empty() {
            continue;
        }
        events.clear();
        segmenter
            .push_frame(&converted, &mut events)
            .map_err(|e| e.to_string())?;
        for event in &events {
            if let SegmenterEvent::Segment(segment) = event {
                segment_count += 1;
                print_segment(segment, engine_rate);
            }
        }
    }

    if let Some(segment) = segmenter.flush() {
        segment_count += 1;
        print_segment(&segment, engine_rate);
    }

    println!("{segment_count} segment(s)");
    Ok(())
}
