//! Offline WAV rendering for the gamelanizer.
//!
//! Runs the realtime engine over a 16-bit WAV file block by block, exactly
//! as a host would, and writes the wet mix back out.

use clap::Parser;
use gamelanizer::{parse_pitch_ratio, Gamelanizer, GamelanizerConfig, TempoMarker};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gamelanizer-render")]
#[command(about = "Render a WAV file through the subdivision effect", long_about = None)]
struct Args {
    /// Input WAV file (16-bit signed PCM).
    #[arg(short, long)]
    input: PathBuf,

    /// Output WAV file path.
    #[arg(short, long)]
    output: PathBuf,

    /// Session tempo in beats per minute. Ignored when a tempo map is given.
    #[arg(short, long, default_value = "120")]
    bpm: f64,

    /// JSON tempo-marker table overriding --bpm.
    #[arg(short, long)]
    tempo_map: Option<PathBuf>,

    /// Interval between subdivision levels (e.g. "4/3", "3/2", "1.25").
    #[arg(short, long, default_value = "4/3")]
    pitch: String,

    /// Number of subdivision levels.
    #[arg(short, long, default_value = "2")]
    levels: usize,

    /// STFT analysis window size (power of two).
    #[arg(short, long, default_value = "1024")]
    window: usize,

    /// Analysis overlap factor.
    #[arg(long, default_value = "4")]
    overlap: usize,

    /// Engine block size in samples.
    #[arg(long, default_value = "1024")]
    block_size: usize,
}

fn main() {
    let args = Args::parse();

    let pitch_ratio = parse_pitch_ratio(&args.pitch).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    });

    let markers: Vec<TempoMarker> = match &args.tempo_map {
        Some(path) => {
            let file = File::open(path).expect("failed to open tempo map");
            serde_json::from_reader(file).expect("failed to parse tempo map")
        }
        None => vec![TempoMarker::new(0.0, args.bpm, 4, 4)],
    };

    let mut reader = WavReader::open(&args.input).expect("failed to open input WAV");
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        eprintln!("input must be 16-bit signed PCM");
        std::process::exit(1);
    }
    let channels = spec.channels as usize;

    // mix down to full-scale mono
    let mut samples: Vec<f32> = Vec::new();
    let mut frame_acc = 0.0f32;
    for (i, sample) in reader.samples::<i16>().enumerate() {
        let sample = sample.expect("failed to read sample");
        frame_acc += sample as f32 / 32768.0;
        if (i + 1) % channels == 0 {
            samples.push(frame_acc / channels as f32);
            frame_acc = 0.0;
        }
    }
    let input_len = samples.len();

    // pad to whole blocks, then leave half the length again for the
    // delayed dry signal and the echo tail
    let block_size = args.block_size;
    let block_padded = input_len.div_ceil(block_size) * block_size;
    samples.resize(block_padded, 0.0);
    samples.resize(block_padded + block_padded / 2, 0.0);
    let total = samples.len().div_ceil(block_size) * block_size;
    samples.resize(total, 0.0);

    let config = GamelanizerConfig::new()
        .with_block_size(block_size)
        .with_window_size(args.window)
        .with_overlap(args.overlap)
        .with_levels(args.levels)
        .with_sample_rate(spec.sample_rate)
        .with_pitch_ratio(pitch_ratio);

    let mut fx = Gamelanizer::new(config, markers).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    });

    let mut block_start = 0u64;
    for block in samples.chunks_mut(block_size) {
        fx.process_block(block, block_start);
        block_start += block_size as u64;
    }

    let out_spec = WavSpec {
        channels: 1,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&args.output, out_spec).expect("failed to create WAV file");
    for &sample in &samples {
        let fixed = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(fixed).expect("failed to write sample");
    }
    writer.finalize().expect("failed to finalize WAV");

    println!(
        "Rendered {:.2}s to {} ({} Hz, {} levels, pitch {})",
        samples.len() as f64 / spec.sample_rate as f64,
        args.output.display(),
        spec.sample_rate,
        args.levels,
        args.pitch
    );
}
