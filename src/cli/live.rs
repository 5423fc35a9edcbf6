//! Live gamelanizer CLI.
//!
//! Runs the effect in real time: audio input through the subdivision engine
//! to the output device, with the tempo given on the command line.

use clap::Parser;
use cpal::traits::{DeviceTrait, StreamTrait};
use gamelanizer::audio::{
    default_input_device, default_output_device, find_input_device, find_output_device,
    list_input_devices, list_output_devices,
};
use gamelanizer::{parse_pitch_ratio, Gamelanizer, GamelanizerConfig, TempoMarker};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

/// Command-line arguments for the live effect.
#[derive(Parser)]
#[command(name = "gamelanizer")]
#[command(about = "Beat-synchronous subdivision effect on live audio", long_about = None)]
struct Args {
    /// Session tempo in beats per minute.
    #[arg(short, long, default_value = "120")]
    bpm: f64,

    /// Interval between subdivision levels, as a fraction or decimal
    /// (e.g. "4/3" for a fourth, "3/2" for a fifth).
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

    /// Input device (name or index).
    #[arg(short, long)]
    input: Option<String>,

    /// Output device (name or index).
    #[arg(short, long)]
    output: Option<String>,

    /// List available audio devices and exit.
    #[arg(long)]
    list_devices: bool,
}

fn print_devices() {
    println!("Input devices:");
    for info in list_input_devices() {
        let marker = if info.is_default { " *" } else { "" };
        println!("  {}: {} ({} ch){}", info.index, info.name, info.max_channels, marker);
    }

    println!("\nOutput devices:");
    for info in list_output_devices() {
        let marker = if info.is_default { " *" } else { "" };
        println!("  {}: {} ({} ch){}", info.index, info.name, info.max_channels, marker);
    }
}

fn main() {
    let args = Args::parse();

    if args.list_devices {
        print_devices();
        return;
    }

    let pitch_ratio = match parse_pitch_ratio(&args.pitch) {
        Ok(ratio) => ratio,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let device = match &args.output {
        Some(spec) => find_output_device(spec)
            .unwrap_or_else(|| panic!("output device '{spec}' not found")),
        None => default_output_device().expect("no output device"),
    };
    let default_config = device.default_output_config().expect("no output config");
    let sample_rate = default_config.sample_rate().0;
    let output_channels = 2.min(default_config.channels()) as usize;

    let stream_config = cpal::StreamConfig {
        channels: output_channels as u16,
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let config = GamelanizerConfig::new()
        .with_block_size(args.block_size)
        .with_window_size(args.window)
        .with_overlap(args.overlap)
        .with_levels(args.levels)
        .with_sample_rate(sample_rate)
        .with_pitch_ratio(pitch_ratio);
    let block_size = config.block_size;

    let mut fx = match Gamelanizer::new(config, vec![TempoMarker::new(0.0, args.bpm, 4, 4)]) {
        Ok(fx) => fx,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let metrics = Arc::clone(&fx.metrics);
    metrics.set_block_period(block_size as u64 * 1_000_000_000 / sample_rate as u64);

    println!("Output: {}", device.name().unwrap_or_default());
    println!("Sample rate: {sample_rate}");
    println!("Tempo: {} bpm, pitch {} ({} levels)", args.bpm, args.pitch, args.levels);

    // Queue for live audio input, mixed down to mono
    let input_queue: Arc<Mutex<VecDeque<f32>>> =
        Arc::new(Mutex::new(VecDeque::with_capacity(8192)));

    let input_device = match &args.input {
        Some(spec) => find_input_device(spec),
        None => default_input_device(),
    };
    let _input_stream = input_device.and_then(|input_device| {
        let input_config = input_device.default_input_config().ok()?;
        let in_channels = input_config.channels() as usize;
        println!("Input: {}", input_device.name().unwrap_or_default());
        let queue = Arc::clone(&input_queue);
        let stream = input_device
            .build_input_stream(
                &input_config.into(),
                move |data: &[f32], _| {
                    let mut q = queue.lock().unwrap();
                    for frame in data.chunks(in_channels) {
                        let mono = frame.iter().sum::<f32>() / in_channels as f32;
                        q.push_back(mono);
                        if q.len() > 8192 {
                            q.pop_front();
                        }
                    }
                },
                |err| eprintln!("input stream error: {err}"),
                None,
            )
            .ok()?;
        stream.play().ok()?;
        Some(stream)
    });

    let input_queue_out = Arc::clone(&input_queue);
    let mut block = vec![0.0f32; block_size];
    let mut pending: VecDeque<f32> = VecDeque::with_capacity(block_size * 2);
    let mut block_start: u64 = 0;
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| {
                let frames = data.len() / output_channels;
                while pending.len() < frames {
                    {
                        let mut q = input_queue_out.lock().unwrap();
                        for sample in block.iter_mut() {
                            *sample = q.pop_front().unwrap_or(0.0);
                        }
                    }
                    fx.process_block(&mut block, block_start);
                    block_start += block_size as u64;
                    pending.extend(block.iter().copied());
                }
                for frame in data.chunks_mut(output_channels) {
                    let wet = pending.pop_front().unwrap_or(0.0);
                    for channel in frame.iter_mut() {
                        *channel = wet;
                    }
                }
            },
            |err| eprintln!("stream error: {err}"),
            None,
        )
        .unwrap();

    stream.play().unwrap();
    println!("Press Ctrl+C to stop");

    loop {
        std::thread::sleep(std::time::Duration::from_secs(5));
        println!(
            "load {:.1}% (peak {:.1}%), {} beats, {} blocks",
            metrics.load() * 100.0,
            metrics.peak_load() * 100.0,
            metrics.beats_completed.load(Ordering::Relaxed),
            metrics.blocks_processed.load(Ordering::Relaxed)
        );
    }
}
