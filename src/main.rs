use std::f64::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use num_complex::Complex64;

use iqflow::ChannelConfig;
use iqflow::ReceiverChannel;
use iqflow::audio::LocalAudioOutput;
use iqflow::dsp::{DspExchange, LoopbackDsp};
use iqflow::modes::Mode;
use iqflow::radio::{BenchRadio, RadioContext};
use iqflow::sinks::{NetworkAudioSink, RenderSink};

/// Exercise one receive channel end to end: a synthetic carrier is fed
/// through the ring buffer, the worker and the audio/spectral fan-out,
/// with a loopback standing in for the DSP library.
#[derive(Parser, Debug)]
#[command(name = "iqflow")]
#[command(about = "Run a receive channel against a synthetic IQ source", long_about = None)]
struct Args {
    /// Channel configuration TOML file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// IQ sample rate in Hz (multiple of 48000)
    #[arg(short = 'r', long, default_value = "48000")]
    sample_rate: u32,

    /// Tone offset from the channel center in Hz
    #[arg(short = 't', long, default_value = "1000")]
    tone: f64,

    /// Demodulation mode
    #[arg(short = 'm', long, value_enum)]
    mode: Option<Mode>,

    /// How long to run, in seconds
    #[arg(short = 's', long, default_value = "2.0")]
    seconds: f64,

    /// Play the demodulated audio on the default output device
    #[arg(long)]
    local_audio: bool,
}

struct CountingNetworkSink {
    written: Arc<AtomicUsize>,
}

impl NetworkAudioSink for CountingNetworkSink {
    fn write(&mut self, _left: i16, _right: i16) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }
}

struct CountingRenderSink {
    scheduled: Arc<AtomicUsize>,
}

impl RenderSink for CountingRenderSink {
    fn schedule_redraw(&mut self, _channel: usize) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config: ChannelConfig = match &args.config {
        Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
        None => ChannelConfig::default(),
    };
    if args.local_audio {
        config.audio.local_audio = true;
    }

    let dsp = Arc::new(LoopbackDsp::new());
    let radio = Arc::new(BenchRadio::new());

    let rx = ReceiverChannel::create(
        0,
        args.sample_rate,
        &config,
        &[],
        Arc::clone(&dsp) as Arc<dyn DspExchange>,
        Arc::clone(&radio) as Arc<dyn RadioContext>,
    )?;
    if let Some(mode) = args.mode {
        rx.set_mode(mode);
    }

    let network_written = Arc::new(AtomicUsize::new(0));
    rx.set_network_sink(Some(Box::new(CountingNetworkSink {
        written: Arc::clone(&network_written),
    })));
    let redraws = Arc::new(AtomicUsize::new(0));
    rx.set_render_sink(Some(Box::new(CountingRenderSink {
        scheduled: Arc::clone(&redraws),
    })));
    if args.local_audio {
        match LocalAudioOutput::new(0) {
            Ok(sink) => rx.set_audio_sink(Some(Box::new(sink))),
            Err(e) => log::warn!("local audio unavailable: {}", e),
        }
    }

    let state = rx.state_snapshot();
    println!("=== iqflow receive channel ===");
    println!("Sample rate: {} Hz", state.sample_rate);
    println!("Frame size: {} samples", state.buffer_size);
    println!("Output samples per frame: {}", state.output_samples);
    println!("Mode: {} filter: [{}, {}] Hz", state.mode, state.filter_low, state.filter_high);
    println!("Tone offset: {} Hz", args.tone);
    println!();

    // Rotate a unit phasor to synthesize the carrier.
    let rotation = Complex64::from_polar(1.0, TAU * args.tone / args.sample_rate as f64);
    let mut phasor = Complex64::new(1.0, 0.0);

    let tick = Duration::from_secs_f64(1.0 / state.fps as f64);
    let samples_per_tick = (args.sample_rate / state.fps) as usize;
    let deadline = Instant::now() + Duration::from_secs_f64(args.seconds);
    let mut fed = 0usize;

    while Instant::now() < deadline {
        let started = Instant::now();
        for _ in 0..samples_per_tick {
            rx.add_iq_samples(0.5 * phasor.re, 0.5 * phasor.im);
            phasor *= rotation;
            fed += 1;
        }
        rx.update_tick();
        if let Some(remaining) = tick.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    println!("Fed {} IQ pairs", fed);
    println!("Network audio samples: {}", network_written.load(Ordering::Relaxed));
    println!("Redraws scheduled: {}", redraws.load(Ordering::Relaxed));
    println!("Meter: {:.1} dBm", rx.meter_level());

    let delta = rx.move_frequency(100, true);
    let state = rx.state_snapshot();
    println!("Tuned by {} Hz to {}", delta, state.frequency_a);

    drop(rx);
    Ok(())
}
