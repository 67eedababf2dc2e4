//! Contract with the external DSP library.
//!
//! The pipeline never implements demodulation itself; it drives a
//! channel-keyed synchronous exchange and a set of configuration bindings.
//! [`LoopbackDsp`] is the null implementation used by tests and the demo
//! binary: the exchange decimates the IQ frame straight to the audio
//! buffer and the spectral path produces a flat trace.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, RxError};
use crate::modes::{AgcMode, MeterType, Mode};

/// Parameters handed to the DSP when a channel is opened.
#[derive(Debug, Clone)]
pub struct ChannelOpenParams {
    pub buffer_size: usize,
    pub fft_size: usize,
    pub sample_rate: u32,
    pub dsp_rate: u32,
    pub output_rate: u32,
    pub low_latency: bool,
}

/// AGC program: speed plus the derived attack/hang/decay constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgcProfile {
    pub mode: AgcMode,
    pub gain: f64,
    pub slope: f64,
    pub attack_ms: i32,
    pub hang_ms: i32,
    pub decay_ms: i32,
    pub hang_threshold: i32,
}

/// Noise-processing switches and blanker/NR parameters, pushed as one
/// group so the chain never runs with a half-applied configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoiseSettings {
    pub nb: bool,
    pub nb2: bool,
    pub nr: bool,
    pub nr2: bool,
    pub anf: bool,
    pub snb: bool,
    /// Impulse blanker time constant in seconds.
    pub nb_tau: f64,
    /// Impulse blanker advance time in seconds.
    pub nb_advtime: f64,
    /// Impulse blanker hang time in seconds.
    pub nb_hang: f64,
    /// Impulse blanker detection threshold.
    pub nb_thresh: f64,
    /// Spectral blanker operating mode.
    pub nb2_mode: i32,
    /// Spectral NR gain method.
    pub nr2_gain_method: i32,
    /// Spectral NR noise-power-estimation method.
    pub nr2_npe_method: i32,
}

/// Spectral analyzer geometry.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerSettings {
    pub pixels: usize,
    pub buffer_size: usize,
    pub fps: u32,
}

/// The synchronous, channel-keyed DSP surface the pipeline drives.
///
/// `exchange` is the only call on the worker's hot path; everything else is
/// configuration pushed from the setter API. Implementations must be safe
/// to call from the worker thread and the control thread concurrently.
pub trait DspExchange: Send + Sync {
    fn open_channel(&self, channel: usize, params: &ChannelOpenParams) -> Result<()>;
    fn close_channel(&self, channel: usize);
    /// Pause or resume the demodulation chain; held off during the
    /// sample-rate transition.
    fn set_channel_run(&self, channel: usize, run: bool);

    /// Run the demodulation chain over one interleaved I/Q frame, writing
    /// interleaved stereo audio into `output`. Returns the DSP error code;
    /// zero is success and [`crate::constants::DSP_NOT_READY`] means the
    /// chain is not primed yet.
    fn exchange(&self, channel: usize, input: &[f64], output: &mut [f64]) -> i32;

    /// In-place impulse noise blanker.
    fn noise_blanker(&self, channel: usize, frame: &mut [f64]);
    /// In-place spectral noise blanker.
    fn noise_blanker2(&self, channel: usize, frame: &mut [f64]);

    /// Feed one frame to the spectral analyzer.
    fn spectrum(&self, channel: usize, frame: &[f64]);
    /// Fetch the latest per-pixel dB magnitudes; returns whether a fresh
    /// trace was available.
    fn get_pixels(&self, channel: usize, out: &mut [f32]) -> bool;
    /// S-meter reading in dB, before calibration offsets.
    fn meter(&self, channel: usize, meter: MeterType) -> f64;

    fn set_passband(&self, channel: usize, low: f64, high: f64);
    fn set_mode(&self, channel: usize, mode: Mode);
    fn set_deviation(&self, channel: usize, deviation: f64);
    fn set_agc(&self, channel: usize, profile: &AgcProfile);
    fn set_noise(&self, channel: usize, settings: &NoiseSettings);
    /// CTUN frequency shift on or off.
    fn set_shift_run(&self, channel: usize, run: bool);
    /// Retune the channel and blanker chains after a sample-rate change.
    fn set_rates(&self, channel: usize, sample_rate: u32, dsp_rate: u32, output_rate: u32);
    fn set_volume(&self, channel: usize, volume: f64);
    fn init_analyzer(&self, channel: usize, settings: &AnalyzerSettings);
    fn set_display_average(&self, channel: usize, backmult: f64, num_average: i32);
}

#[derive(Default)]
struct LoopbackChannel {
    open: bool,
    running: bool,
    passband: (f64, f64),
    mode: Option<Mode>,
    noise: NoiseSettings,
    shift: bool,
    pixels: usize,
    /// Remaining exchange calls that report `error_code`.
    error_count: u32,
    error_code: i32,
}

/// Identity DSP used by tests and the demo binary. Exchange decimates the
/// input frame to the output rate; the spectral trace is a flat floor.
pub struct LoopbackDsp {
    channels: Mutex<HashMap<usize, LoopbackChannel>>,
    meter_db: Mutex<f64>,
}

impl LoopbackDsp {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            meter_db: Mutex::new(-73.0),
        }
    }

    /// Make the next `count` exchange calls on `channel` return `code`.
    pub fn fail_exchanges(&self, channel: usize, code: i32, count: u32) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let ch = channels.entry(channel).or_default();
        ch.error_code = code;
        ch.error_count = count;
    }

    pub fn set_meter_db(&self, db: f64) {
        *self.meter_db.lock().unwrap_or_else(|e| e.into_inner()) = db;
    }

    pub fn passband(&self, channel: usize) -> (f64, f64) {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(&channel).map(|c| c.passband).unwrap_or((0.0, 0.0))
    }

    pub fn noise_settings(&self, channel: usize) -> NoiseSettings {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(&channel).map(|c| c.noise).unwrap_or_default()
    }

    pub fn is_open(&self, channel: usize) -> bool {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(&channel).map(|c| c.open).unwrap_or(false)
    }
}

impl Default for LoopbackDsp {
    fn default() -> Self {
        Self::new()
    }
}

impl DspExchange for LoopbackDsp {
    fn open_channel(&self, channel: usize, params: &ChannelOpenParams) -> Result<()> {
        if params.buffer_size == 0 {
            return Err(RxError::ChannelCreate {
                channel,
                reason: "zero buffer size".into(),
            });
        }
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let ch = channels.entry(channel).or_default();
        ch.open = true;
        ch.running = true;
        Ok(())
    }

    fn close_channel(&self, channel: usize) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.remove(&channel);
    }

    fn set_channel_run(&self, channel: usize, run: bool) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ch) = channels.get_mut(&channel) {
            ch.running = run;
        }
    }

    fn exchange(&self, channel: usize, input: &[f64], output: &mut [f64]) -> i32 {
        {
            let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(ch) = channels.get_mut(&channel)
                && ch.error_count > 0
            {
                ch.error_count -= 1;
                return ch.error_code;
            }
        }
        // Decimate pairs by the rate ratio; I maps to left, Q to right.
        let in_pairs = input.len() / 2;
        let out_pairs = output.len() / 2;
        if out_pairs == 0 {
            return 0;
        }
        if in_pairs == 0 {
            output.fill(0.0);
            return 0;
        }
        let ratio = (in_pairs / out_pairs).max(1);
        for k in 0..out_pairs {
            let src = (k * ratio).min(in_pairs - 1) * 2;
            output[k * 2] = input[src];
            output[k * 2 + 1] = input[src + 1];
        }
        0
    }

    fn noise_blanker(&self, _channel: usize, _frame: &mut [f64]) {}

    fn noise_blanker2(&self, _channel: usize, _frame: &mut [f64]) {}

    fn spectrum(&self, _channel: usize, _frame: &[f64]) {}

    fn get_pixels(&self, channel: usize, out: &mut [f32]) -> bool {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(ch) = channels.get(&channel) else {
            return false;
        };
        if !ch.running {
            return false;
        }
        out.fill(-120.0);
        true
    }

    fn meter(&self, _channel: usize, _meter: MeterType) -> f64 {
        *self.meter_db.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_passband(&self, channel: usize, low: f64, high: f64) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.entry(channel).or_default().passband = (low, high);
    }

    fn set_mode(&self, channel: usize, mode: Mode) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.entry(channel).or_default().mode = Some(mode);
    }

    fn set_deviation(&self, _channel: usize, _deviation: f64) {}

    fn set_agc(&self, _channel: usize, _profile: &AgcProfile) {}

    fn set_noise(&self, channel: usize, settings: &NoiseSettings) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.entry(channel).or_default().noise = *settings;
    }

    fn set_shift_run(&self, channel: usize, run: bool) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.entry(channel).or_default().shift = run;
    }

    fn set_rates(&self, _channel: usize, _sample_rate: u32, _dsp_rate: u32, _output_rate: u32) {}

    fn set_volume(&self, _channel: usize, _volume: f64) {}

    fn init_analyzer(&self, channel: usize, settings: &AnalyzerSettings) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.entry(channel).or_default().pixels = settings.pixels;
    }

    fn set_display_average(&self, _channel: usize, _backmult: f64, _num_average: i32) {}
}
