//! Configuration for a receiver channel.
//!
//! These are the creation-time defaults; nearly everything here can later
//! be changed through the [`crate::receiver::ReceiverChannel`] setter API,
//! and the live values round-trip through the property save/restore
//! contract in [`crate::state`].

use serde::{Deserialize, Serialize};

use crate::constants::DSP_RATE;
use crate::modes::{AgcMode, AudioChannels, MeterType, Mode, SplitMode};

/// Top-level per-channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub dsp: DspConfig,
    pub tuning: TuningConfig,
    pub display: DisplayConfig,
    pub audio: AudioConfig,
    pub agc: AgcConfig,
    pub noise: NoiseConfig,
}

/// DSP staging parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DspConfig {
    /// Frame size in complex samples drained per exchange call.
    pub buffer_size: usize,
    /// FFT size handed to the DSP channel at open.
    pub fft_size: usize,
    /// Rate the demodulation chain runs at (fixed 48 kHz downstream).
    pub dsp_rate: u32,
    /// Rate audio leaves the exchange at.
    pub output_rate: u32,
    /// Trade filter sharpness for latency in the DSP chain.
    pub low_latency: bool,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            buffer_size: 2048,
            fft_size: 2048,
            dsp_rate: DSP_RATE,
            output_rate: DSP_RATE,
            low_latency: false,
        }
    }
}

/// Initial tuning state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// VFO A frequency in Hz.
    pub frequency: i64,
    /// VFO B frequency in Hz.
    pub frequency_b: i64,
    pub mode: Mode,
    /// Index into the per-mode filter table.
    pub filter_index: usize,
    /// Tuning step in Hz; moves with `round` truncate to a multiple of this.
    pub step: i64,
    /// FM deviation in Hz (2500 or 5000).
    pub deviation: i64,
    pub split: SplitMode,
    /// Band identifier; band tables themselves are a collaborator concern.
    pub band: i32,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            frequency: 14_200_000,
            frequency_b: 14_300_000,
            mode: Mode::Usb,
            filter_index: 5,
            step: 100,
            deviation: 2500,
            split: SplitMode::Off,
            band: 20,
        }
    }
}

/// Display-facing geometry and pacing. Rendering is external; the pipeline
/// only needs these to size the pixel buffer and interpret click-tune
/// coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Spectral update rate driven by the external timer.
    pub fps: u32,
    /// Width of the panadapter in pixels; pixel count is width * zoom.
    pub panadapter_width: usize,
    pub zoom: usize,
    /// Display averaging time constant in milliseconds.
    pub display_average_time: f64,
    pub meter: MeterType,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            panadapter_width: 820,
            zoom: 1,
            display_average_time: 170.0,
            meter: MeterType::Average,
        }
    }
}

/// Audio fan-out policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub volume: f64,
    pub channels: AudioChannels,
    /// Feed the local (soundcard) sink.
    pub local_audio: bool,
    /// Feed the network/radio-protocol sink.
    pub remote_audio: bool,
    /// Keep receiving (and feeding remote audio) while transmitting.
    pub duplex: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: 0.05,
            channels: AudioChannels::Stereo,
            local_audio: false,
            remote_audio: true,
            duplex: false,
        }
    }
}

/// AGC configuration. The per-speed attack/hang/decay constants are fixed
/// (see [`crate::tuning::agc_profile`]); only the speed, top gain, slope
/// and hang threshold are operator-adjustable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgcConfig {
    pub mode: AgcMode,
    pub gain: f64,
    pub slope: f64,
    pub hang_threshold: f64,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            mode: AgcMode::Off,
            gain: 80.0,
            slope: 35.0,
            hang_threshold: 0.0,
        }
    }
}

/// Noise processing toggles and blanker tuning, all applied through the
/// DSP binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Noise blanker (impulse).
    pub nb: bool,
    /// Spectral noise blanker.
    pub nb2: bool,
    /// Noise reduction.
    pub nr: bool,
    /// Spectral noise reduction.
    pub nr2: bool,
    /// Automatic notch filter.
    pub anf: bool,
    /// Spectral noise blanker (SNB).
    pub snb: bool,
    pub nb_tau: f64,
    pub nb_advtime: f64,
    pub nb_hang: f64,
    pub nb_thresh: f64,
    pub nb2_mode: i32,
    pub nr2_gain_method: i32,
    pub nr2_npe_method: i32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            nb: false,
            nb2: false,
            nr: false,
            nr2: false,
            anf: false,
            snb: false,
            nb_tau: 0.0001,
            nb_advtime: 0.0001,
            nb_hang: 0.0001,
            nb_thresh: 0.05,
            nb2_mode: 0,
            nr2_gain_method: 2,
            nr2_npe_method: 0,
        }
    }
}

impl ChannelConfig {
    /// Sanity-check the parts of the configuration the pipeline depends on.
    /// Creation aborts on any violation.
    pub fn validate(&self, sample_rate: u32) -> Result<(), String> {
        if sample_rate == 0 || sample_rate % self.dsp.dsp_rate != 0 {
            return Err(format!(
                "sample rate {} must be a positive multiple of {}",
                sample_rate, self.dsp.dsp_rate
            ));
        }
        if self.dsp.buffer_size == 0 || self.dsp.buffer_size % 2 != 0 {
            return Err(format!(
                "buffer size {} must be even and nonzero",
                self.dsp.buffer_size
            ));
        }
        if self.tuning.step <= 0 {
            return Err(format!("step {} must be positive", self.tuning.step));
        }
        if self.display.fps == 0 || self.display.zoom == 0 || self.display.panadapter_width == 0 {
            return Err("fps, zoom and panadapter width must be nonzero".into());
        }
        Ok(())
    }
}
