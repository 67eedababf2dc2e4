//! The per-channel receiver record.
//!
//! Every other component reads this; the UI collaborator mutates it only
//! through the setter API on [`crate::receiver::ReceiverChannel`], which
//! holds the channel mutex and pushes each change to the DSP binding in
//! the same critical section.
//!
//! `filter_low`/`filter_high` are derived values: only the filter-update
//! path writes them (and the property restore, which is followed by a
//! recompute at creation). Frequencies are unrounded integers; step
//! rounding happens inside the move operations only.

use crate::config::{ChannelConfig, NoiseConfig};
use crate::constants::RING_FRAMES;
use crate::filters;
use crate::modes::{AgcMode, AudioChannels, MeterType, Mode, SplitMode};

#[derive(Debug, Clone)]
pub struct ReceiverState {
    // Identity
    pub channel: usize,
    pub adc: usize,

    // Rates and staging
    pub sample_rate: u32,
    pub dsp_rate: u32,
    pub output_rate: u32,
    pub buffer_size: usize,
    pub fft_size: usize,
    pub low_latency: bool,
    pub output_samples: usize,

    // Tuning
    pub frequency_a: i64,
    pub frequency_b: i64,
    pub lo_a: i64,
    pub error_a: i64,
    pub lo_b: i64,
    pub error_b: i64,
    pub ctun: bool,
    pub ctun_frequency: i64,
    pub ctun_offset: i64,
    pub ctun_min: i64,
    pub ctun_max: i64,
    pub rit_enabled: bool,
    pub rit: i64,
    pub rit_step: i64,
    pub step: i64,
    pub locked: bool,
    pub split: SplitMode,

    // Mode and filter
    pub band: i32,
    pub mode: Mode,
    pub filter_index: usize,
    pub filter_low: i64,
    pub filter_high: i64,
    pub deviation: i64,

    // Display geometry (inputs to click-tune; rendering is external)
    pub fps: u32,
    pub display_average_time: f64,
    pub zoom: usize,
    pub pan: usize,
    pub panadapter_width: usize,
    pub pixels: usize,
    pub hz_per_pixel: f64,
    pub meter: MeterType,
    pub meter_db: f64,

    // Audio fan-out
    pub volume: f64,
    pub audio_channels: AudioChannels,
    pub local_audio: bool,
    pub remote_audio: bool,
    pub duplex: bool,
    pub mute_while_transmitting: bool,
    pub output_started: bool,
    pub audio_output_buffer: Vec<f64>,

    // AGC
    pub agc: AgcMode,
    pub agc_gain: f64,
    pub agc_slope: f64,
    pub agc_hang_threshold: f64,

    // Noise processing
    pub noise: NoiseConfig,

    pub subrx_enable: bool,
}

impl ReceiverState {
    pub fn new(channel: usize, sample_rate: u32, config: &ChannelConfig) -> Self {
        let pixels = config.display.panadapter_width * config.display.zoom;
        let output_samples = output_samples(config.dsp.buffer_size, sample_rate, config.dsp.dsp_rate);
        Self {
            channel,
            adc: 0,
            sample_rate,
            dsp_rate: config.dsp.dsp_rate,
            output_rate: config.dsp.output_rate,
            buffer_size: config.dsp.buffer_size,
            fft_size: config.dsp.fft_size,
            low_latency: config.dsp.low_latency,
            output_samples,
            frequency_a: config.tuning.frequency,
            frequency_b: config.tuning.frequency_b,
            lo_a: 0,
            error_a: 0,
            lo_b: 0,
            error_b: 0,
            ctun: false,
            ctun_frequency: 0,
            ctun_offset: 0,
            ctun_min: config.tuning.frequency - (sample_rate as i64 / 2),
            ctun_max: config.tuning.frequency + (sample_rate as i64 / 2),
            rit_enabled: false,
            rit: 0,
            rit_step: 10,
            step: config.tuning.step,
            locked: false,
            split: config.tuning.split,
            band: config.tuning.band,
            mode: config.tuning.mode,
            filter_index: config.tuning.filter_index,
            filter_low: 0,
            filter_high: 0,
            deviation: config.tuning.deviation,
            fps: config.display.fps,
            display_average_time: config.display.display_average_time,
            zoom: config.display.zoom,
            pan: 0,
            panadapter_width: config.display.panadapter_width,
            pixels,
            hz_per_pixel: sample_rate as f64 / pixels as f64,
            meter: config.display.meter,
            meter_db: -200.0,
            volume: config.audio.volume,
            audio_channels: config.audio.channels,
            local_audio: config.audio.local_audio,
            remote_audio: config.audio.remote_audio,
            duplex: config.audio.duplex,
            mute_while_transmitting: false,
            output_started: false,
            audio_output_buffer: vec![0.0; 2 * output_samples],
            agc: config.agc.mode,
            agc_gain: config.agc.gain,
            agc_slope: config.agc.slope,
            agc_hang_threshold: config.agc.hang_threshold,
            noise: config.noise.clone(),
            subrx_enable: false,
        }
    }

    /// Ring capacity in doubles for the current frame size.
    pub fn ring_capacity(&self) -> usize {
        self.buffer_size * RING_FRAMES
    }

    /// Recompute the derived passband from the current mode, filter index,
    /// sidetone and deviation.
    pub fn derive_passband(&mut self, sidetone: i64) {
        let (low, high) =
            filters::passband_for_index(self.mode, self.filter_index, sidetone, self.deviation);
        self.filter_low = low;
        self.filter_high = high;
    }

    /// Serialize the persisted field set as name/value string pairs. The
    /// property store itself is a collaborator; only the field contract
    /// lives here.
    pub fn save_properties(&self) -> Vec<(String, String)> {
        let p = |name: &str| format!("receiver[{}].{}", self.channel, name);
        let mut props: Vec<(String, String)> = Vec::new();
        let mut put = |name: &str, value: String| props.push((p(name), value));

        put("adc", self.adc.to_string());
        put("sample_rate", self.sample_rate.to_string());
        put("dsp_rate", self.dsp_rate.to_string());
        put("output_rate", self.output_rate.to_string());
        put("buffer_size", self.buffer_size.to_string());
        put("fft_size", self.fft_size.to_string());
        put("low_latency", (self.low_latency as i32).to_string());
        put("fps", self.fps.to_string());
        put("display_average_time", self.display_average_time.to_string());
        put("frequency_a", self.frequency_a.to_string());
        put("frequency_b", self.frequency_b.to_string());
        put("lo_a", self.lo_a.to_string());
        put("error_a", self.error_a.to_string());
        put("lo_b", self.lo_b.to_string());
        put("error_b", self.error_b.to_string());
        put("ctun", (self.ctun as i32).to_string());
        put("ctun_frequency", self.ctun_frequency.to_string());
        put("ctun_offset", self.ctun_offset.to_string());
        put("ctun_min", self.ctun_min.to_string());
        put("ctun_max", self.ctun_max.to_string());
        put("rit_enabled", (self.rit_enabled as i32).to_string());
        put("rit", self.rit.to_string());
        put("rit_step", self.rit_step.to_string());
        put("step", self.step.to_string());
        put("locked", (self.locked as i32).to_string());
        put("split", (self.split as i32).to_string());
        put("band", self.band.to_string());
        put("mode", self.mode.as_index().to_string());
        put("filter", self.filter_index.to_string());
        put("filter_low", self.filter_low.to_string());
        put("filter_high", self.filter_high.to_string());
        put("deviation", self.deviation.to_string());
        put("zoom", self.zoom.to_string());
        put("pan", self.pan.to_string());
        put("volume", self.volume.to_string());
        put("audio_channels", (self.audio_channels as i32).to_string());
        put("local_audio", (self.local_audio as i32).to_string());
        put("remote_audio", (self.remote_audio as i32).to_string());
        put("duplex", (self.duplex as i32).to_string());
        put(
            "mute_while_transmitting",
            (self.mute_while_transmitting as i32).to_string(),
        );
        put("agc", (self.agc as i32).to_string());
        put("agc_gain", self.agc_gain.to_string());
        put("agc_slope", self.agc_slope.to_string());
        put("agc_hang_threshold", self.agc_hang_threshold.to_string());
        put("nb", (self.noise.nb as i32).to_string());
        put("nb2", (self.noise.nb2 as i32).to_string());
        put("nr", (self.noise.nr as i32).to_string());
        put("nr2", (self.noise.nr2 as i32).to_string());
        put("anf", (self.noise.anf as i32).to_string());
        put("snb", (self.noise.snb as i32).to_string());
        put("nb_tau", self.noise.nb_tau.to_string());
        put("nb_advtime", self.noise.nb_advtime.to_string());
        put("nb_hang", self.noise.nb_hang.to_string());
        put("nb_thresh", self.noise.nb_thresh.to_string());
        put("nb2_mode", self.noise.nb2_mode.to_string());
        put("nr2_gain_method", self.noise.nr2_gain_method.to_string());
        put("nr2_npe_method", self.noise.nr2_npe_method.to_string());
        props
    }

    /// Restore from saved properties. Entries for other channels and
    /// unparseable values are ignored; a partial or stale store never
    /// blocks startup. Derived fields are recomputed by the creation path
    /// after the restore.
    pub fn restore_properties(&mut self, props: &[(String, String)]) {
        let prefix = format!("receiver[{}].", self.channel);
        for (name, value) in props {
            let Some(field) = name.strip_prefix(&prefix) else {
                continue;
            };
            self.restore_field(field, value);
        }
        self.pixels = self.panadapter_width * self.zoom;
        if self.pixels > 0 {
            self.hz_per_pixel = self.sample_rate as f64 / self.pixels as f64;
        }
        self.output_samples = output_samples(self.buffer_size, self.sample_rate, self.dsp_rate);
        self.audio_output_buffer = vec![0.0; 2 * self.output_samples];
    }

    fn restore_field(&mut self, field: &str, value: &str) {
        fn int(value: &str) -> Option<i64> {
            value.parse().ok()
        }
        fn flag(value: &str) -> Option<bool> {
            int(value).map(|v| v != 0)
        }
        fn float(value: &str) -> Option<f64> {
            value.parse().ok()
        }
        match field {
            "adc" => self.adc = int(value).map(|v| v as usize).unwrap_or(self.adc),
            "sample_rate" => {
                self.sample_rate = int(value).map(|v| v as u32).unwrap_or(self.sample_rate)
            }
            "dsp_rate" => self.dsp_rate = int(value).map(|v| v as u32).unwrap_or(self.dsp_rate),
            "output_rate" => {
                self.output_rate = int(value).map(|v| v as u32).unwrap_or(self.output_rate)
            }
            "buffer_size" => {
                self.buffer_size = int(value).map(|v| v as usize).unwrap_or(self.buffer_size)
            }
            "fft_size" => self.fft_size = int(value).map(|v| v as usize).unwrap_or(self.fft_size),
            "low_latency" => self.low_latency = flag(value).unwrap_or(self.low_latency),
            "fps" => self.fps = int(value).map(|v| v as u32).unwrap_or(self.fps),
            "display_average_time" => {
                self.display_average_time = float(value).unwrap_or(self.display_average_time)
            }
            "frequency_a" => self.frequency_a = int(value).unwrap_or(self.frequency_a),
            "frequency_b" => self.frequency_b = int(value).unwrap_or(self.frequency_b),
            "lo_a" => self.lo_a = int(value).unwrap_or(self.lo_a),
            "error_a" => self.error_a = int(value).unwrap_or(self.error_a),
            "lo_b" => self.lo_b = int(value).unwrap_or(self.lo_b),
            "error_b" => self.error_b = int(value).unwrap_or(self.error_b),
            "ctun" => self.ctun = flag(value).unwrap_or(self.ctun),
            "ctun_frequency" => self.ctun_frequency = int(value).unwrap_or(self.ctun_frequency),
            "ctun_offset" => self.ctun_offset = int(value).unwrap_or(self.ctun_offset),
            "ctun_min" => self.ctun_min = int(value).unwrap_or(self.ctun_min),
            "ctun_max" => self.ctun_max = int(value).unwrap_or(self.ctun_max),
            "rit_enabled" => self.rit_enabled = flag(value).unwrap_or(self.rit_enabled),
            "rit" => self.rit = int(value).unwrap_or(self.rit),
            "rit_step" => self.rit_step = int(value).unwrap_or(self.rit_step),
            "step" => self.step = int(value).unwrap_or(self.step),
            "locked" => self.locked = flag(value).unwrap_or(self.locked),
            "split" => {
                self.split = match int(value) {
                    Some(0) => SplitMode::Off,
                    Some(1) => SplitMode::On,
                    Some(2) => SplitMode::Sat,
                    Some(3) => SplitMode::Rsat,
                    _ => self.split,
                }
            }
            "band" => self.band = int(value).map(|v| v as i32).unwrap_or(self.band),
            "mode" => {
                if let Some(mode) = int(value).and_then(|v| Mode::from_index(v as usize)) {
                    self.mode = mode;
                }
            }
            "filter" => {
                self.filter_index = int(value).map(|v| v as usize).unwrap_or(self.filter_index)
            }
            "filter_low" => self.filter_low = int(value).unwrap_or(self.filter_low),
            "filter_high" => self.filter_high = int(value).unwrap_or(self.filter_high),
            "deviation" => self.deviation = int(value).unwrap_or(self.deviation),
            "zoom" => self.zoom = int(value).map(|v| v as usize).unwrap_or(self.zoom).max(1),
            "pan" => self.pan = int(value).map(|v| v as usize).unwrap_or(self.pan),
            "volume" => self.volume = float(value).unwrap_or(self.volume),
            "audio_channels" => {
                self.audio_channels = match int(value) {
                    Some(0) => AudioChannels::Stereo,
                    Some(1) => AudioChannels::LeftOnly,
                    Some(2) => AudioChannels::RightOnly,
                    _ => self.audio_channels,
                }
            }
            "local_audio" => self.local_audio = flag(value).unwrap_or(self.local_audio),
            "remote_audio" => self.remote_audio = flag(value).unwrap_or(self.remote_audio),
            "duplex" => self.duplex = flag(value).unwrap_or(self.duplex),
            "mute_while_transmitting" => {
                self.mute_while_transmitting = flag(value).unwrap_or(self.mute_while_transmitting)
            }
            "agc" => {
                self.agc = match int(value) {
                    Some(0) => AgcMode::Off,
                    Some(1) => AgcMode::Long,
                    Some(2) => AgcMode::Slow,
                    Some(3) => AgcMode::Medium,
                    Some(4) => AgcMode::Fast,
                    _ => self.agc,
                }
            }
            "agc_gain" => self.agc_gain = float(value).unwrap_or(self.agc_gain),
            "agc_slope" => self.agc_slope = float(value).unwrap_or(self.agc_slope),
            "agc_hang_threshold" => {
                self.agc_hang_threshold = float(value).unwrap_or(self.agc_hang_threshold)
            }
            "nb" => self.noise.nb = flag(value).unwrap_or(self.noise.nb),
            "nb2" => self.noise.nb2 = flag(value).unwrap_or(self.noise.nb2),
            "nr" => self.noise.nr = flag(value).unwrap_or(self.noise.nr),
            "nr2" => self.noise.nr2 = flag(value).unwrap_or(self.noise.nr2),
            "anf" => self.noise.anf = flag(value).unwrap_or(self.noise.anf),
            "snb" => self.noise.snb = flag(value).unwrap_or(self.noise.snb),
            "nb_tau" => self.noise.nb_tau = float(value).unwrap_or(self.noise.nb_tau),
            "nb_advtime" => self.noise.nb_advtime = float(value).unwrap_or(self.noise.nb_advtime),
            "nb_hang" => self.noise.nb_hang = float(value).unwrap_or(self.noise.nb_hang),
            "nb_thresh" => self.noise.nb_thresh = float(value).unwrap_or(self.noise.nb_thresh),
            "nb2_mode" => {
                self.noise.nb2_mode = int(value).map(|v| v as i32).unwrap_or(self.noise.nb2_mode)
            }
            "nr2_gain_method" => {
                self.noise.nr2_gain_method = int(value)
                    .map(|v| v as i32)
                    .unwrap_or(self.noise.nr2_gain_method)
            }
            "nr2_npe_method" => {
                self.noise.nr2_npe_method = int(value)
                    .map(|v| v as i32)
                    .unwrap_or(self.noise.nr2_npe_method)
            }
            _ => log::debug!("ignoring unknown property field: {field}"),
        }
    }
}

/// Audio samples produced per frame: the exchange resamples the input
/// frame down to the 48 kHz output rate.
pub fn output_samples(buffer_size: usize, sample_rate: u32, dsp_rate: u32) -> usize {
    let ratio = (sample_rate / dsp_rate).max(1);
    buffer_size / ratio as usize
}
