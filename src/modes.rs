//! Demodulation modes and the small enums shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Demodulation mode. The discriminants match the channel ordering of the
/// DSP library's mode table, so `as_index`/`from_index` round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Mode {
    Lsb,
    Usb,
    Dsb,
    Cwl,
    Cwu,
    Fmn,
    Am,
    Digu,
    Spec,
    Digl,
    Sam,
    Drm,
}

impl Mode {
    pub const COUNT: usize = 12;

    pub fn as_index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Mode> {
        use Mode::*;
        const ALL: [Mode; Mode::COUNT] = [
            Lsb, Usb, Dsb, Cwl, Cwu, Fmn, Am, Digu, Spec, Digl, Sam, Drm,
        ];
        ALL.get(index).copied()
    }

    /// CW modes shift the passband by the sidetone offset and are exempt
    /// from step rounding during tuning moves.
    pub fn is_cw(self) -> bool {
        matches!(self, Mode::Cwl | Mode::Cwu)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Lsb => "LSB",
            Mode::Usb => "USB",
            Mode::Dsb => "DSB",
            Mode::Cwl => "CWL",
            Mode::Cwu => "CWU",
            Mode::Fmn => "FMN",
            Mode::Am => "AM",
            Mode::Digu => "DIGU",
            Mode::Spec => "SPEC",
            Mode::Digl => "DIGL",
            Mode::Sam => "SAM",
            Mode::Drm => "DRM",
        };
        write!(f, "{s}")
    }
}

/// Split operating mode: B may track A with the same or inverted sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMode {
    Off,
    On,
    /// Satellite tracking: VFO B follows VFO A moves with the same sign.
    Sat,
    /// Reverse satellite tracking: VFO B follows with inverted sign.
    Rsat,
}

/// AGC speed selection; the per-speed attack/hang/decay constants live in
/// [`crate::tuning::agc_profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum AgcMode {
    Off,
    Long,
    Slow,
    Medium,
    Fast,
}

/// Which half of the stereo exchange output feeds the sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioChannels {
    Stereo,
    LeftOnly,
    RightOnly,
}

/// S-meter detector selection passed through to the DSP meter query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterType {
    Average,
    Peak,
}
