//! Radio-wide facts the channel reads but does not own.
//!
//! There is deliberately no global radio state in this crate: every
//! operation that needs these answers receives a handle, so multiple
//! radios (or a test harness) can coexist in one process.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// Queries the pipeline makes against the owning radio, plus the one
/// outbound notification (a retune the transport must follow).
pub trait RadioContext: Send + Sync {
    fn is_transmitting(&self) -> bool;
    /// Channel index of the receiver currently feeding the network audio
    /// path; only that receiver writes to the network sink.
    fn active_receiver(&self) -> usize;
    /// Calibration offset added to the raw DSP meter reading.
    fn meter_calibration(&self) -> f64;
    /// Front-end attenuation for the given ADC, in dB, already carrying
    /// the sign the meter display expects.
    fn adc_attenuation(&self, adc: usize) -> f64;
    /// CW keyer sidetone frequency in Hz.
    fn cw_sidetone_frequency(&self) -> i64;
    /// A tuning operation changed the demodulated frequency; the transport
    /// retunes hardware from here.
    fn frequency_changed(&self, channel: usize, frequency: i64) {
        let _ = (channel, frequency);
    }
}

/// Self-contained [`RadioContext`] used by tests and the demo binary.
pub struct BenchRadio {
    transmitting: AtomicBool,
    active: AtomicUsize,
    sidetone: AtomicI64,
    pub meter_calibration: f64,
    pub attenuation: f64,
}

impl BenchRadio {
    pub fn new() -> Self {
        Self {
            transmitting: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            sidetone: AtomicI64::new(600),
            meter_calibration: 0.0,
            attenuation: 0.0,
        }
    }

    pub fn set_transmitting(&self, on: bool) {
        self.transmitting.store(on, Ordering::SeqCst);
    }

    pub fn set_active_receiver(&self, channel: usize) {
        self.active.store(channel, Ordering::SeqCst);
    }

    pub fn set_sidetone(&self, hz: i64) {
        self.sidetone.store(hz, Ordering::SeqCst);
    }
}

impl Default for BenchRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioContext for BenchRadio {
    fn is_transmitting(&self) -> bool {
        self.transmitting.load(Ordering::SeqCst)
    }

    fn active_receiver(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn meter_calibration(&self) -> f64 {
        self.meter_calibration
    }

    fn adc_attenuation(&self, _adc: usize) -> f64 {
        self.attenuation
    }

    fn cw_sidetone_frequency(&self) -> i64 {
        self.sidetone.load(Ordering::SeqCst)
    }
}
