//! Collaborator interfaces on the output side of the pipeline, plus the
//! PCM conversion applied at the network boundary.

use crate::constants::PCM_FULL_SCALE;

/// Local (soundcard) audio sink; receives one float stereo pair per output
/// sample. `start` is called once, after the first processed frame has
/// been written, so the stream opens with audio already queued.
pub trait AudioSink: Send {
    fn write(&mut self, left: f32, right: f32);
    fn start(&mut self) {}
}

/// Network/radio-protocol audio sink; receives 16-bit signed PCM pairs.
pub trait NetworkAudioSink: Send {
    fn write(&mut self, left: i16, right: i16);
}

/// Display collaborator. `schedule_redraw` must hand off to the UI thread
/// itself; it is invoked from the render thread, never the worker.
pub trait RenderSink: Send {
    fn schedule_redraw(&mut self, channel: usize);
}

/// Auxiliary demodulator (e.g. a digital-mode sub-decoder) fed raw IQ
/// pairs straight from ingest, independent of ring-buffer state.
pub trait AuxDecoder: Send {
    fn add_iq(&mut self, i_sample: f64, q_sample: f64);
}

/// Secondary sub-receiver sharing this channel's IQ stream. It is fed the
/// same drained frame after the primary exchange and contributes the right
/// audio channel while enabled.
pub trait SubReceiver: Send {
    fn feed_iq(&mut self, frame: &[f64]);
    /// Interleaved stereo audio produced from the last fed frame.
    fn audio_output(&self) -> &[f64];
}

/// Externally-owned transmitter that may track this receiver's passband.
pub trait TransmitterLink: Send + Sync {
    fn tracks_receiver(&self, channel: usize) -> bool;
    fn set_filter(&self, low: i64, high: i64);
}

/// Clamp a float sample to [-1, 1] and scale to 16-bit signed PCM.
pub fn to_pcm(sample: f64) -> i16 {
    (sample.clamp(-1.0, 1.0) * PCM_FULL_SCALE) as i16
}
