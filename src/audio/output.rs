//! Soundcard playback sink.
//!
//! The worker thread writes one stereo pair per processed output sample;
//! the cpal stream callback pulls them back out. cpal streams are
//! confined to the thread that built them, so the stream lives on its own
//! thread and [`LocalAudioOutput`] talks to it over channels, which keeps
//! the sink itself `Send` for the pipeline. The stream is built paused
//! and only starts playing on the deferred `start` call, after the first
//! processed frame has been queued.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::constants::DSP_RATE;
use crate::error::{Result, RxError};
use crate::sinks::AudioSink;

/// Queue capacity in stereo pairs; about half a second at 48 kHz.
const QUEUE_PAIRS: usize = 24_000;

enum Command {
    Start,
    Stop,
}

pub struct LocalAudioOutput {
    samples: Sender<(f32, f32)>,
    control: Sender<Command>,
}

impl LocalAudioOutput {
    /// Open the default output device at the 48 kHz stereo output rate.
    pub fn new(channel: usize) -> Result<Self> {
        let (samples_tx, samples_rx) = bounded::<(f32, f32)>(QUEUE_PAIRS);
        let (control_tx, control_rx) = bounded::<Command>(2);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        std::thread::Builder::new()
            .name(format!("rx-audio-{channel}"))
            .spawn(move || stream_thread(samples_rx, control_rx, ready_tx))
            .map_err(|e| RxError::AudioDevice(format!("audio thread: {e}")))?;

        // The stream thread reports whether the device opened before we
        // hand the sink back.
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                samples: samples_tx,
                control: control_tx,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RxError::AudioDevice("audio thread exited".into())),
        }
    }
}

impl AudioSink for LocalAudioOutput {
    fn write(&mut self, left: f32, right: f32) {
        // A full queue means the device is behind; drop rather than block
        // the worker.
        let _ = self.samples.try_send((left, right));
    }

    fn start(&mut self) {
        let _ = self.control.send(Command::Start);
    }
}

impl Drop for LocalAudioOutput {
    fn drop(&mut self) {
        let _ = self.control.send(Command::Stop);
    }
}

fn stream_thread(
    samples: Receiver<(f32, f32)>,
    control: Receiver<Command>,
    ready: Sender<Result<()>>,
) {
    let stream = match build_stream(samples) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    loop {
        match control.recv() {
            Ok(Command::Start) => {
                if let Err(e) = stream.play() {
                    log::warn!("audio stream start failed: {}", e);
                }
            }
            Ok(Command::Stop) | Err(_) => break,
        }
    }
    let _ = stream.pause();
}

fn build_stream(samples: Receiver<(f32, f32)>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| RxError::AudioDevice("No output device found".into()))?;

    match device.description() {
        Ok(desc) => log::info!("Output device: {:?}", desc),
        Err(_) => log::info!("Output device: Unknown"),
    }

    let stream_config = cpal::StreamConfig {
        channels: 2,
        sample_rate: DSP_RATE,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_exact_mut(2) {
                    // Underrun plays silence.
                    let (left, right) = samples.try_recv().unwrap_or((0.0, 0.0));
                    frame[0] = left;
                    frame[1] = right;
                }
            },
            |err| log::warn!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| RxError::AudioStream(format!("{}", e)))?;

    Ok(stream)
}
