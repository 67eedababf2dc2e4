//! The per-channel receive pipeline.
//!
//! One [`ReceiverChannel`] owns a ring buffer, a DSP worker thread and a
//! render-dispatch thread. The transport feeds it IQ pairs through
//! [`ReceiverChannel::add_iq_samples`]; processed audio fans out to the
//! attached sinks and spectral data is published for the display
//! collaborator, which drives [`ReceiverChannel::update_tick`] from its
//! frame timer.
//!
//! Lock model: the ring buffer carries its own mutex with a critical
//! section bounded to index arithmetic and a copy. The channel mutex (the
//! [`ReceiverState`]) is the configuration-stability lock: it is held
//! across the DSP exchange and by every setter, so a setting never changes
//! mid-frame. The pixel buffer has a third mutex shared with the display
//! reader. The state lock is always taken before the pixel or sink locks,
//! never the other way around, and the ring lock nests inside the state
//! lock only on the sample-rate path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::config::{ChannelConfig, NoiseConfig};
use crate::constants::{DSP_NOT_READY, JOIN_TIMEOUT, UNDERFLOW_BACKOFF};
use crate::dsp::{AnalyzerSettings, ChannelOpenParams, DspExchange, NoiseSettings};
use crate::error::{Result, RxError};
use crate::modes::{AgcMode, AudioChannels, Mode, SplitMode};
use crate::queue::{NotifyQueue, Token};
use crate::radio::RadioContext;
use crate::ring::IqRing;
use crate::sinks::{AudioSink, AuxDecoder, NetworkAudioSink, RenderSink, SubReceiver, TransmitterLink, to_pcm};
use crate::state::{self, ReceiverState};
use crate::tuning;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn noise_settings(noise: &NoiseConfig) -> NoiseSettings {
    NoiseSettings {
        nb: noise.nb,
        nb2: noise.nb2,
        nr: noise.nr,
        nr2: noise.nr2,
        anf: noise.anf,
        snb: noise.snb,
        nb_tau: noise.nb_tau,
        nb_advtime: noise.nb_advtime,
        nb_hang: noise.nb_hang,
        nb_thresh: noise.nb_thresh,
        nb2_mode: noise.nb2_mode,
        nr2_gain_method: noise.nr2_gain_method,
        nr2_npe_method: noise.nr2_npe_method,
    }
}

/// Shared core of a channel. The worker and render threads each hold an
/// Arc, so an abandoned thread keeps its buffers alive after teardown
/// gives up on joining it.
struct ChannelInner {
    channel: usize,
    running: AtomicBool,
    /// Frame size in pairs, mirrored out of the state so the per-pair
    /// ingest path never touches the channel mutex.
    frame_size: AtomicUsize,
    ring: IqRing,
    worker_queue: NotifyQueue,
    render_queue: NotifyQueue,
    state: Mutex<ReceiverState>,
    pixels: Mutex<Vec<f32>>,
    dsp: Arc<dyn DspExchange>,
    radio: Arc<dyn RadioContext>,
    audio_sink: Mutex<Option<Box<dyn AudioSink>>>,
    network_sink: Mutex<Option<Box<dyn NetworkAudioSink>>>,
    render_sink: Mutex<Option<Box<dyn RenderSink>>>,
    aux: Mutex<Option<Box<dyn AuxDecoder>>>,
    subrx: Mutex<Option<Box<dyn SubReceiver>>>,
    transmitter: Mutex<Option<Arc<dyn TransmitterLink>>>,
}

pub struct ReceiverChannel {
    inner: Arc<ChannelInner>,
    worker: Option<JoinHandle<()>>,
    render: Option<JoinHandle<()>>,
    worker_done: Receiver<()>,
    render_done: Receiver<()>,
}

impl ReceiverChannel {
    /// Create a channel: restore persisted fields over the configured
    /// defaults, open and program the DSP channel, allocate the ring and
    /// start both threads. Any failure releases everything built so far
    /// and the channel never starts.
    pub fn create(
        channel: usize,
        sample_rate: u32,
        config: &ChannelConfig,
        properties: &[(String, String)],
        dsp: Arc<dyn DspExchange>,
        radio: Arc<dyn RadioContext>,
    ) -> Result<Self> {
        config.validate(sample_rate).map_err(RxError::Config)?;

        let mut state = ReceiverState::new(channel, sample_rate, config);
        state.restore_properties(properties);
        state.derive_passband(radio.cw_sidetone_frequency());

        let ring = IqRing::new(state.ring_capacity())?;

        dsp.open_channel(
            channel,
            &ChannelOpenParams {
                buffer_size: state.buffer_size,
                fft_size: state.fft_size,
                sample_rate: state.sample_rate,
                dsp_rate: state.dsp_rate,
                output_rate: state.output_rate,
                low_latency: state.low_latency,
            },
        )?;
        dsp.set_mode(channel, state.mode);
        if state.mode == Mode::Fmn {
            dsp.set_deviation(channel, state.deviation as f64);
        }
        dsp.set_passband(channel, state.filter_low as f64, state.filter_high as f64);
        dsp.set_agc(channel, &tuning::agc_profile(&state));
        dsp.set_noise(channel, &noise_settings(&state.noise));
        dsp.set_shift_run(channel, state.ctun);
        dsp.set_volume(channel, state.volume);
        dsp.init_analyzer(
            channel,
            &AnalyzerSettings {
                pixels: state.pixels,
                buffer_size: state.buffer_size,
                fps: state.fps,
            },
        );
        let (backmult, num_average) = tuning::display_average(state.fps, state.display_average_time);
        dsp.set_display_average(channel, backmult, num_average);
        dsp.set_channel_run(channel, true);

        let pixels = vec![0.0f32; state.pixels];
        let frame_size = state.buffer_size;
        let inner = Arc::new(ChannelInner {
            channel,
            running: AtomicBool::new(true),
            frame_size: AtomicUsize::new(frame_size),
            ring,
            worker_queue: NotifyQueue::new(),
            render_queue: NotifyQueue::new(),
            state: Mutex::new(state),
            pixels: Mutex::new(pixels),
            dsp: Arc::clone(&dsp),
            radio,
            audio_sink: Mutex::new(None),
            network_sink: Mutex::new(None),
            render_sink: Mutex::new(None),
            aux: Mutex::new(None),
            subrx: Mutex::new(None),
            transmitter: Mutex::new(None),
        });

        let (worker, worker_done) = match spawn_loop("rx-worker", &inner, worker_loop) {
            Ok(pair) => pair,
            Err(e) => {
                dsp.close_channel(channel);
                return Err(e);
            }
        };
        let (render, render_done) = match spawn_loop("rx-render", &inner, render_loop) {
            Ok(pair) => pair,
            Err(e) => {
                inner.running.store(false, Ordering::Release);
                inner.worker_queue.shutdown();
                let _ = worker.join();
                dsp.close_channel(channel);
                return Err(e);
            }
        };

        log::info!("receiver channel {channel} started: sample_rate={sample_rate}");
        Ok(Self {
            inner,
            worker: Some(worker),
            render: Some(render),
            worker_done,
            render_done,
        })
    }

    pub fn channel(&self) -> usize {
        self.inner.channel
    }

    // Sink attachment. Sinks may be installed or swapped while the
    // pipeline is running; the worker picks up the change on the next
    // frame.

    pub fn set_audio_sink(&self, sink: Option<Box<dyn AudioSink>>) {
        *lock(&self.inner.audio_sink) = sink;
        lock(&self.inner.state).output_started = false;
    }

    pub fn set_network_sink(&self, sink: Option<Box<dyn NetworkAudioSink>>) {
        *lock(&self.inner.network_sink) = sink;
    }

    pub fn set_render_sink(&self, sink: Option<Box<dyn RenderSink>>) {
        *lock(&self.inner.render_sink) = sink;
    }

    pub fn set_aux_decoder(&self, decoder: Option<Box<dyn AuxDecoder>>) {
        *lock(&self.inner.aux) = decoder;
    }

    pub fn set_sub_receiver(&self, subrx: Option<Box<dyn SubReceiver>>) {
        *lock(&self.inner.subrx) = subrx;
    }

    pub fn set_subrx_enable(&self, enable: bool) {
        lock(&self.inner.state).subrx_enable = enable;
    }

    pub fn set_transmitter_link(&self, transmitter: Option<Arc<dyn TransmitterLink>>) {
        *lock(&self.inner.transmitter) = transmitter;
    }

    /// Transport entry point, called once per incoming IQ pair. Pushes
    /// into the ring and wakes the worker when a full frame is staged;
    /// the raw pair is also forwarded to the auxiliary decoder,
    /// independent of ring state.
    pub fn add_iq_samples(&self, i_sample: f64, q_sample: f64) {
        let inner = &self.inner;
        let frame_size = inner.frame_size.load(Ordering::Acquire);
        if inner.ring.push(i_sample, q_sample, frame_size) {
            inner.worker_queue.notify();
        }
        if let Some(aux) = lock(&inner.aux).as_mut() {
            aux.add_iq(i_sample, q_sample);
        }
    }

    /// Periodic display tick. Polls the analyzer for a fresh trace,
    /// wakes the render thread when one is available and refreshes the
    /// meter reading. Suppressed while transmitting unless in duplex.
    pub fn update_tick(&self) {
        let inner = &self.inner;
        let mut state = lock(&inner.state);
        if inner.radio.is_transmitting() && !state.duplex {
            return;
        }
        {
            let mut pixels = lock(&inner.pixels);
            if inner.dsp.get_pixels(inner.channel, &mut pixels) {
                inner.render_queue.notify();
            }
        }
        state.meter_db =
            inner.dsp.meter(inner.channel, state.meter) + inner.radio.meter_calibration();
    }

    /// Meter value for display: the calibrated DSP reading plus the
    /// front-end attenuation of this channel's ADC.
    pub fn meter_level(&self) -> f64 {
        let state = lock(&self.inner.state);
        state.meter_db + self.inner.radio.adc_attenuation(state.adc)
    }

    /// Copy the most recent spectral trace out for rendering.
    pub fn copy_pixels(&self, out: &mut Vec<f32>) {
        let pixels = lock(&self.inner.pixels);
        out.clear();
        out.extend_from_slice(&pixels);
    }

    // Tuning. Each operation mutates under the channel mutex and pushes
    // the consequences to the DSP and the bound transmitter in the same
    // critical section.

    /// Relative tune of VFO A (or the CTUN offset), with split
    /// propagation to VFO B. Returns the applied delta.
    pub fn move_frequency(&self, hz: i64, round: bool) -> i64 {
        let mut state = lock(&self.inner.state);
        let subrx_active = state.subrx_enable;
        let delta = tuning::move_rx(&mut state, hz, round, subrx_active);
        if delta != 0 {
            self.frequency_changed(&state);
        }
        delta
    }

    /// Relative tune of VFO B only.
    pub fn move_frequency_b(&self, hz: i64, round: bool) {
        let mut state = lock(&self.inner.state);
        let subrx_active = state.subrx_enable;
        tuning::move_b(&mut state, hz, true, round, subrx_active);
    }

    /// Absolute retune from a panadapter click offset in Hz.
    pub fn move_to(&self, hz: i64) {
        let mut state = lock(&self.inner.state);
        let sidetone = self.inner.radio.cw_sidetone_frequency();
        let subrx_active = state.subrx_enable;
        tuning::move_to(&mut state, hz, sidetone, subrx_active);
        self.frequency_changed(&state);
    }

    fn frequency_changed(&self, state: &ReceiverState) {
        let frequency = if state.ctun {
            state.ctun_frequency
        } else {
            state.frequency_a
        };
        self.inner.radio.frequency_changed(self.inner.channel, frequency);
    }

    pub fn set_ctun(&self, on: bool) {
        let mut state = lock(&self.inner.state);
        tuning::set_ctun(&mut state, on);
        self.inner.dsp.set_shift_run(self.inner.channel, on);
        self.frequency_changed(&state);
    }

    pub fn set_split(&self, split: SplitMode) {
        lock(&self.inner.state).split = split;
    }

    pub fn set_locked(&self, locked: bool) {
        lock(&self.inner.state).locked = locked;
    }

    // Mode and filter.

    pub fn set_mode(&self, mode: Mode) {
        let mut state = lock(&self.inner.state);
        state.mode = mode;
        self.inner.dsp.set_mode(self.inner.channel, mode);
        if mode == Mode::Fmn {
            self.inner.dsp.set_deviation(self.inner.channel, state.deviation as f64);
        }
        self.apply_filter(&mut state);
    }

    pub fn set_filter(&self, filter_index: usize) {
        let mut state = lock(&self.inner.state);
        state.filter_index = filter_index;
        self.apply_filter(&mut state);
    }

    pub fn set_deviation(&self, deviation: i64) {
        let mut state = lock(&self.inner.state);
        state.deviation = deviation;
        self.inner.dsp.set_deviation(self.inner.channel, deviation as f64);
        self.apply_filter(&mut state);
    }

    /// Band change re-applies mode and filter; safe to call with the
    /// current band.
    pub fn set_band(&self, band: i32) {
        let mut state = lock(&self.inner.state);
        state.band = band;
        self.inner.dsp.set_mode(self.inner.channel, state.mode);
        self.apply_filter(&mut state);
    }

    /// Recompute the passband edges and push them to the DSP; a bound
    /// transmitter tracking this receiver follows the same edges.
    fn apply_filter(&self, state: &mut ReceiverState) {
        state.derive_passband(self.inner.radio.cw_sidetone_frequency());
        self.inner
            .dsp
            .set_passband(self.inner.channel, state.filter_low as f64, state.filter_high as f64);
        if let Some(transmitter) = lock(&self.inner.transmitter).as_ref()
            && transmitter.tracks_receiver(self.inner.channel)
        {
            transmitter.set_filter(state.filter_low, state.filter_high);
        }
    }

    // AGC, noise, audio.

    pub fn set_agc(&self, mode: AgcMode) {
        let mut state = lock(&self.inner.state);
        state.agc = mode;
        self.inner.dsp.set_agc(self.inner.channel, &tuning::agc_profile(&state));
    }

    pub fn set_agc_gain(&self, gain: f64) {
        let mut state = lock(&self.inner.state);
        state.agc_gain = gain;
        self.inner.dsp.set_agc(self.inner.channel, &tuning::agc_profile(&state));
    }

    pub fn update_noise(&self, noise: NoiseConfig) {
        let mut state = lock(&self.inner.state);
        state.noise = noise;
        self.inner.dsp.set_noise(self.inner.channel, &noise_settings(&state.noise));
    }

    pub fn set_volume(&self, volume: f64) {
        let mut state = lock(&self.inner.state);
        state.volume = volume;
        self.inner.dsp.set_volume(self.inner.channel, volume);
    }

    // Display geometry.

    pub fn set_fps(&self, fps: u32) {
        let mut state = lock(&self.inner.state);
        state.fps = fps;
        self.init_analyzer(&mut state);
        let (backmult, num_average) = tuning::display_average(state.fps, state.display_average_time);
        self.inner.dsp.set_display_average(self.inner.channel, backmult, num_average);
    }

    pub fn set_zoom(&self, zoom: usize) {
        let mut state = lock(&self.inner.state);
        state.zoom = zoom.max(1);
        state.pixels = state.panadapter_width * state.zoom;
        state.pan = if state.zoom == 1 {
            0
        } else {
            state.pixels / 2 - state.panadapter_width / 2
        };
        self.init_analyzer(&mut state);
    }

    fn init_analyzer(&self, state: &mut ReceiverState) {
        state.hz_per_pixel = state.sample_rate as f64 / state.pixels as f64;
        lock(&self.inner.pixels).resize(state.pixels, 0.0);
        self.inner.dsp.init_analyzer(
            self.inner.channel,
            &AnalyzerSettings {
                pixels: state.pixels,
                buffer_size: state.buffer_size,
                fps: state.fps,
            },
        );
    }

    /// Change the channel sample rate mid-stream. The DSP chain is held
    /// off and the ring is reinstalled while both the channel mutex and
    /// the ring mutex are held, so the worker can never observe a torn
    /// buffer.
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<()> {
        let mut state = lock(&self.inner.state);
        if sample_rate == 0 || sample_rate % state.dsp_rate != 0 {
            return Err(RxError::Config(format!(
                "sample rate {} must be a positive multiple of {}",
                sample_rate, state.dsp_rate
            )));
        }
        self.inner.dsp.set_channel_run(self.inner.channel, false);
        state.sample_rate = sample_rate;
        state.output_samples =
            state::output_samples(state.buffer_size, sample_rate, state.dsp_rate);
        state.audio_output_buffer = vec![0.0; 2 * state.output_samples];
        state.output_started = false;
        self.inner.ring.reset(state.ring_capacity())?;
        self.inner.dsp.set_rates(
            self.inner.channel,
            sample_rate,
            state.dsp_rate,
            state.output_rate,
        );
        self.init_analyzer(&mut state);
        self.inner.dsp.set_channel_run(self.inner.channel, true);
        log::info!(
            "receiver channel {} sample rate now {} (output_samples={})",
            self.inner.channel,
            sample_rate,
            state.output_samples
        );
        Ok(())
    }

    /// Persisted field set as name/value pairs.
    pub fn save_properties(&self) -> Vec<(String, String)> {
        lock(&self.inner.state).save_properties()
    }

    /// Snapshot of the channel state for inspection.
    pub fn state_snapshot(&self) -> ReceiverState {
        lock(&self.inner.state).clone()
    }

    /// Stop both threads and release the DSP channel. Threads that fail
    /// to stop within [`JOIN_TIMEOUT`] are logged and abandoned; they
    /// hold their own reference to the shared core, so they can never
    /// touch freed buffers.
    pub fn shutdown(&mut self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.inner.worker_queue.shutdown();
        self.inner.render_queue.shutdown();
        join_with_timeout("worker", self.worker.take(), &self.worker_done, self.inner.channel);
        join_with_timeout("render", self.render.take(), &self.render_done, self.inner.channel);
        self.inner.dsp.set_channel_run(self.inner.channel, false);
        self.inner.dsp.close_channel(self.inner.channel);
        log::info!("receiver channel {} stopped", self.inner.channel);
    }
}

impl Drop for ReceiverChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_loop(
    name: &str,
    inner: &Arc<ChannelInner>,
    body: fn(&ChannelInner),
) -> Result<(JoinHandle<()>, Receiver<()>)> {
    let channel = inner.channel;
    let (done_tx, done_rx): (Sender<()>, Receiver<()>) = bounded(1);
    let inner = Arc::clone(inner);
    let handle = thread::Builder::new()
        .name(format!("{name}-{channel}"))
        .spawn(move || {
            body(&inner);
            let _ = done_tx.send(());
        })
        .map_err(|e| RxError::ChannelCreate {
            channel,
            reason: format!("{name} thread: {e}"),
        })?;
    Ok((handle, done_rx))
}

fn join_with_timeout(name: &str, handle: Option<JoinHandle<()>>, done: &Receiver<()>, channel: usize) {
    let Some(handle) = handle else {
        return;
    };
    match done.recv_timeout(JOIN_TIMEOUT) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            if handle.join().is_err() {
                log::warn!("{name} thread panicked: channel={channel}");
            }
        }
        Err(RecvTimeoutError::Timeout) => {
            log::warn!(
                "{name} thread did not stop within {:?}, abandoning: channel={}",
                JOIN_TIMEOUT,
                channel
            );
            drop(handle);
        }
    }
}

fn worker_loop(inner: &ChannelInner) {
    let (buffer_size, sample_rate) = {
        let state = lock(&inner.state);
        (state.buffer_size, state.sample_rate)
    };
    let _rt_handle = match audio_thread_priority::promote_current_thread_to_real_time(
        buffer_size as u32,
        sample_rate,
    ) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("could not set real-time priority: {}", e);
            None
        }
    };
    log::debug!("worker started: channel={}", inner.channel);

    loop {
        if inner.worker_queue.wait() == Token::Shutdown {
            break;
        }
        if !inner.running.load(Ordering::Acquire) {
            break;
        }
        if inner.radio.is_transmitting() && !lock(&inner.state).duplex {
            continue;
        }
        let frame_size = inner.frame_size.load(Ordering::Acquire);
        let Some(mut frame) = inner.ring.drain(frame_size) else {
            // Frame not fully staged yet; retry shortly.
            inner.worker_queue.notify();
            thread::sleep(UNDERFLOW_BACKOFF);
            continue;
        };
        process_frame(inner, &mut frame);
    }
    log::debug!("worker exiting: channel={}", inner.channel);
}

fn process_frame(inner: &ChannelInner, frame: &mut [f64]) {
    let mut state = lock(&inner.state);
    if state.noise.nb {
        inner.dsp.noise_blanker(inner.channel, frame);
    }
    if state.noise.nb2 {
        inner.dsp.noise_blanker2(inner.channel, frame);
    }
    let code = inner.dsp.exchange(inner.channel, frame, &mut state.audio_output_buffer);
    if code != 0 {
        log::warn!("dsp exchange: channel={} code={}", inner.channel, code);
        if code == DSP_NOT_READY {
            state.audio_output_buffer.fill(0.0);
        }
    }
    if state.subrx_enable
        && let Some(subrx) = lock(&inner.subrx).as_mut()
    {
        subrx.feed_iq(frame);
    }
    inner.dsp.spectrum(inner.channel, frame);
    publish_audio(inner, &mut state);
}

/// Fan processed audio out to the local and network sinks. With a
/// sub-receiver enabled the right channel carries its audio; otherwise
/// the channel policy selects which sides of the stereo exchange output
/// are heard. Only the active receiver feeds the network sink, and its
/// samples are zeroed while transmitting (or with remote audio off)
/// unless in duplex.
fn publish_audio(inner: &ChannelInner, state: &mut ReceiverState) {
    let transmitting = inner.radio.is_transmitting();
    let active = inner.radio.active_receiver() == inner.channel;
    let mut audio_sink = lock(&inner.audio_sink);
    let mut network_sink = lock(&inner.network_sink);
    let subrx = lock(&inner.subrx);
    let subrx_audio: Option<&[f64]> = if state.subrx_enable {
        subrx.as_ref().map(|s| s.audio_output())
    } else {
        None
    };

    for k in 0..state.output_samples {
        let (left, right) = if let Some(sub) = subrx_audio {
            (
                state.audio_output_buffer[2 * k],
                sub.get(2 * k).copied().unwrap_or(0.0),
            )
        } else {
            match state.audio_channels {
                AudioChannels::Stereo => (
                    state.audio_output_buffer[2 * k],
                    state.audio_output_buffer[2 * k + 1],
                ),
                AudioChannels::LeftOnly => (state.audio_output_buffer[2 * k], 0.0),
                AudioChannels::RightOnly => (0.0, state.audio_output_buffer[2 * k + 1]),
            }
        };
        let left = left.clamp(-1.0, 1.0);
        let right = right.clamp(-1.0, 1.0);

        if state.local_audio
            && let Some(sink) = audio_sink.as_mut()
        {
            sink.write(left as f32, right as f32);
        }

        if active {
            let mute = (transmitting || !state.remote_audio) && !state.duplex;
            let (pcm_left, pcm_right) = if mute {
                (0, 0)
            } else {
                (to_pcm(left), to_pcm(right))
            };
            if let Some(sink) = network_sink.as_mut() {
                sink.write(pcm_left, pcm_right);
            }
        }
    }

    if state.local_audio && !state.output_started {
        if let Some(sink) = audio_sink.as_mut() {
            sink.start();
        }
        state.output_started = true;
    }
}

fn render_loop(inner: &ChannelInner) {
    log::debug!("render dispatch started: channel={}", inner.channel);
    loop {
        if inner.render_queue.wait() == Token::Shutdown {
            break;
        }
        if !inner.running.load(Ordering::Acquire) {
            break;
        }
        // Redraws touch UI resources, so the sink only schedules; the
        // actual drawing happens on the UI thread.
        if let Some(sink) = lock(&inner.render_sink).as_mut() {
            sink.schedule_redraw(inner.channel);
        }
    }
    log::debug!("render dispatch exiting: channel={}", inner.channel);
}
