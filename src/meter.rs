//! The level/spectrum meter controller.
//!
//! Every piece of mutable engine state lives in one [`EngineState`] behind a
//! single `parking_lot::Mutex` shared with the capture thread. The capture
//! thread takes the lock once per frame (one push plus one append, which may
//! run the FFT batch); every consumer call takes it once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::audio::amplitude::AmplitudeTracker;
use crate::audio::analysis::{ProcessReport, Spectrum, SpectrumAccumulator};
use crate::audio::device::{CaptureDevice, DeviceError, StreamParams};
use crate::audio::filter::{FilterKind, FilterSpec};
use crate::audio::frame::SampleFormat;
use crate::audio::window::WindowKind;
use crate::capture::CaptureLoop;
use crate::config::MeterSettings;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Capture thread error: {0}")]
    Thread(String),

    #[error("Cannot change {0} while the device is open")]
    ConfigurationRejected(&'static str),
}

/// Out-of-band messages for the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The configured filter turned a frame into NaN/Inf; that frame was
    /// left out of the spectrum.
    FilterUnstable { message: String },
}

pub trait NotificationSink: Send {
    fn notify(&self, notification: Notification);
}

impl NotificationSink for mpsc::Sender<Notification> {
    fn notify(&self, notification: Notification) {
        if self.send(notification).is_err() {
            log::debug!("Notification receiver is gone");
        }
    }
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::FilterUnstable { message } => log::warn!("{}", message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Stopping,
}

/// Forwards instability notices, at most one until acknowledged.
struct Notifier {
    sink: Box<dyn NotificationSink>,
    latched: bool,
}

impl Notifier {
    fn filter_unstable(&mut self, spec: &FilterSpec, rejected: usize) {
        if self.latched {
            log::debug!("{} more frame(s) dropped by unstable filter", rejected);
            return;
        }
        log::warn!(
            "{} filter ({:.1}-{:.1}Hz, order {}) produced non-finite output, {} frame(s) dropped",
            spec.kind.name(),
            spec.low_hz,
            spec.high_hz,
            spec.order,
            rejected
        );
        self.latched = true;
        self.sink.notify(Notification::FilterUnstable {
            message: "The configured filter cannot be applied: it produces invalid data \
                      that cannot be used to obtain a spectrum. Its cut-off frequency is \
                      most likely too close to zero or to the Nyquist frequency for the \
                      sample rate."
                .into(),
        });
    }
}

/// All mutable engine state, guarded as one unit.
pub(crate) struct EngineState {
    pub(crate) params: StreamParams,
    pub(crate) phase: Phase,
    pub(crate) tracker: AmplitudeTracker,
    pub(crate) spectrum: SpectrumAccumulator,
    sample_window: f64,
    fft_unit: f64,
    view_duration: u32,
    notifier: Notifier,
}

impl EngineState {
    pub(crate) fn new(settings: &MeterSettings, sink: Box<dyn NotificationSink>) -> Self {
        let params = settings.stream;
        let rate = params.sample_rate as f64;

        let mut spectrum =
            SpectrumAccumulator::new(rate, SpectrumAccumulator::frame_len_for(settings.fft_unit, rate));
        spectrum.set_min_retained_frames(settings.min_retained_frames);
        spectrum.set_overlap_ratio(settings.overlap_ratio);
        spectrum.set_window(settings.window);
        spectrum.set_filter(settings.filter);
        spectrum.reset();

        let mut state = Self {
            params,
            phase: Phase::Idle,
            tracker: AmplitudeTracker::new(AmplitudeTracker::capacity_for(
                settings.sample_window,
                params.frame_duration(),
            )),
            spectrum,
            sample_window: settings.sample_window,
            fft_unit: settings.fft_unit,
            view_duration: 0,
            notifier: Notifier {
                sink,
                latched: false,
            },
        };
        state.set_view_duration(settings.view_duration);
        state
    }

    fn device_open(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// One captured frame: its amplitude and its mono samples.
    pub(crate) fn push_frame(&mut self, amplitude: f64, mono: &[f64]) {
        self.tracker.push(amplitude);
        if let Some(report) = self.spectrum.append(mono) {
            self.absorb(report);
        }
    }

    fn absorb(&mut self, report: ProcessReport) {
        if report.rejected > 0 {
            let spec = *self.spectrum.filter_spec();
            self.notifier.filter_unstable(&spec, report.rejected);
        }
    }

    fn reset_analysis(&mut self) {
        self.tracker.clear();
        self.spectrum.clear_sum();
        self.spectrum.reset();
    }

    /// Called by the capture thread once the device is closed.
    pub(crate) fn finish_capture(&mut self) {
        self.reset_analysis();
        self.phase = Phase::Idle;
    }

    fn resize_tracker(&mut self) {
        self.tracker
            .set_window_duration(self.sample_window, self.params.frame_duration());
    }

    fn resize_fft(&mut self) {
        let rate = self.params.sample_rate as f64;
        self.spectrum.set_sample_rate(rate);
        self.spectrum
            .set_frame_len(SpectrumAccumulator::frame_len_for(self.fft_unit, rate));
    }

    fn set_view_duration(&mut self, secs: f64) {
        let mut view = if secs.is_finite() && secs > 0.0 { secs as u32 } else { 0 };
        let mut batch = view / 8;
        let minimum = (2.0 * self.fft_unit) as u32;
        if batch < minimum {
            log::debug!(
                "FFT batch duration {}s is shorter than twice the FFT unit {}s",
                batch,
                self.fft_unit
            );
            view = minimum;
            batch = if minimum > 1 { minimum - 1 } else { minimum };
        }
        self.view_duration = view;
        self.spectrum.set_batch_duration(batch as f64);
    }
}

struct Worker {
    handle: JoinHandle<Box<dyn CaptureDevice>>,
    done_rx: mpsc::Receiver<()>,
}

/// Controller for one capture stream and its two analysers.
pub struct Meter {
    shared: Arc<Mutex<EngineState>>,
    stop: Arc<AtomicBool>,
    device: Option<Box<dyn CaptureDevice>>,
    worker: Option<Worker>,
    stop_timeout: Duration,
}

impl Meter {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        settings: MeterSettings,
        sink: Box<dyn NotificationSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Mutex::new(EngineState::new(&settings, sink))),
            stop: Arc::new(AtomicBool::new(false)),
            device: Some(device),
            worker: None,
            stop_timeout: settings.stop_timeout,
        }
    }

    /// Open the device and start capturing. Does nothing if already running.
    pub fn start(&mut self) -> Result<(), MeterError> {
        if self.worker.is_some() {
            let wait = match self.phase() {
                Phase::Running => {
                    log::debug!("Capture already running");
                    return Ok(());
                }
                // The worker has torn down and is about to signal.
                Phase::Idle => self.stop_timeout,
                Phase::Stopping => Duration::ZERO,
            };
            if !self.reap(wait) {
                return Err(MeterError::Thread("previous capture is still stopping".into()));
            }
        }

        let mut device = self
            .device
            .take()
            .ok_or_else(|| MeterError::Thread("capture device was lost".into()))?;

        let params = self.shared.lock().params;
        if let Err(e) = device.open(&params) {
            log::error!("Failed to open {}: {}", device.name(), e);
            self.device = Some(device);
            return Err(e.into());
        }
        log::info!(
            "Opened {}: {}Hz, {} channel(s), {:?}, {} samples per frame",
            device.name(),
            params.sample_rate,
            params.channels,
            params.format,
            params.frame_samples
        );

        {
            let mut state = self.shared.lock();
            state.reset_analysis();
            state.phase = Phase::Running;
        }
        self.stop.store(false, Ordering::Release);

        let (done_tx, done_rx) = mpsc::channel();
        let capture = CaptureLoop::new(device, self.shared.clone(), self.stop.clone());
        let spawned = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let device = capture.run();
                let _ = done_tx.send(());
                device
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker { handle, done_rx });
                Ok(())
            }
            Err(e) => {
                self.shared.lock().phase = Phase::Idle;
                Err(MeterError::Thread(e.to_string()))
            }
        }
    }

    /// Ask the capture thread to finish and wait up to the stop timeout.
    /// A thread still blocked in a read is left to finish on its own.
    pub fn stop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        self.stop.store(true, Ordering::Release);
        {
            let mut state = self.shared.lock();
            if state.phase == Phase::Running {
                state.phase = Phase::Stopping;
            }
        }
        log::info!("Stopping capture");

        if !self.reap(self.stop_timeout) {
            log::warn!(
                "Capture thread did not stop within {:?}; it will finish in the background",
                self.stop_timeout
            );
        }
    }

    /// Join the worker if it finishes within `wait`. Returns whether no
    /// worker remains.
    fn reap(&mut self, wait: Duration) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };
        if let Err(mpsc::RecvTimeoutError::Timeout) = worker.done_rx.recv_timeout(wait) {
            self.worker = Some(worker);
            return false;
        }
        match worker.handle.join() {
            Ok(device) => self.device = Some(device),
            Err(_) => {
                log::error!("Capture thread panicked");
                self.shared.lock().phase = Phase::Idle;
            }
        }
        true
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    // Stream layout

    pub fn sample_rate(&self) -> u32 {
        self.shared.lock().params.sample_rate
    }

    pub fn nyquist_frequency(&self) -> f64 {
        self.sample_rate() as f64 / 2.0
    }

    /// Change the sample rate. Rejected while the device is open.
    pub fn set_sample_rate(&self, hz: u32) -> Result<(), MeterError> {
        let mut state = self.shared.lock();
        if state.device_open() {
            log::debug!("Ignoring sample rate change to {}Hz while open", hz);
            return Err(MeterError::ConfigurationRejected("sample rate"));
        }
        if hz == 0 {
            return Err(MeterError::Device(DeviceError::Unsupported(
                "sample rate must be positive".into(),
            )));
        }
        state.params.sample_rate = hz;
        state.resize_fft();
        state.resize_tracker();
        Ok(())
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.shared.lock().params.format
    }

    pub fn sample_peak(&self) -> f64 {
        self.sample_format().peak()
    }

    /// Select the sample format by its PortAudio-style code.
    pub fn set_sample_size(&self, code: u32) -> Result<(), MeterError> {
        self.set_sample_format(SampleFormat::from_code(code))
    }

    pub fn set_sample_format(&self, format: SampleFormat) -> Result<(), MeterError> {
        let mut state = self.shared.lock();
        if state.device_open() {
            log::debug!("Ignoring sample format change to {:?} while open", format);
            return Err(MeterError::ConfigurationRejected("sample format"));
        }
        state.params.format = format;
        Ok(())
    }

    pub fn channels(&self) -> u16 {
        self.shared.lock().params.channels
    }

    pub fn set_channels(&self, channels: u16) -> Result<(), MeterError> {
        let mut state = self.shared.lock();
        if state.device_open() {
            log::debug!("Ignoring channel change to {} while open", channels);
            return Err(MeterError::ConfigurationRejected("channel count"));
        }
        state.params.channels = channels.max(1);
        Ok(())
    }

    pub fn set_mono(&self) -> Result<(), MeterError> {
        self.set_channels(1)
    }

    pub fn set_stereo(&self) -> Result<(), MeterError> {
        self.set_channels(2)
    }

    pub fn frame_samples(&self) -> usize {
        self.shared.lock().params.frame_samples
    }

    /// Samples per channel per read. Takes effect from the next read.
    pub fn set_frame_samples(&self, samples: usize) {
        let mut state = self.shared.lock();
        state.params.frame_samples = samples.max(1);
        state.resize_tracker();
    }

    pub fn frame_duration(&self) -> f64 {
        self.shared.lock().params.frame_duration()
    }

    // Level meter

    pub fn set_sample_window(&self, secs: f64) {
        let mut state = self.shared.lock();
        state.sample_window = secs;
        state.resize_tracker();
    }

    pub fn sample_window(&self) -> f64 {
        self.shared.lock().sample_window
    }

    /// Rolling mean level relative to the format's peak, in dB.
    pub fn current_db(&self) -> f64 {
        let state = self.shared.lock();
        state.tracker.current_db(state.params.format.peak())
    }

    pub fn max_amplitude(&self) -> f64 {
        let state = self.shared.lock();
        state.tracker.max(state.params.format.peak())
    }

    // Spectrum

    /// Select the window by name; unknown names turn windowing off.
    pub fn set_window_type(&self, name: &str) {
        self.set_window(WindowKind::from_name(name));
    }

    pub fn set_window(&self, window: Option<WindowKind>) {
        self.shared.lock().spectrum.set_window(window);
    }

    pub fn window_type(&self) -> Option<WindowKind> {
        self.shared.lock().spectrum.window()
    }

    pub fn set_overlap_ratio(&self, ratio: f64) {
        self.shared.lock().spectrum.set_overlap_ratio(ratio);
    }

    /// Length of one FFT frame in seconds. Discards buffered samples.
    pub fn set_fft_unit(&self, secs: f64) {
        let mut state = self.shared.lock();
        state.fft_unit = secs;
        state.resize_fft();
    }

    pub fn fft_unit(&self) -> f64 {
        self.shared.lock().fft_unit
    }

    /// How long one spectrum view element covers; sets the FFT batch size.
    pub fn set_fft_view_duration(&self, secs: f64) {
        self.shared.lock().set_view_duration(secs);
    }

    pub fn fft_view_duration(&self) -> u32 {
        self.shared.lock().view_duration
    }

    pub fn fft_batch_duration(&self) -> f64 {
        self.shared.lock().spectrum.batch_duration()
    }

    pub fn frames_in_stream(&self) -> usize {
        self.shared.lock().spectrum.frames_in_stream()
    }

    /// Take the spectrum summed since the last call, if any frame was
    /// transformed in between.
    pub fn fft_data(&self) -> Option<Spectrum> {
        let mut state = self.shared.lock();
        let (spectrum, report) = state.spectrum.drain();
        state.absorb(report);
        spectrum
    }

    /// Bin centre frequencies for the current rate and FFT length.
    pub fn fft_freqs(&self) -> Arc<[f64]> {
        self.shared.lock().spectrum.frequencies()
    }

    // Filter

    pub fn filter_spec(&self) -> FilterSpec {
        *self.shared.lock().spectrum.filter_spec()
    }

    pub fn set_filter(&self, spec: FilterSpec) {
        self.update_filter(|current| *current = spec);
    }

    /// Edit the filter spec in place under one lock.
    fn update_filter(&self, change: impl FnOnce(&mut FilterSpec)) {
        let mut state = self.shared.lock();
        let mut spec = *state.spectrum.filter_spec();
        change(&mut spec);
        state.spectrum.set_filter(spec);
        if !spec.is_valid(state.params.sample_rate as f64) && spec.kind != FilterKind::None {
            log::debug!("Filter {:?} is out of range, filtering disabled", spec);
        }
    }

    pub fn set_filter_type(&self, kind: FilterKind) {
        self.update_filter(|spec| spec.kind = kind);
    }

    pub fn set_filter_low_f(&self, hz: f64) {
        self.update_filter(|spec| spec.low_hz = hz);
    }

    pub fn set_filter_high_f(&self, hz: f64) {
        self.update_filter(|spec| spec.high_hz = hz);
    }

    pub fn set_filter_order(&self, order: u32) {
        self.update_filter(|spec| spec.order = order);
    }

    /// Re-arm the filter instability notification.
    pub fn acknowledge_notification(&self) {
        self.shared.lock().notifier.latched = false;
    }
}

impl Drop for Meter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::ToneDevice;
    use crate::capture::tests::{int16_frame, ScriptedDevice};
    use std::time::Instant;

    fn settings(rate: u32, frame_samples: usize) -> MeterSettings {
        let mut settings = MeterSettings::default();
        settings.stream.sample_rate = rate;
        settings.stream.frame_samples = frame_samples;
        settings
    }

    fn wait_for<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = check() {
                return Some(value);
            }
            if Instant::now() > deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn float_frame(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn rate_change_rejected_while_open() {
        let mut device = ScriptedDevice::new();
        device.repeat = Some(int16_frame(&[10; 8]));
        let mut meter = Meter::new(Box::new(device), settings(8_000, 8), Box::new(LogSink));

        assert_eq!(meter.fft_freqs().last().copied(), Some(4_000.0));
        meter.start().expect("start");
        assert!(matches!(
            meter.set_sample_rate(16_000),
            Err(MeterError::ConfigurationRejected(_))
        ));
        assert!(matches!(
            meter.set_sample_size(1),
            Err(MeterError::ConfigurationRejected(_))
        ));
        assert!(meter.set_stereo().is_err());
        assert_eq!(meter.sample_rate(), 8_000);
        assert_eq!(meter.sample_format(), SampleFormat::Int16);
        assert_eq!(meter.channels(), 1);

        meter.stop();
        assert_eq!(meter.phase(), Phase::Idle);
        meter.set_sample_rate(16_000).expect("closed");
        assert_eq!(meter.nyquist_frequency(), 8_000.0);
        assert_eq!(meter.fft_freqs().last().copied(), Some(8_000.0));
    }

    #[test]
    fn start_twice_opens_once() {
        let mut device = ScriptedDevice::new();
        device.repeat = Some(int16_frame(&[10; 8]));
        let opens = device.opens.clone();
        let closes = device.closes.clone();

        let mut meter = Meter::new(Box::new(device), settings(8_000, 8), Box::new(LogSink));
        meter.start().expect("start");
        meter.start().expect("second start");
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(meter.is_running());

        meter.stop();
        meter.stop();
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        meter.start().expect("restart");
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        drop(meter);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_open_stays_idle() {
        let mut device = ScriptedDevice::new();
        device.fail_open = true;
        let mut meter = Meter::new(Box::new(device), settings(8_000, 8), Box::new(LogSink));

        assert!(matches!(meter.start(), Err(MeterError::Device(DeviceError::Open(_)))));
        assert_eq!(meter.phase(), Phase::Idle);
        assert!(meter.fft_data().is_none());
        // the device is kept so the next start can retry
        assert!(meter.start().is_err());
    }

    #[test]
    fn level_follows_tone() {
        let mut meter = Meter::new(
            Box::new(ToneDevice::new(250.0, 0.5)),
            settings(8_000, 32),
            Box::new(LogSink),
        );
        assert!(meter.current_db() < -80.0);
        meter.start().expect("start");

        let db = wait_for(Duration::from_secs(2), || {
            let filled = meter.shared.lock().tracker.len() >= 2;
            filled.then(|| meter.current_db())
        })
        .expect("level");
        meter.stop();

        // mean |x| of a half-scale sine is 0.5 * 2/pi of peak
        let expected = 20.0 * (0.5 * 2.0 / std::f64::consts::PI).log10();
        assert!((db - expected).abs() < 0.1, "level {} dB", db);
    }

    #[test]
    fn spectrum_peaks_at_tone() {
        let mut settings = settings(8_000, 400);
        settings.fft_unit = 0.05;
        settings.window = None;
        let mut meter = Meter::new(
            Box::new(ToneDevice::new(1_000.0, 0.8)),
            settings,
            Box::new(LogSink),
        );
        meter.start().expect("start");
        let spectrum = wait_for(Duration::from_secs(3), || meter.fft_data()).expect("spectrum");
        meter.stop();

        let resolution = 8_000.0 / 400.0;
        let peak = spectrum.peak_frequency().expect("peak");
        assert!((peak - 1_000.0).abs() <= resolution, "peak at {}", peak);
        assert_eq!(spectrum.frequencies.len(), 201);
    }

    #[test]
    fn unstable_filter_notifies_once_until_acknowledged() {
        let mut nan_frame = vec![0.1f32; 8];
        nan_frame[3] = f32::NAN;
        let mut device = ScriptedDevice::new();
        device.repeat = Some(float_frame(&nan_frame));

        let mut settings = settings(8_000, 8);
        settings.stream.format = SampleFormat::Float32;
        settings.fft_unit = 0.001;
        settings.window = None;
        settings.filter = FilterSpec {
            kind: FilterKind::LowPass,
            high_hz: 1_000.0,
            ..FilterSpec::default()
        };

        let (tx, rx) = mpsc::channel();
        let mut meter = Meter::new(Box::new(device), settings, Box::new(tx));
        meter.start().expect("start");

        let mut drained = 0;
        let first = wait_for(Duration::from_secs(2), || {
            assert!(meter.fft_data().is_none());
            drained += 1;
            rx.try_recv().ok()
        })
        .expect("notification");
        assert!(matches!(first, Notification::FilterUnstable { .. }));

        // more bad frames arrive but the latch holds
        thread::sleep(Duration::from_millis(50));
        assert!(meter.fft_data().is_none());
        assert!(rx.try_recv().is_err());

        meter.acknowledge_notification();
        let again = wait_for(Duration::from_secs(2), || {
            meter.fft_data();
            rx.try_recv().ok()
        });
        meter.stop();
        assert!(again.is_some());
        assert!(drained >= 1);
    }

    #[test]
    fn view_duration_keeps_batch_above_minimum() {
        let device = ScriptedDevice::new();
        let meter = Meter::new(Box::new(device), MeterSettings::default(), Box::new(LogSink));

        // fft unit 2s: anything under 32s falls back to a 4s view
        meter.set_fft_view_duration(10.0);
        assert_eq!(meter.fft_view_duration(), 4);
        assert_eq!(meter.fft_batch_duration(), 3.0);

        meter.set_fft_view_duration(120.0);
        assert_eq!(meter.fft_view_duration(), 120);
        assert_eq!(meter.fft_batch_duration(), 15.0);
    }

    #[test]
    fn restart_right_after_worker_exit() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut device = ScriptedDevice::new();
        device.repeat = Some(int16_frame(&[10; 8]));
        let raise = stop.clone();
        device.on_exhausted = Some(Box::new(move || raise.store(true, Ordering::Release)));
        let opens = device.opens.clone();

        let mut meter = Meter::new(Box::new(device), settings(8_000, 8), Box::new(LogSink));
        meter.stop = stop;
        meter.start().expect("start");
        wait_for(Duration::from_secs(2), || (meter.phase() == Phase::Idle).then_some(()))
            .expect("worker exit");

        meter.start().expect("restart");
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        meter.stop();
    }

    #[test]
    fn filter_edits_all_land() {
        let meter = Meter::new(Box::new(ScriptedDevice::new()), MeterSettings::default(), Box::new(LogSink));
        meter.set_filter(FilterSpec {
            kind: FilterKind::LowPass,
            low_hz: 1.0,
            high_hz: 5_000.0,
            order: 2,
        });
        for step in 1..=10 {
            meter.set_filter_low_f(step as f64 * 10.0);
            meter.set_filter_high_f(step as f64 * 1_000.0);
        }
        meter.set_filter_type(FilterKind::BandStop);

        let spec = meter.filter_spec();
        assert_eq!(spec.kind, FilterKind::BandStop);
        assert_eq!((spec.low_hz, spec.high_hz, spec.order), (100.0, 10_000.0, 2));
        assert!(!meter.shared.lock().spectrum.filter().is_passthrough());
    }

    #[test]
    fn settings_round_through_accessors() {
        let meter = Meter::new(Box::new(ScriptedDevice::new()), MeterSettings::default(), Box::new(LogSink));
        assert_eq!(meter.sample_rate(), 44_100);
        assert_eq!(meter.sample_peak(), 32_767.0);
        assert_eq!(meter.window_type(), Some(WindowKind::BlackmanHarris));
        assert_eq!(meter.max_amplitude(), 32_767.0);

        meter.set_sample_size(16).expect("idle");
        assert_eq!(meter.sample_format(), SampleFormat::Int8);
        assert_eq!(meter.sample_peak(), 127.0);

        meter.set_window_type("no such window");
        assert_eq!(meter.window_type(), None);
        meter.set_window_type("Hann");
        assert_eq!(meter.window_type(), Some(WindowKind::Hann));

        meter.set_filter_type(FilterKind::BandPass);
        meter.set_filter_low_f(300.0);
        meter.set_filter_high_f(3_000.0);
        meter.set_filter_order(4);
        let spec = meter.filter_spec();
        assert_eq!(spec.kind, FilterKind::BandPass);
        assert_eq!((spec.low_hz, spec.high_hz, spec.order), (300.0, 3_000.0, 4));

        meter.set_frame_samples(2048);
        assert!((meter.frame_duration() - 2048.0 / 44_100.0).abs() < 1e-12);
        assert_eq!(meter.frames_in_stream(), 1);
    }
}
