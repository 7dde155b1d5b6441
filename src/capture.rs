use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::audio::device::{CaptureDevice, StreamParams};
use crate::audio::frame::SampleFrame;
use crate::meter::EngineState;

/// Minimum time one loop iteration should take: a frame's duration rounded
/// down to whole milliseconds, plus one.
pub fn pacing_interval(frame_samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::from_millis(1);
    }
    let frame_ms = 1000 * frame_samples as u64 / sample_rate as u64;
    Duration::from_millis(1 + frame_ms)
}

/// Caches the pacing interval until the frame length or rate changes.
#[derive(Debug, Default)]
struct Pacing {
    key: Option<(usize, u32)>,
    interval: Duration,
}

impl Pacing {
    fn interval(&mut self, params: &StreamParams) -> Duration {
        let key = (params.frame_samples, params.sample_rate);
        if self.key != Some(key) {
            self.interval = pacing_interval(key.0, key.1);
            self.key = Some(key);
            log::debug!("Capture pacing set to {:?}", self.interval);
        }
        self.interval
    }
}

/// Producer side of the meter: reads frames until asked to stop and feeds
/// them to the shared analysers.
pub(crate) struct CaptureLoop<D: CaptureDevice> {
    device: D,
    shared: Arc<Mutex<EngineState>>,
    stop: Arc<AtomicBool>,
}

impl<D: CaptureDevice> CaptureLoop<D> {
    /// `device` must already be open.
    pub(crate) fn new(device: D, shared: Arc<Mutex<EngineState>>, stop: Arc<AtomicBool>) -> Self {
        Self {
            device,
            shared,
            stop,
        }
    }

    /// Run until the stop flag is raised, then close the device and hand it
    /// back. A read already in flight when the flag goes up is completed.
    pub(crate) fn run(mut self) -> D {
        let mut pacing = Pacing::default();
        let mut frames = 0u64;
        let mut errors = 0u64;

        while !self.stop.load(Ordering::Acquire) {
            let started = Instant::now();
            let params = self.shared.lock().params;
            let interval = pacing.interval(&params);

            match self.device.read(params.frame_samples) {
                Ok(bytes) => {
                    let frame = SampleFrame::from_bytes(&bytes, params.format, params.channels);
                    let amplitude = frame.mean_amplitude();
                    let mono = frame.downmix();
                    self.shared.lock().push_frame(amplitude, &mono);
                    frames += 1;
                }
                Err(e) => {
                    errors += 1;
                    log::warn!("Skipping frame from {}: {}", self.device.name(), e);
                }
            }

            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }

        self.device.close();
        self.shared.lock().finish_capture();
        log::info!(
            "Capture from {} stopped after {} frames ({} read errors)",
            self.device.name(),
            frames,
            errors
        );
        self.device
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::device::DeviceError;
    use crate::audio::frame::SampleFormat;
    use crate::config::MeterSettings;
    use crate::meter::{LogSink, Phase};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Device that replays a script of reads, then repeats `repeat` forever
    /// (or fails once the script is exhausted when `repeat` is `None`).
    pub(crate) struct ScriptedDevice {
        pub(crate) script: VecDeque<Result<Vec<u8>, DeviceError>>,
        pub(crate) repeat: Option<Vec<u8>>,
        pub(crate) on_exhausted: Option<Box<dyn FnMut() + Send>>,
        pub(crate) fail_open: bool,
        pub(crate) opens: Arc<AtomicUsize>,
        pub(crate) closes: Arc<AtomicUsize>,
        open: bool,
    }

    impl ScriptedDevice {
        pub(crate) fn new() -> Self {
            Self {
                script: VecDeque::new(),
                repeat: None,
                on_exhausted: None,
                fail_open: false,
                opens: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
                open: false,
            }
        }
    }

    impl CaptureDevice for ScriptedDevice {
        fn open(&mut self, _params: &StreamParams) -> Result<(), DeviceError> {
            if self.fail_open {
                return Err(DeviceError::Open("scripted failure".into()));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.open = true;
            Ok(())
        }

        fn read(&mut self, _frames: usize) -> Result<Vec<u8>, DeviceError> {
            if !self.open {
                return Err(DeviceError::NotOpen);
            }
            if let Some(next) = self.script.pop_front() {
                return next;
            }
            if let Some(mut hook) = self.on_exhausted.take() {
                hook();
            }
            self.repeat
                .clone()
                .ok_or_else(|| DeviceError::Read("script exhausted".into()))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    pub(crate) fn int16_frame(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn shared_state() -> Arc<Mutex<EngineState>> {
        let mut settings = MeterSettings::default();
        settings.stream.format = SampleFormat::Int16;
        settings.stream.sample_rate = 8_000;
        settings.stream.frame_samples = 4;
        settings.sample_window = 1.0;
        settings.fft_unit = 0.001;

        let mut state = EngineState::new(&settings, Box::new(LogSink));
        state.phase = Phase::Running;
        Arc::new(Mutex::new(state))
    }

    #[test]
    fn interval_is_frame_duration_plus_one_ms() {
        assert_eq!(pacing_interval(1024, 44_100), Duration::from_millis(24));
        assert_eq!(pacing_interval(8, 8_000), Duration::from_millis(2));
        assert_eq!(pacing_interval(4, 8_000), Duration::from_millis(1));
    }

    #[test]
    fn frames_reach_both_analysers_and_errors_are_skipped() {
        let shared = shared_state();
        let stop = Arc::new(AtomicBool::new(false));

        let mut device = ScriptedDevice::new();
        device.script.extend([
            Err(DeviceError::Read("glitch".into())),
            Ok(int16_frame(&[100, -100, 100, -100])),
            Err(DeviceError::Read("glitch".into())),
            Ok(int16_frame(&[300, 300, -300, -300])),
        ]);

        // snapshot the analysers before teardown clears them
        let seen = Arc::new(Mutex::new(None));
        device.on_exhausted = Some(Box::new({
            let shared = shared.clone();
            let stop = stop.clone();
            let seen = seen.clone();
            move || {
                let state = shared.lock();
                *seen.lock() = Some((state.tracker.len(), state.tracker.mean(), state.spectrum.write_pos()));
                stop.store(true, Ordering::Release);
            }
        }));
        device.open(&StreamParams::default()).expect("open");

        let device = CaptureLoop::new(device, shared.clone(), stop).run();

        let (len, mean, written) = seen.lock().take().expect("snapshot");
        assert_eq!(len, 2);
        assert!((mean - 200.0).abs() < 1e-9);
        // primed frame of eight zeros plus two four-sample frames
        assert_eq!(written, 8 + 8);

        assert!(!device.is_open());
        assert_eq!(device.closes.load(Ordering::SeqCst), 1);
        let state = shared.lock();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.tracker.is_empty());
    }

    #[test]
    fn raised_flag_stops_before_reading() {
        let shared = shared_state();
        let stop = Arc::new(AtomicBool::new(true));

        let mut device = ScriptedDevice::new();
        device.repeat = Some(int16_frame(&[1, 2, 3, 4]));
        device.open(&StreamParams::default()).expect("open");

        let device = CaptureLoop::new(device, shared.clone(), stop).run();
        assert_eq!(device.closes.load(Ordering::SeqCst), 1);
        assert!(shared.lock().tracker.is_empty());
    }
}
