//! Live PCM level meter and spectrum analyser.
//!
//! A [`Meter`] owns one capture device. A background thread reads frames
//! from it, keeps a rolling mean amplitude for a dB level and accumulates
//! windowed, optionally filtered FFT magnitude spectra until a consumer
//! drains them with [`Meter::fft_data`].

pub mod audio;
pub mod capture;
pub mod config;
pub mod meter;

pub use audio::analysis::{ProcessReport, Spectrum, SpectrumAccumulator};
pub use audio::amplitude::{AmplitudeTracker, DB_FLOOR};
pub use audio::device::{CaptureDevice, DeviceError, FileDevice, StreamParams, ToneDevice};
pub use audio::filter::{FilterCoefficients, FilterKind, FilterSpec};
pub use audio::frame::{SampleFormat, SampleFrame};
#[cfg(feature = "live")]
pub use audio::live::LiveDevice;
pub use audio::window::WindowKind;
pub use config::{load_config, Config, MeterSettings};
pub use meter::{LogSink, Meter, MeterError, Notification, NotificationSink, Phase};
