//! Capture sources the meter can read frames from.
//!
//! A device is a blocking, synchronous source of raw little-endian PCM
//! bytes in the format negotiated at `open`. Read failures are transient:
//! the capture loop logs them and tries again on its next iteration.

use std::f64::consts::TAU;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::decode::{decode_audio, AudioData};
use super::frame::SampleFormat;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to open capture device: {0}")]
    Open(String),

    #[error("Capture device is not open")]
    NotOpen,

    #[error("Capture read failed: {0}")]
    Read(String),

    #[error("Unsupported stream parameters: {0}")]
    Unsupported(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),
}

/// Stream layout requested from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    /// Samples per channel in one read.
    pub frame_samples: usize,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            format: SampleFormat::Int16,
            channels: 1,
            sample_rate: 44_100,
            frame_samples: 1024,
        }
    }
}

impl StreamParams {
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * self.channels as usize * self.format.bytes()
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_samples as f64 / self.sample_rate as f64
    }
}

pub trait CaptureDevice: Send {
    /// Open a stream. Opening an already open device reopens it.
    fn open(&mut self, params: &StreamParams) -> Result<(), DeviceError>;

    /// Block until `frames` sample periods are available and return them.
    fn read(&mut self, frames: usize) -> Result<Vec<u8>, DeviceError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn name(&self) -> &str {
        "capture device"
    }
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for Box<D> {
    fn open(&mut self, params: &StreamParams) -> Result<(), DeviceError> {
        (**self).open(params)
    }

    fn read(&mut self, frames: usize) -> Result<Vec<u8>, DeviceError> {
        (**self).read(frames)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

fn check_params(params: &StreamParams) -> Result<(), DeviceError> {
    if params.sample_rate == 0 {
        return Err(DeviceError::Unsupported("sample rate must be positive".into()));
    }
    if params.channels == 0 {
        return Err(DeviceError::Unsupported("at least one channel is required".into()));
    }
    Ok(())
}

/// Synthetic sine source, identical on every channel.
pub struct ToneDevice {
    frequency: f64,
    level: f64,
    phase: f64,
    params: Option<StreamParams>,
}

impl ToneDevice {
    /// `level` is the amplitude as a fraction of the format's peak.
    pub fn new(frequency: f64, level: f64) -> Self {
        Self {
            frequency,
            level: level.clamp(0.0, 1.0),
            phase: 0.0,
            params: None,
        }
    }
}

impl CaptureDevice for ToneDevice {
    fn open(&mut self, params: &StreamParams) -> Result<(), DeviceError> {
        check_params(params)?;
        self.phase = 0.0;
        self.params = Some(*params);
        log::info!(
            "Tone source: {:.1}Hz at {:.0}% of full scale, {}Hz {:?}",
            self.frequency,
            self.level * 100.0,
            params.sample_rate,
            params.format
        );
        Ok(())
    }

    fn read(&mut self, frames: usize) -> Result<Vec<u8>, DeviceError> {
        let params = self.params.ok_or(DeviceError::NotOpen)?;
        let amplitude = self.level * params.format.peak();
        let step = TAU * self.frequency / params.sample_rate as f64;

        let mut out = Vec::with_capacity(frames * params.channels as usize * params.format.bytes());
        for _ in 0..frames {
            let value = amplitude * self.phase.sin();
            for _ in 0..params.channels {
                params.format.encode_into(value, &mut out);
            }
            self.phase = (self.phase + step) % TAU;
        }
        Ok(out)
    }

    fn close(&mut self) {
        self.params = None;
    }

    fn is_open(&self) -> bool {
        self.params.is_some()
    }

    fn name(&self) -> &str {
        "tone"
    }
}

/// Replays a decoded audio file as a looping capture source.
pub struct FileDevice {
    path: PathBuf,
    label: String,
    audio: Option<AudioData>,
    params: Option<StreamParams>,
    position: usize,
}

impl FileDevice {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            label: path.display().to_string(),
            path,
            audio: None,
            params: None,
            position: 0,
        }
    }
}

impl CaptureDevice for FileDevice {
    fn open(&mut self, params: &StreamParams) -> Result<(), DeviceError> {
        check_params(params)?;
        if self.audio.is_none() {
            let audio = decode_audio(&self.path).map_err(|e| DeviceError::Decode(format!("{:#}", e)))?;
            if audio.frames() == 0 {
                return Err(DeviceError::Open(format!("{} contains no audio", self.label)));
            }
            self.audio = Some(audio);
        }
        if let Some(audio) = &self.audio {
            if audio.sample_rate != params.sample_rate {
                log::warn!(
                    "{} is {}Hz but the stream runs at {}Hz; playback pitch will shift",
                    self.label,
                    audio.sample_rate,
                    params.sample_rate
                );
            }
        }
        self.position = 0;
        self.params = Some(*params);
        Ok(())
    }

    fn read(&mut self, frames: usize) -> Result<Vec<u8>, DeviceError> {
        let params = self.params.ok_or(DeviceError::NotOpen)?;
        let audio = self.audio.as_ref().ok_or(DeviceError::NotOpen)?;
        let source_channels = audio.channels as usize;
        let total = audio.frames();
        let peak = params.format.peak();

        let mut out = Vec::with_capacity(frames * params.channels as usize * params.format.bytes());
        for _ in 0..frames {
            let period = &audio.samples[self.position * source_channels..][..source_channels];
            for ch in 0..params.channels as usize {
                let value = period[ch % source_channels] as f64 * peak;
                params.format.encode_into(value, &mut out);
            }
            self.position += 1;
            if self.position == total {
                log::debug!("{} reached end of file, looping", self.label);
                self.position = 0;
            }
        }
        Ok(out)
    }

    fn close(&mut self) {
        self.params = None;
    }

    fn is_open(&self) -> bool {
        self.params.is_some()
    }

    fn name(&self) -> &str {
        &self.label
    }
}
