use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::audio::device::StreamParams;
use crate::audio::filter::{FilterKind, FilterSpec};
use crate::audio::frame::SampleFormat;
use crate::audio::window::WindowKind;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub meter: LevelConfig,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_rate")]
    pub rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default)]
    pub format: SampleFormat,
    #[serde(default = "default_frame_samples")]
    pub frame_samples: usize,
}

#[derive(Debug, Deserialize)]
pub struct LevelConfig {
    /// Rolling amplitude window in seconds.
    #[serde(default = "default_sample_window")]
    pub sample_window: f64,
    /// Consumer refresh period in milliseconds.
    #[serde(default = "default_update_ms")]
    pub update_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct SpectrumConfig {
    #[serde(default = "default_fft_unit")]
    pub fft_unit: f64,
    #[serde(default = "default_overlap_ratio")]
    pub overlap_ratio: f64,
    #[serde(default = "default_window")]
    pub window: String,
    #[serde(default = "default_view_duration")]
    pub view_duration: f64,
    #[serde(default = "default_min_retained_frames")]
    pub min_retained_frames: usize,
}

#[derive(Debug, Deserialize)]
pub struct FilterConfig {
    #[serde(default, rename = "type")]
    pub kind: FilterKind,
    #[serde(default = "default_filter_low")]
    pub low: f64,
    #[serde(default = "default_filter_high")]
    pub high: f64,
    #[serde(default = "default_filter_order")]
    pub order: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            channels: default_channels(),
            format: SampleFormat::default(),
            frame_samples: default_frame_samples(),
        }
    }
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            sample_window: default_sample_window(),
            update_ms: default_update_ms(),
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_unit: default_fft_unit(),
            overlap_ratio: default_overlap_ratio(),
            window: default_window(),
            view_duration: default_view_duration(),
            min_retained_frames: default_min_retained_frames(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::None,
            low: default_filter_low(),
            high: default_filter_high(),
            order: default_filter_order(),
        }
    }
}

pub fn default_rate() -> u32 { 44_100 }
pub fn default_channels() -> u16 { 1 }
pub fn default_frame_samples() -> usize { 1024 }
pub fn default_sample_window() -> f64 { 0.25 }
pub fn default_update_ms() -> u64 { 100 }
pub fn default_fft_unit() -> f64 { 2.0 }
pub fn default_overlap_ratio() -> f64 { 0.66 }
pub fn default_window() -> String { WindowKind::default().name().into() }
pub fn default_view_duration() -> f64 { 2.0 }
pub fn default_min_retained_frames() -> usize { 1 }
pub fn default_filter_low() -> f64 { 1.0 }
pub fn default_filter_high() -> f64 { 2.0 }
pub fn default_filter_order() -> u32 { 3 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Cannot read config {}: {}", path.display(), e);
            return None;
        }
    };
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Ignoring malformed config {}: {}", path.display(), e);
            None
        }
    }
}

/// Everything a [`crate::Meter`] needs at construction.
#[derive(Debug, Clone)]
pub struct MeterSettings {
    pub stream: StreamParams,
    pub sample_window: f64,
    pub fft_unit: f64,
    pub overlap_ratio: f64,
    pub window: Option<WindowKind>,
    pub view_duration: f64,
    pub min_retained_frames: usize,
    pub filter: FilterSpec,
    /// How long `stop` waits for the capture thread.
    pub stop_timeout: Duration,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            stream: StreamParams {
                format: SampleFormat::default(),
                channels: default_channels(),
                sample_rate: default_rate(),
                frame_samples: default_frame_samples(),
            },
            sample_window: default_sample_window(),
            fft_unit: default_fft_unit(),
            overlap_ratio: default_overlap_ratio(),
            window: Some(WindowKind::default()),
            view_duration: default_view_duration(),
            min_retained_frames: default_min_retained_frames(),
            filter: FilterSpec::default(),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for MeterSettings {
    fn from(config: &Config) -> Self {
        Self {
            stream: StreamParams {
                format: config.audio.format,
                channels: config.audio.channels.max(1),
                sample_rate: config.audio.rate,
                frame_samples: config.audio.frame_samples.max(1),
            },
            sample_window: config.meter.sample_window,
            fft_unit: config.spectrum.fft_unit,
            overlap_ratio: config.spectrum.overlap_ratio,
            window: WindowKind::from_name(&config.spectrum.window),
            view_duration: config.spectrum.view_duration,
            min_retained_frames: config.spectrum.min_retained_frames.max(1),
            filter: FilterSpec {
                kind: config.filter.kind,
                low_hz: config.filter.low,
                high_hz: config.filter.high,
                order: config.filter.order,
            },
            ..Self::default()
        }
    }
}
