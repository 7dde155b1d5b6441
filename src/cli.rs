use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sonometer", about = "Live audio level meter and spectrum analyser")]
pub struct Cli {
    /// Audio file replayed as the capture source (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Capture a synthetic sine at this frequency (Hz) instead of a file
    #[arg(long)]
    pub tone: Option<f64>,

    /// Level of the synthetic sine as a fraction of full scale
    #[arg(long, default_value_t = 0.5)]
    pub tone_level: f64,

    /// Capture from the default system input (requires the `live` feature)
    #[arg(long)]
    pub live: bool,

    /// Sample rate in Hz
    #[arg(short, long, default_value_t = 44_100)]
    pub rate: u32,

    /// Number of interleaved channels
    #[arg(long, default_value_t = 1)]
    pub channels: u16,

    /// Sample format: int8, int16, int32 or float32
    #[arg(long, default_value = "int16")]
    pub format: String,

    /// Samples per channel in one device read
    #[arg(long, default_value_t = 1024)]
    pub frame: usize,

    /// Rolling level window in seconds
    #[arg(long, default_value_t = 0.25)]
    pub sample_window: f64,

    /// FFT window function ("none" to disable)
    #[arg(short, long, default_value = "Blackman-Harris")]
    pub window: String,

    /// Filter type: none, low-pass, high-pass, band-pass, band-stop
    #[arg(long, default_value = "none")]
    pub filter: String,

    /// Filter low cut-off in Hz
    #[arg(long, default_value_t = 1.0)]
    pub low: f64,

    /// Filter high cut-off in Hz
    #[arg(long, default_value_t = 2.0)]
    pub high: f64,

    /// Filter order
    #[arg(long, default_value_t = 3)]
    pub order: u32,

    /// Seconds covered by one spectrum view element
    #[arg(long, default_value_t = 2.0)]
    pub view_duration: f64,

    /// Display refresh period in milliseconds
    #[arg(long, default_value_t = 100)]
    pub update_ms: u64,

    /// Number of bands in the printed spectrum
    #[arg(long, default_value_t = 32)]
    pub bands: usize,

    /// Stop after this many seconds instead of running until interrupted
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Config file (defaults to ./sonometer.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// List available window functions and exit
    #[arg(long)]
    pub list_windows: bool,
}
