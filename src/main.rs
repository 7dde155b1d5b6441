mod cli;

use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use cli::Cli;
use sonometer::config::{self, Config};
use sonometer::{
    CaptureDevice, FileDevice, FilterKind, FilterSpec, Meter, MeterSettings, Notification,
    SampleFormat, Spectrum, StreamParams, ToneDevice, WindowKind, DB_FLOOR,
};

const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    if cli.list_windows {
        println!("Available window functions:");
        for kind in WindowKind::ALL {
            let marker = if kind == WindowKind::default() { " (default)" } else { "" };
            println!("  {}{}", kind, marker);
        }
        println!("  None");
        return Ok(());
    }

    // Load config: explicit --config path, or auto-detect sonometer.toml / user config
    let config_path = cli.config.clone().or_else(|| {
        let local = std::path::PathBuf::from("sonometer.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("sonometer").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });
    let mut cfg = Config::default();
    if let Some(ref path) = config_path {
        if let Some(loaded) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        }
    }
    merge_config(&mut cli, &cfg);

    let settings = build_settings(&cli, &cfg)?;
    let device = open_source(&cli)?;

    log::info!("sonometer - live level and spectrum meter");
    log::info!(
        "Stream: {}Hz, {} channel(s), {:?}, {} samples per frame",
        settings.stream.sample_rate,
        settings.stream.channels,
        settings.stream.format,
        settings.stream.frame_samples
    );
    match settings.window {
        Some(window) => log::info!("Window: {} ({:.0}% overlap)", window, settings.overlap_ratio * 100.0),
        None => log::info!("Window: none"),
    }
    if settings.filter.kind != FilterKind::None {
        log::info!(
            "Filter: {} {:.1}-{:.1}Hz order {}",
            settings.filter.kind.name(),
            settings.filter.low_hz,
            settings.filter.high_hz,
            settings.filter.order
        );
    }

    let (notify_tx, notify_rx) = mpsc::channel::<Notification>();
    let mut meter = Meter::new(device, settings, Box::new(notify_tx));
    meter.start().context("Failed to start capture")?;

    let pb = ProgressBar::new((-DB_FLOOR) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:>8} {bar:50.green/white} {msg}")?
            .progress_chars("█▉ "),
    );
    pb.set_prefix("level");

    let started = Instant::now();
    let tick = Duration::from_millis(cli.update_ms.max(1));
    let limit = cli
        .duration
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64);

    while limit.map_or(true, |limit| started.elapsed() < limit) {
        std::thread::sleep(tick);

        let db = meter.current_db();
        pb.set_position((db - DB_FLOOR).clamp(0.0, -DB_FLOOR) as u64);
        pb.set_message(format!("{:6.1} dB", db));

        if let Some(spectrum) = meter.fft_data() {
            pb.println(describe_spectrum(&spectrum, cli.bands));
        }

        while let Ok(notification) = notify_rx.try_recv() {
            match notification {
                Notification::FilterUnstable { message } => pb.println(format!("warning: {}", message)),
            }
        }

        if !meter.is_running() {
            log::warn!("Capture stopped unexpectedly");
            break;
        }
    }

    meter.stop();
    pb.finish_with_message("stopped");
    log::info!("Done after {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}

/// Config values apply only where the CLI is still at its default.
fn merge_config(cli: &mut Cli, cfg: &Config) {
    if cli.rate == config::default_rate() { cli.rate = cfg.audio.rate; }
    if cli.channels == config::default_channels() { cli.channels = cfg.audio.channels; }
    if cli.format == "int16" {
        cli.format = format!("{:?}", cfg.audio.format).to_lowercase();
    }
    if cli.frame == config::default_frame_samples() { cli.frame = cfg.audio.frame_samples; }
    if cli.sample_window == config::default_sample_window() {
        cli.sample_window = cfg.meter.sample_window;
    }
    if cli.update_ms == config::default_update_ms() { cli.update_ms = cfg.meter.update_ms; }
    if cli.window == config::default_window() { cli.window = cfg.spectrum.window.clone(); }
    if cli.view_duration == config::default_view_duration() {
        cli.view_duration = cfg.spectrum.view_duration;
    }
    if cli.filter == "none" { cli.filter = cfg.filter.kind.name().to_string(); }
    if cli.low == config::default_filter_low() { cli.low = cfg.filter.low; }
    if cli.high == config::default_filter_high() { cli.high = cfg.filter.high; }
    if cli.order == config::default_filter_order() { cli.order = cfg.filter.order; }
}

fn build_settings(cli: &Cli, cfg: &Config) -> Result<MeterSettings> {
    let format = SampleFormat::from_name(&cli.format)
        .with_context(|| format!("Unknown sample format: {}", cli.format))?;
    let kind = FilterKind::from_name(&cli.filter)
        .with_context(|| format!("Unknown filter type: {}", cli.filter))?;
    if cli.rate == 0 {
        anyhow::bail!("Sample rate must be positive");
    }

    Ok(MeterSettings {
        stream: StreamParams {
            format,
            channels: cli.channels.max(1),
            sample_rate: cli.rate,
            frame_samples: cli.frame.max(1),
        },
        sample_window: cli.sample_window,
        window: WindowKind::from_name(&cli.window),
        view_duration: cli.view_duration,
        filter: FilterSpec {
            kind,
            low_hz: cli.low,
            high_hz: cli.high,
            order: cli.order,
        },
        ..MeterSettings::from(cfg)
    })
}

fn open_source(cli: &Cli) -> Result<Box<dyn CaptureDevice>> {
    if cli.live {
        #[cfg(feature = "live")]
        {
            return Ok(Box::new(sonometer::LiveDevice::new()));
        }
        #[cfg(not(feature = "live"))]
        anyhow::bail!(
            "Live capture requires the 'live' feature. \
             Rebuild with: cargo build --features live"
        );
    }
    if let Some(freq) = cli.tone {
        return Ok(Box::new(ToneDevice::new(freq, cli.tone_level)));
    }
    let input = cli
        .input
        .as_ref()
        .context("An input audio file, --tone or --live is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    log::info!("Input: {}", input.display());
    Ok(Box::new(FileDevice::new(input)))
}

fn describe_spectrum(spectrum: &Spectrum, bands: usize) -> String {
    let levels = spectrum.rebin(bands.max(1));
    let max = levels.iter().copied().fold(0.0f64, f64::max);
    let bars: String = levels
        .iter()
        .map(|&v| {
            let idx = if max > 0.0 { (v / max * 8.0).round() as usize } else { 0 };
            LEVELS[idx.min(8)]
        })
        .collect();
    match spectrum.peak_frequency() {
        Some(peak) => format!(
            "spectrum |{}| peak {:>8.1} Hz ({} transforms)",
            bars, peak, spectrum.transforms
        ),
        None => format!("spectrum |{}| ({} transforms)", bars, spectrum.transforms),
    }
}
