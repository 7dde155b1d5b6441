use std::borrow::Cow;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner, Length};

use super::filter::{FilterCoefficients, FilterSpec};
use super::window::WindowKind;

/// Summed one-sided magnitude spectra drained from a [`SpectrumAccumulator`].
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub magnitudes: Vec<f64>,
    pub frequencies: Arc<[f64]>,
    pub transforms: usize,
}

impl Spectrum {
    /// Per-bin average over the summed transforms.
    pub fn mean(&self) -> Vec<f64> {
        let n = self.transforms.max(1) as f64;
        self.magnitudes.iter().map(|m| m / n).collect()
    }

    /// Frequency of the strongest non-DC bin.
    pub fn peak_frequency(&self) -> Option<f64> {
        let (bin, _) = self
            .magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        self.frequencies.get(bin).copied()
    }

    /// Fold the spectrum into `bands` equal-width bands from 0 Hz to Nyquist.
    ///
    /// The DC bin is dropped and the remaining one-sided magnitudes are
    /// doubled before summing, so each band holds the energy of both halves
    /// of the full transform.
    pub fn rebin(&self, bands: usize) -> Vec<f64> {
        let mut out = vec![0.0; bands];
        let nyquist = match self.frequencies.last() {
            Some(&f) if f > 0.0 && bands > 0 => f,
            _ => return out,
        };
        let width = nyquist / bands as f64;

        for (&freq, &mag) in self.frequencies.iter().zip(&self.magnitudes).skip(1) {
            let band = ((freq / width) as usize).min(bands - 1);
            out[band] += 2.0 * mag;
        }
        out
    }
}

/// What one call to [`SpectrumAccumulator::process`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Frames transformed and added to the running sum.
    pub transforms: usize,
    /// Frames skipped because filtering produced non-finite samples.
    pub rejected: usize,
}

/// Growing mono sample stream cut into overlapping, windowed and filtered
/// frames whose magnitude spectra are summed until drained.
///
/// Positions are absolute sample indices since the last reset; `origin` is
/// the absolute index of the first sample still held in `stream`.
pub struct SpectrumAccumulator {
    stream: Vec<f64>,
    origin: usize,
    cursor: usize,

    sample_rate: f64,
    frame_len: usize,
    overlap_ratio: f64,
    min_retained_frames: usize,
    batch_duration: f64,

    window: Option<WindowKind>,
    kernel: Option<Vec<f64>>,
    filter_spec: FilterSpec,
    filter: FilterCoefficients,

    sum: Option<Vec<f64>>,
    transforms: usize,
    eager_since_drain: bool,

    fft: Option<Arc<dyn Fft<f64>>>,
    frequencies: Option<(usize, f64, Arc<[f64]>)>,
}

impl SpectrumAccumulator {
    pub const DEFAULT_OVERLAP_RATIO: f64 = 0.66;
    pub const DEFAULT_BATCH_DURATION: f64 = 4.0;

    pub fn new(sample_rate: f64, frame_len: usize) -> Self {
        let mut acc = Self {
            stream: Vec::new(),
            origin: 0,
            cursor: 0,
            sample_rate,
            frame_len: frame_len.max(1),
            overlap_ratio: Self::DEFAULT_OVERLAP_RATIO,
            min_retained_frames: 1,
            batch_duration: Self::DEFAULT_BATCH_DURATION,
            window: None,
            kernel: None,
            filter_spec: FilterSpec::default(),
            filter: FilterCoefficients::Passthrough,
            sum: None,
            transforms: 0,
            eager_since_drain: false,
            fft: None,
            frequencies: None,
        };
        acc.reset();
        acc
    }

    /// FFT frame length for `unit_secs` of audio at `sample_rate`.
    pub fn frame_len_for(unit_secs: f64, sample_rate: f64) -> usize {
        let len = (unit_secs * sample_rate).round();
        if len.is_finite() && len >= 1.0 {
            len as usize
        } else {
            1
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn window(&self) -> Option<WindowKind> {
        self.window
    }

    pub fn filter_spec(&self) -> &FilterSpec {
        &self.filter_spec
    }

    pub fn filter(&self) -> &FilterCoefficients {
        &self.filter
    }

    pub fn batch_duration(&self) -> f64 {
        self.batch_duration
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Absolute index one past the last appended sample.
    pub fn write_pos(&self) -> usize {
        self.origin + self.stream.len()
    }

    /// Whole FFT frames currently held in the stream buffer.
    pub fn frames_in_stream(&self) -> usize {
        self.stream.len() / self.frame_len
    }

    /// Samples of lead-in each windowed frame shares with the previous one.
    pub fn overlap_len(&self) -> usize {
        if self.window.is_none() {
            return 0;
        }
        let overlap = (self.overlap_ratio * self.frame_len as f64).round() as usize;
        overlap.min(self.frame_len - 1)
    }

    /// Samples the cursor moves per transformed frame in steady state.
    pub fn advance_len(&self) -> usize {
        self.frame_len - self.overlap_len()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.frequencies = None;
        self.filter = FilterCoefficients::design(&self.filter_spec, sample_rate);
    }

    /// Change the FFT frame length. Buffered samples and partial sums are
    /// discarded since they were cut for the old length.
    pub fn set_frame_len(&mut self, frame_len: usize) {
        let frame_len = frame_len.max(1);
        if frame_len == self.frame_len {
            return;
        }
        self.frame_len = frame_len;
        self.fft = None;
        self.frequencies = None;
        self.rebuild_kernel();
        self.clear_sum();
        self.reset();
    }

    pub fn set_overlap_ratio(&mut self, ratio: f64) {
        self.overlap_ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
    }

    /// History kept behind the overlap lead-in, in frames. At least one, so
    /// a later increase of the overlap still finds its samples.
    pub fn set_min_retained_frames(&mut self, frames: usize) {
        self.min_retained_frames = frames.max(1);
    }

    pub fn set_batch_duration(&mut self, secs: f64) {
        self.batch_duration = secs;
    }

    pub fn set_window(&mut self, window: Option<WindowKind>) {
        if window != self.window {
            self.window = window;
            self.rebuild_kernel();
        }
    }

    /// Redesign the filter, but only when the spec actually changed.
    pub fn set_filter(&mut self, spec: FilterSpec) {
        if spec != self.filter_spec {
            self.filter = FilterCoefficients::design(&spec, self.sample_rate);
            self.filter_spec = spec;
        }
    }

    fn rebuild_kernel(&mut self) {
        self.kernel = self.window.map(|w| w.coefficients(self.frame_len));
    }

    /// Empty the stream and re-prime it with `min_retained_frames` frames of
    /// silence so the first windowed frame has a full lead-in.
    pub fn reset(&mut self) {
        let primed = self.min_retained_frames * self.frame_len;
        self.stream.clear();
        self.stream.resize(primed, 0.0);
        self.origin = 0;
        self.cursor = primed;
        self.eager_since_drain = false;
    }

    pub fn clear_sum(&mut self) {
        self.sum = None;
        self.transforms = 0;
    }

    /// Append mono samples. Once more than the batch duration is waiting
    /// behind the cursor the backlog is processed right away.
    pub fn append(&mut self, samples: &[f64]) -> Option<ProcessReport> {
        self.stream.extend_from_slice(samples);

        let pending = self.write_pos().saturating_sub(self.cursor) as f64 / self.sample_rate;
        if pending > self.batch_duration {
            self.eager_since_drain = true;
            Some(self.process())
        } else {
            None
        }
    }

    /// Transform every complete frame after the cursor, then compact.
    pub fn process(&mut self) -> ProcessReport {
        let frame_len = self.frame_len;
        let overlap = self.overlap_len();
        let mut report = ProcessReport::default();

        loop {
            let start = self.cursor.saturating_sub(overlap);
            if start < self.origin || start + frame_len > self.write_pos() {
                break;
            }

            let buffer = {
                let offset = start - self.origin;
                let frame = &self.stream[offset..offset + frame_len];
                let windowed: Cow<[f64]> = match &self.kernel {
                    Some(kernel) => frame.iter().zip(kernel).map(|(s, w)| s * w).collect(),
                    None => Cow::Borrowed(frame),
                };
                let filtered = self.filter.apply(&windowed);
                if filtered.iter().all(|v| v.is_finite()) {
                    Some(
                        filtered
                            .iter()
                            .map(|&s| Complex::new(s, 0.0))
                            .collect::<Vec<_>>(),
                    )
                } else {
                    None
                }
            };
            self.cursor = start + frame_len;

            let Some(mut buffer) = buffer else {
                log::debug!("Skipping FFT frame at {}: filter output not finite", start);
                report.rejected += 1;
                continue;
            };

            self.plan().process(&mut buffer);
            let bins = frame_len / 2 + 1;
            match self.sum.as_mut() {
                Some(sum) => {
                    for (acc, c) in sum.iter_mut().zip(&buffer[..bins]) {
                        *acc += c.norm();
                    }
                }
                None => self.sum = Some(buffer[..bins].iter().map(|c| c.norm()).collect()),
            }
            self.transforms += 1;
            report.transforms += 1;
        }

        if report.transforms == 0 && report.rejected == 0 {
            log::debug!(
                "Not enough sample data ({} buffered) to perform FFT yet",
                self.stream.len()
            );
        }
        self.compact();
        report
    }

    /// Drop history older than `min_retained_frames` frames before the
    /// cursor, in whole-frame steps so the overlap lead-in survives.
    fn compact(&mut self) {
        let keep_from = self
            .cursor
            .saturating_sub(self.overlap_len())
            .saturating_sub(self.min_retained_frames * self.frame_len);
        let droppable = keep_from.saturating_sub(self.origin);
        if droppable >= self.frame_len {
            self.stream.drain(..droppable);
            self.origin += droppable;
        }
    }

    /// Hand back the summed spectrum and start a new sum. Pending samples
    /// are processed first unless an eager pass already ran since the last
    /// drain.
    pub fn drain(&mut self) -> (Option<Spectrum>, ProcessReport) {
        let report = if self.eager_since_drain {
            ProcessReport::default()
        } else {
            self.process()
        };
        self.eager_since_drain = false;

        let spectrum = self.sum.take().map(|magnitudes| Spectrum {
            magnitudes,
            frequencies: self.frequencies(),
            transforms: self.transforms,
        });
        self.transforms = 0;
        (spectrum, report)
    }

    /// Bin centre frequencies `k * rate / F` for `k` in `0..=F/2`.
    pub fn frequencies(&mut self) -> Arc<[f64]> {
        match &self.frequencies {
            Some((len, rate, table)) if *len == self.frame_len && *rate == self.sample_rate => {
                table.clone()
            }
            _ => {
                let step = self.sample_rate / self.frame_len as f64;
                let table: Arc<[f64]> = (0..=self.frame_len / 2).map(|k| k as f64 * step).collect();
                self.frequencies = Some((self.frame_len, self.sample_rate, table.clone()));
                table
            }
        }
    }

    fn plan(&mut self) -> Arc<dyn Fft<f64>> {
        match &self.fft {
            Some(fft) if fft.len() == self.frame_len => fft.clone(),
            _ => {
                let fft = FftPlanner::<f64>::new().plan_fft_forward(self.frame_len);
                self.fft = Some(fft.clone());
                fft
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::filter::FilterKind;
    use std::f64::consts::PI;

    fn sine(freq: f64, rate: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / rate).sin()).collect()
    }

    #[test]
    fn hann_overlap_on_short_frames() {
        let mut acc = SpectrumAccumulator::new(44_100.0, 1024);
        acc.set_window(WindowKind::from_name("Hann"));
        acc.set_overlap_ratio(0.66);
        assert_eq!(acc.overlap_len(), 676);
        assert_eq!(acc.advance_len(), 348);

        acc.set_window(None);
        assert_eq!(acc.overlap_len(), 0);
        assert_eq!(acc.advance_len(), 1024);
    }

    #[test]
    fn sine_peak_lands_in_its_bin() {
        let rate = 8_000.0;
        let mut acc = SpectrumAccumulator::new(rate, 1024);
        acc.append(&sine(1_000.0, rate, 4 * 1024));

        let (spectrum, report) = acc.drain();
        let spectrum = spectrum.expect("spectrum");
        assert_eq!(report.transforms, 4);
        assert_eq!(spectrum.transforms, 4);
        assert_eq!(spectrum.magnitudes.len(), 513);

        let resolution = rate / 1024.0;
        let peak = spectrum.peak_frequency().expect("peak");
        assert!((peak - 1_000.0).abs() <= resolution, "peak at {}", peak);
    }

    #[test]
    fn cursor_never_passes_written_samples() {
        let mut acc = SpectrumAccumulator::new(1_000.0, 64);
        acc.set_window(Some(WindowKind::Hann));
        acc.set_batch_duration(0.05);

        let chunk = sine(50.0, 1_000.0, 37);
        for _ in 0..100 {
            acc.append(&chunk);
            assert!(acc.cursor() <= acc.write_pos());
            assert!(acc.cursor() >= acc.origin + acc.overlap_len());
        }
        acc.process();
        assert!(acc.cursor() <= acc.write_pos());
        assert!(acc.write_pos() - acc.cursor() < acc.advance_len());
    }

    #[test]
    fn compaction_keeps_overlap_lead_in() {
        let mut acc = SpectrumAccumulator::new(1_000.0, 100);
        acc.set_window(Some(WindowKind::Hann));
        acc.set_overlap_ratio(0.5);
        acc.append(&sine(10.0, 1_000.0, 2_000));
        acc.process();

        let lead_in = acc.cursor() - acc.overlap_len();
        assert!(acc.origin <= lead_in - acc.frame_len());
        // whole frames are dropped once a frame of slack builds up
        assert!(acc.origin > 0);
        assert_eq!(acc.write_pos(), 2_100);
        assert_eq!(acc.frames_in_stream(), 1);
    }

    #[test]
    fn window_enabled_mid_stream_keeps_transforming() {
        let rate = 1_000.0;
        let mut acc = SpectrumAccumulator::new(rate, 100);
        acc.set_min_retained_frames(0);
        acc.set_batch_duration(60.0);
        acc.append(&sine(10.0, rate, 300));
        assert_eq!(acc.process().transforms, 3);

        acc.set_window(Some(WindowKind::Hann));
        acc.set_overlap_ratio(0.9);
        let mut transforms = 0;
        for _ in 0..50 {
            acc.append(&sine(10.0, rate, 100));
            transforms += acc.process().transforms;
        }
        assert!(transforms >= 40, "only {} transforms after enabling the window", transforms);
        assert!(acc.frames_in_stream() <= 4);
    }

    #[test]
    fn drain_without_new_frames_is_empty() {
        let mut acc = SpectrumAccumulator::new(8_000.0, 256);
        assert!(acc.drain().0.is_none());

        acc.append(&sine(500.0, 8_000.0, 300));
        assert!(acc.drain().0.is_some());
        assert!(acc.drain().0.is_none());
    }

    #[test]
    fn frequency_table_follows_rate() {
        let mut acc = SpectrumAccumulator::new(8_000.0, 8);
        let table = acc.frequencies();
        assert_eq!(&table[..], &[0.0, 1_000.0, 2_000.0, 3_000.0, 4_000.0]);
        assert!(Arc::ptr_eq(&table, &acc.frequencies()));

        acc.set_sample_rate(16_000.0);
        let table = acc.frequencies();
        assert_eq!(table[4], 8_000.0);
    }

    #[test]
    fn eager_pass_skips_drain_processing() {
        let rate = 1_000.0;
        let mut acc = SpectrumAccumulator::new(rate, 100);
        acc.set_batch_duration(0.5);

        assert!(acc.append(&sine(50.0, rate, 400)).is_none());
        let report = acc.append(&sine(50.0, rate, 200)).expect("eager pass");
        assert_eq!(report.transforms, 6);

        // the leftover tail is not processed by this drain
        acc.append(&sine(50.0, rate, 100));
        let (spectrum, report) = acc.drain();
        assert_eq!(report, ProcessReport::default());
        assert_eq!(spectrum.map(|s| s.transforms), Some(6));

        // the next drain catches up
        let (spectrum, report) = acc.drain();
        assert_eq!(report.transforms, 1);
        assert_eq!(spectrum.map(|s| s.transforms), Some(1));
    }

    #[test]
    fn unstable_filter_output_is_rejected() {
        let rate = 1_000.0;
        let mut acc = SpectrumAccumulator::new(rate, 50);
        acc.set_filter(FilterSpec {
            kind: FilterKind::LowPass,
            high_hz: 100.0,
            ..FilterSpec::default()
        });
        let mut samples = sine(10.0, rate, 100);
        samples[70] = f64::NAN;
        acc.append(&samples);

        let report = acc.process();
        assert_eq!(report.transforms, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(acc.cursor(), acc.write_pos());
    }

    #[test]
    fn rebin_sums_doubled_bins() {
        let spectrum = Spectrum {
            magnitudes: vec![100.0, 1.0, 2.0, 3.0, 4.0],
            frequencies: vec![0.0, 1_000.0, 2_000.0, 3_000.0, 4_000.0].into(),
            transforms: 2,
        };
        assert_eq!(spectrum.rebin(2), vec![2.0, 18.0]);
        assert_eq!(spectrum.rebin(0), Vec::<f64>::new());
        assert_eq!(spectrum.mean(), vec![50.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(spectrum.peak_frequency(), Some(4_000.0));
    }
}
