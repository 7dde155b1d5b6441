//! Butterworth filtering applied to frames ahead of the spectrum FFT.
//!
//! Designs follow the usual analog-prototype route: Butterworth poles, a
//! frequency transform (low/high/band-pass/band-stop) on pre-warped cutoffs,
//! then the bilinear transform. High-pass designs are kept as second-order
//! sections and run once; the others keep a transfer function and run
//! forward-backward for zero phase.

use std::borrow::Cow;
use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    #[default]
    None,
    LowPass,
    HighPass,
    BandPass,
    BandStop,
}

impl FilterKind {
    /// Resolve names like "Low pass", "high-pass" or "bandstop".
    pub fn from_name(name: &str) -> Option<FilterKind> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "" | "none" => Some(FilterKind::None),
            "lowpass" | "lp" => Some(FilterKind::LowPass),
            "highpass" | "hp" => Some(FilterKind::HighPass),
            "bandpass" | "bp" => Some(FilterKind::BandPass),
            "bandstop" | "bs" | "notch" => Some(FilterKind::BandStop),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::None => "None",
            FilterKind::LowPass => "Low pass",
            FilterKind::HighPass => "High pass",
            FilterKind::BandPass => "Band pass",
            FilterKind::BandStop => "Band stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub low_hz: f64,
    pub high_hz: f64,
    pub order: u32,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            kind: FilterKind::None,
            low_hz: 1.0,
            high_hz: 2.0,
            order: 3,
        }
    }
}

impl FilterSpec {
    /// Whether the cutoffs make sense for this filter type at `sample_rate`.
    pub fn is_valid(&self, sample_rate: f64) -> bool {
        let nyquist = sample_rate / 2.0;
        let (low, high) = (self.low_hz, self.high_hz);
        if self.order == 0 || !low.is_finite() || !high.is_finite() {
            return false;
        }
        match self.kind {
            FilterKind::None => false,
            FilterKind::LowPass => high > 0.0 && high < nyquist,
            FilterKind::HighPass => low > 0.0 && low < nyquist,
            FilterKind::BandPass | FilterKind::BandStop => {
                low >= 0.0 && low < high && high <= nyquist
            }
        }
    }
}

/// One second-order section, `a[0]` normalised to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterCoefficients {
    #[default]
    Passthrough,
    /// Second-order sections applied once, front to back.
    Cascade(Vec<Biquad>),
    /// Transfer function applied forward then backward.
    ZeroPhase { b: Vec<f64>, a: Vec<f64> },
}

impl FilterCoefficients {
    /// Build coefficients for `spec`. Invalid cutoffs give `Passthrough`.
    pub fn design(spec: &FilterSpec, sample_rate: f64) -> Self {
        if spec.kind == FilterKind::None {
            return FilterCoefficients::Passthrough;
        }
        if !spec.is_valid(sample_rate) {
            log::debug!(
                "{} filter {}..{} Hz is outside 0..{} Hz, filtering disabled",
                spec.kind.name(),
                spec.low_hz,
                spec.high_hz,
                sample_rate / 2.0
            );
            return FilterCoefficients::Passthrough;
        }

        let order = spec.order as usize;
        let proto = butterworth_prototype(order);
        let fs = sample_rate;

        let analog = match spec.kind {
            FilterKind::LowPass => proto.lowpass(prewarp(spec.high_hz, fs)),
            FilterKind::HighPass => proto.highpass(prewarp(spec.low_hz, fs)),
            FilterKind::BandPass | FilterKind::BandStop => {
                let w1 = prewarp(spec.low_hz, fs);
                let w2 = prewarp(spec.high_hz, fs);
                let wo = (w1 * w2).sqrt();
                let bw = w2 - w1;
                if spec.kind == FilterKind::BandPass {
                    proto.bandpass(wo, bw)
                } else {
                    proto.bandstop(wo, bw)
                }
            }
            FilterKind::None => return FilterCoefficients::Passthrough,
        };
        let digital = analog.bilinear(fs);

        match spec.kind {
            FilterKind::HighPass => FilterCoefficients::Cascade(digital.to_sos()),
            _ => {
                let (b, a) = digital.to_tf();
                FilterCoefficients::ZeroPhase { b, a }
            }
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, FilterCoefficients::Passthrough)
    }

    /// Filter `input`. Passthrough hands the input back untouched.
    pub fn apply<'a>(&self, input: &'a [f64]) -> Cow<'a, [f64]> {
        match self {
            FilterCoefficients::Passthrough => Cow::Borrowed(input),
            FilterCoefficients::Cascade(sections) => Cow::Owned(sosfilt(sections, input)),
            FilterCoefficients::ZeroPhase { b, a } => Cow::Owned(filtfilt(b, a, input)),
        }
    }
}

fn prewarp(hz: f64, fs: f64) -> f64 {
    2.0 * fs * (PI * hz / fs).tan()
}

#[derive(Debug, Clone)]
struct Zpk {
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    gain: f64,
}

fn butterworth_prototype(order: usize) -> Zpk {
    let n = order as f64;
    let poles = (0..order)
        .map(|k| {
            let m = -(n - 1.0) + 2.0 * k as f64;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n))
        })
        .collect();
    Zpk {
        zeros: Vec::new(),
        poles,
        gain: 1.0,
    }
}

fn prod(roots: &[Complex64], f: impl Fn(Complex64) -> Complex64) -> Complex64 {
    roots.iter().fold(Complex64::new(1.0, 0.0), |acc, &r| acc * f(r))
}

impl Zpk {
    fn degree(&self) -> usize {
        self.poles.len() - self.zeros.len()
    }

    fn lowpass(self, wo: f64) -> Zpk {
        let degree = self.degree() as i32;
        Zpk {
            zeros: self.zeros.iter().map(|&z| z * wo).collect(),
            poles: self.poles.iter().map(|&p| p * wo).collect(),
            gain: self.gain * wo.powi(degree),
        }
    }

    fn highpass(self, wo: f64) -> Zpk {
        let degree = self.degree();
        let gain = self.gain * (prod(&self.zeros, |z| -z) / prod(&self.poles, |p| -p)).re;
        let mut zeros: Vec<Complex64> = self.zeros.iter().map(|&z| wo / z).collect();
        zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
        Zpk {
            zeros,
            poles: self.poles.iter().map(|&p| wo / p).collect(),
            gain,
        }
    }

    fn bandpass(self, wo: f64, bw: f64) -> Zpk {
        let degree = self.degree();
        let split = |&r: &Complex64| {
            let scaled = r * (bw / 2.0);
            let root = (scaled * scaled - wo * wo).sqrt();
            [scaled + root, scaled - root]
        };
        let mut zeros: Vec<Complex64> = self.zeros.iter().flat_map(split).collect();
        zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
        Zpk {
            zeros,
            poles: self.poles.iter().flat_map(split).collect(),
            gain: self.gain * bw.powi(degree as i32),
        }
    }

    fn bandstop(self, wo: f64, bw: f64) -> Zpk {
        let degree = self.degree();
        let gain = self.gain * (prod(&self.zeros, |z| -z) / prod(&self.poles, |p| -p)).re;
        let split = |&r: &Complex64| {
            let inv = (bw / 2.0) / r;
            let root = (inv * inv - wo * wo).sqrt();
            [inv + root, inv - root]
        };
        let mut zeros: Vec<Complex64> = self.zeros.iter().flat_map(split).collect();
        for _ in 0..degree {
            zeros.push(Complex64::new(0.0, wo));
            zeros.push(Complex64::new(0.0, -wo));
        }
        Zpk {
            zeros,
            poles: self.poles.iter().flat_map(split).collect(),
            gain,
        }
    }

    fn bilinear(self, fs: f64) -> Zpk {
        let fs2 = Complex64::new(2.0 * fs, 0.0);
        let degree = self.degree();
        let gain = self.gain * (prod(&self.zeros, |z| fs2 - z) / prod(&self.poles, |p| fs2 - p)).re;
        let mut zeros: Vec<Complex64> = self.zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
        zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));
        Zpk {
            zeros,
            poles: self.poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect(),
            gain,
        }
    }

    fn to_tf(&self) -> (Vec<f64>, Vec<f64>) {
        let b = poly(&self.zeros).into_iter().map(|c| c * self.gain).collect();
        let a = poly(&self.poles);
        (b, a)
    }

    fn to_sos(&self) -> Vec<Biquad> {
        let pole_groups = conjugate_groups(&self.poles);
        let mut zero_groups = conjugate_groups(&self.zeros);
        let sections = pole_groups.len().max(zero_groups.len());
        zero_groups.resize(sections, [0.0, 0.0]);

        let mut out: Vec<Biquad> = (0..sections)
            .map(|i| {
                let a = pole_groups.get(i).copied().unwrap_or([0.0, 0.0]);
                let b = zero_groups[i];
                Biquad {
                    b: [1.0, b[0], b[1]],
                    a: [1.0, a[0], a[1]],
                }
            })
            .collect();
        if let Some(first) = out.first_mut() {
            for c in first.b.iter_mut() {
                *c *= self.gain;
            }
        }
        out
    }
}

/// Expand monic polynomial coefficients from roots, highest power first.
fn poly(roots: &[Complex64]) -> Vec<f64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &r in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * r;
        }
        coeffs = next;
    }
    coeffs.into_iter().map(|c| c.re).collect()
}

/// Group roots into real quadratics `[c1, c2]` of `1 + c1 z^-1 + c2 z^-2`.
fn conjugate_groups(roots: &[Complex64]) -> Vec<[f64; 2]> {
    let tol = 1e-10;
    let mut groups = Vec::new();
    let mut reals = Vec::new();

    for r in roots {
        if r.im.abs() <= tol * r.norm().max(1.0) {
            reals.push(r.re);
        } else if r.im > 0.0 {
            groups.push([-2.0 * r.re, r.norm_sqr()]);
        }
    }
    for pair in reals.chunks(2) {
        match pair {
            [x, y] => groups.push([-(x + y), x * y]),
            [x] => groups.push([-x, 0.0]),
            _ => {}
        }
    }
    groups
}

fn sosfilt(sections: &[Biquad], input: &[f64]) -> Vec<f64> {
    let mut out = input.to_vec();
    for s in sections {
        let (mut z1, mut z2) = (0.0, 0.0);
        for x in out.iter_mut() {
            let xin = *x;
            let y = s.b[0] * xin + z1;
            z1 = s.b[1] * xin - s.a[1] * y + z2;
            z2 = s.b[2] * xin - s.a[2] * y;
            *x = y;
        }
    }
    out
}

/// Normalise and pad `b`/`a` to a common length with `a[0] == 1`.
fn normalize(b: &[f64], a: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = b.len().max(a.len());
    let a0 = a.first().copied().unwrap_or(1.0);
    let mut bn: Vec<f64> = b.iter().map(|v| v / a0).collect();
    let mut an: Vec<f64> = a.iter().map(|v| v / a0).collect();
    bn.resize(n, 0.0);
    an.resize(n, 0.0);
    (bn, an)
}

/// Direct form II transposed with an initial state.
fn lfilter(b: &[f64], a: &[f64], input: &[f64], mut state: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    let mut out = Vec::with_capacity(input.len());
    for &x in input {
        let y = b[0] * x + state.first().copied().unwrap_or(0.0);
        for i in 0..n.saturating_sub(1) {
            let next = if i + 1 < n - 1 { state[i + 1] } else { 0.0 };
            state[i] = b[i + 1] * x + next - a[i + 1] * y;
        }
        out.push(y);
    }
    out
}

/// Steady-state filter state for a unit step input.
fn lfilter_zi(b: &[f64], a: &[f64]) -> Vec<f64> {
    let n = b.len();
    if n < 2 {
        return Vec::new();
    }
    let m = n - 1;
    let mut mat = vec![vec![0.0; m]; m];
    for (i, row) in mat.iter_mut().enumerate() {
        row[i] = 1.0;
        row[0] += a[i + 1];
        if i + 1 < m {
            row[i + 1] -= 1.0;
        }
    }
    let rhs: Vec<f64> = (0..m).map(|i| b[i + 1] - a[i + 1] * b[0]).collect();
    solve(mat, rhs).unwrap_or_else(|| {
        log::debug!("Singular filter state system, starting from rest");
        vec![0.0; m]
    })
}

/// Gaussian elimination with partial pivoting.
fn solve(mut mat: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| mat[x][col].abs().total_cmp(&mat[y][col].abs()))?;
        if mat[pivot][col].abs() < 1e-300 {
            return None;
        }
        mat.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in col + 1..n {
            let factor = mat[row][col] / mat[col][col];
            for k in col..n {
                mat[row][k] -= factor * mat[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| mat[row][k] * x[k]).sum();
        x[row] = (rhs[row] - tail) / mat[row][row];
    }
    Some(x)
}

/// Forward-backward filtering with odd extension at both ends.
fn filtfilt(b: &[f64], a: &[f64], input: &[f64]) -> Vec<f64> {
    let len = input.len();
    if len == 0 {
        return Vec::new();
    }
    let (b, a) = normalize(b, a);
    let pad = (3 * b.len()).min(len - 1);

    let first = input[0];
    let last = input[len - 1];
    let mut ext = Vec::with_capacity(len + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
    ext.extend_from_slice(input);
    ext.extend((1..=pad).map(|i| 2.0 * last - input[len - 1 - i]));

    let zi = lfilter_zi(&b, &a);
    let scaled = |x0: f64| zi.iter().map(|z| z * x0).collect::<Vec<f64>>();

    let mut y = lfilter(&b, &a, &ext, scaled(ext[0]));
    y.reverse();
    let mut y = lfilter(&b, &a, &y, scaled(y[0]));
    y.reverse();

    y[pad..pad + len].to_vec()
}
