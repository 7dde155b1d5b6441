use std::f64::consts::PI;
use std::fmt;

/// DSP weighting kernels applied to a frame before the FFT.
///
/// All kernels are the symmetric form, so `coefficients(n)` is palindromic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowKind {
    Boxcar,
    Triangular,
    Blackman,
    Hamming,
    Hann,
    Bartlett,
    FlatTop,
    Parzen,
    Bohman,
    #[default]
    BlackmanHarris,
    Nuttall,
    BartlettHann,
    Cosine,
    Exponential,
    Tukey,
    Taylor,
    Lanczos,
}

impl WindowKind {
    pub const ALL: [WindowKind; 17] = [
        WindowKind::Boxcar,
        WindowKind::Triangular,
        WindowKind::Blackman,
        WindowKind::Hamming,
        WindowKind::Hann,
        WindowKind::Bartlett,
        WindowKind::FlatTop,
        WindowKind::Parzen,
        WindowKind::Bohman,
        WindowKind::BlackmanHarris,
        WindowKind::Nuttall,
        WindowKind::BartlettHann,
        WindowKind::Cosine,
        WindowKind::Exponential,
        WindowKind::Tukey,
        WindowKind::Taylor,
        WindowKind::Lanczos,
    ];

    /// Resolve a display name such as "Blackman-Harris" or "Flat top".
    ///
    /// Matching ignores case, spaces, hyphens and underscores. An empty name
    /// or "none" means no window; anything unrecognised also yields `None`
    /// and is logged.
    pub fn from_name(name: &str) -> Option<WindowKind> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        let kind = match key.as_str() {
            "" | "none" => return None,
            "boxcar" | "rectangular" => WindowKind::Boxcar,
            "triangular" | "triang" => WindowKind::Triangular,
            "blackman" => WindowKind::Blackman,
            "hamming" => WindowKind::Hamming,
            "hann" | "hanning" => WindowKind::Hann,
            "bartlett" => WindowKind::Bartlett,
            "flattop" => WindowKind::FlatTop,
            "parzen" => WindowKind::Parzen,
            "bohman" => WindowKind::Bohman,
            "blackmanharris" => WindowKind::BlackmanHarris,
            "nuttall" => WindowKind::Nuttall,
            "bartletthann" | "barthann" => WindowKind::BartlettHann,
            "cosine" => WindowKind::Cosine,
            "exponential" => WindowKind::Exponential,
            "tukey" => WindowKind::Tukey,
            "taylor" => WindowKind::Taylor,
            "lanczos" => WindowKind::Lanczos,
            _ => {
                log::debug!("Unrecognized window function '{}', using none", name);
                return None;
            }
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            WindowKind::Boxcar => "Boxcar",
            WindowKind::Triangular => "Triangular",
            WindowKind::Blackman => "Blackman",
            WindowKind::Hamming => "Hamming",
            WindowKind::Hann => "Hann",
            WindowKind::Bartlett => "Bartlett",
            WindowKind::FlatTop => "Flat top",
            WindowKind::Parzen => "Parzen",
            WindowKind::Bohman => "Bohman",
            WindowKind::BlackmanHarris => "Blackman-Harris",
            WindowKind::Nuttall => "Nuttall",
            WindowKind::BartlettHann => "Bartlett-Hann",
            WindowKind::Cosine => "Cosine",
            WindowKind::Exponential => "Exponential",
            WindowKind::Tukey => "Tukey",
            WindowKind::Taylor => "Taylor",
            WindowKind::Lanczos => "Lanczos",
        }
    }

    pub fn coefficients(self, len: usize) -> Vec<f64> {
        if len <= 1 {
            return vec![1.0; len];
        }

        match self {
            WindowKind::Boxcar => vec![1.0; len],
            WindowKind::Triangular => triangular(len),
            WindowKind::Blackman => cosine_sum(len, &[0.42, 0.50, 0.08]),
            WindowKind::Hamming => cosine_sum(len, &[0.54, 0.46]),
            WindowKind::Hann => cosine_sum(len, &[0.5, 0.5]),
            WindowKind::Bartlett => bartlett(len),
            WindowKind::FlatTop => cosine_sum(
                len,
                &[0.21557895, 0.41663158, 0.277263158, 0.083578947, 0.006947368],
            ),
            WindowKind::Parzen => parzen(len),
            WindowKind::Bohman => bohman(len),
            WindowKind::BlackmanHarris => cosine_sum(len, &[0.35875, 0.48829, 0.14128, 0.01168]),
            WindowKind::Nuttall => cosine_sum(len, &[0.3635819, 0.4891775, 0.1365995, 0.0106411]),
            WindowKind::BartlettHann => bartlett_hann(len),
            WindowKind::Cosine => (0..len)
                .map(|n| (PI / len as f64 * (n as f64 + 0.5)).sin())
                .collect(),
            WindowKind::Exponential => exponential(len, 1.0),
            WindowKind::Tukey => tukey(len, 0.5),
            WindowKind::Taylor => taylor(len, 4, 30.0),
            WindowKind::Lanczos => lanczos(len),
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Generalized cosine window with alternating signs, `a0 - a1 cos + a2 cos2 - ...`.
fn cosine_sum(len: usize, coeffs: &[f64]) -> Vec<f64> {
    let step = 2.0 * PI / (len - 1) as f64;
    (0..len)
        .map(|n| {
            let phase = n as f64 * step;
            coeffs
                .iter()
                .enumerate()
                .map(|(k, a)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * a * (k as f64 * phase).cos()
                })
                .sum()
        })
        .collect()
}

fn triangular(len: usize) -> Vec<f64> {
    let m = len as f64;
    (0..len)
        .map(|i| {
            // distance from the nearer edge, counting from 1
            let n = (i.min(len - 1 - i) + 1) as f64;
            if len % 2 == 0 {
                (2.0 * n - 1.0) / m
            } else {
                2.0 * n / (m + 1.0)
            }
        })
        .collect()
}

fn bartlett(len: usize) -> Vec<f64> {
    let span = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let n = n as f64;
            if n <= span / 2.0 {
                2.0 * n / span
            } else {
                2.0 - 2.0 * n / span
            }
        })
        .collect()
}

fn parzen(len: usize) -> Vec<f64> {
    let half = len as f64 / 2.0;
    let quarter = (len - 1) as f64 / 4.0;
    (0..len)
        .map(|i| {
            let n = (i as f64 - (len - 1) as f64 / 2.0).abs();
            let r = n / half;
            if n <= quarter {
                1.0 - 6.0 * r * r + 6.0 * r * r * r
            } else {
                2.0 * (1.0 - r).powi(3)
            }
        })
        .collect()
}

fn bohman(len: usize) -> Vec<f64> {
    let span = (len - 1) as f64;
    (0..len)
        .map(|i| {
            if i == 0 || i == len - 1 {
                return 0.0;
            }
            let fac = (2.0 * i as f64 / span - 1.0).abs();
            (1.0 - fac) * (PI * fac).cos() + (PI * fac).sin() / PI
        })
        .collect()
}

fn bartlett_hann(len: usize) -> Vec<f64> {
    let span = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let fac = (n as f64 / span - 0.5).abs();
            0.62 - 0.48 * fac + 0.38 * (2.0 * PI * fac).cos()
        })
        .collect()
}

fn exponential(len: usize, tau: f64) -> Vec<f64> {
    let center = (len - 1) as f64 / 2.0;
    (0..len)
        .map(|n| (-(n as f64 - center).abs() / tau).exp())
        .collect()
}

fn tukey(len: usize, alpha: f64) -> Vec<f64> {
    let span = (len - 1) as f64;
    let width = (alpha * span / 2.0).floor() as usize;
    (0..len)
        .map(|n| {
            let x = n as f64;
            if n <= width {
                0.5 * (1.0 + (PI * (-1.0 + 2.0 * x / alpha / span)).cos())
            } else if n >= len - width - 1 {
                0.5 * (1.0 + (PI * (-2.0 / alpha + 1.0 + 2.0 * x / alpha / span)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

fn taylor(len: usize, nbar: usize, sll: f64) -> Vec<f64> {
    let b = 10f64.powf(sll / 20.0);
    let a = b.acosh() / PI;
    let nb = nbar as f64;
    let s2 = nb * nb / (a * a + (nb - 0.5) * (nb - 0.5));
    let ma: Vec<f64> = (1..nbar).map(|m| m as f64).collect();

    let fm: Vec<f64> = ma
        .iter()
        .enumerate()
        .map(|(mi, &m)| {
            let m2 = m * m;
            let sign = if mi % 2 == 0 { 1.0 } else { -1.0 };
            let numer = sign
                * ma
                    .iter()
                    .map(|&k| 1.0 - m2 / s2 / (a * a + (k - 0.5) * (k - 0.5)))
                    .product::<f64>();
            let denom = 2.0
                * ma
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != mi)
                    .map(|(_, &k)| 1.0 - m2 / (k * k))
                    .product::<f64>();
            numer / denom
        })
        .collect();

    let m = len as f64;
    let w = |x: f64| -> f64 {
        1.0 + 2.0
            * fm
                .iter()
                .zip(ma.iter())
                .map(|(f, k)| f * (2.0 * PI * k * (x - m / 2.0 + 0.5) / m).cos())
                .sum::<f64>()
    };

    let scale = 1.0 / w((m - 1.0) / 2.0);
    (0..len).map(|n| w(n as f64) * scale).collect()
}

fn lanczos(len: usize) -> Vec<f64> {
    let span = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let x = 2.0 * n as f64 / span - 1.0;
            if x == 0.0 {
                1.0
            } else {
                (PI * x).sin() / (PI * x)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn names_resolve_loosely() {
        assert_eq!(WindowKind::from_name("Blackman-Harris"), Some(WindowKind::BlackmanHarris));
        assert_eq!(WindowKind::from_name("flat top"), Some(WindowKind::FlatTop));
        assert_eq!(WindowKind::from_name("Flat-top"), Some(WindowKind::FlatTop));
        assert_eq!(WindowKind::from_name("HANN"), Some(WindowKind::Hann));
        assert_eq!(WindowKind::from_name("Kaiser"), None);
        assert_eq!(WindowKind::from_name(""), None);
        for kind in WindowKind::ALL {
            assert_eq!(WindowKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn default_is_blackman_harris() {
        assert_eq!(WindowKind::default(), WindowKind::BlackmanHarris);
    }

    #[test]
    fn every_kernel_has_requested_length_and_is_symmetric() {
        for kind in WindowKind::ALL {
            for len in [2usize, 7, 64] {
                let w = kind.coefficients(len);
                assert_eq!(w.len(), len, "{}", kind);
                for i in 0..len {
                    assert!(close(w[i], w[len - 1 - i]), "{} not symmetric at {}", kind, i);
                    assert!(w[i].is_finite());
                }
            }
            assert_eq!(kind.coefficients(1), vec![1.0]);
            assert!(kind.coefficients(0).is_empty());
        }
    }

    #[test]
    fn hann_tapers_to_zero_with_unit_centre() {
        let w = WindowKind::Hann.coefficients(9);
        assert!(close(w[0], 0.0));
        assert!(close(w[8], 0.0));
        assert!(close(w[4], 1.0));
    }

    #[test]
    fn known_reference_values() {
        // hamming edges
        assert!(close(WindowKind::Hamming.coefficients(5)[0], 0.08));
        // blackman-harris edges
        assert!(close(WindowKind::BlackmanHarris.coefficients(5)[0], 6.0e-5));
        // triangular, odd and even
        let t5 = WindowKind::Triangular.coefficients(5);
        assert!(close(t5[0], 1.0 / 3.0) && close(t5[2], 1.0));
        let t4 = WindowKind::Triangular.coefficients(4);
        assert!(close(t4[0], 0.25) && close(t4[1], 0.75));
        // taylor is normalised to a unit peak
        let tay = WindowKind::Taylor.coefficients(33);
        assert!(close(tay[16], 1.0));
    }
}
