use serde::Deserialize;

/// Width and signedness of the samples a capture device delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    Int8,
    #[default]
    Int16,
    Int32,
    Float32,
}

impl SampleFormat {
    /// Map a PortAudio-style format code. Unknown codes fall back to 16-bit.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => SampleFormat::Float32,
            2 => SampleFormat::Int32,
            8 => SampleFormat::Int16,
            16 => SampleFormat::Int8,
            other => {
                log::warn!("Unknown sample format code {}, assuming 16-bit signed", other);
                SampleFormat::Int16
            }
        }
    }

    pub fn code(self) -> u32 {
        match self {
            SampleFormat::Float32 => 1,
            SampleFormat::Int32 => 2,
            SampleFormat::Int16 => 8,
            SampleFormat::Int8 => 16,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int8" | "i8" | "s8" => Some(SampleFormat::Int8),
            "int16" | "i16" | "s16" => Some(SampleFormat::Int16),
            "int32" | "i32" | "s32" => Some(SampleFormat::Int32),
            "float32" | "f32" => Some(SampleFormat::Float32),
            _ => None,
        }
    }

    /// Bytes per sample.
    pub fn bytes(self) -> usize {
        match self {
            SampleFormat::Int8 => 1,
            SampleFormat::Int16 => 2,
            SampleFormat::Int32 | SampleFormat::Float32 => 4,
        }
    }

    /// Largest magnitude a sample of this format can take, in canonical units.
    pub fn peak(self) -> f64 {
        match self {
            SampleFormat::Int8 => i8::MAX as f64,
            SampleFormat::Int16 => i16::MAX as f64,
            SampleFormat::Int32 => i32::MAX as f64,
            SampleFormat::Float32 => 1.0,
        }
    }

    /// Convert one little-endian encoded sample to its canonical value.
    ///
    /// Integer formats keep their native scale so that `peak()` stays the
    /// reference for dB figures; float samples are taken as-is.
    #[inline]
    pub fn to_canonical(self, raw: &[u8]) -> f64 {
        match self {
            SampleFormat::Int8 => raw[0] as i8 as f64,
            SampleFormat::Int16 => i16::from_le_bytes([raw[0], raw[1]]) as f64,
            SampleFormat::Int32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            SampleFormat::Float32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
        }
    }

    /// Encode a canonical value back into this format, clamping to range.
    pub fn encode_into(self, value: f64, out: &mut Vec<u8>) {
        match self {
            SampleFormat::Int8 => {
                let v = value.round().clamp(i8::MIN as f64, i8::MAX as f64) as i8;
                out.push(v as u8);
            }
            SampleFormat::Int16 => {
                let v = value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
            SampleFormat::Int32 => {
                let v = value.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                out.extend_from_slice(&v.to_le_bytes());
            }
            SampleFormat::Float32 => {
                out.extend_from_slice(&(value as f32).to_le_bytes());
            }
        }
    }
}

/// One device read worth of interleaved samples in canonical form.
#[derive(Debug, Clone)]
pub struct SampleFrame {
    pub format: SampleFormat,
    pub channels: u16,
    pub samples: Vec<f64>,
}

impl SampleFrame {
    /// Decode raw device bytes. A trailing partial sample is ignored.
    pub fn from_bytes(bytes: &[u8], format: SampleFormat, channels: u16) -> Self {
        let samples = bytes
            .chunks_exact(format.bytes())
            .map(|raw| format.to_canonical(raw))
            .collect();
        Self {
            format,
            channels: channels.max(1),
            samples,
        }
    }

    pub fn peak(&self) -> f64 {
        self.format.peak()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean absolute amplitude over every interleaved sample.
    pub fn mean_amplitude(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.abs()).sum::<f64>() / self.samples.len() as f64
    }

    /// Average the channels of each sample period into one value.
    pub fn downmix(&self) -> Vec<f64> {
        let ch = self.channels as usize;
        if ch == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(ch)
            .map(|period| period.iter().sum::<f64>() / ch as f64)
            .collect()
    }
}
