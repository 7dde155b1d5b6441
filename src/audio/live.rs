//! Default system input via cpal.
//!
//! cpal streams are not `Send`, so a dedicated thread builds and owns the
//! stream and forwards every callback buffer over a bounded channel. `read`
//! blocks on that channel until a full frame has arrived. Backlog beyond
//! [`BACKLOG_FRAMES`] frames is dropped, oldest first, so a reader that
//! falls behind stays close to real time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, StreamConfig};

use super::device::{CaptureDevice, DeviceError, StreamParams};

const READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Callback buffers the channel holds before new ones are dropped.
const CHANNEL_CHUNKS: usize = 32;
/// Frames of samples kept waiting for `read`.
pub const BACKLOG_FRAMES: usize = 4;

struct StreamThread {
    stop_tx: mpsc::Sender<()>,
    data_rx: mpsc::Receiver<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

pub struct LiveDevice {
    label: String,
    stream: Option<StreamThread>,
    pending: VecDeque<f32>,
    params: Option<StreamParams>,
}

impl LiveDevice {
    pub fn new() -> Self {
        Self {
            label: "default input".into(),
            stream: None,
            pending: VecDeque::new(),
            params: None,
        }
    }
}

impl Default for LiveDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for LiveDevice {
    fn open(&mut self, params: &StreamParams) -> Result<(), DeviceError> {
        self.close();

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (data_tx, data_rx) = mpsc::sync_channel::<Vec<f32>>(CHANNEL_CHUNKS);
        let dropped = Arc::new(AtomicUsize::new(0));
        let callback_dropped = dropped.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, DeviceError>>();
        let config = StreamConfig {
            channels: params.channels,
            sample_rate: SampleRate(params.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let handle = thread::Builder::new()
            .name("live-input".to_string())
            .spawn(move || {
                let stream = match start_stream(&config, data_tx, callback_dropped) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the device is closed or dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| DeviceError::Open(e.to_string()))?;

        let name = ready_rx
            .recv()
            .map_err(|_| DeviceError::Open("input thread exited during setup".into()))??;
        log::info!(
            "Live input '{}': {}Hz, {} channels",
            name,
            params.sample_rate,
            params.channels
        );

        self.label = name;
        self.stream = Some(StreamThread {
            stop_tx,
            data_rx,
            dropped,
            handle,
        });
        self.params = Some(*params);
        Ok(())
    }

    fn read(&mut self, frames: usize) -> Result<Vec<u8>, DeviceError> {
        let params = self.params.ok_or(DeviceError::NotOpen)?;
        let stream = self.stream.as_ref().ok_or(DeviceError::NotOpen)?;
        let wanted = frames * params.channels as usize;

        while let Ok(chunk) = stream.data_rx.try_recv() {
            self.pending.extend(chunk);
        }
        while self.pending.len() < wanted {
            match stream.data_rx.recv_timeout(READ_TIMEOUT) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(DeviceError::Read("timed out waiting for input".into()))
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(DeviceError::Read("input stream closed".into()))
                }
            }
        }

        let skipped = trim_backlog(&mut self.pending, wanted * BACKLOG_FRAMES)
            + stream.dropped.swap(0, Ordering::Relaxed);
        if skipped > 0 {
            log::debug!("Live input behind, skipped {} samples", skipped);
        }

        let peak = params.format.peak();
        let mut out = Vec::with_capacity(wanted * params.format.bytes());
        for sample in self.pending.drain(..wanted) {
            params.format.encode_into(sample as f64 * peak, &mut out);
        }
        Ok(out)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.stop_tx.send(());
            if stream.handle.join().is_err() {
                log::error!("Live input thread panicked");
            }
            log::info!("Live input '{}' closed", self.label);
        }
        self.pending.clear();
        self.params = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl Drop for LiveDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drop the oldest samples until at most `cap` remain. Returns how many
/// were dropped.
fn trim_backlog(pending: &mut VecDeque<f32>, cap: usize) -> usize {
    let excess = pending.len().saturating_sub(cap);
    pending.drain(..excess);
    excess
}

fn start_stream(
    config: &StreamConfig,
    data_tx: mpsc::SyncSender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
) -> Result<(cpal::Stream, String), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| DeviceError::Open("no default input device".into()))?;
    let name = device.name().unwrap_or_else(|_| "default input".into());

    let native = device
        .default_input_config()
        .map_err(|e| DeviceError::Open(e.to_string()))?;

    let stream = match native.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, config, data_tx, dropped),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, config, data_tx, dropped),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, config, data_tx, dropped),
        other => {
            return Err(DeviceError::Unsupported(format!(
                "input sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| DeviceError::Open(e.to_string()))?;

    stream.play().map_err(|e| DeviceError::Open(e.to_string()))?;
    Ok((stream, name))
}

fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    data_tx: mpsc::SyncSender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data
                .iter()
                .map(|s| cpal::Sample::from_sample(*s))
                .collect();
            if let Err(mpsc::TrySendError::Full(samples)) = data_tx.try_send(samples) {
                dropped.fetch_add(samples.len(), Ordering::Relaxed);
            }
        },
        |err| {
            log::error!("Live input stream error: {}", err);
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backlog_keeps_only_the_newest_samples() {
        let mut pending: VecDeque<f32> = (0..10).map(|v| v as f32).collect();
        assert_eq!(trim_backlog(&mut pending, 4), 6);
        assert_eq!(pending, VecDeque::from(vec![6.0, 7.0, 8.0, 9.0]));

        assert_eq!(trim_backlog(&mut pending, 8), 0);
        assert_eq!(pending.len(), 4);
    }

    #[test]
    fn full_channel_rejects_instead_of_growing() {
        let (tx, rx) = mpsc::sync_channel::<Vec<f32>>(CHANNEL_CHUNKS);
        for _ in 0..CHANNEL_CHUNKS {
            tx.try_send(vec![0.0; 16]).expect("room");
        }
        assert!(matches!(tx.try_send(vec![0.0; 16]), Err(mpsc::TrySendError::Full(_))));
        assert_eq!(rx.try_iter().count(), CHANNEL_CHUNKS);
    }
}
