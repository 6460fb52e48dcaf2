//! # Audio Capture Module
//!
//! The capture side of the pipeline. It runs inside the CPAL input callback,
//! so nothing here may block, and per-callback work stays small and bounded.
//!
//! ## Features
//! - [`AudioFrame`]: one immutable hop of mono samples with its timestamp
//! - Re-blocking of arbitrary callback sizes into fixed hops
//! - A bounded, non-blocking handoff channel that drops frames when full
//! - A lock-free level meter for immediate metering
//! - Default input device capture with f32 format selection

use crate::config::AnalysisConfig;
use crate::error::CaptureError;
use crate::spectral;
use crate::state::SharedAnalysisState;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One hop of mono samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    timestamp: f64,
}

impl AudioFrame {
    /// # Arguments
    /// * `samples` - Mono samples, roughly in [-1, 1]
    /// * `sample_rate` - Sample rate in Hz
    /// * `timestamp` - Capture time of the first sample, in seconds
    pub fn new(samples: Vec<f32>, sample_rate: u32, timestamp: f64) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Creates the handoff channel between capture and analysis.
///
/// The channel holds at most `capacity` frames (at least one). The sender
/// never blocks; frames offered while it is full are dropped and counted.
pub fn frame_channel(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FrameSender {
            tx,
            dropped: Arc::clone(&dropped),
        },
        FrameReceiver { rx, dropped },
    )
}

/// Capture end of the handoff channel.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: Sender<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Hands a frame over without blocking.
    ///
    /// # Returns
    /// * `true` - The frame was queued
    /// * `false` - The channel was full or the analysis side is gone; the
    ///   frame was dropped
    pub fn offer(&self, frame: AudioFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Frames dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Analysis end of the handoff channel.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: Receiver<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameReceiver {
    /// Takes the oldest pending frame, if any.
    pub fn try_recv(&self) -> Result<AudioFrame, TryRecvError> {
        self.rx.try_recv()
    }

    /// Number of frames waiting.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    /// Total frames dropped by the capture side so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Latest instantaneous RMS, written by the capture callback and readable
/// from any thread without locking.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    bits: Arc<AtomicU32>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, rms: f32) {
        self.bits.store(rms.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Cuts interleaved callback buffers of any size into fixed-size mono hops.
///
/// Only the first channel of interleaved input is kept. Timestamps are the
/// anchor (the wall-clock time of the first sample, see
/// [`FrameBlocker::anchor`]) plus the running sample count, so they never
/// decrease. An unanchored blocker counts from zero.
#[derive(Debug)]
pub struct FrameBlocker {
    block_size: usize,
    sample_rate: u32,
    channels: usize,
    pending: Vec<f32>,
    samples_emitted: u64,
    origin: Option<f64>,
}

impl FrameBlocker {
    pub fn new(block_size: usize, sample_rate: u32, channels: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            pending: Vec::with_capacity(block_size * 2),
            samples_emitted: 0,
            origin: None,
        }
    }

    /// Pins the first sample to `wall_clock` seconds since the Unix epoch.
    /// Only the first call counts; later ones are ignored.
    pub fn anchor(&mut self, wall_clock: f64) {
        if self.origin.is_none() && wall_clock.is_finite() {
            self.origin = Some(wall_clock);
        }
    }

    pub fn is_anchored(&self) -> bool {
        self.origin.is_some()
    }

    /// Appends interleaved samples and emits every complete hop.
    ///
    /// # Returns
    /// * RMS of the mono samples in `data`, for metering
    pub fn push<F>(&mut self, data: &[f32], mut emit: F) -> f32
    where
        F: FnMut(AudioFrame),
    {
        let start = self.pending.len();
        self.pending
            .extend(data.iter().step_by(self.channels).copied());
        let level = spectral::rms(&self.pending[start..]);

        let mut offset = 0;
        while self.pending.len() - offset >= self.block_size {
            let samples = self.pending[offset..offset + self.block_size].to_vec();
            let timestamp = self.origin.unwrap_or(0.0)
                + self.samples_emitted as f64 / self.sample_rate as f64;
            emit(AudioFrame::new(samples, self.sample_rate, timestamp));
            self.samples_emitted += self.block_size as u64;
            offset += self.block_size;
        }
        self.pending.drain(..offset);
        level
    }

    /// Samples waiting for the next complete hop.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

/// A running input stream. Dropping it (or calling [`CaptureStream::stop`])
/// ends capture, disconnects its [`FrameSender`] and clears the running flag
/// in the shared state.
pub struct CaptureStream {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
    device_name: String,
    state: Arc<SharedAnalysisState>,
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream")
            .field("device_name", &self.device_name)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

impl CaptureStream {
    /// The rate the device actually runs at, which may differ from the
    /// requested one.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stops the stream. The callback, and with it the frame sender, is
    /// released when `self` drops at the end of this call.
    pub fn stop(self) -> Result<(), CaptureError> {
        self.stream.pause()?;
        log::info!("[AUDIO] Stream on {} stopped", self.device_name);
        Ok(())
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.state.set_audio_running(false);
    }
}

/// Records a stream failure in the shared state. A lost device also clears
/// the running flag; other backend errors are reported while capture goes on.
pub fn report_stream_error(state: &SharedAnalysisState, err: &cpal::StreamError) {
    state.set_error(Some(format!("Audio stream error: {}", err)));
    if matches!(err, cpal::StreamError::DeviceNotAvailable) {
        state.set_audio_running(false);
    }
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks an f32 input format, preferring mono and the configured rate
/// 3. Installs a callback that meters, re-blocks and hands frames over
///
/// # Arguments
/// * `config` - Requested sample rate and hop size
/// * `sender` - Capture end of the handoff channel
/// * `meter` - Receives the RMS of every callback buffer
/// * `state` - Running flag and stream errors are reported here
///
/// # Returns
/// * `Ok(stream)` - Running stream; check [`CaptureStream::sample_rate`]
/// * `Err(e)` - No device, no usable format, or the stream failed to start
pub fn start_capture(
    config: &AnalysisConfig,
    sender: FrameSender,
    meter: LevelMeter,
    state: Arc<SharedAnalysisState>,
) -> Result<CaptureStream, CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown device".to_string());
    log::info!("[AUDIO] Using audio input device: {}", device_name);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, config.sample_rate)
        .ok_or_else(|| CaptureError::NoSupportedFormat(device_name.clone()))?;

    let sample_rate = config
        .sample_rate
        .clamp(supported_config.min_sample_rate().0, supported_config.max_sample_rate().0);
    let stream_config: cpal::StreamConfig = supported_config
        .with_sample_rate(cpal::SampleRate(sample_rate))
        .into();
    let channels = stream_config.channels;

    if sample_rate != config.sample_rate {
        log::warn!(
            "[AUDIO] Device does not support {} Hz, capturing at {} Hz",
            config.sample_rate,
            sample_rate
        );
    }
    log::info!("[AUDIO] Selected {} Hz, {} channel(s)", sample_rate, channels);

    let mut blocker = FrameBlocker::new(config.block_size, sample_rate, channels as usize);
    let error_state = Arc::clone(&state);
    let err_fn = move |err: cpal::StreamError| report_stream_error(&error_state, &err);

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], info: &cpal::InputCallbackInfo| {
            if !blocker.is_anchored() {
                blocker.anchor(capture_wall_clock(info));
            }
            let level = blocker.push(data, |frame| {
                // Full channel: the frame is dropped and counted
                sender.offer(frame);
            });
            meter.set(level);
        },
        err_fn,
        None,
    )?;

    stream.play()?;
    state.set_audio_running(true);

    Ok(CaptureStream {
        stream,
        sample_rate,
        channels,
        device_name,
        state,
    })
}

/// Wall-clock time, in seconds since the Unix epoch, at which the first
/// sample of this callback's buffer was captured.
fn capture_wall_clock(info: &cpal::InputCallbackInfo) -> f64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since_epoch| since_epoch.as_secs_f64())
        .unwrap_or(0.0);
    let stamps = info.timestamp();
    let latency = stamps
        .callback
        .duration_since(&stamps.capture)
        .map(|latency| latency.as_secs_f64())
        .unwrap_or(0.0);
    now - latency
}

/// Finds the best supported f32 input configuration.
///
/// Prefers configurations whose rate range contains `target_rate`, then the
/// fewest channels, then the closest rate bound.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if (min..=max).contains(&target_rate) {
                0
            } else {
                min.abs_diff(target_rate).min(max.abs_diff(target_rate))
            };
            (distance, c.channels())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: f32, len: usize, timestamp: f64) -> AudioFrame {
        AudioFrame::new(vec![value; len], 44_100, timestamp)
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (sender, receiver) = frame_channel(4);
        let accepted = (0..10)
            .filter(|&i| sender.offer(frame(i as f32, 8, i as f64)))
            .count();

        assert_eq!(accepted, 4);
        assert_eq!(receiver.pending(), 4);
        assert_eq!(receiver.dropped(), 6);
        assert_eq!(sender.dropped(), 6);

        // The oldest frames were kept
        let first = receiver.try_recv().unwrap();
        assert_eq!(first.samples()[0], 0.0);
    }

    #[test]
    fn test_offer_after_receiver_dropped() {
        let (sender, receiver) = frame_channel(2);
        drop(receiver);
        assert!(!sender.offer(frame(0.0, 8, 0.0)));
        assert_eq!(sender.dropped(), 0);
    }

    #[test]
    fn test_receiver_sees_disconnect() {
        let (sender, receiver) = frame_channel(2);
        sender.offer(frame(0.0, 8, 0.0));
        drop(sender);
        assert!(receiver.try_recv().is_ok());
        assert_eq!(receiver.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (sender, receiver) = frame_channel(0);
        assert_eq!(receiver.capacity(), 1);
        assert!(sender.offer(frame(0.0, 8, 0.0)));
        assert!(!sender.offer(frame(0.0, 8, 0.0)));
    }

    #[test]
    fn test_blocker_reblocks_uneven_callbacks() {
        let mut blocker = FrameBlocker::new(4, 8, 1);
        let mut frames = Vec::new();
        let input: Vec<f32> = (0..11).map(|i| i as f32).collect();

        blocker.push(&input[..3], |f| frames.push(f));
        assert!(frames.is_empty());
        blocker.push(&input[3..10], |f| frames.push(f));
        assert_eq!(frames.len(), 2);
        blocker.push(&input[10..], |f| frames.push(f));
        assert_eq!(frames.len(), 2);
        assert_eq!(blocker.buffered(), 3);

        assert_eq!(frames[0].samples(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(frames[1].samples(), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(frames[0].timestamp(), 0.0);
        assert_eq!(frames[1].timestamp(), 0.5);
        assert_eq!(frames[1].sample_rate(), 8);
    }

    #[test]
    fn test_lost_device_clears_running_flag() {
        let state = SharedAnalysisState::default();
        state.set_audio_running(true);
        report_stream_error(&state, &cpal::StreamError::DeviceNotAvailable);
        assert!(!state.is_audio_running());
        assert!(state.last_error().is_some());
    }

    #[test]
    fn test_backend_error_keeps_running_flag() {
        let state = SharedAnalysisState::default();
        state.set_audio_running(true);
        let err = cpal::StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "buffer overrun".to_string(),
            },
        };
        report_stream_error(&state, &err);
        assert!(state.is_audio_running());
        assert!(state.last_error().unwrap().contains("buffer overrun"));
    }

    #[test]
    fn test_blocker_anchors_to_wall_clock() {
        let mut blocker = FrameBlocker::new(4, 8, 1);
        assert!(!blocker.is_anchored());
        blocker.anchor(1_700_000_000.25);
        // Only the first anchor counts
        blocker.anchor(5.0);
        blocker.anchor(f64::NAN);
        assert!(blocker.is_anchored());

        let mut frames = Vec::new();
        blocker.push(&[0.0; 12], |f| frames.push(f));
        let stamps: Vec<f64> = frames.iter().map(|f| f.timestamp()).collect();
        assert_eq!(stamps, vec![1_700_000_000.25, 1_700_000_000.75, 1_700_000_001.25]);
    }

    #[test]
    fn test_non_finite_anchor_is_ignored() {
        let mut blocker = FrameBlocker::new(4, 8, 1);
        blocker.anchor(f64::INFINITY);
        assert!(!blocker.is_anchored());
        let mut frames = Vec::new();
        blocker.push(&[0.0; 4], |f| frames.push(f));
        assert_eq!(frames[0].timestamp(), 0.0);
    }

    #[test]
    fn test_blocker_keeps_first_channel() {
        let mut blocker = FrameBlocker::new(3, 44_100, 2);
        let interleaved = [0.1, -9.0, 0.2, -9.0, 0.3, -9.0];
        let mut frames = Vec::new();
        let level = blocker.push(&interleaved, |f| frames.push(f));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), &[0.1, 0.2, 0.3]);
        assert!((level - spectral::rms(&[0.1, 0.2, 0.3])).abs() < 1e-6);
    }

    #[test]
    fn test_level_meter_shares_value() {
        let meter = LevelMeter::new();
        assert_eq!(meter.level(), 0.0);
        let writer = meter.clone();
        writer.set(0.25);
        assert_eq!(meter.level(), 0.25);
    }
}
