//! # Analysis Worker
//!
//! The analysis side of the capture boundary.
//!
//! ## Architecture
//! - **Capture callback**: offers frames to the bounded handoff channel
//! - **Analysis thread**: wakes on a fixed tick, drains every pending frame
//!   through the [`FeatureExtractor`], and publishes only the last result
//! - **UI thread**: reads snapshots from [`SharedAnalysisState`]
//!
//! Every frame goes through the extractor, so the stability window stays in
//! step with real elapsed frames. Only the publish is thinned out, which
//! keeps the UI from flickering through intermediate results.

use crate::audio::FrameReceiver;
use crate::config::AnalysisConfig;
use crate::error::ConfigError;
use crate::features::{FeatureExtractor, Features};
use crate::state::SharedAnalysisState;
use crossbeam_channel::{Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Outcome of one [`AnalysisController::update`] cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Frames analyzed this cycle.
    pub processed: usize,
    /// Every sender is gone; no more frames will arrive.
    pub disconnected: bool,
}

/// Couples the extractor to its input channel and output state.
#[derive(Debug)]
pub struct AnalysisController {
    extractor: FeatureExtractor,
    frames: FrameReceiver,
    state: Arc<SharedAnalysisState>,
    reported_drops: u64,
}

impl AnalysisController {
    pub fn new(
        extractor: FeatureExtractor,
        frames: FrameReceiver,
        state: Arc<SharedAnalysisState>,
    ) -> Self {
        Self {
            extractor,
            frames,
            state,
            reported_drops: 0,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        self.extractor.config()
    }

    pub fn state(&self) -> &Arc<SharedAnalysisState> {
        &self.state
    }

    /// Processes every pending frame and publishes the last result.
    pub fn update(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let mut last_features: Option<Features> = None;

        loop {
            match self.frames.try_recv() {
                Ok(frame) => {
                    last_features = Some(self.extractor.process(&frame));
                    report.processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    report.disconnected = true;
                    break;
                }
            }
        }

        if let Some(features) = last_features {
            self.state.publish(features);
        }

        let dropped = self.frames.dropped();
        if dropped > self.reported_drops {
            log::debug!(
                "[ANALYSIS] {} frame(s) dropped by capture ({} total)",
                dropped - self.reported_drops,
                dropped
            );
            self.reported_drops = dropped;
        }

        report
    }

    /// Applies a new configuration. A changed sample rate or block size also
    /// clears the published state, since old results no longer apply.
    pub fn reconfigure(&mut self, config: AnalysisConfig) -> Result<(), ConfigError> {
        let stream_changed = config.sample_rate != self.config().sample_rate
            || config.block_size != self.config().block_size;
        self.extractor.reconfigure(config)?;
        if stream_changed {
            self.state.reset();
        }
        Ok(())
    }

    /// Clears all analysis history and the published state.
    pub fn reset(&mut self) {
        self.extractor.reset();
        self.state.reset();
    }
}

/// Runs an [`AnalysisController`] on a dedicated thread.
///
/// The thread exits when [`AnalysisWorker::stop`] is called, when the worker
/// is dropped, or by itself once the capture side disconnects.
#[derive(Debug)]
pub struct AnalysisWorker {
    shutdown_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<AnalysisController>>,
}

impl AnalysisWorker {
    /// Spawns the analysis thread.
    ///
    /// # Arguments
    /// * `controller` - Pipeline, input channel and output state
    /// * `interval` - Time between drain cycles, e.g. one UI frame
    pub fn spawn(mut controller: AnalysisController, interval: Duration) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_handle = thread::Builder::new()
            .name("analysis".to_string())
            .spawn(move || {
                log::info!("[ANALYSIS] Entering analysis loop...");
                let ticker = crossbeam_channel::tick(interval);

                loop {
                    crossbeam_channel::select! {
                        recv(ticker) -> _ => {
                            if controller.update().disconnected {
                                log::info!("[ANALYSIS] Audio channel closed");
                                break;
                            }
                        },
                        recv(shutdown_rx) -> _ => {
                            log::info!("[ANALYSIS] Received shutdown signal");
                            break;
                        },
                    }
                }

                log::info!("[ANALYSIS] Analysis thread finished");
                controller
            })?;

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            thread_handle: Some(thread_handle),
        })
    }

    /// `true` once the thread has exited on its own or been stopped.
    pub fn is_finished(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    /// Signals the thread, waits for it, and hands the controller back.
    ///
    /// # Returns
    /// * `None` if the thread panicked
    pub fn stop(mut self) -> Option<AnalysisController> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<AnalysisController> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            // The thread may already be gone; that is fine
            let _ = shutdown_tx.try_send(());
        }
        let handle = self.thread_handle.take()?;
        match handle.join() {
            Ok(controller) => Some(controller),
            Err(_) => {
                log::error!("[ANALYSIS] Analysis thread panicked");
                None
            }
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{frame_channel, AudioFrame};
    use crate::synth::{self, SineSource};

    fn controller(config: &AnalysisConfig) -> (crate::audio::FrameSender, AnalysisController) {
        let (sender, receiver) = frame_channel(config.channel_capacity);
        let extractor = FeatureExtractor::new(config.clone()).unwrap();
        let state = Arc::new(SharedAnalysisState::new(config.spectrum_history_len));
        (sender, AnalysisController::new(extractor, receiver, state))
    }

    #[test]
    fn test_update_drains_all_and_publishes_last() {
        let config = AnalysisConfig::default();
        let (sender, mut controller) = controller(&config);

        assert_eq!(controller.update(), CycleReport::default());
        assert!(controller.state().snapshot().is_none());

        for i in 0..5 {
            assert!(sender.offer(synth::silence(&config, i as f64)));
        }
        let report = controller.update();
        assert_eq!(report.processed, 5);
        assert!(!report.disconnected);

        let snapshot = controller.state().snapshot().unwrap();
        assert_eq!(snapshot.timestamp, 4.0);
        // One publish, one spectrum in the history
        assert_eq!(controller.state().spectrum_history().len(), 1);
    }

    #[test]
    fn test_every_drained_frame_feeds_stability() {
        let config = AnalysisConfig {
            channel_capacity: 64,
            ..AnalysisConfig::default()
        };
        let (sender, mut controller) = controller(&config);
        let capacity = config.stability_capacity();

        // Warm-up frame plus a full window, all in a single cycle
        for frame in SineSource::new(440.0, 0.5, &config).take(capacity + 1) {
            assert!(sender.offer(frame));
        }
        controller.update();
        let snapshot = controller.state().snapshot().unwrap();
        assert!(snapshot.stable);
        assert_eq!(snapshot.note_name, Some("A4"));
    }

    #[test]
    fn test_update_reports_disconnect_after_draining() {
        let config = AnalysisConfig::default();
        let (sender, mut controller) = controller(&config);
        sender.offer(synth::silence(&config, 0.0));
        drop(sender);

        let report = controller.update();
        assert_eq!(report.processed, 1);
        assert!(report.disconnected);
        assert!(controller.state().snapshot().is_some());
    }

    #[test]
    fn test_reconfigure_sample_rate_clears_state() {
        let config = AnalysisConfig::default();
        let (sender, mut controller) = controller(&config);
        sender.offer(synth::silence(&config, 0.0));
        controller.update();

        let louder = AnalysisConfig {
            rms_threshold: 0.01,
            ..config.clone()
        };
        controller.reconfigure(louder).unwrap();
        assert!(controller.state().snapshot().is_some());

        let resampled = AnalysisConfig {
            sample_rate: 48_000,
            ..config
        };
        controller.reconfigure(resampled).unwrap();
        assert!(controller.state().snapshot().is_none());
        assert_eq!(controller.config().sample_rate, 48_000);
    }

    #[test]
    fn test_worker_stops_on_request() {
        let config = AnalysisConfig::default();
        let (sender, controller) = controller(&config);
        let state = Arc::clone(controller.state());
        let worker = AnalysisWorker::spawn(controller, Duration::from_millis(5)).unwrap();

        sender.offer(AudioFrame::new(vec![0.0; 1024], 44_100, 0.0));
        let mut waited = 0;
        while state.snapshot().is_none() && waited < 200 {
            thread::sleep(Duration::from_millis(5));
            waited += 1;
        }
        assert!(state.snapshot().is_some());

        let controller = worker.stop().unwrap();
        assert_eq!(controller.config(), &config);
    }

    #[test]
    fn test_worker_leaves_running_flag_to_capture() {
        let config = AnalysisConfig::default();
        let (sender, controller) = controller(&config);
        let state = Arc::clone(controller.state());
        let worker = AnalysisWorker::spawn(controller, Duration::from_millis(5)).unwrap();
        // Analysis ticking says nothing about whether capture runs
        thread::sleep(Duration::from_millis(20));
        assert!(!state.is_audio_running());

        state.set_audio_running(true);
        drop(sender);
        worker.stop().unwrap();
        assert!(state.is_audio_running());
    }

    #[test]
    fn test_worker_exits_when_capture_disconnects() {
        let config = AnalysisConfig::default();
        let (sender, controller) = controller(&config);
        let worker = AnalysisWorker::spawn(controller, Duration::from_millis(5)).unwrap();

        drop(sender);
        let mut waited = 0;
        while !worker.is_finished() && waited < 200 {
            thread::sleep(Duration::from_millis(5));
            waited += 1;
        }
        assert!(worker.is_finished());
        assert!(worker.stop().is_some());
    }
}
