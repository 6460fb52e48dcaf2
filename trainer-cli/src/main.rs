//! # Trainer - Headless Tuner Front End
//!
//! Runs the analysis core against the default input device (or a synthetic
//! tone) and prints a tuner readout on every refresh.
//!
//! ## Architecture
//! - **Main Thread**: reads snapshots from the shared state and prints them
//! - **Audio Thread**: the cpal callback, or the tone generator with `--simulate`
//! - **Analysis Thread**: drains frames through the feature extractor
//! - **Communication**: a bounded frame channel in, shared state out

mod cli;
mod meter;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Sender;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use trainer_core::audio::{self, CaptureStream, FrameSender};
use trainer_core::synth::SineSource;
use trainer_core::{
    spectral, AnalysisConfig, AnalysisController, AnalysisWorker, FeatureExtractor, Features,
    LevelMeter, SharedAnalysisState,
};

use cli::Cli;

/// A JSON readout line.
#[derive(Serialize)]
struct Readout<'a> {
    #[serde(flatten)]
    features: &'a Features,
    level: f32,
}

/// Where frames come from.
enum Source {
    Device(CaptureStream),
    Simulated(ToneFeeder),
}

/// Tone generator thread standing in for the capture callback.
///
/// Frames are paced in real time and offered with the same drop-on-full
/// behavior as the device callback. Like a capture stream, it owns the
/// running flag while it feeds.
struct ToneFeeder {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
    state: Arc<SharedAnalysisState>,
}

impl ToneFeeder {
    fn spawn(
        mut source: SineSource,
        config: &AnalysisConfig,
        sender: FrameSender,
        meter: LevelMeter,
        state: Arc<SharedAnalysisState>,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let hop = Duration::from_secs_f64(config.block_size as f64 / config.sample_rate as f64);

        let thread_handle = thread::Builder::new()
            .name("tone".to_string())
            .spawn(move || {
                log::info!("[AUDIO] Simulating {:.2} Hz", source.frequency());
                let ticker = crossbeam_channel::tick(hop);
                loop {
                    crossbeam_channel::select! {
                        recv(ticker) -> _ => {
                            let frame = source.next_frame();
                            meter.set(spectral::rms(frame.samples()));
                            sender.offer(frame);
                        },
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                log::info!("[AUDIO] Tone generator stopped");
            })
            .context("failed to spawn tone thread")?;
        state.set_audio_running(true);

        Ok(Self {
            shutdown_tx,
            thread_handle: Some(thread_handle),
            state,
        })
    }

    fn stop(mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("[AUDIO] Tone thread panicked");
            }
        }
        self.state.set_audio_running(false);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(sample_rate) = cli.sample_rate {
        config.sample_rate = sample_rate;
    }
    if let Some(block_size) = cli.block_size {
        config.block_size = block_size;
    }
    // The meter line never draws the waveform or spectrum
    config.include_visualization = false;
    config.validate().context("invalid analysis config")?;

    let state = Arc::new(SharedAnalysisState::new(config.spectrum_history_len));
    let (sender, receiver) = audio::frame_channel(config.channel_capacity);
    let level_meter = LevelMeter::new();

    let source = match cli.simulate {
        Some(frequency) => {
            let tone = SineSource::new(frequency, cli.amplitude.clamp(0.0, 1.0), &config);
            Source::Simulated(ToneFeeder::spawn(
                tone,
                &config,
                sender,
                level_meter.clone(),
                Arc::clone(&state),
            )?)
        }
        None => {
            let stream = audio::start_capture(&config, sender, level_meter.clone(), Arc::clone(&state))
                .context("failed to start audio capture")?;
            // Frames carry the device rate; analyze them at that rate
            if stream.sample_rate() != config.sample_rate {
                config.sample_rate = stream.sample_rate();
            }
            Source::Device(stream)
        }
    };

    let extractor = FeatureExtractor::new(config.clone()).context("invalid analysis config")?;
    log::info!(
        "[MAIN] Analyzing {} Hz, hop {} ({:.1} ms), stable after {} frames",
        config.sample_rate,
        config.block_size,
        config.frame_duration_ms(),
        extractor.stability_capacity()
    );

    let controller = AnalysisController::new(extractor, receiver, Arc::clone(&state));
    let refresh = Duration::from_millis(cli.refresh_ms.max(1));
    let worker = AnalysisWorker::spawn(controller, refresh).context("failed to spawn analysis thread")?;

    let started = Instant::now();
    let deadline = cli.duration.map(|secs| Duration::from_secs_f64(secs.max(0.0)));
    let ticker = crossbeam_channel::tick(refresh);
    let mut last_timestamp = None;

    loop {
        let _ = ticker.recv();

        if let Some(features) = state.snapshot() {
            // Only print fresh results
            if last_timestamp != Some(features.timestamp) {
                last_timestamp = Some(features.timestamp);
                print_readout(&features, level_meter.level(), cli.json)?;
            }
        }

        if deadline.is_some_and(|deadline| started.elapsed() >= deadline) {
            break;
        }
        if worker.is_finished() {
            log::warn!("[MAIN] Analysis stopped: input ended");
            break;
        }
    }

    match source {
        Source::Device(stream) => {
            if let Err(e) = stream.stop() {
                log::error!("[MAIN] Failed to stop audio stream: {}", e);
            }
        }
        Source::Simulated(tone) => tone.stop(),
    }
    if worker.stop().is_none() {
        anyhow::bail!("analysis thread panicked");
    }
    if let Some(message) = state.last_error() {
        log::warn!("[MAIN] Last error: {}", message);
    }
    log::info!("[MAIN] Finished after {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}

fn print_readout(features: &Features, level: f32, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(&Readout { features, level })
            .context("failed to serialize readout")?;
        println!("{}", line);
    } else {
        println!("{}", meter::render(features, level));
    }
    Ok(())
}
