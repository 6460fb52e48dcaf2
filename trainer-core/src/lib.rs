// trainer-core/src/lib.rs

//! The analysis core of the instrument trainer.
//! This crate turns a live monophonic signal into per-frame pitch, tuning,
//! voicing and stability readings. It is completely headless
//! and contains no GUI code.
//!
//! ## Pipeline
//! - [`pitch`]: YIN fundamental frequency estimation
//! - [`notes`]: frequency to note name and cents
//! - [`spectral`]: RMS loudness and spectral flatness
//! - [`voicing`]: the "is this a played note" decision
//! - [`stability`]: sliding-window hold detection
//! - [`features`]: the orchestrator producing [`Features`]
//!
//! ## Plumbing
//! - [`audio`]: capture callback, frames and the handoff channel
//! - [`worker`]: the analysis thread
//! - [`state`]: the snapshot store read by the UI

pub mod audio;
pub mod config;
pub mod error;
pub mod features;
pub mod notes;
pub mod pitch;
pub mod spectral;
pub mod stability;
pub mod state;
pub mod synth;
pub mod voicing;
pub mod worker;

pub use audio::{AudioFrame, FrameReceiver, FrameSender, LevelMeter};
pub use config::AnalysisConfig;
pub use error::{CaptureError, ConfigError};
pub use features::{FeatureExtractor, Features};
pub use state::SharedAnalysisState;
pub use worker::{AnalysisController, AnalysisWorker};
