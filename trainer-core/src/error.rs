//! # Error Types
//!
//! Typed errors for the two places the core can fail: building an
//! [`AnalysisConfig`](crate::config::AnalysisConfig) and opening the capture
//! stream. Per-frame analysis never fails; malformed or silent frames degrade
//! to "no pitch" results instead.

use std::path::PathBuf;
use thiserror::Error;

/// Rejected configuration. Raised eagerly, before any frame is analyzed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive")]
    SampleRate,
    #[error("block size must be positive")]
    BlockSize,
    #[error("fmin ({fmin} Hz) must be positive and lower than fmax ({fmax} Hz)")]
    FrequencyRange { fmin: f32, fmax: f32 },
    #[error("{name} must be a finite, non-negative number (got {value})")]
    Threshold { name: &'static str, value: f32 },
    #[error("stable window must be a positive duration (got {0} ms)")]
    StableWindow(f32),
    #[error("{name} must be at least 1")]
    Capacity { name: &'static str },
    #[error("failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to open or start the input stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device available")]
    NoDevice,
    #[error("no f32 input format found on {0}")]
    NoSupportedFormat(String),
    #[error("failed to query input configs")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error("failed to build input stream")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start input stream")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("failed to pause input stream")]
    PauseStream(#[from] cpal::PauseStreamError),
}
