//! # Analysis Configuration
//!
//! All the knobs of the analysis pipeline live in [`AnalysisConfig`]. Every
//! option is runtime-mutable through
//! [`FeatureExtractor::reconfigure`](crate::features::FeatureExtractor::reconfigure),
//! and every configuration is validated before the pipeline sees it.
//!
//! Configs are plain JSON. Missing fields fall back to their defaults, so a
//! file containing only `{"block_size": 2048}` is valid.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for the whole analysis core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sample rate of incoming frames in Hz.
    pub sample_rate: u32,
    /// Hop size: samples per analysis frame.
    pub block_size: usize,
    /// Lowest fundamental accepted by the pitch estimator, in Hz.
    pub fmin: f32,
    /// Highest fundamental accepted by the pitch estimator, in Hz.
    pub fmax: f32,
    /// Detector confidence a frame must exceed to be voiced.
    pub confidence_threshold: f32,
    /// RMS a frame must exceed to be voiced.
    pub rms_threshold: f32,
    /// Spectral flatness a frame must stay below to be voiced (purity).
    pub flatness_threshold: f32,
    /// Duration a note must be held in tune before it counts as stable.
    pub stable_window_ms: f32,
    /// Largest |cents| deviation still considered in tune.
    pub stable_cents_tolerance: f32,
    /// Clear the stability window when the detected note changes.
    pub reset_on_note_change: bool,
    /// Number of power spectra kept for waterfall displays.
    pub spectrum_history_len: usize,
    /// Capacity of the capture-to-analysis handoff channel, in frames.
    pub channel_capacity: usize,
    /// Attach raw samples and the power spectrum to each result.
    pub include_visualization: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 1024,
            fmin: 40.0,
            fmax: 2000.0,
            confidence_threshold: 0.2,
            rms_threshold: 0.001,
            // Below 0.15 reads as a note, above as noise
            flatness_threshold: 0.15,
            stable_window_ms: 500.0,
            stable_cents_tolerance: 15.0,
            reset_on_note_change: true,
            spectrum_history_len: 120,
            channel_capacity: 32,
            include_visualization: true,
        }
    }
}

impl AnalysisConfig {
    /// Checks every option, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::SampleRate);
        }
        if self.block_size == 0 {
            return Err(ConfigError::BlockSize);
        }
        let range_ok = self.fmin.is_finite()
            && self.fmax.is_finite()
            && self.fmin > 0.0
            && self.fmin < self.fmax;
        if !range_ok {
            return Err(ConfigError::FrequencyRange {
                fmin: self.fmin,
                fmax: self.fmax,
            });
        }

        let thresholds = [
            ("confidence_threshold", self.confidence_threshold),
            ("rms_threshold", self.rms_threshold),
            ("flatness_threshold", self.flatness_threshold),
            ("stable_cents_tolerance", self.stable_cents_tolerance),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Threshold { name, value });
            }
        }

        if !self.stable_window_ms.is_finite() || self.stable_window_ms <= 0.0 {
            return Err(ConfigError::StableWindow(self.stable_window_ms));
        }
        if self.spectrum_history_len == 0 {
            return Err(ConfigError::Capacity {
                name: "spectrum_history_len",
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Capacity {
                name: "channel_capacity",
            });
        }
        Ok(())
    }

    /// Duration of one frame in milliseconds.
    pub fn frame_duration_ms(&self) -> f32 {
        self.block_size as f32 * 1000.0 / self.sample_rate as f32
    }

    /// Number of frames the stability window holds.
    ///
    /// `ceil(stable_window_ms / frame_duration_ms)`, never less than one.
    pub fn stability_capacity(&self) -> usize {
        let frames = (self.stable_window_ms / self.frame_duration_ms()).ceil();
        if frames.is_finite() && frames >= 1.0 {
            frames as usize
        } else {
            1
        }
    }

    /// Loads and validates a JSON config file.
    ///
    /// # Arguments
    /// * `path` - Path to a JSON file; absent fields take their defaults
    ///
    /// # Returns
    /// * `Ok(AnalysisConfig)` - Parsed, valid configuration
    /// * `Err(ConfigError)` - Unreadable file, bad JSON, or invalid values
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        log::info!("[CONFIG] Loaded configuration from {:?}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.stable_cents_tolerance, 15.0);
    }

    #[test]
    fn test_stability_capacity_rounds_up() {
        let config = AnalysisConfig::default();
        // 500 ms / (1024 / 44100 s) = 21.53 frames
        assert_eq!(config.stability_capacity(), 22);

        let tiny = AnalysisConfig {
            stable_window_ms: 1.0,
            ..AnalysisConfig::default()
        };
        assert_eq!(tiny.stability_capacity(), 1);
    }

    #[test]
    fn test_rejects_inverted_frequency_range() {
        let config = AnalysisConfig {
            fmin: 2000.0,
            fmax: 40.0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FrequencyRange { .. })
        ));

        let equal = AnalysisConfig {
            fmin: 440.0,
            fmax: 440.0,
            ..AnalysisConfig::default()
        };
        assert!(equal.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let no_rate = AnalysisConfig {
            sample_rate: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(no_rate.validate(), Err(ConfigError::SampleRate)));

        let no_block = AnalysisConfig {
            block_size: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(no_block.validate(), Err(ConfigError::BlockSize)));

        let no_channel = AnalysisConfig {
            channel_capacity: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            no_channel.validate(),
            Err(ConfigError::Capacity { name: "channel_capacity" })
        ));
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let negative = AnalysisConfig {
            rms_threshold: -0.1,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(ConfigError::Threshold { name: "rms_threshold", .. })
        ));

        let nan = AnalysisConfig {
            flatness_threshold: f32::NAN,
            ..AnalysisConfig::default()
        };
        assert!(nan.validate().is_err());

        let no_window = AnalysisConfig {
            stable_window_ms: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            no_window.validate(),
            Err(ConfigError::StableWindow(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{ "block_size": 2048, "fmin": 70.0 }"#).unwrap();
        assert_eq!(config.block_size, 2048);
        assert_eq!(config.fmin, 70.0);
        assert_eq!(config.fmax, 2000.0);
        assert_eq!(config.sample_rate, 44_100);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "trainer-config-{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{ "stable_window_ms": 250.0 }"#).unwrap();
        let config = AnalysisConfig::load_from_file(&path).unwrap();
        assert_eq!(config.stable_window_ms, 250.0);

        fs::write(&path, r#"{ "fmin": 900.0, "fmax": 100.0 }"#).unwrap();
        assert!(matches!(
            AnalysisConfig::load_from_file(&path),
            Err(ConfigError::FrequencyRange { .. })
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            AnalysisConfig::load_from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        let _ = fs::remove_file(&path);

        assert!(matches!(
            AnalysisConfig::load_from_file(&path),
            Err(ConfigError::Io { .. })
        ));
    }
}
