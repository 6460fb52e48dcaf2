//! # Feature Extraction
//!
//! The per-frame pipeline. [`FeatureExtractor::process`] runs, in order:
//!
//! 1. pitch estimation and note mapping
//! 2. RMS, power spectrum and flatness
//! 3. the voicing decision, which needs both of the above
//! 4. the stability update, which needs the voicing decision and cents
//!
//! and returns one immutable [`Features`] record.

use crate::audio::AudioFrame;
use crate::config::AnalysisConfig;
use crate::error::ConfigError;
use crate::notes::{self, NoteReading};
use crate::pitch::PitchEstimator;
use crate::spectral::SpectralAnalyzer;
use crate::stability::StabilityTracker;
use crate::voicing::VoicingGate;
use serde::Serialize;
use std::sync::Arc;

/// Represents the result of a single audio analysis frame.
///
/// `note_name`, `midi_note` and `cents` are present exactly when a pitch was
/// found inside the configured band. `stable` implies `is_voiced`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Features {
    /// Capture time of the frame's first sample, in seconds. Device frames
    /// use Unix time; synthetic sources count from zero.
    pub timestamp: f64,
    pub rms: f32,
    /// Detected fundamental in Hz.
    pub frequency: Option<f32>,
    /// Nearest note, e.g. "A4".
    pub note_name: Option<&'static str>,
    pub midi_note: Option<u8>,
    /// Deviation from the nearest note in cents.
    pub cents: Option<f32>,
    /// Detector confidence (0.0 to 1.0).
    pub confidence: f32,
    /// Spectral flatness; 1.0 for silence.
    pub flatness: f32,
    pub is_pure: bool,
    pub is_voiced: bool,
    pub stable: bool,
    /// Duration of the current in-tune hold, in milliseconds.
    pub stable_ms: f32,
    /// Raw frame samples, for oscilloscope displays.
    #[serde(skip)]
    pub samples: Option<Arc<[f32]>>,
    /// Power spectrum (`len / 2 + 1` bins), for spectrum displays.
    #[serde(skip)]
    pub spectrum: Option<Arc<[f32]>>,
}

impl Features {
    /// Note name and cents rendered for a tuner readout, "-" without a note.
    pub fn display_note(&self) -> String {
        match (self.note_name, self.cents) {
            (Some(name), Some(cents)) => format!("{} {:+.1}c", name, cents),
            _ => "-".to_string(),
        }
    }
}

/// Owns one instance of every pipeline stage.
#[derive(Debug)]
pub struct FeatureExtractor {
    config: AnalysisConfig,
    pitch: PitchEstimator,
    spectral: SpectralAnalyzer,
    gate: VoicingGate,
    stability: StabilityTracker,
}

impl FeatureExtractor {
    /// Validates `config` and builds the pipeline.
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            pitch: PitchEstimator::new(&config),
            spectral: SpectralAnalyzer::with_frame_len(config.block_size),
            gate: VoicingGate::new(&config),
            stability: StabilityTracker::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Frames the stability window needs before it can report stable.
    pub fn stability_capacity(&self) -> usize {
        self.stability.capacity()
    }

    /// Applies a new configuration between frames.
    ///
    /// - Voicing thresholds and the cents tolerance apply from the next frame
    /// - A new sample rate, block size or band rebuilds the pitch estimator
    ///   and resets the stability window
    /// - A new stability window or note-change policy resets the window
    ///
    /// An invalid config is rejected and the current one stays in effect.
    pub fn reconfigure(&mut self, config: AnalysisConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let old = &self.config;

        let geometry_changed = old.sample_rate != config.sample_rate
            || old.block_size != config.block_size
            || old.fmin != config.fmin
            || old.fmax != config.fmax;
        let window_changed = old.stable_window_ms != config.stable_window_ms
            || old.reset_on_note_change != config.reset_on_note_change;

        if geometry_changed {
            log::info!(
                "[ANALYSIS] Rebuilding pitch estimator for {} Hz, block {}",
                config.sample_rate,
                config.block_size
            );
            self.pitch = PitchEstimator::new(&config);
        }
        if geometry_changed || window_changed {
            self.stability.reconfigure(&config);
        } else {
            self.stability.set_tolerance(config.stable_cents_tolerance);
        }
        self.gate = VoicingGate::new(&config);
        self.config = config;
        Ok(())
    }

    /// Forgets all history, e.g. after a device switch.
    pub fn reset(&mut self) {
        self.pitch.reset();
        self.stability.reset();
    }

    /// Analyzes one frame. Never panics; frames of the wrong length simply
    /// carry no pitch.
    pub fn process(&mut self, frame: &AudioFrame) -> Features {
        let samples = frame.samples();

        // 1. Pitch and note
        let pitch = self.pitch.process(samples);
        let note: Option<NoteReading> = pitch.frequency.and_then(notes::hz_to_note);

        // 2. Loudness and purity
        let spectral = self.spectral.analyze(samples);

        // 3. Voicing
        let is_pure = self.gate.is_pure(spectral.flatness);
        let is_voiced = self.gate.is_voiced(&pitch, spectral.rms, spectral.flatness);

        // 4. Stability
        let stability = self.stability.update(is_voiced, note.as_ref());

        let (samples, spectrum): (Option<Arc<[f32]>>, Option<Arc<[f32]>>) =
            if self.config.include_visualization {
                (
                    Some(Arc::from(samples)),
                    Some(Arc::from(spectral.power_spectrum)),
                )
            } else {
                (None, None)
            };

        Features {
            timestamp: frame.timestamp(),
            rms: spectral.rms,
            frequency: note.and(pitch.frequency),
            note_name: note.map(|n| n.name()),
            midi_note: note.map(|n| n.midi),
            cents: note.map(|n| n.cents),
            confidence: pitch.confidence,
            flatness: spectral.flatness,
            is_pure,
            is_voiced,
            stable: stability.stable && is_voiced,
            stable_ms: stability.stable_ms,
            samples,
            spectrum,
        }
    }
}
