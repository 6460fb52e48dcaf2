//! # Voicing Gate
//!
//! Decides whether a frame holds a deliberately played note. No single cue
//! is enough on its own: periodic noise fools the confidence score, loud
//! noise fools the RMS, and quiet hum fools the flatness. The gate therefore
//! requires all of them at once.

use crate::config::AnalysisConfig;
use crate::pitch::PitchEstimate;

/// Threshold set for the voicing decision. All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoicingGate {
    pub confidence_threshold: f32,
    pub rms_threshold: f32,
    pub flatness_threshold: f32,
}

impl VoicingGate {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            rms_threshold: config.rms_threshold,
            flatness_threshold: config.flatness_threshold,
        }
    }

    /// `true` when the spectrum is tonal enough to be a note.
    pub fn is_pure(&self, flatness: f32) -> bool {
        flatness < self.flatness_threshold
    }

    /// Pitch present, confident, loud and pure, all four together.
    pub fn is_voiced(&self, pitch: &PitchEstimate, rms: f32, flatness: f32) -> bool {
        pitch.is_pitched()
            && pitch.confidence > self.confidence_threshold
            && rms > self.rms_threshold
            && self.is_pure(flatness)
    }
}
