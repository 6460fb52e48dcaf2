//! Synthetic frame sources: a retunable sine tone and silence.
//!
//! They produce the same [`AudioFrame`]s the capture callback does, with
//! sample-count timestamps, so the pipeline can run without an input device.

use crate::audio::AudioFrame;
use crate::config::AnalysisConfig;
use std::f64::consts::TAU;

/// Endless sine tone, cut into hops.
///
/// Phase is carried across frames, so consecutive frames join without a
/// discontinuity even when the frequency changes.
#[derive(Debug, Clone)]
pub struct SineSource {
    frequency: f64,
    amplitude: f32,
    sample_rate: u32,
    block_size: usize,
    phase: f64,
    position: u64,
}

impl SineSource {
    pub fn new(frequency: f64, amplitude: f32, config: &AnalysisConfig) -> Self {
        Self {
            frequency,
            amplitude,
            sample_rate: config.sample_rate.max(1),
            block_size: config.block_size.max(1),
            phase: 0.0,
            position: 0,
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Retunes the tone from the next sample on.
    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
    }

    pub fn next_frame(&mut self) -> AudioFrame {
        let step = TAU * self.frequency / self.sample_rate as f64;
        let mut samples = Vec::with_capacity(self.block_size);
        for _ in 0..self.block_size {
            samples.push(self.amplitude * self.phase.sin() as f32);
            self.phase = (self.phase + step) % TAU;
        }
        let timestamp = self.position as f64 / self.sample_rate as f64;
        self.position += self.block_size as u64;
        AudioFrame::new(samples, self.sample_rate, timestamp)
    }
}

impl Iterator for SineSource {
    type Item = AudioFrame;

    fn next(&mut self) -> Option<AudioFrame> {
        Some(self.next_frame())
    }
}

/// An all-zero hop at `timestamp`.
pub fn silence(config: &AnalysisConfig, timestamp: f64) -> AudioFrame {
    AudioFrame::new(vec![0.0; config.block_size], config.sample_rate, timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_hop_sized_and_timestamped() {
        let config = AnalysisConfig::default();
        let frames: Vec<_> = SineSource::new(440.0, 0.5, &config).take(3).collect();
        assert!(frames.iter().all(|f| f.len() == 1024));
        assert_eq!(frames[0].timestamp(), 0.0);
        assert!((frames[2].timestamp() - 2048.0 / 44_100.0).abs() < 1e-12);
    }

    #[test]
    fn test_phase_is_continuous() {
        let config = AnalysisConfig {
            block_size: 100,
            ..AnalysisConfig::default()
        };
        let mut source = SineSource::new(440.0, 1.0, &config);
        let a = source.next_frame();
        let b = source.next_frame();
        // Successive samples of a 440 Hz tone differ by at most 2 * pi * 440 / 44100
        let jump = (b.samples()[0] - a.samples()[99]).abs();
        assert!(jump < 0.07, "jump = {}", jump);
    }

    #[test]
    fn test_amplitude() {
        let config = AnalysisConfig::default();
        let frame = SineSource::new(440.0, 0.5, &config).next_frame();
        let peak = frame.samples().iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak <= 0.5 && peak > 0.49);
    }

    #[test]
    fn test_silence() {
        let config = AnalysisConfig::default();
        let frame = silence(&config, 1.5);
        assert_eq!(frame.len(), 1024);
        assert!(frame.samples().iter().all(|&s| s == 0.0));
        assert_eq!(frame.timestamp(), 1.5);
    }
}
