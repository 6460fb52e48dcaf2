//! # Pitch Detection Module
//!
//! Block-wise fundamental frequency estimation using the YIN algorithm.
//!
//! The estimator keeps audio history, so each call analyzes a window of at
//! least two hops. Lags reach one sample past the period of `fmin`, and the
//! difference function integrates over whatever part of the window those lags
//! leave free, but never less than three quarters of the longest period. At
//! 44.1 kHz with a 1024-sample hop and `fmin` at 40 Hz the window stays at two
//! hops and still reaches a bass guitar's low E (41 Hz). Shorter hops grow the
//! window instead, which adds warm-up frames.
//!
//! ## Features
//! - YIN difference function with cumulative mean normalization
//! - Absolute threshold with dip descent to avoid octave errors
//! - Parabolic interpolation for sub-sample accuracy
//! - Confidence score derived from the normalized dip depth
//! - Rejection of estimates outside the configured [fmin, fmax] band

use crate::config::AnalysisConfig;

/// YIN absolute threshold on the normalized difference function.
const YIN_TOLERANCE: f32 = 0.15;

/// Shortest lag searched; `interpolate` reads one lag below it.
const MIN_LAG: usize = 2;

/// Mean-square energy below which a window is treated as digital silence
/// (about -100 dBFS). Kept permissive: loudness gating happens in
/// [`VoicingGate`](crate::voicing::VoicingGate).
const SILENCE_ENERGY: f32 = 1e-10;

/// Result of analyzing one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Detected fundamental in Hz; `None` when no pitch was found.
    pub frequency: Option<f32>,
    /// Confidence of the estimate (0.0 to 1.0).
    pub confidence: f32,
}

impl PitchEstimate {
    /// The "no pitch" result.
    pub fn none() -> Self {
        Self {
            frequency: None,
            confidence: 0.0,
        }
    }

    pub fn is_pitched(&self) -> bool {
        self.frequency.is_some()
    }
}

/// Stateful YIN estimator for fixed-size hops.
///
/// Window and lag sizes derive from the sample rate, hop size and fmin at
/// construction. A change to any of them requires a new estimator.
#[derive(Debug, Clone)]
pub struct PitchEstimator {
    sample_rate: u32,
    hop_size: usize,
    fmin: f32,
    fmax: f32,
    /// Last lag of the difference function; a dip bottoming out here is
    /// clipped by the search range and rejected.
    max_lag: usize,
    /// Samples compared at each lag.
    integration: usize,
    /// Most recent samples, oldest first.
    window: Vec<f32>,
    difference: Vec<f32>,
    normalized: Vec<f32>,
}

impl PitchEstimator {
    /// Creates an estimator for the config's sample rate, hop and band.
    ///
    /// The config is assumed to be validated.
    pub fn new(config: &AnalysisConfig) -> Self {
        let hop_size = config.block_size.max(1);
        let sample_rate = config.sample_rate.max(1);

        // One lag past the fmin period, so a tone right at fmin still shows
        // a dip with a rising edge behind it.
        //
        // Short lags are always searched: a tone above fmax must be found
        // and rejected, not mistaken for its subharmonic.
        let fmin_period = (sample_rate as f64 / config.fmin as f64).ceil() as usize;
        let max_lag = (fmin_period + 1).max(MIN_LAG + 1);

        // The integration spans at least three quarters of the longest period;
        // hops too short for that grow the window
        let min_integration = max_lag * 3 / 4;
        let window_size = (hop_size * 2).max(max_lag + min_integration);
        let integration = window_size - max_lag;

        Self {
            sample_rate,
            hop_size,
            fmin: config.fmin,
            fmax: config.fmax,
            max_lag,
            integration,
            window: vec![0.0; window_size],
            difference: vec![0.0; max_lag + 1],
            normalized: vec![0.0; max_lag + 1],
        }
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Lowest frequency the lag range can represent.
    pub fn lowest_detectable(&self) -> f32 {
        self.sample_rate as f32 / (self.max_lag - 1) as f32
    }

    /// Samples of history analyzed per call.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        self.window.iter_mut().for_each(|s| *s = 0.0);
    }

    /// Estimates the pitch of the next hop.
    ///
    /// # Arguments
    /// * `frame` - Exactly `hop_size` samples
    ///
    /// # Returns
    /// * `PitchEstimate::none()` for frames of the wrong length (history is
    ///   left untouched), silent windows, periods longer than the lag range,
    ///   and estimates outside [fmin, fmax]
    pub fn process(&mut self, frame: &[f32]) -> PitchEstimate {
        if frame.len() != self.hop_size {
            return PitchEstimate::none();
        }

        let keep = self.window.len() - self.hop_size;
        self.window.copy_within(self.hop_size.., 0);
        self.window[keep..].copy_from_slice(frame);

        let energy = self.window.iter().map(|&s| s * s).sum::<f32>() / self.window.len() as f32;
        if !energy.is_finite() || energy < SILENCE_ENERGY {
            return PitchEstimate::none();
        }

        self.compute_difference();
        let Some(tau) = self.pick_period() else {
            return PitchEstimate::none();
        };

        let confidence = (1.0 - self.normalized[tau]).clamp(0.0, 1.0);
        let period = self.interpolate(tau);
        let frequency = self.sample_rate as f32 / period;

        if !frequency.is_finite() || frequency < self.fmin || frequency > self.fmax {
            return PitchEstimate::none();
        }

        PitchEstimate {
            frequency: Some(frequency),
            confidence,
        }
    }

    /// Steps 1 to 3: difference function and its cumulative mean normalized
    /// form, for lags `1..=max_lag`.
    fn compute_difference(&mut self) {
        let integration = self.integration;
        let last_lag = self.max_lag;

        self.difference[0] = 0.0;
        for tau in 1..=last_lag {
            let mut diff = 0.0;
            for i in 0..integration {
                let delta = self.window[i] - self.window[i + tau];
                diff += delta * delta;
            }
            self.difference[tau] = diff;
        }

        let mut running_sum = 0.0;
        self.normalized[0] = 1.0;
        for tau in 1..=last_lag {
            running_sum += self.difference[tau];
            self.normalized[tau] = if running_sum > 0.0 {
                self.difference[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
    }

    /// Steps 4 and 5: first dip under the tolerance, descended to its
    /// bottom. No dip under the tolerance means the window is not periodic;
    /// a dip still falling at `max_lag` belongs to a period below fmin.
    fn pick_period(&self) -> Option<usize> {
        let first = (MIN_LAG..=self.max_lag).find(|&tau| self.normalized[tau] < YIN_TOLERANCE)?;

        let mut best = first;
        while best < self.max_lag && self.normalized[best + 1] < self.normalized[best] {
            best += 1;
        }
        (best < self.max_lag).then_some(best)
    }

    /// Step 6: parabolic interpolation of the raw difference function.
    fn interpolate(&self, tau: usize) -> f32 {
        let y1 = self.difference[tau - 1];
        let y2 = self.difference[tau];
        let y3 = self.difference[tau + 1];

        let denominator = y1 - 2.0 * y2 + y3;
        if denominator.abs() > f32::EPSILON {
            let peak_shift = (y1 - y3) / (2.0 * denominator);
            if peak_shift.abs() <= 1.0 {
                return tau as f32 + peak_shift;
            }
        }
        tau as f32
    }
}
