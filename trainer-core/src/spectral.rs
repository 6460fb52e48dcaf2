//! # Spectral Features Module
//!
//! Loudness and purity of a single frame.
//!
//! ## Features
//! - RMS loudness
//! - Power spectrum from a forward FFT (RustFFT, planned once per length)
//! - DC offset removal and Hann windowing before the transform
//! - Spectral flatness: geometric over arithmetic mean of the power spectrum.
//!   Near 0 for a tonal signal, near 1 for noise.

use rustfft::{num_complex::Complex, FftPlanner};

/// Frames quieter than this skip the FFT entirely; flatness is then 1.0.
pub const SILENCE_RMS: f32 = 1e-5;

/// Floor applied to power bins before taking logarithms.
pub const POWER_FLOOR: f32 = 1e-10;

/// Loudness and spectral shape of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralReading {
    pub rms: f32,
    /// In (0, 1]; 1.0 for silent frames.
    pub flatness: f32,
    /// `len / 2 + 1` power bins. All zero for silent frames.
    pub power_spectrum: Vec<f32>,
}

/// Root-mean-square amplitude of a signal, 0 for an empty one.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 { return; }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the input buffer to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [Complex<f32>]) {
    let n = buffer.len();
    if n < 2 { return; }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        sample.re *= multiplier;
    }
}

/// Spectral flatness of a power spectrum, flooring bins at [`POWER_FLOOR`].
///
/// Returns 1.0 for an empty spectrum.
pub fn spectral_flatness(power_spectrum: &[f32]) -> f32 {
    if power_spectrum.is_empty() {
        return 1.0;
    }
    let n = power_spectrum.len() as f64;
    let (log_sum, sum) = power_spectrum
        .iter()
        .map(|&p| p.max(POWER_FLOOR) as f64)
        .fold((0.0f64, 0.0f64), |(log_sum, sum), p| (log_sum + p.ln(), sum + p));

    let geometric_mean = (log_sum / n).exp();
    let arithmetic_mean = sum / n;
    let flatness = (geometric_mean / arithmetic_mean) as f32;
    // AM-GM bounds this by 1; rounding can nudge it over
    if flatness.is_finite() {
        flatness.clamp(f32::MIN_POSITIVE, 1.0)
    } else {
        1.0
    }
}

/// Computes [`SpectralReading`]s, reusing FFT plans and buffers across frames.
pub struct SpectralAnalyzer {
    planner: FftPlanner<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("fft_len", &self.buffer.len())
            .finish()
    }
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            buffer: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Creates an analyzer with the plan for `len`-sample frames ready.
    pub fn with_frame_len(len: usize) -> Self {
        let mut analyzer = Self::new();
        if len > 0 {
            let fft = analyzer.planner.plan_fft_forward(len);
            analyzer.buffer.reserve(len);
            analyzer.scratch.resize(fft.get_inplace_scratch_len(), Complex::default());
        }
        analyzer
    }

    /// Analyzes one frame.
    ///
    /// Frames of any length are accepted. An empty frame has RMS 0, flatness
    /// 1.0 and a single zero bin.
    pub fn analyze(&mut self, samples: &[f32]) -> SpectralReading {
        let len = samples.len();
        let bins = len / 2 + 1;
        let rms = rms(samples);

        if rms < SILENCE_RMS {
            return SpectralReading {
                rms,
                flatness: 1.0,
                power_spectrum: vec![0.0; bins],
            };
        }

        let power_spectrum = self.power_spectrum(samples);
        let flatness = spectral_flatness(&power_spectrum);
        SpectralReading {
            rms,
            flatness,
            power_spectrum,
        }
    }

    /// Power spectrum (`|X[k]|^2` for `k` in `0..=len/2`) of a
    /// DC-corrected, Hann-windowed frame.
    pub fn power_spectrum(&mut self, samples: &[f32]) -> Vec<f32> {
        let len = samples.len();
        if len == 0 {
            return vec![0.0];
        }

        let mut centered = samples.to_vec();
        remove_dc_offset(&mut centered);

        self.buffer.clear();
        self.buffer
            .extend(centered.iter().map(|&sample| Complex { re: sample, im: 0.0 }));
        apply_hann_window(&mut self.buffer);

        let fft = self.planner.plan_fft_forward(len);
        let scratch_len = fft.get_inplace_scratch_len();
        if self.scratch.len() < scratch_len {
            self.scratch.resize(scratch_len, Complex::default());
        }
        fft.process_with_scratch(&mut self.buffer, &mut self.scratch[..scratch_len]);

        self.buffer
            .iter()
            .take(len / 2 + 1)
            .map(|c| c.norm_sqr())
            .collect()
    }
}
