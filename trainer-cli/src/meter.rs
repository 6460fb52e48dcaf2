//! # Text Cent Meter
//!
//! Renders a [`Features`] snapshot as a single terminal line:
//!
//! ```text
//! A4   440.2 Hz  [----------|*---------]  +0.8c  HOLD 1.20s  rms 0.354
//! ```
//!
//! The needle is clamped to the ends of the scale, so a reading 80 cents
//! sharp pins to the right edge.

use trainer_core::Features;

/// The meter shows deviations from -50 to +50 cents.
const METER_RANGE: f32 = 50.0;

/// Cells on each side of the center mark.
const HALF_WIDTH: usize = 10;

/// Draws the needle bar for a cents deviation, or an empty scale without one.
pub fn needle(cents: Option<f32>) -> String {
    let mut cells = vec!['-'; HALF_WIDTH * 2 + 1];
    cells[HALF_WIDTH] = '|';

    if let Some(cents) = cents {
        let offset = (cents.clamp(-METER_RANGE, METER_RANGE) / METER_RANGE * HALF_WIDTH as f32)
            .round() as isize;
        let index = (HALF_WIDTH as isize + offset) as usize;
        cells[index] = '*';
    }

    format!("[{}]", cells.into_iter().collect::<String>())
}

/// One readout line.
pub fn render(features: &Features, level: f32) -> String {
    let note = features.note_name.unwrap_or("--");
    let frequency = features
        .frequency
        .map(|f| format!("{:7.1} Hz", f))
        .unwrap_or_else(|| "     -- Hz".to_string());
    let cents = features
        .cents
        .map(|c| format!("{:+5.1}c", c))
        .unwrap_or_else(|| "   --".to_string());
    let status = if features.stable {
        format!("HOLD {:.2}s", features.stable_ms / 1000.0)
    } else if features.is_voiced {
        "....      ".to_string()
    } else {
        "          ".to_string()
    };

    format!(
        "{:<4} {}  {}  {}  {}  rms {:.3}",
        note,
        frequency,
        needle(features.cents),
        cents,
        status,
        level
    )
}
