//! # Note Mapping Module
//!
//! Converts frequencies to equal-tempered notes (A4 = 440 Hz, MIDI 69) and
//! signed cents deviations. Everything here is pure arithmetic and
//! independent of audio.
//!
//! ## Features
//! - Hz to nearest MIDI note and cents deviation
//! - Note names with octave numbers ("A4", "C#3")
//! - MIDI note to frequency conversion
//! - Cent distance between two frequencies

use once_cell::sync::Lazy;

/// Concert A in Hz.
pub const A4_FREQUENCY: f32 = 440.0;
/// MIDI number of concert A.
pub const A4_MIDI: i32 = 69;

const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Names for all 128 MIDI notes, built once.
///
/// MIDI 0 is "C-1", MIDI 69 is "A4", MIDI 127 is "G9".
static MIDI_NOTE_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    (0..128i32)
        .map(|midi| {
            let pitch_class = PITCH_CLASS_NAMES[(midi % 12) as usize];
            let octave = midi / 12 - 1;
            format!("{}{}", pitch_class, octave)
        })
        .collect()
});

/// The nearest equal-tempered note to a frequency, and how far off it is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteReading {
    /// Rounded MIDI note number.
    pub midi: u8,
    /// Signed deviation from `midi` in cents, about (-50, +50].
    pub cents: f32,
}

impl NoteReading {
    /// Note name with octave, e.g. "A4".
    pub fn name(&self) -> &'static str {
        note_name(self.midi)
    }

    /// Octave number in scientific pitch notation (MIDI 60 is octave 4).
    pub fn octave(&self) -> i32 {
        self.midi as i32 / 12 - 1
    }

    /// Position in the chromatic scale starting at C (0..12).
    pub fn pitch_class(&self) -> u8 {
        self.midi % 12
    }
}

/// Name of a MIDI note ("A4" for 69).
pub fn note_name(midi: u8) -> &'static str {
    // Every u8 below 128 is in the table; anything above clamps to G9.
    let index = (midi as usize).min(MIDI_NOTE_NAMES.len() - 1);
    MIDI_NOTE_NAMES[index].as_str()
}

/// Maps a frequency to its nearest note.
///
/// # Arguments
/// * `hz` - Frequency in Hz
///
/// # Returns
/// * `Some(reading)` - Nearest note and cents deviation
/// * `None` - "No note": zero, negative, or non-finite input, or a frequency
///   whose nearest note falls outside MIDI 0..=127
pub fn hz_to_note(hz: f32) -> Option<NoteReading> {
    if !hz.is_finite() || hz <= 0.0 {
        return None;
    }

    // f64 keeps the cents exact for frequencies that land on a semitone
    let midi_float = 12.0 * (hz as f64 / A4_FREQUENCY as f64).log2() + A4_MIDI as f64;
    let midi_round = midi_float.round();
    if !(0.0..=127.0).contains(&midi_round) {
        return None;
    }

    let cents = ((midi_float - midi_round) * 100.0) as f32;
    Some(NoteReading {
        midi: midi_round as u8,
        cents,
    })
}

/// Equal-tempered frequency of a MIDI note.
pub fn midi_to_frequency(midi: u8) -> f32 {
    A4_FREQUENCY * 2.0_f32.powf((midi as i32 - A4_MIDI) as f32 / 12.0)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat; 1200 cents is an octave.
pub fn cents_between(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
