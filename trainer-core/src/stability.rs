//! # Stability Tracking
//!
//! Decides whether a note is being held steadily. The tracker keeps a
//! fixed-size sliding window of the cents deviations of recent voiced frames:
//!
//! - **Empty**: nothing voiced yet, or the last frame was unvoiced
//! - **Filling**: fewer voiced frames than the window holds
//! - **Stable** / **Unstable**: the window is full, and every entry is (or is
//!   not) within tolerance
//!
//! An unvoiced frame clears the window at once, with no hysteresis.
//!
//! The window also remembers which note it belongs to. With
//! `reset_on_note_change` enabled, a voiced frame on a different note starts
//! a fresh window, so an octave jump that happens to land in tune does not
//! inherit the previous note's history.

use crate::config::AnalysisConfig;
use crate::notes::NoteReading;
use std::collections::VecDeque;

/// Verdict for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StabilityStatus {
    pub stable: bool,
    /// How long the current run of in-tolerance frames on the same note has
    /// lasted, in milliseconds.
    pub stable_ms: f32,
}

#[derive(Debug, Clone)]
pub struct StabilityTracker {
    window: VecDeque<f32>,
    capacity: usize,
    tolerance_cents: f32,
    frame_ms: f32,
    reset_on_note_change: bool,
    current_note: Option<u8>,
    in_tune_frames: usize,
}

impl StabilityTracker {
    pub fn new(config: &AnalysisConfig) -> Self {
        let capacity = config.stability_capacity();
        Self {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
            tolerance_cents: config.stable_cents_tolerance,
            frame_ms: config.frame_duration_ms(),
            reset_on_note_change: config.reset_on_note_change,
            current_note: None,
            in_tune_frames: 0,
        }
    }

    /// Frames needed before the window can report stable.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Applies the window-related options of a new config and starts over.
    pub fn reconfigure(&mut self, config: &AnalysisConfig) {
        *self = Self::new(config);
    }

    /// Updates the tolerance in place; the window is kept.
    pub fn set_tolerance(&mut self, tolerance_cents: f32) {
        self.tolerance_cents = tolerance_cents;
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.current_note = None;
        self.in_tune_frames = 0;
    }

    /// Feeds one frame.
    ///
    /// # Arguments
    /// * `voiced` - Voicing decision for the frame
    /// * `note` - Mapped note; a voiced frame without one counts as unvoiced
    pub fn update(&mut self, voiced: bool, note: Option<&NoteReading>) -> StabilityStatus {
        let note = match note {
            Some(note) if voiced => note,
            _ => {
                self.reset();
                return StabilityStatus::default();
            }
        };

        if self.current_note != Some(note.midi) {
            if self.reset_on_note_change {
                self.window.clear();
            }
            self.in_tune_frames = 0;
            self.current_note = Some(note.midi);
        }

        self.window.push_back(note.cents);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }

        if note.cents.abs() <= self.tolerance_cents {
            self.in_tune_frames += 1;
        } else {
            self.in_tune_frames = 0;
        }

        let stable = self.window.len() == self.capacity
            && self
                .window
                .iter()
                .all(|cents| cents.abs() <= self.tolerance_cents);

        StabilityStatus {
            stable,
            stable_ms: self.in_tune_frames as f32 * self.frame_ms,
        }
    }
}
