//! # Shared Analysis State
//!
//! The one object both sides of the analysis boundary see. The analysis
//! thread publishes results here; the UI thread reads copies. The lock is
//! only ever held to swap or clone plain values, never across analysis work.
//!
//! Construct it once, wrap it in an `Arc`, and hand clones to the worker and
//! the UI.

use crate::features::Features;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    latest: Option<Features>,
    spectra: VecDeque<Arc<[f32]>>,
    audio_running: bool,
    last_error: Option<String>,
}

#[derive(Debug)]
pub struct SharedAnalysisState {
    inner: Mutex<Inner>,
    history_len: usize,
}

impl SharedAnalysisState {
    /// # Arguments
    /// * `history_len` - Power spectra kept for waterfall displays (at least 1)
    pub fn new(history_len: usize) -> Self {
        let history_len = history_len.max(1);
        Self {
            inner: Mutex::new(Inner {
                spectra: VecDeque::with_capacity(history_len),
                ..Inner::default()
            }),
            history_len,
        }
    }

    // The guarded data is plain values, so a panic elsewhere cannot leave
    // it half-updated; recover instead of propagating the poison.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the latest result and appends its spectrum to the history,
    /// evicting the oldest spectrum when full.
    pub fn publish(&self, features: Features) {
        let mut inner = self.lock();
        if let Some(spectrum) = &features.spectrum {
            if inner.spectra.len() == self.history_len {
                inner.spectra.pop_front();
            }
            inner.spectra.push_back(Arc::clone(spectrum));
        }
        inner.latest = Some(features);
    }

    /// Copy of the latest result, if any was published since the last reset.
    pub fn snapshot(&self) -> Option<Features> {
        self.lock().latest.clone()
    }

    /// Recent power spectra, oldest first.
    pub fn spectrum_history(&self) -> Vec<Arc<[f32]>> {
        self.lock().spectra.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history_len
    }

    /// Drops the latest result and the spectrum history.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.latest = None;
        inner.spectra.clear();
    }

    pub fn set_audio_running(&self, running: bool) {
        self.lock().audio_running = running;
    }

    pub fn is_audio_running(&self) -> bool {
        self.lock().audio_running
    }

    /// Records (or clears, with `None`) the message shown to the user.
    pub fn set_error(&self, message: Option<String>) {
        if let Some(message) = &message {
            log::error!("[STATE] {}", message);
        }
        self.lock().last_error = message;
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }
}

impl Default for SharedAnalysisState {
    fn default() -> Self {
        Self::new(120)
    }
}
