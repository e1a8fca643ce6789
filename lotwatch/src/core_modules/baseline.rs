// THEORY:
// The `baseline` module is the temporal heart of the engine. It remembers one
// reference mean per cell and decides, frame by frame, which cells have moved
// away from their remembered state.
//
// Key architectural principles:
// 1.  **Selective update**: a cell's reference is overwritten only when that
//     cell is flagged. Once a region settles at a new brightness (a car parks,
//     a shadow arrives), the flagged update re-anchors the baseline there and
//     the region stays quiet until it changes *again* relative to the new
//     anchor. Cells under threshold keep their old baseline indefinitely, so
//     sub-threshold drift never accumulates into a false trigger.
// 2.  **Strict comparison**: a deviation exactly equal to the threshold does
//     not flag. Only `diff > threshold` counts.
// 3.  **Sole ownership**: the reference sequence is private. Callers get
//     `initialize` and `evaluate` as the only mutators and a read-only view
//     for diagnostics — nobody outside this module can perturb the baselines.
//
// Evaluating before a baseline exists would compare against nothing; that is
// a programming error on the caller's side and fails fast instead of quietly
// defaulting to zero.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("baseline tracker evaluated before it was initialized")]
    NotInitialized,
    #[error("got {actual} cell means but the baseline holds {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Stateful per-cell change detector with selectively updated references.
pub struct BaselineTracker {
    threshold: f64,
    reference: Option<Vec<f64>>,
}

impl BaselineTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            reference: None,
        }
    }

    /// Records the initial per-cell means as the reference state. Called once,
    /// from the first normalized frame, before any `evaluate`.
    pub fn initialize(&mut self, initial_means: &[f64]) {
        self.reference = Some(initial_means.to_vec());
    }

    pub fn is_initialized(&self) -> bool {
        self.reference.is_some()
    }

    /// Read-only view of the current reference means, if initialized.
    pub fn reference(&self) -> Option<&[f64]> {
        self.reference.as_deref()
    }

    /// Compares current means against the references. Every cell whose
    /// absolute deviation strictly exceeds the threshold is flagged and its
    /// reference is re-anchored to the current mean; all other references are
    /// left untouched. Flagged indices come back in ascending (row-major)
    /// order.
    pub fn evaluate(&mut self, current_means: &[f64]) -> Result<Vec<usize>, BaselineError> {
        let reference = self
            .reference
            .as_mut()
            .ok_or(BaselineError::NotInitialized)?;
        if current_means.len() != reference.len() {
            return Err(BaselineError::LengthMismatch {
                expected: reference.len(),
                actual: current_means.len(),
            });
        }

        let mut flagged = Vec::new();
        for (idx, (&mean, anchor)) in current_means.iter().zip(reference.iter_mut()).enumerate() {
            let diff = (*anchor - mean).abs();
            if diff > self.threshold {
                *anchor = mean;
                flagged.push(idx);
            }
        }
        Ok(flagged)
    }
}
