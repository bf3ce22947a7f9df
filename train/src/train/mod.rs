//! The training state machine.

mod worker;

pub use worker::*;

use crate::common::*;

/// Phases of one training run. Any unrecoverable error surfaces as an `Err`
/// from the worker instead of reaching `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fit,
    Validate,
    Test,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fit => "fit",
            Self::Validate => "validate",
            Self::Test => "test",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Aggregate metrics of one full pass over a split, weighted by batch size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub loss: f64,
    pub acc: f64,
    pub num_examples: usize,
}

/// Outcome of observing one epoch's validation accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub new_best: bool,
    pub should_stop: bool,
}

/// Best-checkpoint and early-stop bookkeeping over validation accuracy.
///
/// Ties go to the most recent epoch for checkpoint selection; the patience
/// counter resets only on strict improvement.
#[derive(Debug, Clone)]
pub struct BestTracker {
    patience: Option<usize>,
    best: Option<(usize, f64)>,
    stale_epochs: usize,
}

impl BestTracker {
    pub fn new(patience: Option<usize>) -> Self {
        Self {
            patience,
            best: None,
            stale_epochs: 0,
        }
    }

    pub fn observe(&mut self, epoch: usize, val_acc: f64) -> Observation {
        let (new_best, improved) = match self.best {
            None => (true, true),
            Some((_epoch, best_acc)) => (val_acc >= best_acc, val_acc > best_acc),
        };

        if new_best {
            self.best = Some((epoch, val_acc));
        }
        if improved {
            self.stale_epochs = 0;
        } else {
            self.stale_epochs += 1;
        }

        let should_stop = self
            .patience
            .map_or(false, |patience| self.stale_epochs >= patience);

        Observation {
            new_best,
            should_stop,
        }
    }

    /// The best epoch and its validation accuracy so far.
    pub fn best(&self) -> Option<(usize, f64)> {
        self.best
    }
}
