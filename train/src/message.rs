//! Messages sent from the training worker to the logging worker.

use crate::{common::*, train::EpochStats};

#[derive(Debug, Clone)]
pub enum LoggingMessage {
    /// Aggregate metrics of one fit epoch.
    Epoch {
        epoch: usize,
        train_loss: f64,
        train_acc: f64,
        val_loss: f64,
        val_acc: f64,
    },
    /// Aggregate metrics of the final full pass over one split.
    FinalPass {
        split: Split,
        /// The epoch the evaluated weights come from.
        epoch: usize,
        loss: f64,
        acc: f64,
    },
}

impl LoggingMessage {
    pub fn epoch(epoch: usize, train: EpochStats, val: EpochStats) -> Self {
        Self::Epoch {
            epoch,
            train_loss: train.loss,
            train_acc: train.acc,
            val_loss: val.loss,
            val_acc: val.acc,
        }
    }

    pub fn final_pass(split: Split, epoch: usize, stats: EpochStats) -> Self {
        Self::FinalPass {
            split,
            epoch,
            loss: stats.loss,
            acc: stats.acc,
        }
    }
}
