//! Inverse-frequency class weighting for the loss function.

use crate::common::*;
use crate::dataset::{ExampleRecord, CLASS_NAMES};

/// Class weights inversely proportional to training-split frequency,
/// normalized to sum to one.
///
/// Computed once after the train manifest is built and immutable afterwards;
/// the same vector weights the loss of the train, validation and test passes
/// so reported losses stay comparable. Accuracy stays unweighted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeights {
    weights: Vec<f64>,
}

impl ClassWeights {
    /// Count labels over the training records. Absent-label records do not
    /// contribute to the counts.
    pub fn from_records(records: &[ExampleRecord]) -> Result<Self> {
        let mut counts = [0usize; CLASS_NAMES.len()];
        records
            .iter()
            .filter_map(|record| record.label)
            .for_each(|label| counts[label.class_index() as usize] += 1);
        Self::from_counts(&counts)
    }

    /// `weight[c] = total / count[c]`, then normalize the vector to sum 1.
    pub fn from_counts(counts: &[usize]) -> Result<Self> {
        let total: usize = counts.iter().sum();
        ensure!(total > 0, "no labeled examples to balance");

        let raw: Vec<f64> = counts
            .iter()
            .enumerate()
            .map(|(index, &count)| {
                ensure!(
                    count > 0,
                    "class {} has no examples in the training split",
                    index
                );
                Ok(total as f64 / count as f64)
            })
            .try_collect()?;

        let norm: f64 = raw.iter().sum();
        Ok(Self {
            weights: raw.into_iter().map(|weight| weight / norm).collect(),
        })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    pub fn to_tensor(&self, device: Device) -> Tensor {
        let weights: Vec<f32> = self.weights.iter().map(|&weight| weight as f32).collect();
        Tensor::of_slice(&weights).to_device(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn inverse_frequency_weights() {
        let weights = ClassWeights::from_counts(&[800, 200]).unwrap();
        let slice = weights.as_slice();

        // raw weights 1.25 and 5.0, normalized to sum 1 with the 1:4 ratio
        // preserved
        assert_abs_diff_eq!(slice[0], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(slice[1], 0.8, epsilon = 1e-9);
        assert_abs_diff_eq!(slice.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(slice[1] / slice[0], 4.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_class_is_an_error() {
        assert!(ClassWeights::from_counts(&[10, 0]).is_err());
        assert!(ClassWeights::from_counts(&[0, 0]).is_err());
    }

    #[test]
    fn weight_tensor_shape() {
        let weights = ClassWeights::from_counts(&[3, 1]).unwrap();
        let tensor = weights.to_tensor(Device::Cpu);
        assert_eq!(tensor.size(), &[2]);
    }
}
