use crate::balance::ClassWeights;
use crate::common::*;

/// Cross-entropy over class logits with fixed per-class weights.
///
/// Reduction follows the weighted-mean convention: the sum of weighted
/// per-sample losses divided by the sum of the picked weights.
#[derive(Debug)]
pub struct WeightedCrossEntropy {
    weights: Tensor,
}

impl WeightedCrossEntropy {
    pub fn new(class_weights: &ClassWeights, device: Device) -> Self {
        let weights = class_weights.to_tensor(device).set_requires_grad(false);
        Self { weights }
    }

    /// `logits` is `[batch_size, num_classes]`, `targets` a `[batch_size]`
    /// int64 tensor of class indices.
    pub fn forward(&self, logits: &Tensor, targets: &Tensor) -> Tensor {
        debug_assert!(targets.kind() == Kind::Int64, "expect int64 targets");

        let log_probs = logits.log_softmax(-1, Kind::Float);
        let picked = log_probs.gather(1, &targets.unsqueeze(1), false).view([-1]);
        let sample_weights = self.weights.gather(0, targets, false);

        let weighted = (&sample_weights * &picked).sum(Kind::Float);
        -(weighted / sample_weights.sum(Kind::Float))
    }
}

/// Fraction of correct argmax predictions; unweighted.
pub fn accuracy(logits: &Tensor, targets: &Tensor) -> Result<f64> {
    let (batch_size, _num_classes) = logits.size2()?;
    ensure!(batch_size > 0, "cannot compute accuracy of an empty batch");

    let (_scores, predictions) = logits.max_dim(1, false);
    let correct = i64::from(predictions.eq_tensor(targets).count_nonzero(0));
    Ok(correct as f64 / batch_size as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn matches_hand_computed_weighted_mean() {
        let weights = ClassWeights::from_counts(&[3, 1]).unwrap();
        let loss_fn = WeightedCrossEntropy::new(&weights, Device::Cpu);

        let logits = Tensor::of_slice(&[2.0f32, 0.0, 1.0, 3.0]).view([2, 2]);
        let targets = Tensor::of_slice(&[0i64, 1]);
        let loss = f64::from(&loss_fn.forward(&logits, &targets));

        // per-sample -log softmax picked at the target index
        let loss0 = -(2.0f64 - (2.0f64.exp() + 0.0f64.exp()).ln());
        let loss1 = -(3.0f64 - (1.0f64.exp() + 3.0f64.exp()).ln());
        let (w0, w1) = (weights.as_slice()[0], weights.as_slice()[1]);
        let expected = (w0 * loss0 + w1 * loss1) / (w0 + w1);

        assert_abs_diff_eq!(loss, expected, epsilon = 1e-5);
    }

    #[test]
    fn uniform_weights_reduce_to_plain_mean() {
        let weights = ClassWeights::from_counts(&[5, 5]).unwrap();
        let loss_fn = WeightedCrossEntropy::new(&weights, Device::Cpu);

        let logits = Tensor::of_slice(&[0.5f32, -0.5, -1.0, 1.0]).view([2, 2]);
        let targets = Tensor::of_slice(&[1i64, 1]);
        let loss = f64::from(&loss_fn.forward(&logits, &targets));

        let loss0 = -(-0.5f64 - (0.5f64.exp() + (-0.5f64).exp()).ln());
        let loss1 = -(1.0f64 - ((-1.0f64).exp() + 1.0f64.exp()).ln());
        assert_abs_diff_eq!(loss, (loss0 + loss1) / 2.0, epsilon = 1e-5);
    }

    #[test]
    fn accuracy_counts_argmax_matches() {
        let logits = Tensor::of_slice(&[2.0f32, 0.0, 0.0, 2.0, 2.0, 0.0]).view([3, 2]);
        let targets = Tensor::of_slice(&[0i64, 1, 1]);
        let acc = accuracy(&logits, &targets).unwrap();
        assert_abs_diff_eq!(acc, 2.0 / 3.0, epsilon = 1e-9);
    }
}
