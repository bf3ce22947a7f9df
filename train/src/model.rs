//! The classifier assembly: trainable adapter in front of the frozen
//! zero-shot head.

use crate::{common::*, config::AdapterConfig, data::Batch};

pub struct KilnClassifier {
    /// Holds the adapter parameters and nothing else; handing `vs` to the
    /// optimizer is what restricts training to the adapter.
    pub vs: nn::VarStore,
    adapter: ChannelAdapter,
    head: ZeroShotHead,
    loss_fn: WeightedCrossEntropy,
}

impl KilnClassifier {
    pub fn new(
        adapter_config: &AdapterConfig,
        backbone: Arc<dyn VisionLanguageBackbone>,
        class_weights: &ClassWeights,
        device: Device,
    ) -> Result<Self> {
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let adapter = match *adapter_config {
            AdapterConfig::Linear => ChannelAdapter::linear(&root / "adapter", NUM_BANDS),
            AdapterConfig::Mlp { hidden_channels } => {
                ChannelAdapter::mlp(&root / "adapter", NUM_BANDS, hidden_channels)
            }
        };
        let head = ZeroShotHead::new(backbone, &CLASS_NAMES, device)?;
        let loss_fn = WeightedCrossEntropy::new(class_weights, device);

        Ok(Self {
            vs,
            adapter,
            head,
            loss_fn,
        })
    }

    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }

    /// Cosine-similarity logits against the cached class text embeddings.
    pub fn predict_logits(&self, images: &Tensor) -> Result<Tensor> {
        let adapted = self.adapter.forward(images);
        self.head.forward(&adapted)
    }

    /// Weighted loss and unweighted accuracy for one batch.
    pub fn step(&self, batch: &Batch) -> Result<(Tensor, f64)> {
        let logits = self.predict_logits(&batch.images)?;
        let loss = self.loss_fn.forward(&logits, &batch.labels);
        let acc = accuracy(&logits, &batch.labels)?;
        Ok((loss, acc))
    }
}
