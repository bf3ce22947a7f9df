use crate::common::*;
use super::VisionLanguageBackbone;

/// Logit scale convention of contrastively pretrained vision-language
/// models.
pub const LOGIT_SCALE: f64 = 100.0;

/// Input normalization constants of the frozen backbone. Non-negotiable:
/// they match the distribution the image encoder was pretrained on.
pub const CLIP_PIXEL_MEAN: [f64; 3] = [0.48145466, 0.4578275, 0.40821073];
pub const CLIP_PIXEL_STD: [f64; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Zero-shot classification head over a frozen backbone.
///
/// Class text embeddings are computed once at construction from fixed
/// prompts and cached for the run; the class names never change, so
/// recomputation would be wasted work.
#[derive(Debug)]
pub struct ZeroShotHead {
    backbone: Arc<dyn VisionLanguageBackbone>,
    text_features: Tensor,
    pixel_mean: Tensor,
    pixel_std: Tensor,
}

impl ZeroShotHead {
    pub fn new(
        backbone: Arc<dyn VisionLanguageBackbone>,
        class_names: &[&str],
        device: Device,
    ) -> Result<Self> {
        ensure!(!class_names.is_empty(), "no class names given");

        let text_features = tch::no_grad(|| -> Result<Tensor> {
            let embeddings: Vec<Tensor> = class_names
                .iter()
                .map(|name| -> Result<_> {
                    let prompt = format!("a satellite photo of {}", name.to_lowercase());
                    let tokens = backbone.tokenize(&prompt)?.to_device(device);
                    backbone.encode_text(&tokens)
                })
                .try_collect()?;
            let features = Tensor::cat(&embeddings, 0);
            Ok(l2_normalize(&features).detach())
        })?;
        ensure!(
            text_features.size2()? == (class_names.len() as i64, backbone.embed_dim()),
            "text features have size {:?}, expected [{}, {}]",
            text_features.size(),
            class_names.len(),
            backbone.embed_dim()
        );

        let pixel_mean = Tensor::of_slice(&CLIP_PIXEL_MEAN)
            .to_kind(Kind::Float)
            .view([1, 3, 1, 1])
            .to_device(device);
        let pixel_std = Tensor::of_slice(&CLIP_PIXEL_STD)
            .to_kind(Kind::Float)
            .view([1, 3, 1, 1])
            .to_device(device);

        Ok(Self {
            backbone,
            text_features,
            pixel_mean,
            pixel_std,
        })
    }

    /// Resize adapted images to the backbone's native resolution and apply
    /// its input normalization. Bilinear, no antialiasing, differentiable.
    pub fn preprocess(&self, images: &Tensor) -> Tensor {
        let resolution = self.backbone.input_resolution();
        let resized = images.upsample_bilinear2d(&[resolution, resolution], false, None, None);
        (resized - &self.pixel_mean) / &self.pixel_std
    }

    /// Cosine-similarity logits against the cached class text embeddings.
    pub fn forward(&self, images: &Tensor) -> Result<Tensor> {
        let inputs = self.preprocess(images);
        let features = self.backbone.encode_image(&inputs)?;
        let features = l2_normalize(&features);
        let logits = features.matmul(&self.text_features.transpose(0, 1)) * LOGIT_SCALE;
        Ok(logits)
    }

    pub fn text_features(&self) -> &Tensor {
        &self.text_features
    }
}

fn l2_normalize(features: &Tensor) -> Tensor {
    features / features.norm_scalaropt_dim(2.0, &[-1], true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Deterministic stand-in for the frozen backbone.
    #[derive(Debug)]
    struct StubBackbone {
        embed_dim: i64,
    }

    impl VisionLanguageBackbone for StubBackbone {
        fn embed_dim(&self) -> i64 {
            self.embed_dim
        }

        fn input_resolution(&self) -> i64 {
            32
        }

        fn tokenize(&self, text: &str) -> Result<Tensor> {
            let ids: Vec<i64> = text.bytes().take(8).map(|byte| byte as i64).collect();
            Ok(Tensor::of_slice(&ids).view([1, ids.len() as i64]))
        }

        fn encode_text(&self, tokens: &Tensor) -> Result<Tensor> {
            let token_sum = f64::from(tokens.to_kind(Kind::Float).sum(Kind::Float));
            let base = Tensor::arange(self.embed_dim, (Kind::Float, Device::Cpu));
            Ok(((base + 1.0) * token_sum * 0.01).sin().unsqueeze(0))
        }

        fn encode_image(&self, images: &Tensor) -> Result<Tensor> {
            let pooled = images.mean_dim(&[2, 3], false, Kind::Float);
            let weight = (Tensor::arange(3 * self.embed_dim, (Kind::Float, Device::Cpu))
                .view([3, self.embed_dim])
                * 0.1)
                .sin();
            Ok(pooled.matmul(&weight))
        }
    }

    #[test]
    fn text_features_are_unit_norm() {
        let backbone = Arc::new(StubBackbone { embed_dim: 16 });
        let head = ZeroShotHead::new(backbone, &["not brick kiln", "brick kiln"], Device::Cpu)
            .unwrap();

        let features = head.text_features();
        assert_eq!(features.size(), &[2, 16]);
        for row in 0..2 {
            let norm = f64::from(
                features
                    .get(row)
                    .norm_scalaropt_dim(2.0, &[-1], false),
            );
            assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn logits_have_one_column_per_class() {
        let backbone = Arc::new(StubBackbone { embed_dim: 16 });
        let head = ZeroShotHead::new(backbone, &["not brick kiln", "brick kiln"], Device::Cpu)
            .unwrap();

        let images = Tensor::randn(&[3, 3, 64, 64], (Kind::Float, Device::Cpu));
        let logits = head.forward(&images).unwrap();
        assert_eq!(logits.size(), &[3, 2]);
        assert!(bool::from(logits.isfinite().all()));
    }

    #[test]
    fn preprocess_resizes_to_backbone_resolution() {
        let backbone = Arc::new(StubBackbone { embed_dim: 8 });
        let head = ZeroShotHead::new(backbone, &["not brick kiln", "brick kiln"], Device::Cpu)
            .unwrap();

        let images = Tensor::randn(&[2, 3, 64, 64], (Kind::Float, Device::Cpu));
        let processed = head.preprocess(&images);
        assert_eq!(processed.size(), &[2, 3, 32, 32]);
    }
}
