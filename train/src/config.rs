//! Training program configuration format.

use crate::common::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

/// Dataset location options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// The directory holding the tiles and the manifest files.
    pub data_dir: PathBuf,
    /// Split manifest file name within `data_dir`.
    #[serde(default = "default_partition_file")]
    pub partition_file: PathBuf,
    /// Label map file name within `data_dir`.
    #[serde(default = "default_label_map_file")]
    pub label_map_file: PathBuf,
}

/// Model options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// TorchScript export of the frozen CLIP backbone.
    pub backbone_file: PathBuf,
    /// The channel-adapter variant put in front of the backbone.
    pub adapter: AdapterConfig,
}

/// The channel-adapter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterConfig {
    /// Single per-pixel linear projection.
    Linear,
    /// Per-pixel two-stage projection with rectification.
    Mlp {
        #[serde(default = "default_hidden_channels")]
        hidden_channels: usize,
    },
}

impl AdapterConfig {
    /// Map the numeric command-line selector to a variant.
    pub fn from_selector(selector: u32) -> Result<Self> {
        match selector {
            1 => Ok(Self::Linear),
            2 => Ok(Self::Mlp {
                hidden_channels: default_hidden_channels(),
            }),
            other => bail!("unsupported adapter variant {}, choose 1 or 2", other),
        }
    }
}

/// The training options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// The batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: NonZeroUsize,
    /// The optimizer learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: R64,
    /// The maximum number of fit epochs; overridden by the command line.
    #[serde(default = "default_max_epochs")]
    pub max_epochs: NonZeroUsize,
    /// Stop fitting after this many epochs without val_acc improvement.
    pub early_stop_patience: Option<NonZeroUsize>,
    /// The maximum number of waiting records per data-loading stage.
    pub worker_buf_size: Option<usize>,
    /// The device the training run works on.
    #[serde(with = "tch_serde::serde_device", default = "default_device")]
    pub device: Device,
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

fn default_partition_file() -> PathBuf {
    PathBuf::from("default_partition.json")
}

fn default_label_map_file() -> PathBuf {
    PathBuf::from("label_map.json")
}

fn default_hidden_channels() -> usize {
    64
}

fn default_batch_size() -> NonZeroUsize {
    NonZeroUsize::new(32).unwrap()
}

fn default_learning_rate() -> R64 {
    r64(1e-3)
}

fn default_max_epochs() -> NonZeroUsize {
    NonZeroUsize::new(10).unwrap()
}

fn default_device() -> Device {
    Device::cuda_if_available()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_maps_to_variant() {
        assert_eq!(AdapterConfig::from_selector(1).unwrap(), AdapterConfig::Linear);
        assert_eq!(
            AdapterConfig::from_selector(2).unwrap(),
            AdapterConfig::Mlp {
                hidden_channels: 64
            }
        );
        assert!(AdapterConfig::from_selector(0).is_err());
        assert!(AdapterConfig::from_selector(3).is_err());
    }

    #[test]
    fn parses_json5_config() {
        let text = r#"{
            dataset: {
                data_dir: "data/m-brick-kiln",
            },
            model: {
                backbone_file: "clip-vit-b32.pt",
                adapter: { kind: "mlp" },
            },
            training: {
                batch_size: 16,
                early_stop_patience: 3,
                worker_buf_size: 4,
            },
            logging: {
                dir: "logs",
            },
        }"#;
        let config: Config = json5::from_str(text).unwrap();

        assert_eq!(
            config.dataset.partition_file,
            PathBuf::from("default_partition.json")
        );
        assert_eq!(
            config.model.adapter,
            AdapterConfig::Mlp {
                hidden_channels: 64
            }
        );
        assert_eq!(config.training.batch_size.get(), 16);
        assert_eq!(config.training.learning_rate, r64(1e-3));
        assert_eq!(config.training.early_stop_patience.map(NonZeroUsize::get), Some(3));
    }
}
