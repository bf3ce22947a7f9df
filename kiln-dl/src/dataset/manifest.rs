use crate::common::*;
use super::{raster::TILE_EXTENSION, ExampleRecord, KilnLabel, Split};

/// Per-split example records joined from a split manifest and a label map.
#[derive(Debug, Clone)]
pub struct Manifest {
    records: HashMap<Split, Vec<ExampleRecord>>,
}

impl Manifest {
    /// Join the split manifest and the label map into per-split records.
    ///
    /// The label map is inverted once (image id -> label) before the join.
    /// Ids without a label yield records with an absent label; the records
    /// are kept so downstream consumers decide whether that is fatal.
    pub fn load(
        data_dir: impl AsRef<Path>,
        partition_file: impl AsRef<Path>,
        label_map_file: impl AsRef<Path>,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let partition = load_partition(&data_dir.join(partition_file.as_ref()))?;
        let image_to_label = load_label_map(&data_dir.join(label_map_file.as_ref()))?;

        let mut missing_labels = 0;
        let records: HashMap<Split, Vec<ExampleRecord>> = Split::ALL
            .iter()
            .map(|&split| {
                let records: Vec<ExampleRecord> = partition[&split]
                    .iter()
                    .map(|image_id| {
                        let label = image_to_label.get(image_id.as_str()).copied();
                        if label.is_none() {
                            missing_labels += 1;
                        }
                        ExampleRecord {
                            image_id: image_id.clone(),
                            filename: data_dir
                                .join(format!("{}.{}", image_id, TILE_EXTENSION)),
                            split,
                            label,
                        }
                    })
                    .collect();
                (split, records)
            })
            .collect();

        info!(
            "splits: train={} valid={} test={}",
            records[&Split::Train].len(),
            records[&Split::Valid].len(),
            records[&Split::Test].len()
        );
        if missing_labels > 0 {
            warn!("{} images have no label in the label map", missing_labels);
        }

        Ok(Self { records })
    }

    pub fn split(&self, split: Split) -> &[ExampleRecord] {
        &self.records[&split]
    }
}

fn load_partition(path: &Path) -> Result<HashMap<Split, Vec<String>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read split manifest '{}'", path.display()))?;
    let raw: HashMap<String, Vec<String>> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse split manifest '{}'", path.display()))?;

    let mut splits = HashMap::new();
    for (key, ids) in raw {
        let split = match key.as_str() {
            "train" => Split::Train,
            "valid" => Split::Valid,
            "test" => Split::Test,
            other => bail!("unknown split '{}' in '{}'", other, path.display()),
        };
        splits.insert(split, ids);
    }
    for split in Split::ALL {
        ensure!(
            splits.contains_key(&split),
            "split '{}' missing from '{}'",
            split,
            path.display()
        );
    }

    Ok(splits)
}

/// Invert the label map to image id -> label. An id listed under both
/// classes is a fatal configuration error.
fn load_label_map(path: &Path) -> Result<HashMap<String, KilnLabel>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read label map '{}'", path.display()))?;
    let raw: HashMap<String, Vec<String>> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse label map '{}'", path.display()))?;

    let mut image_to_label = HashMap::new();
    for (key, ids) in &raw {
        let label = KilnLabel::from_key(key)
            .with_context(|| format!("in label map '{}'", path.display()))?;
        for image_id in ids {
            if let Some(previous) = image_to_label.insert(image_id.clone(), label) {
                ensure!(
                    previous == label,
                    "image '{}' appears under both classes in '{}'",
                    image_id,
                    path.display()
                );
            }
        }
    }

    Ok(image_to_label)
}
