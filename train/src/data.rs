//! Batched tile streams with parallel prefetch workers.

use crate::common::*;

/// One batch of normalized tiles and their class labels.
#[derive(Debug)]
pub struct Batch {
    /// `[B, 13, H, W]` float tensor.
    pub images: Tensor,
    /// `[B]` int64 tensor.
    pub labels: Tensor,
}

impl Batch {
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            images: self.images.to_device(device),
            labels: self.labels.to_device(device),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.size()[0] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stream batches from the dataset.
///
/// Worker tasks only read and normalize tiles; they never touch model
/// state. `shuffle_seed` selects the shuffled training order for one epoch,
/// `None` keeps the stable evaluation order. The trailing partial batch is
/// kept.
pub fn batch_stream(
    dataset: Arc<NormalizedTileDataset>,
    batch_size: usize,
    worker_buf_size: Option<usize>,
    shuffle_seed: Option<u64>,
) -> Pin<Box<dyn Stream<Item = Result<Batch>> + Send>> {
    let mut indexes: Vec<usize> = (0..dataset.num_records()).collect();
    if let Some(seed) = shuffle_seed {
        indexes.shuffle(&mut StdRng::seed_from_u64(seed));
    }

    let stream = stream::iter(indexes.into_iter().map(Fallible::Ok));

    // read and normalize tiles on blocking workers
    let stream = stream.try_par_then(worker_buf_size, move |index| {
        let dataset = dataset.clone();
        async move {
            let sample = tokio::task::spawn_blocking(move || dataset.nth(index)).await??;
            Fallible::Ok(sample)
        }
    });

    // group into batches
    let stream = stream.chunks(batch_size).map(|chunk| -> Result<Batch> {
        let samples: Vec<(Tensor, i64)> = chunk.into_iter().try_collect()?;
        let (images, labels): (Vec<_>, Vec<_>) = samples.into_iter().unzip();
        Ok(Batch {
            images: Tensor::stack(&images, 0),
            labels: Tensor::of_slice(&labels),
        })
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_dl::dataset::KilnLabel;
    use ndarray::Array2;
    use ndarray_npy::NpzWriter;
    use std::fs::File;

    fn write_tile(path: &Path, fill: f32) {
        let mut npz = NpzWriter::new(File::create(path).unwrap());
        for (index, name) in SENTINEL2_BANDS.iter().enumerate() {
            let band = Array2::<f32>::from_elem((8, 8), fill + index as f32);
            npz.add_array(*name, &band).unwrap();
        }
        npz.finish().unwrap();
    }

    fn build_dataset(dir: &Path, num_records: usize) -> Arc<NormalizedTileDataset> {
        let records: Vec<ExampleRecord> = (0..num_records)
            .map(|index| {
                let filename = dir.join(format!("tile-{}.npz", index));
                write_tile(&filename, index as f32 * 0.3);
                ExampleRecord {
                    image_id: format!("tile-{}", index),
                    filename,
                    split: Split::Train,
                    label: Some(if index % 2 == 0 {
                        KilnLabel::NotBrickKiln
                    } else {
                        KilnLabel::BrickKiln
                    }),
                }
            })
            .collect();
        let paths: Vec<PathBuf> = records.iter().map(|record| record.filename.clone()).collect();
        let stats = Arc::new(BandStatsTable::compute(&paths, &SENTINEL2_BANDS).unwrap());
        Arc::new(NormalizedTileDataset::new(records, stats).unwrap())
    }

    #[tokio::test]
    async fn batches_cover_the_dataset_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = build_dataset(dir.path(), 5);

        let batches: Vec<Batch> = batch_stream(dataset, 2, None, None)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].images.size(), &[2, 13, 8, 8]);
        assert_eq!(batches[0].len(), 2);
        // the trailing partial batch is kept
        assert_eq!(batches[2].len(), 1);

        // stable evaluation order
        let labels: Vec<i64> = batches
            .iter()
            .flat_map(|batch| Vec::<i64>::from(&batch.labels))
            .collect();
        assert_eq!(labels, &[0, 1, 0, 1, 0]);
    }

    #[tokio::test]
    async fn shuffled_stream_is_a_permutation() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = build_dataset(dir.path(), 6);

        let batches: Vec<Batch> = batch_stream(dataset, 3, None, Some(7))
            .try_collect()
            .await
            .unwrap();

        let mut labels: Vec<i64> = batches
            .iter()
            .flat_map(|batch| Vec::<i64>::from(&batch.labels))
            .collect();
        assert_eq!(labels.len(), 6);
        labels.sort_unstable();
        assert_eq!(labels, &[0, 0, 0, 1, 1, 1]);
    }
}
