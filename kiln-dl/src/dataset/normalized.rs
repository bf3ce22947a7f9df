use crate::common::*;
use super::{raster, BandStatsTable, ExampleRecord};

/// Random-access dataset of normalized multi-band tiles.
///
/// Band statistics come from the training split and are shared by the
/// datasets of all three splits; see [`BandStatsTable`].
#[derive(Debug)]
pub struct NormalizedTileDataset {
    records: Vec<ExampleRecord>,
    stats: Arc<BandStatsTable>,
}

impl NormalizedTileDataset {
    pub fn new(records: Vec<ExampleRecord>, stats: Arc<BandStatsTable>) -> Result<Self> {
        ensure!(
            stats.num_bands() == raster::NUM_BANDS,
            "band statistics cover {} bands, expected {}",
            stats.num_bands(),
            raster::NUM_BANDS
        );
        Ok(Self { records, stats })
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[ExampleRecord] {
        &self.records
    }

    /// Read, normalize and stack the nth tile.
    ///
    /// Returns the `[13, H, W]` float tensor and the integer class label.
    /// Bands are normalized `(x - mean) / std` by their storage position.
    /// Unlike the statistics phase, a read failure here is an error: silent
    /// zero-filling would corrupt gradients and metrics.
    pub fn nth(&self, index: usize) -> Result<(Tensor, i64)> {
        let record = self.records.get(index).ok_or_else(|| {
            format_err!(
                "record index {} out of bounds ({} records)",
                index,
                self.records.len()
            )
        })?;
        let label = record.label.ok_or_else(|| {
            format_err!(
                "image '{}' in split '{}' has no label in the label map",
                record.image_id,
                record.split
            )
        })?;

        let bands = raster::read_bands(&record.filename)
            .with_context(|| format!("failed to load tile for image '{}'", record.image_id))?;
        ensure!(
            bands.len() == self.stats.num_bands(),
            "tile for image '{}' has {} bands, statistics cover {}",
            record.image_id,
            bands.len(),
            self.stats.num_bands()
        );

        let band_tensors: Vec<Tensor> = bands
            .iter()
            .zip(self.stats.bands.iter())
            .map(|(band, stat)| -> Result<_> {
                let (height, width) = band.pixels.dim();
                let pixels = band.pixels.as_slice().ok_or_else(|| {
                    format_err!("band '{}' of image '{}' is not contiguous", band.name, record.image_id)
                })?;
                let tensor = Tensor::of_slice(pixels).view([height as i64, width as i64]);
                Ok((tensor - stat.mean) / stat.std)
            })
            .try_collect()?;

        let image = Tensor::stack(&band_tensors, 0);
        Ok((image, label.class_index()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{KilnLabel, Split, SENTINEL2_BANDS};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use ndarray_npy::NpzWriter;

    fn write_tile(path: &Path, height: usize, width: usize) {
        let mut npz = NpzWriter::new(File::create(path).unwrap());
        for (index, name) in SENTINEL2_BANDS.iter().enumerate() {
            let band = Array2::<f32>::from_shape_fn((height, width), |(row, col)| {
                index as f32 * 10.0 + row as f32 + col as f32 * 0.5
            });
            npz.add_array(*name, &band).unwrap();
        }
        npz.finish().unwrap();
    }

    fn record(path: &Path, label: Option<KilnLabel>) -> ExampleRecord {
        ExampleRecord {
            image_id: "tile-0".into(),
            filename: path.to_owned(),
            split: Split::Train,
            label,
        }
    }

    #[test]
    fn normalization_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile-0.npz");
        write_tile(&path, 4, 4);

        let stats = Arc::new(
            BandStatsTable::compute(&[&path], &SENTINEL2_BANDS).unwrap(),
        );
        let dataset = NormalizedTileDataset::new(
            vec![record(&path, Some(KilnLabel::BrickKiln))],
            stats.clone(),
        )
        .unwrap();

        let (image, label) = dataset.nth(0).unwrap();
        assert_eq!(image.size(), &[13, 4, 4]);
        assert_eq!(label, 1);

        // de-normalizing recovers the raw pixel values
        for band_index in [0usize, 7, 12] {
            let stat = stats.get(band_index).unwrap();
            let normalized = image.double_value(&[band_index as i64, 1, 2]);
            let recovered = normalized * stat.std + stat.mean;
            let raw = band_index as f64 * 10.0 + 1.0 + 2.0 * 0.5;
            assert_abs_diff_eq!(recovered, raw, epsilon = 1e-4);
        }
    }

    #[test]
    fn absent_label_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile-0.npz");
        write_tile(&path, 4, 4);

        let stats = Arc::new(
            BandStatsTable::compute(&[&path], &SENTINEL2_BANDS).unwrap(),
        );
        let dataset =
            NormalizedTileDataset::new(vec![record(&path, None)], stats).unwrap();

        let err = dataset.nth(0).unwrap_err();
        assert!(err.to_string().contains("tile-0"));
    }

    #[test]
    fn unreadable_tile_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("tile-0.npz");
        write_tile(&good, 4, 4);

        let stats = Arc::new(
            BandStatsTable::compute(&[&good], &SENTINEL2_BANDS).unwrap(),
        );
        let missing = dir.path().join("gone.npz");
        let dataset = NormalizedTileDataset::new(
            vec![record(&missing, Some(KilnLabel::NotBrickKiln))],
            stats,
        )
        .unwrap();

        assert!(dataset.nth(0).is_err());
    }
}
