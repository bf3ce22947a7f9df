use crate::common::*;
use super::raster;

/// Sentinel-2 band names in storage order. This list is the ordered
/// reference for positional band matching; band names inside tile files are
/// never compared against it.
pub const SENTINEL2_BANDS: [&str; 13] = [
    "01 - Coastal aerosol",
    "02 - Blue",
    "03 - Green",
    "04 - Red",
    "05 - Vegetation Red Edge",
    "06 - Vegetation Red Edge",
    "07 - Vegetation Red Edge",
    "08 - NIR",
    "08A - Vegetation Red Edge",
    "09 - Water vapour",
    "10 - SWIR - Cirrus",
    "11 - SWIR",
    "12 - SWIR",
];

/// Population statistics of one band across all pixels of all files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStat {
    pub name: String,
    pub mean: f64,
    pub std: f64,
    pub pixel_count: i64,
}

/// Per-band normalization statistics.
///
/// Computed from the training split only and reused verbatim for the
/// validation and test splits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandStatsTable {
    pub bands: Vec<BandStat>,
    /// Files that could not be read during accumulation.
    pub skipped_files: usize,
}

impl BandStatsTable {
    /// Accumulate per-band mean and standard deviation across all pixels of
    /// all readable files, streaming one file at a time.
    ///
    /// Unreadable files are skipped with a warning and counted in
    /// `skipped_files`; per-band pixel counts expose bands with anomalously
    /// few samples.
    pub fn compute<P>(paths: impl IntoIterator<Item = P>, band_names: &[&str]) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let num_bands = band_names.len();
        let mut sums = vec![0f64; num_bands];
        let mut sq_sums = vec![0f64; num_bands];
        let mut pixel_counts = vec![0i64; num_bands];
        let mut skipped_files = 0;

        for path in paths {
            let path = path.as_ref();
            let bands = match raster::read_bands(path) {
                Ok(bands) => bands,
                Err(err) => {
                    warn!("skipping unreadable tile '{}': {:#}", path.display(), err);
                    skipped_files += 1;
                    continue;
                }
            };
            if bands.len() != num_bands {
                warn!(
                    "skipping tile '{}' with {} bands, expected {}",
                    path.display(),
                    bands.len(),
                    num_bands
                );
                skipped_files += 1;
                continue;
            }

            for (index, band) in bands.iter().enumerate() {
                sums[index] += band.pixels.iter().map(|&value| value as f64).sum::<f64>();
                sq_sums[index] += band
                    .pixels
                    .iter()
                    .map(|&value| {
                        let value = value as f64;
                        value * value
                    })
                    .sum::<f64>();
                pixel_counts[index] += band.pixels.len() as i64;
            }
        }

        let bands: Vec<BandStat> = izip!(band_names, sums, sq_sums, pixel_counts)
            .map(|(name, sum, sq_sum, pixel_count)| {
                ensure!(pixel_count > 0, "no pixels accumulated for band '{}'", name);
                let mean = sum / pixel_count as f64;
                // E[x^2] - E[x]^2 may dip below zero from floating-point
                // cancellation; clamp before the square root
                let variance = (sq_sum / pixel_count as f64 - mean * mean).max(0.0);
                Ok(BandStat {
                    name: (*name).to_owned(),
                    mean,
                    std: variance.sqrt(),
                    pixel_count,
                })
            })
            .try_collect()?;

        Ok(Self {
            bands,
            skipped_files,
        })
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    pub fn get(&self, index: usize) -> Option<&BandStat> {
        self.bands.get(index)
    }
}

impl fmt::Display for BandStatsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stat in &self.bands {
            writeln!(
                f,
                "{}: mean={:.6} std={:.6} pixels={}",
                stat.name, stat.mean, stat.std, stat.pixel_count
            )?;
        }
        write!(f, "skipped files: {}", self.skipped_files)
    }
}
