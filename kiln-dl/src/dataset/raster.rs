use crate::common::*;
use ndarray_npy::NpzReader;

/// Number of spectral bands per tile.
pub const NUM_BANDS: usize = 13;

/// Tile file extension.
pub const TILE_EXTENSION: &str = "npz";

/// One named spectral band read from a tile file.
#[derive(Debug, Clone)]
pub struct RasterBand {
    pub name: String,
    pub pixels: Array2<f32>,
}

/// Read the named bands of a tile in storage order.
///
/// Every band must be a 2-D f32 array, and all bands of one file must share
/// the same height and width. Sizes may differ across files.
pub fn read_bands(path: &Path) -> Result<Vec<RasterBand>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open tile '{}'", path.display()))?;
    let mut npz = NpzReader::new(file)
        .with_context(|| format!("failed to parse tile '{}'", path.display()))?;

    let names = npz
        .names()
        .with_context(|| format!("failed to list bands of '{}'", path.display()))?;
    ensure!(
        names.len() == NUM_BANDS,
        "tile '{}' has {} bands, expected {}",
        path.display(),
        names.len(),
        NUM_BANDS
    );

    let bands: Vec<RasterBand> = names
        .iter()
        .map(|entry| -> Result<_> {
            let pixels: Array2<f32> = npz.by_name(entry).with_context(|| {
                format!("failed to read band '{}' of '{}'", entry, path.display())
            })?;
            let name = entry.strip_suffix(".npy").unwrap_or(entry).to_owned();
            Ok(RasterBand { name, pixels })
        })
        .try_collect()?;

    let (height, width) = bands[0].pixels.dim();
    for band in &bands[1..] {
        ensure!(
            band.pixels.dim() == (height, width),
            "band '{}' of '{}' has shape {:?}, expected {:?}",
            band.name,
            path.display(),
            band.pixels.dim(),
            (height, width)
        );
    }

    Ok(bands)
}
