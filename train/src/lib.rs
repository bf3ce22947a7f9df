//! The training program for the brick-kiln channel adapter.

pub mod common;
pub mod config;
pub mod data;
pub mod logging;
pub mod message;
pub mod model;
pub mod train;
pub mod utils;

use crate::{common::*, config::Config, model::KilnClassifier};

/// The entry of the training program.
pub async fn start(config: Arc<Config>) -> Result<()> {
    let start_time = Local::now();
    let logging_dir: Arc<PathBuf> = Arc::new(
        config
            .logging
            .dir
            .join(format!("{}", start_time.format(utils::FILE_STRFTIME))),
    );
    let checkpoint_dir = Arc::new(logging_dir.join("checkpoints"));

    // create dirs and save the resolved config
    {
        tokio::fs::create_dir_all(&*logging_dir).await?;
        tokio::fs::create_dir_all(&*checkpoint_dir).await?;
        let path = logging_dir.join("config.json5");
        let text = serde_json::to_string_pretty(&*config)?;
        tokio::fs::write(&path, text).await?;
    }

    // join the split manifest and the label map
    info!("loading dataset manifest");
    let manifest = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            Manifest::load(
                &config.dataset.data_dir,
                &config.dataset.partition_file,
                &config.dataset.label_map_file,
            )
        })
        .await??
    };

    // band statistics from the training split only; the valid/test datasets
    // reuse the same table
    info!("computing band statistics over the training split");
    let stats = {
        let train_paths: Vec<PathBuf> = manifest
            .split(Split::Train)
            .iter()
            .map(|record| record.filename.clone())
            .collect();
        let stats = tokio::task::spawn_blocking(move || {
            BandStatsTable::compute(&train_paths, &SENTINEL2_BANDS)
        })
        .await??;
        info!("band statistics:\n{}", stats);
        if stats.skipped_files > 0 {
            warn!(
                "{} training tiles were skipped during statistics computation",
                stats.skipped_files
            );
        }
        let path = logging_dir.join("band_stats.json");
        tokio::fs::write(&path, serde_json::to_string_pretty(&stats)?).await?;
        Arc::new(stats)
    };

    // inverse-frequency class weights from the training split
    let class_weights = ClassWeights::from_records(manifest.split(Split::Train))?;
    info!("class weights: {:?}", class_weights.as_slice());

    let train_set = Arc::new(NormalizedTileDataset::new(
        manifest.split(Split::Train).to_vec(),
        stats.clone(),
    )?);
    let valid_set = Arc::new(NormalizedTileDataset::new(
        manifest.split(Split::Valid).to_vec(),
        stats.clone(),
    )?);
    let test_set = Arc::new(NormalizedTileDataset::new(
        manifest.split(Split::Test).to_vec(),
        stats,
    )?);

    // frozen backbone and the assembled classifier
    let device = config.training.device;
    info!(
        "loading frozen backbone from '{}'",
        config.model.backbone_file.display()
    );
    let backbone: Arc<dyn VisionLanguageBackbone> =
        Arc::new(ScriptedClip::load(&config.model.backbone_file, device)?);
    let model = KilnClassifier::new(&config.model.adapter, backbone, &class_weights, device)?;
    info!("training adapter variant '{}'", model.adapter_name());

    // create channels
    let (logging_tx, logging_rx) = mpsc::channel(2);

    // start logger
    let logging_future = logging::logging_worker(logging_dir.clone(), logging_rx);

    // training worker
    let training_future = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            train::training_worker(
                config,
                model,
                train_set,
                valid_set,
                test_set,
                checkpoint_dir,
                logging_tx,
            )
        })
        .map(|result| Fallible::Ok(result??))
    };

    futures::try_join!(training_future, logging_future)?;

    Ok(())
}
