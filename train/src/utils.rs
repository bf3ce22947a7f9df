//! Checkpoint management for the adapter parameters.

use crate::common::*;

pub const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";

/// Metadata persisted next to the best checkpoint; enough to resume
/// evaluation without retraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub val_acc: f64,
    pub file: PathBuf,
}

/// Save the current adapter parameters as the new best checkpoint, drop the
/// previous best file and update the metadata sidecar.
pub fn save_best_checkpoint(
    vs: &nn::VarStore,
    checkpoint_dir: &Path,
    adapter_name: &str,
    epoch: usize,
    val_acc: f64,
    previous: Option<&CheckpointMeta>,
) -> Result<CheckpointMeta> {
    let filename = format!("adapter-{}-e{:03}-va{:.4}.ckpt", adapter_name, epoch, val_acc);
    let file = checkpoint_dir.join(filename);
    vs.save(&file)
        .with_context(|| format!("failed to save checkpoint '{}'", file.display()))?;

    if let Some(previous) = previous {
        if previous.file != file && previous.file.is_file() {
            if let Err(err) = fs::remove_file(&previous.file) {
                warn!(
                    "failed to remove stale checkpoint '{}': {}",
                    previous.file.display(),
                    err
                );
            }
        }
    }

    let meta = CheckpointMeta {
        epoch,
        val_acc,
        file,
    };
    let meta_path = checkpoint_dir.join("best.json");
    fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
        .with_context(|| format!("failed to write '{}'", meta_path.display()))?;

    Ok(meta)
}

/// Save the latest adapter parameters; overwritten every epoch.
pub fn save_last_checkpoint(vs: &nn::VarStore, checkpoint_dir: &Path) -> Result<()> {
    let file = checkpoint_dir.join("last.ckpt");
    vs.save(&file)
        .with_context(|| format!("failed to save checkpoint '{}'", file.display()))?;
    Ok(())
}

/// Restore the best checkpoint recorded in the metadata sidecar.
pub fn load_best_checkpoint(vs: &mut nn::VarStore, checkpoint_dir: &Path) -> Result<CheckpointMeta> {
    let meta_path = checkpoint_dir.join("best.json");
    let text = fs::read_to_string(&meta_path)
        .with_context(|| format!("no best-checkpoint metadata at '{}'", meta_path.display()))?;
    let meta: CheckpointMeta = serde_json::from_str(&text)?;
    vs.load(&meta.file)
        .with_context(|| format!("failed to load checkpoint '{}'", meta.file.display()))?;
    Ok(meta)
}
