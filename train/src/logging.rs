//! Metrics logging worker: CSV rows and TensorBoard scalar events.

use crate::{common::*, message::LoggingMessage};

/// One row of `metrics.csv`. Columns not applying to the row's phase stay
/// empty, matching the sparse layout of common CSV experiment loggers.
#[derive(Debug, Clone, Serialize)]
struct MetricsRow {
    phase: &'static str,
    epoch: Option<usize>,
    train_loss: Option<f64>,
    train_acc: Option<f64>,
    val_loss: Option<f64>,
    val_acc: Option<f64>,
    test_loss: Option<f64>,
    test_acc: Option<f64>,
}

impl MetricsRow {
    fn empty(phase: &'static str, epoch: Option<usize>) -> Self {
        Self {
            phase,
            epoch,
            train_loss: None,
            train_acc: None,
            val_loss: None,
            val_acc: None,
            test_loss: None,
            test_acc: None,
        }
    }
}

/// Consume metric messages until the channel closes, writing each as a
/// flushed CSV row and as TensorBoard scalars.
pub async fn logging_worker(
    logging_dir: Arc<PathBuf>,
    mut rx: mpsc::Receiver<LoggingMessage>,
) -> Result<()> {
    // tensorboard events
    let event_dir = logging_dir.join("events");
    tokio::fs::create_dir_all(&event_dir).await?;
    let event_path_prefix = event_dir
        .join("kiln-dl")
        .into_os_string()
        .into_string()
        .map_err(|_| format_err!("non-UTF-8 logging path"))?;
    let mut event_writer = EventWriterInit::default()
        .from_prefix_async(event_path_prefix, None)
        .await?;

    // csv metrics
    let metrics_path = logging_dir.join("metrics.csv");
    let mut csv_writer = csv::Writer::from_path(&metrics_path)
        .with_context(|| format!("failed to create '{}'", metrics_path.display()))?;

    while let Some(msg) = rx.recv().await {
        match msg {
            LoggingMessage::Epoch {
                epoch,
                train_loss,
                train_acc,
                val_loss,
                val_acc,
            } => {
                let row = MetricsRow {
                    train_loss: Some(train_loss),
                    train_acc: Some(train_acc),
                    val_loss: Some(val_loss),
                    val_acc: Some(val_acc),
                    ..MetricsRow::empty("fit", Some(epoch))
                };
                csv_writer.serialize(row)?;
                csv_writer.flush()?;

                let step = epoch as i64;
                event_writer
                    .write_scalar_async("fit/train_loss".to_string(), step, train_loss as f32)
                    .await?;
                event_writer
                    .write_scalar_async("fit/train_acc".to_string(), step, train_acc as f32)
                    .await?;
                event_writer
                    .write_scalar_async("fit/val_loss".to_string(), step, val_loss as f32)
                    .await?;
                event_writer
                    .write_scalar_async("fit/val_acc".to_string(), step, val_acc as f32)
                    .await?;
            }
            LoggingMessage::FinalPass {
                split,
                epoch,
                loss,
                acc,
            } => {
                let row = match split {
                    Split::Test => MetricsRow {
                        test_loss: Some(loss),
                        test_acc: Some(acc),
                        ..MetricsRow::empty("test", Some(epoch))
                    },
                    _ => MetricsRow {
                        val_loss: Some(loss),
                        val_acc: Some(acc),
                        ..MetricsRow::empty("validate", Some(epoch))
                    },
                };
                csv_writer.serialize(row)?;
                csv_writer.flush()?;

                event_writer
                    .write_scalar_async(format!("{}/loss", split), epoch as i64, loss as f32)
                    .await?;
                event_writer
                    .write_scalar_async(format!("{}/acc", split), epoch as i64, acc as f32)
                    .await?;
            }
        }
    }

    Ok(())
}
