use super::{BestTracker, EpochStats, Phase};
use crate::{
    common::*,
    config::{Config, TrainingConfig},
    data::batch_stream,
    message::LoggingMessage,
    model::KilnClassifier,
    utils,
};

/// Run the Fit -> Validate -> Test state machine on a dedicated thread.
///
/// Only the adapter's var store is handed to the optimizer; the backbone
/// stays frozen. Data-loading workers communicate through the bounded
/// stream buffers and never touch model state, so the adapter parameters
/// and the optimizer state have a single writer.
pub fn training_worker(
    config: Arc<Config>,
    mut model: KilnClassifier,
    train_set: Arc<NormalizedTileDataset>,
    valid_set: Arc<NormalizedTileDataset>,
    test_set: Arc<NormalizedTileDataset>,
    checkpoint_dir: Arc<PathBuf>,
    logging_tx: mpsc::Sender<LoggingMessage>,
) -> Result<()> {
    let TrainingConfig {
        batch_size,
        learning_rate,
        max_epochs,
        early_stop_patience,
        worker_buf_size,
        device,
    } = config.training;
    let batch_size = batch_size.get();
    let max_epochs = max_epochs.get();
    let patience = early_stop_patience.map(|patience| patience.get());

    ensure!(train_set.num_records() > 0, "training split is empty");
    ensure!(valid_set.num_records() > 0, "validation split is empty");
    ensure!(test_set.num_records() > 0, "test split is empty");

    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    let mut optimizer = nn::Adam::default().build(&model.vs, learning_rate.raw())?;
    let mut tracker = BestTracker::new(patience);
    let mut best_meta = None;

    let mut phase = Phase::Fit;
    info!("enter phase {}", phase);

    for epoch in 0..max_epochs {
        // one shuffled pass over the training split
        let train_stats = {
            let mut stream = batch_stream(
                train_set.clone(),
                batch_size,
                worker_buf_size,
                Some(epoch as u64),
            );
            let mut total_loss = 0.0;
            let mut total_acc = 0.0;
            let mut num_examples = 0;

            while let Some(batch) = runtime.block_on(stream.next()) {
                let batch = batch?.to_device(device);
                let (loss, acc) = model.step(&batch)?;

                let loss_value = f64::from(&loss);
                ensure!(
                    loss_value.is_finite(),
                    "non-finite training loss {} at epoch {}",
                    loss_value,
                    epoch
                );
                optimizer.backward_step(&loss);

                let len = batch.len();
                total_loss += loss_value * len as f64;
                total_acc += acc * len as f64;
                num_examples += len;
            }

            ensure!(num_examples > 0, "training split produced no batches");
            EpochStats {
                loss: total_loss / num_examples as f64,
                acc: total_acc / num_examples as f64,
                num_examples,
            }
        };

        // full validation pass without gradient tracking or updates
        let val_stats = run_eval_pass(
            &runtime,
            &model,
            valid_set.clone(),
            batch_size,
            worker_buf_size,
            device,
        )?;

        info!(
            "epoch: {}\ttrain_loss: {:.5}\ttrain_acc: {:.4}\tval_loss: {:.5}\tval_acc: {:.4}",
            epoch, train_stats.loss, train_stats.acc, val_stats.loss, val_stats.acc
        );
        logging_tx
            .blocking_send(LoggingMessage::epoch(epoch, train_stats, val_stats))
            .map_err(|_err| format_err!("cannot send message to logger"))?;

        // checkpoint policy: always the latest state, plus the single best
        // state by validation accuracy
        utils::save_last_checkpoint(&model.vs, &checkpoint_dir)?;
        let observation = tracker.observe(epoch, val_stats.acc);
        if observation.new_best {
            best_meta = Some(utils::save_best_checkpoint(
                &model.vs,
                &checkpoint_dir,
                model.adapter_name(),
                epoch,
                val_stats.acc,
                best_meta.as_ref(),
            )?);
        }
        if observation.should_stop {
            info!("no val_acc improvement, stopping early after epoch {}", epoch);
            break;
        }
    }

    ensure!(
        best_meta.is_some(),
        "no checkpoint was saved during fitting"
    );

    // evaluate the best adapter state on the validation and test splits
    let best = utils::load_best_checkpoint(&mut model.vs, &checkpoint_dir)?;
    info!(
        "restored best checkpoint from epoch {} (val_acc {:.4})",
        best.epoch, best.val_acc
    );

    phase = Phase::Validate;
    info!("enter phase {}", phase);
    let val_stats = run_eval_pass(
        &runtime,
        &model,
        valid_set,
        batch_size,
        worker_buf_size,
        device,
    )?;
    info!(
        "validate\tloss: {:.5}\tacc: {:.4}",
        val_stats.loss, val_stats.acc
    );
    logging_tx
        .blocking_send(LoggingMessage::final_pass(Split::Valid, best.epoch, val_stats))
        .map_err(|_err| format_err!("cannot send message to logger"))?;

    phase = Phase::Test;
    info!("enter phase {}", phase);
    let test_stats = run_eval_pass(
        &runtime,
        &model,
        test_set,
        batch_size,
        worker_buf_size,
        device,
    )?;
    info!(
        "test\tloss: {:.5}\tacc: {:.4}",
        test_stats.loss, test_stats.acc
    );
    logging_tx
        .blocking_send(LoggingMessage::final_pass(Split::Test, best.epoch, test_stats))
        .map_err(|_err| format_err!("cannot send message to logger"))?;

    phase = Phase::Done;
    info!("enter phase {}", phase);
    Ok(())
}

/// One full pass over a split without gradient tracking.
fn run_eval_pass(
    runtime: &tokio::runtime::Runtime,
    model: &KilnClassifier,
    dataset: Arc<NormalizedTileDataset>,
    batch_size: usize,
    worker_buf_size: Option<usize>,
    device: Device,
) -> Result<EpochStats> {
    tch::no_grad(|| {
        let mut stream = batch_stream(dataset, batch_size, worker_buf_size, None);
        let mut total_loss = 0.0;
        let mut total_acc = 0.0;
        let mut num_examples = 0;

        while let Some(batch) = runtime.block_on(stream.next()) {
            let batch = batch?.to_device(device);
            let (loss, acc) = model.step(&batch)?;

            let len = batch.len();
            total_loss += f64::from(&loss) * len as f64;
            total_acc += acc * len as f64;
            num_examples += len;
        }

        ensure!(num_examples > 0, "evaluation split produced no batches");
        Ok(EpochStats {
            loss: total_loss / num_examples as f64,
            acc: total_acc / num_examples as f64,
            num_examples,
        })
    })
}
