use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::debug;

use crate::dataset::{Batch, BatchSource, DatasetError, Split};
use crate::layers::Mode;
use crate::loss::CrossEntropyLoss;
use crate::math::{argmax, Tensor};
use crate::network::{Network, NetworkError};
use crate::optim::Adam;
use crate::train::epoch_stats::{EpochStats, TrainEvent};
use crate::train::metrics::ConfusionMatrix;
use crate::train::train_config::TrainConfig;
use crate::train::TrainError;

/// Result of one exhaustive evaluation pass.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub split: Split,
    pub loss: f32,
    pub accuracy: f32,
    pub samples: usize,
    pub confusion: ConfusionMatrix,
}

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// One entry per completed epoch, in order.
    pub history: Vec<EpochStats>,
    /// Final pass over the validation set, or over the training set when the
    /// run has no decodable validation samples.
    pub evaluation: Evaluation,
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `network` for `config.epochs` epochs of `ceil(train / batch_size)`
/// steps each, then runs a final evaluation pass.
///
/// # Cancellation
/// `config.stop_flag` is checked before every step and every evaluation batch;
/// once set the loop returns `TrainError::Cancelled` without taking another
/// step.
///
/// # Tensor lifetime
/// Each batch and every activation cached for its backward pass are dropped
/// before the step returns, whether or not the step succeeded.
pub fn train_loop(
    network: &mut Network,
    optimizer: &mut Adam,
    source: &mut dyn BatchSource,
    config: &TrainConfig,
) -> Result<TrainOutcome, TrainError> {
    if config.epochs == 0 || config.batch_size == 0 {
        return Err(TrainError::InvalidConfig("epochs and batch size must be at least 1".into()));
    }
    if source.class_count() != network.output_dim() {
        return Err(TrainError::InvalidConfig(format!(
            "{} classes but the network has {} outputs",
            source.class_count(),
            network.output_dim()
        )));
    }
    let train_len = source.len(Split::Train);
    if train_len == 0 {
        return Err(DatasetError::NoDecodableSamples.into());
    }
    let steps_per_epoch = train_len.div_ceil(config.batch_size);
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        emit(config, TrainEvent::EpochStarted { epoch, total_epochs: config.epochs });
        let t_start = Instant::now();
        source.shuffle();

        // ── One full pass over the training data ───────────────────────────
        let (mut loss_sum, mut correct, mut seen) = (0.0f32, 0usize, 0usize);
        for step in 0..steps_per_epoch {
            check_cancel(config)?;
            let Some(batch) = source.batch(Split::Train, step, config.batch_size)? else { continue };
            let (loss, hits) = train_step(network, optimizer, &batch)?;
            loss_sum += loss * batch.len() as f32;
            correct += hits;
            seen += batch.len();
        }
        check_cancel(config)?;
        if seen == 0 {
            return Err(DatasetError::NoDecodableSamples.into());
        }

        // ── Validation ────────────────────────────────────────────────────
        let (val_loss, val_acc) = if source.len(Split::Validation) > 0 {
            let eval = evaluate(network, source, Split::Validation, config)?;
            if eval.samples > 0 { (Some(eval.loss), Some(eval.accuracy)) } else { (None, None) }
        } else {
            (None, None)
        };

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss: loss_sum / seen as f32,
            train_acc: correct as f32 / seen as f32,
            val_loss,
            val_acc,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        debug!(epoch, train_loss = stats.train_loss, train_acc = stats.train_acc, ?val_loss, ?val_acc, "epoch finished");
        emit(config, TrainEvent::EpochCompleted(stats.clone()));
        history.push(stats);
    }

    let mut evaluation = evaluate(network, source, Split::Validation, config)?;
    if evaluation.samples == 0 {
        evaluation = evaluate(network, source, Split::Train, config)?;
    }
    Ok(TrainOutcome { history, evaluation })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn emit(config: &TrainConfig, event: TrainEvent) {
    if let Some(ref tx) = config.progress_tx {
        if tx.send(event).is_err() {
            debug!("progress receiver dropped, continuing without progress events");
        }
    }
}

fn check_cancel(config: &TrainConfig) -> Result<(), TrainError> {
    match config.stop_flag {
        Some(ref flag) if flag.load(Ordering::SeqCst) => Err(TrainError::Cancelled),
        _ => Ok(()),
    }
}

/// One optimizer step. Returns the mean batch loss and the number of correct
/// predictions.
fn train_step(network: &mut Network, optimizer: &mut Adam, batch: &Batch) -> Result<(f32, usize), TrainError> {
    network.zero_grad();
    let outcome = forward_backward(network, batch);
    network.release();
    let (loss, hits) = outcome?;
    optimizer.step(network.params_mut());
    Ok((loss, hits))
}

fn forward_backward(network: &mut Network, batch: &Batch) -> Result<(f32, usize), NetworkError> {
    let output = network.forward(&batch.xs, Mode::Train)?;
    let loss = CrossEntropyLoss::loss(&output, &batch.ys);
    let hits = count_correct(&output, &batch.labels);
    network.backward(CrossEntropyLoss::derivative(&output, &batch.ys))?;
    Ok((loss, hits))
}

fn count_correct(output: &Tensor, labels: &[usize]) -> usize {
    labels.iter().enumerate().filter(|&(row, &label)| argmax(output.item(row)) == label).count()
}

/// Exhaustive evaluation-mode pass over `split`.
fn evaluate(
    network: &mut Network,
    source: &mut dyn BatchSource,
    split: Split,
    config: &TrainConfig,
) -> Result<Evaluation, TrainError> {
    let classes = network.output_dim();
    let mut confusion = ConfusionMatrix::new(classes);
    let (mut loss_sum, mut samples) = (0.0f32, 0usize);
    let steps = source.len(split).div_ceil(config.batch_size);
    for step in 0..steps {
        check_cancel(config)?;
        let Some(batch) = source.batch(split, step, config.batch_size)? else { continue };
        let output = network.predict(&batch.xs)?;
        loss_sum += CrossEntropyLoss::loss(&output, &batch.ys) * batch.len() as f32;
        for (row, &label) in batch.labels.iter().enumerate() {
            confusion.record(label, argmax(output.item(row)));
        }
        samples += batch.len();
    }
    let loss = if samples > 0 { loss_sum / samples as f32 } else { 0.0 };
    Ok(Evaluation { split, loss, accuracy: confusion.accuracy(), samples, confusion })
}
