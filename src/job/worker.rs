use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tracing::{error, info, warn};

use crate::dataset::{prepare_split, ImageBatches, Split};
use crate::error::Error;
use crate::job::orchestrator::Shared;
use crate::job::{job_seed, Job, JobError, JobStatus};
use crate::network::{build_model, CompiledModel};
use crate::registry::{Performance, TrainedModel};
use crate::train::{train_loop, TrainConfig, TrainError, TrainEvent, TrainOutcome};

struct Completion {
    model_id: String,
    evaluation_loss: f32,
    evaluation_accuracy: f32,
}

/// Runs one claimed job (already `preparing`) to a terminal state.
pub(crate) fn run_job(shared: &Arc<Shared>, job: Job, cancel: Arc<AtomicBool>) {
    let job_id = job.id.clone();
    let persisted = match execute(shared, &job, cancel) {
        Ok(done) => shared.update_job(&job_id, "complete", |j| {
            if j.status == JobStatus::Preparing {
                j.transition(JobStatus::Training)?;
            }
            j.progress.evaluation_loss = Some(done.evaluation_loss);
            j.progress.evaluation_accuracy = Some(done.evaluation_accuracy);
            j.complete(&done.model_id)
        }),
        Err(e) => {
            let kind = e.kind();
            if kind == "Cancelled" {
                info!(job_id = %job_id, "training cancelled");
            } else {
                error!(job_id = %job_id, kind, error = %e, "job failed");
            }
            shared.update_job(&job_id, "fail", |j| j.fail(kind, e.to_string()))
        }
    };
    match persisted {
        Ok(job) => info!(job_id = %job_id, status = %job.status, "job finished"),
        Err(e) => error!(job_id = %job_id, error = %e, "cannot persist terminal job state"),
    }
}

/// Everything between `preparing` and the terminal write. The error's kind
/// and message become the job's failure fields.
fn execute(shared: &Arc<Shared>, job: &Job, cancel: Arc<AtomicBool>) -> Result<Completion, Error> {
    let seed = job_seed(&job.id);
    let dataset = shared
        .store
        .get_dataset(&job.dataset_id)?
        .ok_or_else(|| JobError::DatasetNotFound(job.dataset_id.clone()))?;
    let class_names = dataset.class_names();

    let samples = prepare_split(&dataset.root_path, &class_names, job.config.validation_split, seed)?;
    let CompiledModel { mut network, mut optimizer } =
        build_model(job.target.architecture, job.target.input_shape, class_names.len(), seed)?;
    info!(
        job_id = %job.id,
        architecture = job.target.architecture.as_str(),
        parameters = network.parameter_count(),
        train = samples.train.len(),
        validation = samples.validation.len(),
        "model built"
    );
    if cancel.load(Ordering::SeqCst) {
        return Err(TrainError::Cancelled.into());
    }

    if let Err(e) = shared.update_job(&job.id, "start training", |j| j.transition(JobStatus::Training)) {
        warn!(job_id = %job.id, error = %e, "training status not persisted, continuing");
    } else {
        info!(job_id = %job.id, "job training");
    }

    let mut source = ImageBatches::new(samples, job.target.input_shape, seed);
    let (tx, rx) = mpsc::channel();
    let reporter = spawn_reporter(shared, &job.id, rx)?;
    let config = TrainConfig {
        epochs: job.config.epochs,
        batch_size: job.config.batch_size,
        progress_tx: Some(tx),
        stop_flag: Some(cancel),
    };
    let result = train_loop(&mut network, &mut optimizer, &mut source, &config);
    // closing the channel lets the reporter drain and exit
    drop(config);
    if source.skipped() > 0 {
        warn!(job_id = %job.id, skipped = source.skipped(), "undecodable images were skipped");
    }
    drop(source);
    if reporter.join().is_err() {
        error!(job_id = %job.id, "progress reporter panicked");
    }

    let outcome = result?;

    let performance = performance_of(&outcome);
    let entry = shared
        .registry
        .register_trained(TrainedModel {
            job,
            dataset: &dataset,
            class_names: &class_names,
            network: &network,
            performance,
            learning_rate: optimizer.learning_rate,
        })?;

    Ok(Completion {
        model_id: entry.id,
        evaluation_loss: outcome.evaluation.loss,
        evaluation_accuracy: outcome.evaluation.accuracy,
    })
}

/// Validation accuracy of the final pass, or the last epoch's training
/// accuracy when there was nothing to validate on.
fn performance_of(outcome: &TrainOutcome) -> Performance {
    let eval = &outcome.evaluation;
    let scores = eval.confusion.macro_scores();
    let accuracy = match eval.split {
        Split::Validation => eval.accuracy,
        Split::Train => outcome.history.last().map_or(eval.accuracy, |s| s.train_acc),
    };
    Performance { accuracy, precision: scores.precision, recall: scores.recall, f1: scores.f1 }
}

/// Persists progress events in order on a dedicated thread so slow or failing
/// writes never stall a training step.
fn spawn_reporter(
    shared: &Arc<Shared>,
    job_id: &str,
    rx: mpsc::Receiver<TrainEvent>,
) -> Result<thread::JoinHandle<()>, JobError> {
    let shared = Arc::clone(shared);
    let id = job_id.to_string();
    thread::Builder::new()
        .name(format!("job-{id}-progress"))
        .spawn(move || {
            for event in rx {
                let written = match event {
                    TrainEvent::EpochStarted { epoch, total_epochs } => {
                        shared.update_job(&id, "epoch start", |j| {
                            j.epoch_started(epoch, total_epochs);
                            Ok(())
                        })
                    }
                    TrainEvent::EpochCompleted(stats) => shared.update_job(&id, "epoch progress", |j| {
                        j.epoch_completed(stats);
                        Ok(())
                    }),
                };
                if let Err(e) = written {
                    warn!(job_id = %id, error = %e, "progress write abandoned");
                }
            }
        })
        .map_err(JobError::Thread)
}
