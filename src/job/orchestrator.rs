use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dataset::DatasetStatus;
use crate::job::{worker, Job, JobError, JobSpec, JobStatus, CANCELLED_BY_USER_REASON};
use crate::network::check_model_size;
use crate::page::{Page, PageRequest};
use crate::registry::Registry;
use crate::store::{RetryPolicy, Store};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_jobs: usize,
    pub status_retry: RetryPolicy,
}

/// State shared by the orchestrator handle, the dispatcher and the workers.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) retry: RetryPolicy,
    max_concurrent_jobs: usize,
    // guards every read-check-write of a job record
    state_lock: Mutex<()>,
    // cancel flag per job that currently has a worker
    active: Mutex<HashMap<String, Arc<AtomicBool>>>,
    running: Mutex<usize>,
    slot_freed: Condvar,
}

impl Shared {
    /// Applies `change` to the stored job under the state lock and persists it
    /// with the retry policy.
    pub(crate) fn update_job(
        &self,
        id: &str,
        what: &str,
        change: impl FnOnce(&mut Job) -> Result<(), JobError>,
    ) -> Result<Job, JobError> {
        let _guard = self.state_lock.lock();
        let mut job = self.store.get_job(id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;
        change(&mut job)?;
        self.retry.run(what, || self.store.save_job(&job))?;
        Ok(job)
    }

    fn release_slot(&self, job_id: &str) {
        self.active.lock().remove(job_id);
        let mut running = self.running.lock();
        *running = running.saturating_sub(1);
        self.slot_freed.notify_one();
    }
}

/// Accepts jobs, feeds them to a single dispatcher thread and runs each on its
/// own worker thread, at most `max_concurrent_jobs` at a time.
pub struct Orchestrator {
    shared: Arc<Shared>,
    dispatch_tx: Option<mpsc::Sender<String>>,
    dispatcher: Option<thread::JoinHandle<()>>,
}

impl Orchestrator {
    /// Starts the dispatcher. Jobs already `pending` in the store are queued
    /// in creation order.
    pub fn start(store: Arc<dyn Store>, registry: Arc<Registry>, config: OrchestratorConfig) -> Result<Orchestrator, JobError> {
        let shared = Arc::new(Shared {
            store,
            registry,
            retry: config.status_retry,
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            state_lock: Mutex::new(()),
            active: Mutex::new(HashMap::new()),
            running: Mutex::new(0),
            slot_freed: Condvar::new(),
        });

        let (tx, rx) = mpsc::channel::<String>();
        let mut pending: Vec<Job> =
            shared.store.list_jobs()?.into_iter().filter(|j| j.status == JobStatus::Pending).collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        for job in pending {
            let _ = tx.send(job.id);
        }

        let dispatcher_shared = Arc::clone(&shared);
        let dispatcher = thread::Builder::new()
            .name("job-dispatcher".into())
            .spawn(move || dispatch_loop(dispatcher_shared, rx))
            .map_err(JobError::Thread)?;

        info!(max_concurrent_jobs = shared.max_concurrent_jobs, "orchestrator started");
        Ok(Orchestrator { shared, dispatch_tx: Some(tx), dispatcher: Some(dispatcher) })
    }

    /// Validates and persists `spec` as a `pending` job, then queues it.
    pub fn submit(&self, spec: JobSpec, submitted_by: &str) -> Result<Job, JobError> {
        spec.validate()?;
        let dataset = self
            .shared
            .store
            .get_dataset(&spec.dataset_id)?
            .ok_or_else(|| JobError::DatasetNotFound(spec.dataset_id.clone()))?;
        if dataset.status != DatasetStatus::Ready {
            return Err(JobError::DatasetNotReady {
                id: dataset.id,
                status: format!("{:?}", dataset.status).to_lowercase(),
            });
        }
        check_model_size(spec.model_architecture, spec.input_shape, dataset.classes.len().max(1))
            .map_err(|e| JobError::Validation(e.to_string()))?;

        let job = spec.into_job(Uuid::new_v4().to_string(), submitted_by.to_string());
        self.shared.store.save_job(&job)?;
        info!(job_id = %job.id, dataset_id = %job.dataset_id, submitted_by, "job submitted");

        if let Some(tx) = &self.dispatch_tx {
            if tx.send(job.id.clone()).is_err() {
                error!(job_id = %job.id, "dispatcher is gone; job stays pending");
            }
        }
        Ok(job)
    }

    pub fn get(&self, id: &str) -> Result<Job, JobError> {
        self.shared.store.get_job(id)?.ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Newest first, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>, page: PageRequest) -> Result<Page<Job>, JobError> {
        let mut jobs: Vec<Job> =
            self.shared.store.list_jobs()?.into_iter().filter(|j| status.map_or(true, |s| j.status == s)).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(jobs, page))
    }

    /// Requests cancellation.
    ///
    /// A job with a worker gets its cancel flag set and fails at the next step
    /// boundary. A job nobody has claimed yet fails immediately. Terminal jobs
    /// are returned unchanged.
    pub fn cancel(&self, id: &str) -> Result<Job, JobError> {
        let _guard = self.shared.state_lock.lock();
        let mut job = self.shared.store.get_job(id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        if let Some(flag) = self.shared.active.lock().get(id) {
            flag.store(true, Ordering::SeqCst);
            info!(job_id = %id, "cancellation requested");
            return Ok(job);
        }
        job.fail("Cancelled", CANCELLED_BY_USER_REASON)?;
        self.shared.retry.run("cancel", || self.shared.store.save_job(&job))?;
        info!(job_id = %id, "pending job cancelled");
        Ok(job)
    }

    /// Removes the job record. Refused while a worker is running the job; a
    /// worker whose terminal state is already stored no longer counts.
    pub fn delete(&self, id: &str) -> Result<(), JobError> {
        let _guard = self.shared.state_lock.lock();
        let job = self.shared.store.get_job(id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if !job.status.is_terminal() && self.shared.active.lock().contains_key(id) {
            return Err(JobError::Conflict(format!("job {id} is running; cancel it first")));
        }
        if !self.shared.store.delete_job(id)? {
            return Err(JobError::NotFound(id.to_string()));
        }
        info!(job_id = %id, "job deleted");
        Ok(())
    }

    /// Number of jobs that currently have a worker.
    pub fn active_jobs(&self) -> usize {
        self.shared.active.lock().len()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.dispatch_tx.take();
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                error!("dispatcher thread panicked");
            }
        }
    }
}

fn dispatch_loop(shared: Arc<Shared>, rx: mpsc::Receiver<String>) {
    for job_id in rx {
        {
            let mut running = shared.running.lock();
            while *running >= shared.max_concurrent_jobs {
                shared.slot_freed.wait(&mut running);
            }
            *running += 1;
        }
        match claim(&shared, &job_id) {
            Ok(Some((job, cancel))) => spawn_worker(&shared, job, cancel),
            Ok(None) => shared.release_slot(&job_id),
            Err(e) => {
                error!(job_id = %job_id, error = %e, "cannot claim job");
                shared.release_slot(&job_id);
            }
        }
    }
    info!("dispatcher stopped");
}

/// Moves a `pending` job to `preparing` and registers its cancel flag, as one
/// step under the state lock. Jobs that are no longer pending are skipped.
fn claim(shared: &Shared, job_id: &str) -> Result<Option<(Job, Arc<AtomicBool>)>, JobError> {
    let _guard = shared.state_lock.lock();
    let Some(mut job) = shared.store.get_job(job_id)? else {
        return Ok(None);
    };
    if job.status != JobStatus::Pending {
        return Ok(None);
    }
    job.transition(JobStatus::Preparing)?;
    shared.retry.run("claim", || shared.store.save_job(&job))?;
    let cancel = Arc::new(AtomicBool::new(false));
    shared.active.lock().insert(job.id.clone(), Arc::clone(&cancel));
    info!(job_id = %job.id, "job claimed");
    Ok(Some((job, cancel)))
}

fn spawn_worker(shared: &Arc<Shared>, job: Job, cancel: Arc<AtomicBool>) {
    let worker_shared = Arc::clone(shared);
    let job_id = job.id.clone();
    let spawned = thread::Builder::new().name(format!("job-{job_id}")).spawn(move || {
        let id = job.id.clone();
        worker::run_job(&worker_shared, job, cancel);
        worker_shared.release_slot(&id);
    });
    if let Err(e) = spawned {
        warn!(job_id = %job_id, error = %e, "cannot spawn worker");
        let _ = shared.update_job(&job_id, "spawn failure", |job| job.fail("Internal", format!("cannot start worker: {e}")));
        shared.release_slot(&job_id);
    }
}
