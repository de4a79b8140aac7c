#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use ferrite_trainer::dataset::{Dataset, ImagingKind};
use ferrite_trainer::image::InputShape;
use ferrite_trainer::job::{Job, JobSpec, JobStatus};
use ferrite_trainer::network::Architecture;
use ferrite_trainer::registry::ModelType;
use ferrite_trainer::{ServiceConfig, Services};

pub const SMALL: InputShape = InputShape { width: 8, height: 8, channels: 3 };

/// Class `i` of a dataset gets a distinct base brightness so the classes
/// are separable.
fn shade(class_index: usize, sample: usize) -> [u8; 3] {
    let base = 30 + (class_index as u32 * 170).min(220);
    let jitter = (sample as u32 * 7) % 20;
    let v = (base + jitter).min(255) as u8;
    [v, v.saturating_sub(10), v / 2]
}

pub fn write_png(path: &Path, side: u32, rgb: [u8; 3]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(side, side, Rgb(rgb)).save(path).unwrap();
}

/// Lays out `<base>/datasets/<id>/{train,validation}/<class>/<n>.png`.
pub fn make_dataset(config: &ServiceConfig, id: &str, classes: &[(&str, usize, usize)], side: u32) -> PathBuf {
    let root = config.datasets_dir().join(id);
    for (ci, (class, train, val)) in classes.iter().enumerate() {
        fs::create_dir_all(root.join("train").join(class)).unwrap();
        fs::create_dir_all(root.join("validation").join(class)).unwrap();
        for i in 0..*train {
            write_png(&root.join("train").join(class).join(format!("{i}.png")), side, shade(ci, i));
        }
        for i in 0..*val {
            write_png(&root.join("validation").join(class).join(format!("{i}.png")), side, shade(ci, i + 100));
        }
    }
    root
}

pub fn open(base: &Path) -> Services {
    Services::open(ServiceConfig::for_base_dir(base)).unwrap()
}

pub fn open_with(config: ServiceConfig) -> Services {
    Services::open(config).unwrap()
}

pub fn register(services: &Services, id: &str) -> Dataset {
    services.register_dataset(id, &format!("{id} set"), ImagingKind::Xray).unwrap()
}

pub fn spec(dataset_id: &str, name: &str, version: &str, epochs: usize) -> JobSpec {
    JobSpec {
        name: format!("train {name}"),
        description: None,
        dataset_id: dataset_id.to_string(),
        model_type: ModelType::Classification,
        model_name: name.to_string(),
        model_version: version.to_string(),
        model_description: Some("integration test model".into()),
        model_architecture: Architecture::Simple,
        input_shape: SMALL,
        applicable_body_parts: vec!["chest".into()],
        epochs,
        batch_size: 4,
        validation_split: 0.2,
    }
}

/// Polls the job until `done` holds, returning every status seen on the way.
pub fn wait_for(services: &Services, job_id: &str, timeout: Duration, done: impl Fn(&Job) -> bool) -> (Job, Vec<JobStatus>) {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let job = services.orchestrator.get(job_id).unwrap();
        if seen.last() != Some(&job.status) {
            seen.push(job.status);
        }
        if done(&job) {
            return (job, seen);
        }
        assert!(Instant::now() < deadline, "job {job_id} stuck in {:?}", job.status);
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn wait_terminal(services: &Services, job_id: &str) -> (Job, Vec<JobStatus>) {
    wait_for(services, job_id, Duration::from_secs(300), |j| j.status.is_terminal())
}

/// Position of a status along pending → preparing → training → terminal.
pub fn rank(status: JobStatus) -> usize {
    match status {
        JobStatus::Pending => 0,
        JobStatus::Preparing => 1,
        JobStatus::Training => 2,
        JobStatus::Completed | JobStatus::Failed => 3,
    }
}

pub fn assert_monotonic(seen: &[JobStatus]) {
    assert!(seen.windows(2).all(|w| rank(w[0]) < rank(w[1])), "status went backwards: {seen:?}");
}
