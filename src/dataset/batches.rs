use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::warn;

use crate::dataset::{DatasetError, Sample, SplitSamples};
use crate::image::{load_image_file, InputShape};
use crate::math::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
}

/// Stacked images `[n, h, w, c]` with one-hot targets `[n, classes]`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub xs: Tensor,
    pub ys: Tensor,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn from_items(items: &[Tensor], labels: Vec<usize>, classes: usize) -> Result<Batch, DatasetError> {
        let xs = Tensor::stack(items)?;
        let mut ys = Tensor::zeros(&[labels.len(), classes]);
        for (row, &label) in labels.iter().enumerate() {
            ys.data[row * classes + label] = 1.0;
        }
        Ok(Batch { xs, ys, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Where the training loop pulls its batches from.
pub trait BatchSource {
    fn len(&self, split: Split) -> usize;

    fn class_count(&self) -> usize;

    /// Reorders the training samples; called before every epoch.
    fn shuffle(&mut self);

    /// Batch number `index` of `split`. `Ok(None)` when no sample in that
    /// window could be loaded.
    fn batch(&mut self, split: Split, index: usize, batch_size: usize) -> Result<Option<Batch>, DatasetError>;
}

/// Decodes images from disk one batch at a time, so only a single batch of
/// sample tensors is alive at once.
pub struct ImageBatches {
    samples: SplitSamples,
    shape: InputShape,
    rng: StdRng,
    skipped: usize,
}

impl ImageBatches {
    pub fn new(samples: SplitSamples, shape: InputShape, seed: u64) -> ImageBatches {
        ImageBatches { samples, shape, rng: StdRng::seed_from_u64(seed), skipped: 0 }
    }

    /// Samples skipped so far because they failed to decode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn split(&self, split: Split) -> &[Sample] {
        match split {
            Split::Train => &self.samples.train,
            Split::Validation => &self.samples.validation,
        }
    }
}

impl BatchSource for ImageBatches {
    fn len(&self, split: Split) -> usize {
        self.split(split).len()
    }

    fn class_count(&self) -> usize {
        self.samples.classes.len()
    }

    fn shuffle(&mut self) {
        self.samples.train.shuffle(&mut self.rng);
    }

    fn batch(&mut self, split: Split, index: usize, batch_size: usize) -> Result<Option<Batch>, DatasetError> {
        let samples = self.split(split);
        let start = index.saturating_mul(batch_size).min(samples.len());
        let end = start.saturating_add(batch_size).min(samples.len());

        let mut items = Vec::with_capacity(end - start);
        let mut labels = Vec::with_capacity(end - start);
        let mut skipped = 0;
        for sample in &samples[start..end] {
            match load_image_file(&sample.path, self.shape) {
                Ok(t) => {
                    items.push(t);
                    labels.push(sample.label);
                }
                Err(e) => {
                    warn!(path = %sample.path.display(), error = %e, "skipping image");
                    skipped += 1;
                }
            }
        }
        self.skipped += skipped;
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(Batch::from_items(&items, labels, self.class_count())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::Path;

    fn write_png(path: &Path) {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([9, 9, 9])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
        std::fs::write(path, out.into_inner()).unwrap();
    }

    #[test]
    fn undecodable_samples_shrink_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let bad = dir.path().join("bad.png");
        write_png(&good);
        std::fs::write(&bad, b"broken").unwrap();
        let samples = SplitSamples {
            classes: vec!["a".into(), "b".into()],
            train: vec![Sample { path: bad.clone(), label: 0 }, Sample { path: good, label: 1 }],
            validation: vec![Sample { path: bad, label: 0 }],
        };
        let shape = InputShape { width: 2, height: 2, channels: 1 };
        let mut source = ImageBatches::new(samples, shape, 0);

        let batch = source.batch(Split::Train, 0, 2).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.xs.shape, vec![1, 2, 2, 1]);
        assert_eq!(batch.ys.data, vec![0.0, 1.0]);

        assert!(source.batch(Split::Validation, 0, 2).unwrap().is_none());
        assert_eq!(source.skipped(), 2);
    }

    #[test]
    fn last_batch_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let mut train = Vec::new();
        for i in 0..5 {
            let p = dir.path().join(format!("{i}.png"));
            write_png(&p);
            train.push(Sample { path: p, label: 0 });
        }
        let samples = SplitSamples { classes: vec!["a".into()], train, validation: Vec::new() };
        let mut source = ImageBatches::new(samples, InputShape { width: 2, height: 2, channels: 3 }, 0);
        assert_eq!(source.batch(Split::Train, 1, 4).unwrap().unwrap().len(), 1);
        assert!(source.batch(Split::Train, 2, 4).unwrap().is_none());
    }
}
