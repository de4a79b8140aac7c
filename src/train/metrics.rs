use serde::{Deserialize, Serialize};

/// Square confusion matrix; rows are the true class, columns the prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    classes: usize,
    counts: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroScores {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

impl ConfusionMatrix {
    pub fn new(classes: usize) -> ConfusionMatrix {
        ConfusionMatrix { classes, counts: vec![0; classes * classes] }
    }

    pub fn record(&mut self, truth: usize, predicted: usize) {
        if truth < self.classes && predicted < self.classes {
            self.counts[truth * self.classes + predicted] += 1;
        }
    }

    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        self.counts[truth * self.classes + predicted]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn accuracy(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.classes).map(|i| self.get(i, i)).sum();
        correct as f32 / total as f32
    }

    /// Precision, recall and F1 averaged over the classes that occur either as
    /// truth or as a prediction.
    pub fn macro_scores(&self) -> MacroScores {
        let mut sum = MacroScores::default();
        let mut present = 0;
        for c in 0..self.classes {
            let tp = self.get(c, c) as f32;
            let actual: usize = (0..self.classes).map(|p| self.get(c, p)).sum();
            let predicted: usize = (0..self.classes).map(|t| self.get(t, c)).sum();
            if actual == 0 && predicted == 0 {
                continue;
            }
            present += 1;
            let precision = if predicted > 0 { tp / predicted as f32 } else { 0.0 };
            let recall = if actual > 0 { tp / actual as f32 } else { 0.0 };
            let f1 = if precision + recall > 0.0 { 2.0 * precision * recall / (precision + recall) } else { 0.0 };
            sum.precision += precision;
            sum.recall += recall;
            sum.f1 += f1;
        }
        if present == 0 {
            return sum;
        }
        let n = present as f32;
        MacroScores { precision: sum.precision / n, recall: sum.recall / n, f1: sum.f1 / n }
    }
}
