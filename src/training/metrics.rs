use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    /// Mean of the per-batch losses.
    pub loss: f32,
    pub learning_rate: f64,
    pub batches: usize,
    pub duration: Duration,
    pub checkpoint_saved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub checkpoint: usize,
    pub correct: usize,
    pub total: usize,
    pub accuracy: f32,
}

impl EvalReport {
    pub fn new(checkpoint: usize, predictions: &[usize], labels: &[usize]) -> Self {
        let correct = count_correct(predictions, labels);
        let total = labels.len();
        Self {
            checkpoint,
            correct,
            total,
            accuracy: accuracy(predictions, labels),
        }
    }
}

pub fn count_correct(predictions: &[usize], labels: &[usize]) -> usize {
    predictions
        .iter()
        .zip(labels)
        .filter(|(pred, label)| pred == label)
        .count()
}

/// Fraction of predictions equal to their label; 0 for an empty split.
pub fn accuracy(predictions: &[usize], labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    count_correct(predictions, labels) as f32 / labels.len() as f32
}

/// Index of the largest score. Ties go to the first maximum.
pub fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_score), (i, &s)| {
            if s > best_score {
                (i, s)
            } else {
                (best, best_score)
            }
        })
        .0
}
