use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::{
    TreeError, confusion::ConfusionMatrix, record::Record, record::RecordId, tree::DecisionTree,
};

/// Result of running a set of records through a tree.
#[derive(Debug, Clone)]
pub struct Evaluation {
    confusion: ConfusionMatrix,
    predictions: BTreeMap<String, Vec<RecordId>>,
    fallbacks: usize,
    duration: Duration,
}

impl Evaluation {
    /// Return the confusion matrix.
    #[must_use]
    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    /// Return record ids grouped by predicted class, in input order per class.
    #[must_use]
    pub fn predictions(&self) -> &BTreeMap<String, Vec<RecordId>> {
        &self.predictions
    }

    /// Return how many records stopped at a split because no branch matched.
    #[must_use]
    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }

    /// Return the wall time spent predicting.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Shorthand for `confusion().accuracy()`.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.confusion.accuracy()
    }

    /// Shorthand for `confusion().mcc()`.
    #[must_use]
    pub fn mcc(&self) -> f64 {
        self.confusion.mcc()
    }
}

impl DecisionTree {
    /// Predict every record and compare against its target value.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::MissingTargetValue`] when a record lacks the
    /// tree's target attribute.
    #[instrument(skip_all, fields(n_records = records.len()))]
    pub fn evaluate(&self, records: &[Record]) -> Result<Evaluation, TreeError> {
        let started = Instant::now();
        let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(records.len());
        let mut predictions: BTreeMap<String, Vec<RecordId>> = BTreeMap::new();
        let mut fallbacks = 0usize;

        for record in records {
            let Some(actual) = record.class(self.target()) else {
                return Err(TreeError::MissingTargetValue {
                    record: record.id().to_string(),
                    target: self.target().to_string(),
                });
            };
            let prediction = self.predict(record);
            if prediction.fallback {
                fallbacks += 1;
            }
            let predicted = self.classes().label(prediction.class);
            pairs.push((actual, predicted));
            predictions
                .entry(predicted.to_string())
                .or_default()
                .push(record.id().clone());
        }

        let confusion = ConfusionMatrix::from_pairs(pairs);
        let duration = started.elapsed();
        debug!(
            accuracy = confusion.accuracy(),
            fallbacks,
            elapsed_us = duration.as_micros() as u64,
            "evaluation finished"
        );

        Ok(Evaluation {
            confusion,
            predictions,
            fallbacks,
            duration,
        })
    }
}
