//! k-fold evaluation of website fingerprinting datasets with libSVM.
//!
//! The pipeline merges the feature files of all websites, scales them with `svm-scale`, groups the
//! instances into pages, partitions the subpages of every website into folds and runs grid search,
//! training and prediction per fold.
//! The predictions of all folds are merged into a single result.

#![deny(unused_import_braces, unused_qualifications)]

pub mod aggregate;
pub mod classes;
pub mod config;
pub mod dataset;
pub mod driver;
pub mod partition;
pub mod scenario;
pub mod storage;
pub mod tools;

/// Confusion counts of a binary "this website" vs. "not this website" evaluation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConfusionCounts {
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

impl ConfusionCounts {
    pub fn total(&self) -> u64 {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    pub fn f1_score(&self) -> f64 {
        2. * self.true_positives as f64
            / (2. * self.true_positives as f64
                + self.false_positives as f64
                + self.false_negatives as f64)
    }

    pub fn balanced_accuracy(&self) -> f64 {
        // (TPR + TNR) / 2
        ((1. - self.fnr()) + (1. - self.fpr())) / 2.0
    }

    pub fn fpr(&self) -> f64 {
        self.false_positives as f64 / (self.false_positives + self.true_negatives) as f64
    }

    pub fn fnr(&self) -> f64 {
        self.false_negatives as f64 / (self.false_negatives + self.true_positives) as f64
    }
}

impl std::ops::Add for ConfusionCounts {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl std::ops::AddAssign for ConfusionCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.true_positives += rhs.true_positives;
        self.true_negatives += rhs.true_negatives;
        self.false_positives += rhs.false_positives;
        self.false_negatives += rhs.false_negatives;
    }
}

#[derive(serde::Serialize)]
pub struct FlattenedPair<'a, A, B> {
    #[serde(flatten)]
    pub a: &'a A,
    #[serde(flatten)]
    pub b: &'a B,
}
