//! Removal of intermediate files according to the storage policy.

use color_eyre::eyre::{Context as _, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// How much disk space the evaluation may keep occupied
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum Storage {
    Low,
    /// Delete merged, scaled, train, test and prediction files once they are consumed
    RemoveTemp,
    /// Keep every intermediate file
    High,
}

impl Storage {
    pub fn removes_temporaries(self) -> bool {
        matches!(self, Storage::Low | Storage::RemoveTemp)
    }

    /// Delete `files` unless the policy keeps intermediate files.
    ///
    /// Returns the number of removed files.
    pub fn cleanup<I, P>(self, files: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        if !self.removes_temporaries() {
            return Ok(0);
        }
        let mut removed = 0;
        for file in files {
            let file = file.as_ref();
            match std::fs::remove_file(file) {
                Ok(()) => {
                    log::debug!("Removed {}", file.display());
                    removed += 1;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    log::warn!("Temporary file {} does not exist", file.display());
                }
                Err(err) => {
                    return Err(err)
                        .wrap_err_with(|| format!("Failed to remove {}", file.display()))
                }
            }
        }
        Ok(removed)
    }
}

/// The per-fold files which are only needed until the results are aggregated
pub fn fold_temporaries(
    folds: usize,
    artifacts: &crate::scenario::Artifacts,
) -> impl Iterator<Item = PathBuf> + '_ {
    (1..=folds).flat_map(move |fold| {
        [
            artifacts.train(fold),
            artifacts.test(fold),
            artifacts.predict(fold),
        ]
    })
}
