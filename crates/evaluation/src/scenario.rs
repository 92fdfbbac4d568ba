//! Naming of all produced files.
//!
//! A [`Scenario`] encodes every configuration choice into a string like
//! `_simple_TCP_10S_20SP_40ISP_40IMP_900IBG`.
//! The string must be identical between runs with the same configuration, since the grid search is
//! resumed from files named after it.

use features::Format;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct Scenario(String);

/// Dataset dimensions appended to the base scenario once they are known
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScenarioSize {
    /// Number of websites, omitted in separate evaluation
    pub sites: Option<usize>,
    /// Subpages used per website
    pub per_site: usize,
    /// Instances per subpage
    pub per_page: usize,
    /// Instances per main page
    pub per_main_page: Option<usize>,
    /// Size of the background set
    pub background: Option<usize>,
}

impl Scenario {
    pub fn new(simple: bool, format: Format) -> Self {
        let mut scenario = String::new();
        if simple {
            scenario.push_str("_simple");
        }
        let format: &'static str = format.into();
        scenario.push('_');
        scenario.push_str(format);
        Self(scenario)
    }

    pub fn with_size(&self, size: &ScenarioSize) -> Self {
        let mut scenario = self.0.clone();
        if let Some(sites) = size.sites {
            scenario.push_str(&format!("_{}S", sites));
        }
        scenario.push_str(&format!("_{}SP_{}ISP", size.per_site, size.per_page));
        if let Some(per_main_page) = size.per_main_page {
            scenario.push_str(&format!("_{}IMP", per_main_page));
        }
        if let Some(background) = size.background {
            scenario.push_str(&format!("_{}IBG", background));
        }
        Self(scenario)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Paths of the files belonging to one output name and scenario
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifacts {
    dir: PathBuf,
    stem: String,
}

impl Artifacts {
    pub fn new(dir: &Path, name: &str, scenario: &Scenario) -> Self {
        Self {
            dir: dir.to_owned(),
            stem: format!("{}{}", name, scenario),
        }
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.stem, suffix))
    }

    fn fold_file(&self, fold: usize, suffix: &str) -> PathBuf {
        self.file(&format!("_{}{}", fold, suffix))
    }

    pub fn merged(&self) -> PathBuf {
        self.file(".merged")
    }

    pub fn range(&self) -> PathBuf {
        self.file(".range")
    }

    pub fn merged_scaled(&self) -> PathBuf {
        self.file(".merged.scale")
    }

    /// Pooled training data of all folds for a single grid search
    pub fn pooled(&self) -> PathBuf {
        self.file(".scale")
    }

    /// Status file of the grid search, one per fold unless the search is pooled
    pub fn search_status(&self, fold: Option<usize>) -> PathBuf {
        match fold {
            Some(fold) => self.fold_file(fold, ".out"),
            None => self.file(".out"),
        }
    }

    pub fn search_plot(&self, fold: Option<usize>) -> PathBuf {
        match fold {
            Some(fold) => self.fold_file(fold, ".png"),
            None => self.file(".png"),
        }
    }

    pub fn train(&self, fold: usize) -> PathBuf {
        self.fold_file(fold, ".train")
    }

    pub fn test(&self, fold: usize) -> PathBuf {
        self.fold_file(fold, ".test")
    }

    pub fn model(&self, fold: usize) -> PathBuf {
        self.fold_file(fold, ".model")
    }

    pub fn predict(&self, fold: usize) -> PathBuf {
        self.fold_file(fold, ".predict")
    }

    pub fn result(&self) -> PathBuf {
        self.file(".result")
    }

    pub fn summary(&self) -> PathBuf {
        self.file(".summary.json")
    }
}
