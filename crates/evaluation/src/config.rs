//! Command line options and the validated configuration of an evaluation run.
//!
//! Paths which are not given on the command line are taken from the environment:
//!
//! * `dir_EVAL_INPUT`: parent of the `wsc_features` directory
//! * `dir_EVAL_OUTPUT`: directory for all produced files
//! * `dir_EVAL_LIBSVM`: directory with the libSVM executables

use crate::dataset::InstanceLimits;
use crate::storage::Storage;
use crate::tools::{GridSearch, SearchRange, SvmTools};
use color_eyre::eyre::{bail, Result};
use features::discover::{background_domain_file, background_file, main_pages_file};
use features::Format;
use std::path::{Path, PathBuf};

const DEFAULT_GNUPLOT: &str = "/usr/bin/gnuplot";

/// Closed-world or open-world evaluation
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum Setting {
    CW,
    OW,
}

/// Value of the yes/no options
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum Toggle {
    YES,
    NO,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> bool {
        toggle == Toggle::YES
    }
}

#[derive(Debug, clap::Parser)]
#[clap(about = "k-fold evaluation of website fingerprinting datasets with libSVM")]
pub struct CliArgs {
    /// Directory with the feature files, one `wsc<site>_<format>` file per website
    ///
    /// Defaults to `$dir_EVAL_INPUT/wsc_features`.
    #[clap(long = "in")]
    pub input: Option<PathBuf>,
    /// Directory for all produced files, defaults to `$dir_EVAL_OUTPUT`
    #[clap(long = "out")]
    pub output: Option<PathBuf>,
    /// Prefix of all produced files
    #[clap(long, default_value = "WSC_Eval")]
    pub name: String,
    #[clap(long, default_value = "Low")]
    pub storage: Storage,
    /// Only print warnings and the final result
    #[clap(short, long)]
    pub quiet: bool,

    #[clap(long, default_value = "TCP")]
    pub format: Format,
    /// Train with the main pages of the websites (`mainPages_<format>`)
    #[clap(long, default_value = "YES")]
    pub mainpages: Toggle,
    /// Run the grid search once on all data instead of once per fold
    #[clap(long = "quick-cv", default_value = "YES")]
    pub quick_cv: Toggle,
    /// Shuffle the instances of every page
    #[clap(long = "random-instances", default_value = "NO")]
    pub random_instances: Toggle,
    /// Shuffle the subpages of every website
    #[clap(long = "random-subpages", default_value = "NO")]
    pub random_subpages: Toggle,
    #[clap(long, default_value = "CW")]
    pub setting: Setting,
    /// Label instances by website instead of by page
    #[clap(long, default_value = "YES")]
    pub simple: Toggle,
    /// Name of the background instances `<name>_<format>` (open world only)
    #[clap(long)]
    pub background: Option<String>,
    /// Evaluate every website on its own against the background (open world only)
    #[clap(long = "separate-evaluation", default_value = "NO")]
    pub separate_evaluation: Toggle,
    /// 0-based indices of the websites evaluated separately
    #[clap(long = "limit-websites", value_delimiter = ',')]
    pub limit_websites: Vec<usize>,
    /// Instances used per page: `#subpages,#mainpages,#background`, `-1` keeps the default
    #[clap(long = "limit-instances", allow_hyphen_values = true)]
    pub limit_instances: Option<InstanceLimits>,
    /// Subpages used per website
    #[clap(long = "limit-subpages")]
    pub limit_subpages: Option<usize>,

    /// Directory with the libSVM executables, defaults to `$dir_EVAL_LIBSVM`
    #[clap(long)]
    pub svm: Option<PathBuf>,
    /// gnuplot executable or `null`, defaults to `/usr/bin/gnuplot` if it exists
    #[clap(long)]
    pub gnuplot: Option<String>,
    /// Interpreter running the grid search script
    #[clap(long, default_value = "python")]
    pub python: PathBuf,
    /// Range of log2(cost): `begin,end,step` or `null`
    #[clap(long, allow_hyphen_values = true)]
    pub log2c: Option<SearchRange>,
    /// Range of log2(gamma): `begin,end,step` or `null`
    #[clap(long, allow_hyphen_values = true)]
    pub log2g: Option<SearchRange>,
    /// Number of folds, used for the evaluation and the cross-validation of the grid search
    #[clap(short = 'v')]
    pub folds: Option<usize>,
    /// Number of parallel workers of the grid search
    #[clap(long)]
    pub worker: Option<usize>,
    /// Seed of the random shuffling
    #[clap(long, default_value_t = 0)]
    pub seed: u64,
}

/// Background files of the open-world setting
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackgroundSource {
    pub name: String,
    pub instances: PathBuf,
    /// One URL per background instance
    pub domains: PathBuf,
}

/// Validated settings of one evaluation run
#[derive(Clone, Debug, PartialEq)]
pub struct EvalConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub name: String,
    pub storage: Storage,
    pub quiet: bool,
    pub format: Format,
    /// Path of `mainPages_<format>` if main pages are used
    pub main_pages: Option<PathBuf>,
    pub quick: bool,
    pub shuffle_instances: bool,
    pub shuffle_subpages: bool,
    pub simple: bool,
    /// Only present in the open world
    pub background: Option<BackgroundSource>,
    pub separate: bool,
    /// 0-based indices of websites for the separate evaluation, all websites if empty
    pub limit_websites: Vec<usize>,
    pub limits: InstanceLimits,
    pub limit_subpages: Option<usize>,
    pub folds: usize,
    pub seed: u64,
    pub tools: SvmTools,
    pub search: GridSearch,
}

impl EvalConfig {
    pub fn open_world(&self) -> bool {
        self.background.is_some()
    }
}

impl CliArgs {
    /// Validate all options and resolve the paths.
    ///
    /// No file is written, but all input files and executables must exist.
    pub fn into_config(self) -> Result<EvalConfig> {
        let input = match self.input {
            Some(input) => input,
            None => env_dir("dir_EVAL_INPUT", "in")?.join("wsc_features"),
        };
        if !input.is_dir() {
            bail!("Invalid input path {}", input.display());
        }
        let output = match self.output {
            Some(output) => output,
            None => env_dir("dir_EVAL_OUTPUT", "out")?,
        };
        if self.name.is_empty() {
            bail!("The output name must not be empty");
        }

        let main_pages = if bool::from(self.mainpages) {
            let path = main_pages_file(&input, self.format);
            if !path.is_file() {
                bail!("Invalid main pages file {}", path.display());
            }
            Some(path)
        } else {
            None
        };

        let background = match (self.setting, self.background) {
            (Setting::OW, None) => bail!("No background file set in the open-world setting"),
            (Setting::OW, Some(name)) => Some(background_source(&input, name, self.format)?),
            (Setting::CW, Some(_)) => bail!("Background file set in the closed-world setting"),
            (Setting::CW, None) => None,
        };

        let separate = bool::from(self.separate_evaluation);
        if separate && background.is_none() {
            bail!("Separate evaluation is only meaningful in the open-world setting");
        }
        if !separate && !self.limit_websites.is_empty() {
            bail!("Websites can only be limited in the separate evaluation");
        }

        let mut limits = self.limit_instances.unwrap_or_default();
        if background.is_none() && limits.background.take().is_some() {
            log::warn!("The background instance limit is ignored in the closed-world setting");
        }

        let folds = match self.folds {
            Some(0) => bail!("The number of folds must be positive"),
            Some(folds) => folds,
            None => 10,
        };
        if self.worker == Some(0) {
            bail!("The number of workers must be positive");
        }

        let svm = match self.svm {
            Some(svm) => svm,
            None => env_dir("dir_EVAL_LIBSVM", "svm")?,
        };
        if !svm.is_dir() {
            bail!("Invalid libSVM path {}", svm.display());
        }
        let gnuplot = match self.gnuplot.as_deref() {
            Some("null") => None,
            Some(gnuplot) => Some(PathBuf::from(gnuplot)),
            None => Some(PathBuf::from(DEFAULT_GNUPLOT)).filter(|path| path.exists()),
        };
        let tools = SvmTools::from_dir(&svm, self.python, gnuplot);
        tools.check()?;

        Ok(EvalConfig {
            input,
            output,
            name: self.name,
            storage: self.storage,
            quiet: self.quiet,
            format: self.format,
            main_pages,
            quick: self.quick_cv.into(),
            shuffle_instances: self.random_instances.into(),
            shuffle_subpages: self.random_subpages.into(),
            simple: self.simple.into(),
            background,
            separate,
            limit_websites: self.limit_websites,
            limits,
            limit_subpages: self.limit_subpages,
            folds,
            seed: self.seed,
            tools,
            search: GridSearch {
                log2c: self.log2c,
                log2g: self.log2g,
                cv_folds: self.folds,
                workers: self.worker,
            },
        })
    }
}

fn env_dir(var: &str, flag: &str) -> Result<PathBuf> {
    match std::env::var_os(var) {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => bail!(
            "Neither `--{}` nor the environment variable ${} is set",
            flag,
            var
        ),
    }
}

fn background_source(input: &Path, name: String, format: Format) -> Result<BackgroundSource> {
    if name.is_empty() {
        bail!("The background name must not be empty");
    }
    let instances = background_file(input, &name, format);
    if !instances.is_file() {
        bail!("Invalid background file {}", instances.display());
    }
    let domains = background_domain_file(input, &name, format);
    if !domains.is_file() {
        bail!("Invalid domain list {}", domains.display());
    }
    Ok(BackgroundSource {
        name,
        instances,
        domains,
    })
}
