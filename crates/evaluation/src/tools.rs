//! Invocation of the external libSVM executables.
//!
//! Expected inside the libSVM directory:
//!
//! * `svm-scale`
//! * `svm-train-q`: an unpatched `svm-train`, which does not print the prediction output
//! * `svm-predict`: patched to write `predicted,true` per line into the prediction file
//! * `tools/grid_patched.py`: patched grid search, which prints `<cost> <gamma> <rate>` as last line

use color_eyre::eyre::{bail, Context as _, Result};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};

/// Failure modes of an external tool
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to start {tool}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}")]
    Failed { tool: String, status: ExitStatus },
    #[error("{tool} produced no output")]
    EmptyOutput { tool: String },
    #[error("Malformed grid search result `{line}`, expected `<cost> <gamma> <rate>`")]
    MalformedResult { line: String },
}

/// Range of a logarithmic grid search axis: `begin,end,step` or `null` to disable the axis
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SearchRange {
    Null,
    Range { begin: f64, end: f64, step: f64 },
}

impl std::str::FromStr for SearchRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "null" {
            return Ok(Self::Null);
        }
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| format!("invalid search range: {}", s))?;
        match values[..] {
            [begin, end, step] if step != 0. => Ok(Self::Range { begin, end, step }),
            _ => Err(format!(
                "invalid search range: {}, expected `begin,end,step` or `null`",
                s
            )),
        }
    }
}

impl fmt::Display for SearchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchRange::Null => write!(f, "null"),
            SearchRange::Range { begin, end, step } => write!(f, "{},{},{}", begin, end, step),
        }
    }
}

/// Hyper-parameters chosen by the grid search
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HyperParameters {
    pub cost: f64,
    pub gamma: f64,
    /// Cross-validation accuracy reached with `cost` and `gamma`
    pub rate: f64,
}

impl std::str::FromStr for HyperParameters {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ToolError::MalformedResult {
            line: s.to_string(),
        };
        let values = s
            .split_ascii_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| malformed())?;
        match values[..] {
            [cost, gamma, rate] => Ok(Self { cost, gamma, rate }),
            _ => Err(malformed()),
        }
    }
}

/// The result of the grid search is the last non-empty line of its output.
pub fn parse_grid_output(tool: &str, stdout: &str) -> Result<HyperParameters, ToolError> {
    let last_line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| ToolError::EmptyOutput {
            tool: tool.to_string(),
        })?;
    last_line.trim().parse()
}

/// Settings passed through to the grid search
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridSearch {
    pub log2c: Option<SearchRange>,
    pub log2g: Option<SearchRange>,
    /// Internal cross-validation folds, the tool default when unset
    pub cv_folds: Option<usize>,
    pub workers: Option<usize>,
}

/// Paths of the external executables
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SvmTools {
    pub scale: PathBuf,
    pub train: PathBuf,
    pub predict: PathBuf,
    pub grid: PathBuf,
    /// Interpreter for the grid search script
    pub python: PathBuf,
    /// Plotting is disabled without gnuplot
    pub gnuplot: Option<PathBuf>,
}

impl SvmTools {
    pub fn from_dir(svm_dir: &Path, python: PathBuf, gnuplot: Option<PathBuf>) -> Self {
        Self {
            scale: svm_dir.join("svm-scale"),
            train: svm_dir.join("svm-train-q"),
            predict: svm_dir.join("svm-predict"),
            grid: svm_dir.join("tools").join("grid_patched.py"),
            python,
            gnuplot,
        }
    }

    /// Ensure all executables exist
    pub fn check(&self) -> Result<()> {
        for (path, what) in [
            (&self.scale, "svm-scale executable"),
            (&self.train, "svm-train executable"),
            (&self.predict, "svm-predict executable"),
            (&self.grid, "grid_patched.py"),
        ] {
            if !path.exists() {
                bail!("{} not found at {}", what, path.display());
            }
        }
        if let Some(gnuplot) = &self.gnuplot {
            if !gnuplot.exists() {
                bail!("gnuplot executable not found at {}", gnuplot.display());
            }
        }
        Ok(())
    }

    /// Scale `merged` into `scaled` and store the feature ranges in `range`.
    pub fn scale(&self, merged: &Path, range: &Path, scaled: &Path) -> Result<()> {
        let tool = tool_name(&self.scale);
        let stdout = File::create(scaled)
            .wrap_err_with(|| format!("Failed to create {}", scaled.display()))?;
        let mut cmd = Command::new(&self.scale);
        cmd.arg("-s").arg(range).arg(merged).stdout(stdout);
        log::debug!("Run {:?}", cmd);
        let status = cmd.status().map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?;
        if !status.success() {
            return Err(ToolError::Failed { tool, status }.into());
        }
        if std::fs::metadata(scaled)?.len() == 0 {
            return Err(ToolError::EmptyOutput { tool }.into());
        }
        Ok(())
    }

    /// Run the grid search on `training` and return the best parameters.
    ///
    /// An existing `status` file is handed to the search to resume an interrupted run.
    pub fn grid_search(
        &self,
        search: &GridSearch,
        training: &Path,
        status: &Path,
        plot: &Path,
    ) -> Result<HyperParameters> {
        let tool = tool_name(&self.grid);
        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.grid).arg("-svmtrain").arg(&self.train);
        match &self.gnuplot {
            Some(gnuplot) => cmd.arg("-gnuplot").arg(gnuplot),
            None => cmd.arg("-gnuplot").arg("null"),
        };
        if let Some(log2c) = search.log2c {
            cmd.arg("-log2c").arg(log2c.to_string());
        }
        if let Some(log2g) = search.log2g {
            cmd.arg("-log2g").arg(log2g.to_string());
        }
        if let Some(cv_folds) = search.cv_folds {
            cmd.arg("-v").arg(cv_folds.to_string());
        }
        if let Some(workers) = search.workers {
            cmd.arg("-worker").arg(workers.to_string());
        }
        if status.is_file() {
            log::info!("Resume grid search from {}", status.display());
            cmd.arg("-resume").arg(status);
        }
        cmd.arg("-out").arg(status).arg("-png").arg(plot).arg(training);

        let output = run(&mut cmd, &tool, true)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_grid_output(&tool, &stdout)?)
    }

    pub fn train(&self, params: &HyperParameters, training: &Path, model: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.train);
        cmd.arg("-c")
            .arg(params.cost.to_string())
            .arg("-g")
            .arg(params.gamma.to_string())
            .arg(training)
            .arg(model);
        run(&mut cmd, &tool_name(&self.train), true)?;
        Ok(())
    }

    /// Predict `test` with `model`, the tool prints its accuracy unless `quiet`.
    pub fn predict(&self, test: &Path, model: &Path, predict: &Path, quiet: bool) -> Result<()> {
        let mut cmd = Command::new(&self.predict);
        cmd.arg(test).arg(model).arg(predict);
        run(&mut cmd, &tool_name(&self.predict), quiet)?;
        Ok(())
    }
}

fn tool_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}

/// Block until the tool exits, either capturing or forwarding its stdout.
fn run(cmd: &mut Command, tool: &str, capture: bool) -> Result<Output, ToolError> {
    log::debug!("Run {:?}", cmd);
    let stdout = if capture {
        Stdio::piped()
    } else {
        Stdio::inherit()
    };
    let output = cmd
        .stdout(stdout)
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status: output.status,
        });
    }
    Ok(output)
}
