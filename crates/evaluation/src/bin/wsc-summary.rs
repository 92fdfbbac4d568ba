//! Collect the results of separate evaluations.
//!
//! This consumes the `<name>_Separate<scenario>.result` files written by `easy-wsc`.
//! Every line holds the confusion counts of one website: `name tp fp fn tn`.
//! The output is a JSON list with the counts and rates per website and a total per file.

#![deny(unused_import_braces, unused_qualifications)]

use color_eyre::eyre::Result;
use evaluation::aggregate::{read_separate_summary, SeparateRecord};
use evaluation::{ConfusionCounts, FlattenedPair};
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
struct CliArgs {
    /// Only use files whose name contains this value, for example a scenario like `_simple_TCP`
    #[clap(long)]
    filter: Option<String>,
    /// Write the JSON to this file instead of stdout
    #[clap(long)]
    output: Option<PathBuf>,
    /// Folder which contains the summary files, searched recursively
    #[arg(num_args(1))]
    basedir: PathBuf,
}

impl CliArgs {
    fn files(&self) -> Vec<PathBuf> {
        let matches = |entry: &walkdir::DirEntry| -> bool {
            let file_name = entry.file_name().to_string_lossy();
            file_name.contains("_Separate")
                && file_name.ends_with(".result")
                && self
                    .filter
                    .as_deref()
                    .map_or(true, |filter| file_name.contains(filter))
        };

        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.basedir)
            .into_iter()
            .filter_map(|e| match e {
                Ok(e) if e.file_type().is_file() && matches(&e) => Some(e.path().to_owned()),
                Ok(_) => None,
                Err(err) => {
                    log::warn!("{}", err);
                    None
                }
            })
            .collect();
        files.sort();
        files
    }
}

#[derive(Debug, serde::Serialize)]
struct Rates {
    fpr: f64,
    fnr: f64,
    f1: f64,
    balanced_accuracy: f64,
}

impl From<&ConfusionCounts> for Rates {
    fn from(counts: &ConfusionCounts) -> Self {
        Self {
            fpr: counts.fpr(),
            fnr: counts.fnr(),
            f1: counts.f1_score(),
            balanced_accuracy: counts.balanced_accuracy(),
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();
    let args: CliArgs = clap::Parser::parse();

    let files = args.files();
    log::info!("Found {} summary files", files.len());

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let records = read_separate_summary(&file)?;
        let total = records
            .iter()
            .fold(ConfusionCounts::default(), |acc, record| acc + record.counts);

        let websites: Vec<serde_json::Value> = records
            .iter()
            .map(|SeparateRecord { name, counts }| {
                let rates = Rates::from(counts);
                serde_json::json!({
                    "name": name,
                    "counts": FlattenedPair {
                        a: counts,
                        b: &rates,
                    },
                })
            })
            .collect();
        let total_rates = Rates::from(&total);

        results.push(serde_json::json!({
            "file": file,
            "websites": websites,
            "total": FlattenedPair {
                a: &total,
                b: &total_rates,
            },
        }));
    }

    let json = serde_json::to_string_pretty(&results)?;
    match &args.output {
        Some(output) => std::fs::write(output, json)?,
        None => println!("{}", json),
    }

    Ok(())
}
