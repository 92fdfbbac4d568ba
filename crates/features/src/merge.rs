//! Merge per-website feature files into a single dataset file.

use crate::discover::SiteFile;
use crate::{Instance, MAIN_PAGE_LABEL};
use color_eyre::eyre::{bail, eyre, Context as _, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Files which are combined into one merged file
#[derive(Clone, Debug)]
pub struct MergeInput<'a> {
    /// Websites in the order they are written
    pub sites: &'a [SiteFile],
    /// Shared file with the main page instances, labeled with the site index
    pub main_pages: Option<&'a Path>,
    /// Open-world instances, appended verbatim after all websites
    pub background: Option<&'a Path>,
}

/// Line counts of a merged file
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct MergeSummary {
    /// Number of lines written per website block, main page lines included
    pub site_blocks: Vec<usize>,
    pub main_page_lines: usize,
    pub background_lines: usize,
}

impl MergeSummary {
    pub fn foreground_lines(&self) -> usize {
        self.site_blocks.iter().sum()
    }
}

/// Read all instances of a feature file, failing with the offending line number.
pub fn read_instances(path: &Path) -> Result<Vec<Instance>> {
    let file = File::open(path).wrap_err_with(|| format!("Missing input file {}", path.display()))?;
    let mut instances = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let instance: Instance = line
            .parse()
            .map_err(|err| eyre!("{}:{}: {}", path.display(), idx + 1, err))?;
        instances.push(instance);
    }
    Ok(instances)
}

/// Ensure all instances of one page follow each other.
///
/// A label which shows up again after a different label breaks the page numbering of the class builder.
pub fn check_grouped(instances: &[Instance], path: &Path) -> Result<()> {
    let mut seen = BTreeSet::new();
    let mut last = None;
    for (idx, instance) in instances.iter().enumerate() {
        if last != Some(instance.label) {
            if !seen.insert(instance.label) {
                bail!(
                    "{}: instance {} continues page {} after other pages, pages must be contiguous",
                    path.display(),
                    idx + 1,
                    instance.label
                );
            }
            last = Some(instance.label);
        }
    }
    Ok(())
}

/// Write the merged dataset.
///
/// Each website contributes its main page instances, relabeled to [`MAIN_PAGE_LABEL`], followed by its own lines.
/// The background instances are appended at the end.
pub fn merge_features(input: &MergeInput<'_>, output: &Path) -> Result<MergeSummary> {
    for path in input
        .sites
        .iter()
        .map(|site| site.path.as_path())
        .chain(input.main_pages)
        .chain(input.background)
    {
        if !path.is_file() {
            bail!("Missing input file {}", path.display());
        }
    }

    let main_pages = match input.main_pages {
        Some(path) => read_instances(path)?,
        None => Vec::new(),
    };

    let mut summary = MergeSummary::default();
    let mut out = BufWriter::new(
        File::create(output)
            .wrap_err_with(|| format!("Failed to create merged file {}", output.display()))?,
    );

    for site in input.sites {
        let mut block = 0;
        if let Some(main_path) = input.main_pages {
            let mains: Vec<&Instance> = main_pages
                .iter()
                .filter(|instance| instance.label == site.index as i64)
                .collect();
            if mains.is_empty() {
                bail!(
                    "No main page instances for website {} (index {}) in {}",
                    site.name,
                    site.index,
                    main_path.display()
                );
            }
            for instance in mains {
                writeln!(out, "{}", instance.relabeled(MAIN_PAGE_LABEL))?;
                block += 1;
            }
            summary.main_page_lines += block;
        }

        let instances = read_instances(&site.path)?;
        check_grouped(&instances, &site.path)?;
        for instance in &instances {
            writeln!(out, "{}", instance)?;
        }
        block += instances.len();
        log::debug!("Merged {} lines of {}", block, site.path.display());
        summary.site_blocks.push(block);
    }

    if let Some(path) = input.background {
        for instance in read_instances(path)? {
            writeln!(out, "{}", instance)?;
            summary.background_lines += 1;
        }
    }
    out.flush()?;

    Ok(summary)
}

/// Merge all websites into one file labeled by website index and append the main pages.
///
/// The names of the merged files are written to `info`, one per line.
pub fn merge_site_labeled(
    sites: &[SiteFile],
    main_pages: Option<&Path>,
    output: &Path,
    info: &Path,
) -> Result<usize> {
    let mut out = BufWriter::new(
        File::create(output)
            .wrap_err_with(|| format!("Failed to create merged file {}", output.display()))?,
    );
    let mut info_out = BufWriter::new(
        File::create(info).wrap_err_with(|| format!("Failed to create {}", info.display()))?,
    );

    let mut lines = 0;
    for site in sites {
        for instance in read_instances(&site.path)? {
            writeln!(out, "{}", instance.relabeled(site.index as i64))?;
            lines += 1;
        }
        let file_name: PathBuf = site.path.file_name().map(PathBuf::from).unwrap_or_default();
        writeln!(info_out, "{}", file_name.display())?;
    }
    if let Some(path) = main_pages {
        for instance in read_instances(path)? {
            writeln!(out, "{}", instance)?;
            lines += 1;
        }
    }
    out.flush()?;
    info_out.flush()?;

    Ok(lines)
}
