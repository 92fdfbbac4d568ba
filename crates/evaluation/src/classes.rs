//! Group the scaled dataset into pages.
//!
//! The merged file lists all instances of a page next to each other, therefore a change of the
//! label starts a new page.
//! Pages receive dense ids `1..=N` in file order, independent of their original label values.
//! Background instances (label `0`) are collected separately.

use color_eyre::eyre::{bail, eyre, Context as _, Result};
use features::domain::domain_label;
use features::Instance;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Domains of the background instances and the websites which must not appear in the background
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackgroundDomains {
    /// Domain label per background instance, in file order
    pub domains: Vec<String>,
    /// Lowercase names of the monitored websites
    pub foreground: BTreeSet<String>,
}

impl BackgroundDomains {
    /// Read the domain list, one URL per background instance.
    pub fn load(path: &Path, foreground: BTreeSet<String>) -> Result<Self> {
        let file =
            File::open(path).wrap_err_with(|| format!("Missing domain list {}", path.display()))?;
        let domains = BufReader::new(file)
            .lines()
            .map(|line| line.map(|link| domain_label(&link)))
            .collect::<Result<Vec<_>, _>>()
            .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        Ok(Self {
            domains,
            foreground,
        })
    }

    pub fn is_foreground(&self, domain: &str) -> bool {
        self.foreground.contains(domain)
    }
}

/// All instances of a dataset grouped by page
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassSet {
    /// Dense page id to the instances of the page
    pub pages: BTreeMap<usize, Vec<Instance>>,
    pub background: Vec<Instance>,
    /// Background instances dropped because they belong to a monitored website
    pub skipped_background: usize,
}

impl ClassSet {
    /// Number of foreground pages, main pages included
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, page: usize) -> Result<&[Instance]> {
        self.pages
            .get(&page)
            .map(Vec::as_slice)
            .ok_or_else(|| eyre!("Page {} does not exist", page))
    }
}

/// Open `path` and group it with [`build_classes`].
pub fn read_classes(
    path: &Path,
    site_blocks: Option<&[usize]>,
    background: Option<&BackgroundDomains>,
) -> Result<ClassSet> {
    let file = File::open(path)
        .wrap_err_with(|| format!("Missing scaled file {}", path.display()))?;
    build_classes(BufReader::new(file), site_blocks, background)
        .wrap_err_with(|| format!("Invalid dataset {}", path.display()))
}

/// Group the lines of `scaled` into pages.
///
/// `site_blocks` holds the number of foreground lines per website as written by the merger.
/// A website boundary always starts a new page, and inside a website a page label may not come back after other pages.
///
/// Background instances are only allowed with `background`, which filters instances of the monitored websites.
pub fn build_classes<R: BufRead>(
    scaled: R,
    site_blocks: Option<&[usize]>,
    background: Option<&BackgroundDomains>,
) -> Result<ClassSet> {
    let mut classes = ClassSet::default();

    // Foreground line index at which each website starts
    let mut block_starts = site_blocks
        .map(|blocks| {
            blocks
                .iter()
                .scan(0, |start, &len| {
                    let this = *start;
                    *start += len;
                    Some(this)
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .into_iter()
        .peekable();
    let mut domains = background.map(|bg| bg.domains.iter());

    let mut page_id = 0;
    let mut last_label = None;
    let mut labels_in_block = BTreeSet::new();
    let mut foreground_lines = 0;
    let mut in_background = false;

    for (idx, line) in scaled.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let instance: Instance = line
            .parse()
            .map_err(|err| eyre!("line {}: {}", idx + 1, err))?;

        if instance.is_background() {
            let (bg, domains) = match (background, domains.as_mut()) {
                (Some(bg), Some(domains)) => (bg, domains),
                _ => bail!(
                    "line {}: background instance in a closed-world dataset, the instance numbering \
                     seems to be incorrect",
                    idx + 1
                ),
            };
            in_background = true;
            let domain = domains.next().ok_or_else(|| {
                eyre!(
                    "line {}: the domain list has fewer entries than background instances",
                    idx + 1
                )
            })?;
            if bg.is_foreground(domain) {
                log::info!("Skipped background instance of monitored website {}", domain);
                classes.skipped_background += 1;
            } else {
                classes.background.push(instance);
            }
            last_label = Some(features::BACKGROUND_LABEL);
            continue;
        }
        if in_background {
            bail!(
                "line {}: foreground instance with label {} after the background instances",
                idx + 1,
                instance.label
            );
        }

        let new_block = block_starts.next_if_eq(&foreground_lines).is_some();
        // Skip empty websites, which share the start index
        while block_starts.next_if_eq(&foreground_lines).is_some() {}
        if new_block {
            labels_in_block.clear();
        }
        if new_block || last_label != Some(instance.label) {
            if site_blocks.is_some() && !labels_in_block.insert(instance.label) {
                bail!(
                    "line {}: label {} appears again after other pages of the same website",
                    idx + 1,
                    instance.label
                );
            }
            page_id += 1;
        }
        last_label = Some(instance.label);
        foreground_lines += 1;
        classes.pages.entry(page_id).or_default().push(instance);
    }

    if let Some(blocks) = site_blocks {
        let expected: usize = blocks.iter().sum();
        if expected != foreground_lines {
            bail!(
                "Expected {} foreground instances but found {}",
                expected,
                foreground_lines
            );
        }
    }
    if let Some(remaining) = domains.map(Iterator::count) {
        if remaining > 0 {
            log::warn!(
                "The domain list has {} more entries than background instances",
                remaining
            );
        }
    }

    Ok(classes)
}
