//! Run the complete evaluation pipeline.
//!
//! One run merges, scales and groups the dataset, prepares it and evaluates all folds.
//! In the separate evaluation this happens once per website, with only that website in the foreground.

use crate::aggregate::{append_separate_summary, write_results, Aggregator, SeparateRecord, Tally};
use crate::classes::{read_classes, BackgroundDomains};
use crate::config::EvalConfig;
use crate::dataset::{
    limit_instances, shuffle_instances, shuffle_subpages, trim_background, InstanceCounts,
};
use crate::partition::{write_fold, write_pooled, BackgroundFolds, Layout, SplitCounts};
use crate::scenario::{Artifacts, Scenario, ScenarioSize};
use crate::storage::fold_temporaries;
use crate::tools::HyperParameters;
use color_eyre::eyre::{bail, eyre, Context as _, Result};
use features::discover::{site_files, SiteFile};
use features::merge::{merge_features, MergeInput};
use itertools::Itertools as _;
use rand::SeedableRng as _;
use rand_chacha::ChaCha12Rng;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Progress of a single fold
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FoldState {
    /// Training and test files are not written yet
    Pending,
    Searching,
    Training,
    Predicting,
    Done,
}

impl FoldState {
    /// The search is skipped if the parameters of the pooled search are reused.
    pub fn next(self, quick: bool) -> Self {
        match self {
            FoldState::Pending if quick => FoldState::Training,
            FoldState::Pending => FoldState::Searching,
            FoldState::Searching => FoldState::Training,
            FoldState::Training => FoldState::Predicting,
            FoldState::Predicting | FoldState::Done => FoldState::Done,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct FoldSummary {
    pub fold: usize,
    pub params: HyperParameters,
    pub lines: SplitCounts,
}

/// Everything reported about one run, also stored as `<name><scenario>.summary.json`
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RunSummary {
    pub name: String,
    pub scenario: Scenario,
    pub layout: Layout,
    pub instances: InstanceCounts,
    pub background: Option<BackgroundFolds>,
    pub skipped_background: usize,
    /// Parameters of the pooled search in quick mode
    pub pooled_search: Option<HyperParameters>,
    pub folds: Vec<FoldSummary>,
    pub tally: Tally,
}

impl RunSummary {
    /// Number of test instances over all folds
    pub fn expected_total(&self) -> usize {
        self.layout.sites
            * self.instances.per_page
            * self.layout.pages_per_fold()
            * self.layout.folds
            + self.background.map(|bg| bg.size).unwrap_or(0)
    }

    pub fn report(&self) -> String {
        format!(
            "Correct: {} Wrong: {} of {}",
            self.tally.correct,
            self.tally.wrong,
            self.expected_total()
        )
    }
}

/// Evaluate the configured dataset.
///
/// Returns one summary per run, that is one per website in the separate evaluation.
pub fn run(config: &EvalConfig) -> Result<Vec<RunSummary>> {
    std::fs::create_dir_all(&config.output).wrap_err_with(|| {
        format!(
            "Failed to create output directory {}",
            config.output.display()
        )
    })?;

    let sites = site_files(&config.input, config.format)?;
    if sites.is_empty() {
        bail!(
            "No `wsc*_{}` files found in {}",
            config.format,
            config.input.display()
        );
    }
    log::info!(
        "Found {} websites in {}: {}",
        sites.len(),
        config.input.display(),
        sites.iter().map(|site| &site.name).join(", ")
    );

    if !config.separate {
        let foreground = sites.iter().map(|site| site.name.to_lowercase()).collect();
        let summary = run_once(config, &sites, &config.name, foreground)?;
        return Ok(vec![summary]);
    }

    let selected = select_sites(&sites, &config.limit_websites)?;

    let mut summaries = Vec::with_capacity(selected.len());
    for site in selected {
        let name = format!("{}_{}", config.name, site.name);
        log::info!("Evaluate website {} as {}", site.name, name);
        let foreground = BTreeSet::from([site.name.to_lowercase()]);
        let summary = run_once(config, std::slice::from_ref(site), &name, foreground)?;

        let separate_summary = Artifacts::new(
            &config.output,
            &format!("{}_Separate", config.name),
            &summary.scenario,
        )
        .result();
        append_separate_summary(
            &separate_summary,
            &SeparateRecord {
                name,
                counts: summary.tally.confusion.unwrap_or_default(),
            },
        )?;
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Pick the websites of a separate evaluation by their index, all of them if `indices` is empty.
///
/// Every website is evaluated at most once and in the order of `sites`.
fn select_sites<'a>(sites: &'a [SiteFile], indices: &[usize]) -> Result<Vec<&'a SiteFile>> {
    if indices.is_empty() {
        return Ok(sites.iter().collect());
    }
    let indices: BTreeSet<usize> = indices.iter().copied().collect();
    indices
        .into_iter()
        .map(|idx| {
            sites.get(idx).ok_or_else(|| {
                eyre!(
                    "Website index {} out of range, only {} websites exist",
                    idx,
                    sites.len()
                )
            })
        })
        .collect()
}

/// Evaluate `sites` against the background of the configuration.
///
/// `foreground` lists the websites whose background instances are dropped.
fn run_once(
    config: &EvalConfig,
    sites: &[SiteFile],
    name: &str,
    foreground: BTreeSet<String>,
) -> Result<RunSummary> {
    let base = Scenario::new(config.simple, config.format);
    let base_artifacts = Artifacts::new(&config.output, name, &base);

    // Merge and scale
    let merged = base_artifacts.merged();
    let merge_summary = merge_features(
        &MergeInput {
            sites,
            main_pages: config.main_pages.as_deref(),
            background: config.background.as_ref().map(|bg| bg.instances.as_path()),
        },
        &merged,
    )?;
    log::info!(
        "Merged {} foreground ({} main page) and {} background instances into {}",
        merge_summary.foreground_lines(),
        merge_summary.main_page_lines,
        merge_summary.background_lines,
        merged.display()
    );
    let scaled = base_artifacts.merged_scaled();
    config
        .tools
        .scale(&merged, &base_artifacts.range(), &scaled)?;

    // Group into pages
    let domains = match &config.background {
        Some(bg) => Some(BackgroundDomains::load(&bg.domains, foreground)?),
        None => None,
    };
    let mut classes = read_classes(
        &scaled,
        Some(merge_summary.site_blocks.as_slice()),
        domains.as_ref(),
    )?;
    config.storage.cleanup([&merged, &scaled])?;
    if classes.skipped_background > 0 {
        log::info!(
            "Skipped {} background instances of monitored websites",
            classes.skipped_background
        );
    }

    let layout = Layout::new(
        classes.page_count(),
        sites.len(),
        config.main_pages.is_some(),
        config.folds,
        config.limit_subpages,
    )?;
    log::info!(
        "{} websites with {} subpages each, {} subpages per fold",
        layout.sites,
        layout.subpages,
        layout.pages_per_fold()
    );

    // Prepare the dataset
    let mut rng = ChaCha12Rng::seed_from_u64(config.seed);
    if config.shuffle_instances {
        shuffle_instances(&mut classes, &mut rng);
    }
    if config.shuffle_subpages {
        shuffle_subpages(&mut classes, &layout, &mut rng)?;
    }
    let background = if config.open_world() {
        Some(trim_background(
            &mut classes,
            config.limits.background,
            config.folds,
        )?)
    } else {
        None
    };
    let instances = limit_instances(&mut classes, &layout, &config.limits)?;

    let scenario = base.with_size(&ScenarioSize {
        sites: if config.separate {
            None
        } else {
            Some(layout.sites)
        },
        per_site: layout.per_site,
        per_page: instances.per_page,
        per_main_page: instances.per_main_page,
        background: background.map(|bg| bg.size),
    });
    let artifacts = Artifacts::new(&config.output, name, &scenario);
    log::info!("Scenario {}", scenario);

    let pooled_search = if config.quick {
        let pooled = artifacts.pooled();
        let lines = write_to_file(&pooled, |out| {
            write_pooled(&classes, &layout, background.as_ref(), config.simple, out)
        })?;
        log::info!("Grid search on {} pooled instances", lines);
        let params = config.tools.grid_search(
            &config.search,
            &pooled,
            &artifacts.search_status(None),
            &artifacts.search_plot(None),
        )?;
        log::info!(
            "Best c={}, g={} CV rate={}",
            params.cost,
            params.gamma,
            params.rate
        );
        config.storage.cleanup([&pooled])?;
        Some(params)
    } else {
        None
    };

    let progress_bar = if config.quiet {
        indicatif::ProgressBar::hidden()
    } else {
        let progress_bar = indicatif::ProgressBar::with_draw_target(
            Some(config.folds as u64),
            indicatif::ProgressDrawTarget::stderr_with_hz(1),
        );
        progress_bar.set_style(indicatif::ProgressStyle::default_bar().template(
            "[{elapsed_precise}] ETA: {eta_precise} {wide_bar:40.cyan/blue} {pos:>3}/{len:3} \
             folds",
        )?);
        progress_bar
    };
    progress_bar.inc(0);

    let mut folds = Vec::with_capacity(config.folds);
    for fold in 1..=config.folds {
        let summary = evaluate_fold(
            config,
            &artifacts,
            fold,
            pooled_search,
            |train, test| {
                write_fold(
                    &classes,
                    &layout,
                    background.as_ref(),
                    fold,
                    config.simple,
                    train,
                    test,
                )
            },
        )?;
        progress_bar.inc(1);
        folds.push(summary);
    }
    progress_bar.finish_and_clear();

    let aggregator = Aggregator::new(&layout, config.simple, config.separate);
    let predictions: Vec<_> = (1..=config.folds).map(|fold| artifacts.predict(fold)).collect();
    let tally = write_results(
        &aggregator,
        predictions.iter().map(|path| path.as_path()),
        &artifacts.result(),
    )?;
    log::info!("Output prediction: {}", artifacts.result().display());

    let summary = RunSummary {
        name: name.to_string(),
        scenario,
        layout,
        instances,
        background,
        skipped_background: classes.skipped_background,
        pooled_search,
        folds,
        tally,
    };
    let expected = summary.expected_total() as u64;
    if tally.total() != expected {
        log::warn!(
            "Scored {} predictions, but {} test instances were written",
            tally.total(),
            expected
        );
    }
    std::fs::write(artifacts.summary(), serde_json::to_string_pretty(&summary)?)?;

    config
        .storage
        .cleanup(fold_temporaries(config.folds, &artifacts))?;
    Ok(summary)
}

/// Drive one fold from writing its data to the finished prediction.
fn evaluate_fold<F>(
    config: &EvalConfig,
    artifacts: &Artifacts,
    fold: usize,
    pooled_search: Option<HyperParameters>,
    write_data: F,
) -> Result<FoldSummary>
where
    F: FnOnce(&mut BufWriter<File>, &mut BufWriter<File>) -> Result<SplitCounts>,
{
    let train = artifacts.train(fold);
    let test = artifacts.test(fold);
    let model = artifacts.model(fold);
    let quick = pooled_search.is_some();

    let mut write_data = Some(write_data);
    let mut lines = SplitCounts::default();
    let mut params = pooled_search;
    let mut state = FoldState::Pending;
    while state != FoldState::Done {
        match state {
            FoldState::Pending => {
                if let Some(write_data) = write_data.take() {
                    let mut train_out = create(&train)?;
                    let mut test_out = create(&test)?;
                    lines = write_data(&mut train_out, &mut test_out)?;
                    train_out.flush()?;
                    test_out.flush()?;
                }
                log::debug!(
                    "Fold {}: {} training and {} test instances",
                    fold,
                    lines.train,
                    lines.test
                );
            }
            FoldState::Searching => {
                let found = config.tools.grid_search(
                    &config.search,
                    &train,
                    &artifacts.search_status(Some(fold)),
                    &artifacts.search_plot(Some(fold)),
                )?;
                log::info!(
                    "Fold: {:>3} - Best c={}, g={} CV rate={}",
                    fold,
                    found.cost,
                    found.gamma,
                    found.rate
                );
                params = Some(found);
            }
            FoldState::Training => {
                let params = params.ok_or_else(|| eyre!("Fold {} has no parameters", fold))?;
                config.tools.train(&params, &train, &model)?;
            }
            FoldState::Predicting => {
                config
                    .tools
                    .predict(&test, &model, &artifacts.predict(fold), config.quiet)?;
            }
            FoldState::Done => {}
        }
        state = state.next(quick);
    }

    Ok(FoldSummary {
        fold,
        params: params.ok_or_else(|| eyre!("Fold {} has no parameters", fold))?,
        lines,
    })
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn write_to_file<T, F>(path: &Path, write: F) -> Result<T>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<T>,
{
    let mut out = create(path)?;
    let res = write(&mut out)?;
    out.flush()?;
    Ok(res)
}
