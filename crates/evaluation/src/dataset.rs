//! Preparation of the grouped dataset before it is cut into folds.
//!
//! Shuffling, background trimming and instance limits all operate on the [`ClassSet`] in place.

use crate::classes::ClassSet;
use crate::partition::{BackgroundFolds, Layout};
use color_eyre::eyre::{bail, eyre, Result};
use rand::seq::SliceRandom as _;
use rand::Rng;

/// Number of instances to keep: `#subpages,#mainpages,#background`, `-1` keeps all
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct InstanceLimits {
    pub subpages: Option<usize>,
    pub main_pages: Option<usize>,
    pub background: Option<usize>,
}

impl std::str::FromStr for InstanceLimits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |value: &str| -> Result<Option<usize>, String> {
            match value.trim() {
                "-1" => Ok(None),
                value => value
                    .parse()
                    .map(Some)
                    .map_err(|_| format!("invalid instance limit: {}", value)),
            }
        };
        let values: Vec<&str> = s.split(',').collect();
        match values[..] {
            [subpages, main_pages, background] => Ok(Self {
                subpages: parse(subpages)?,
                main_pages: parse(main_pages)?,
                background: parse(background)?,
            }),
            _ => Err(format!(
                "invalid instance limits: {}, expected `#subpages,#mainpages,#background`",
                s
            )),
        }
    }
}

/// Instances per page after the limits are applied
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct InstanceCounts {
    pub per_page: usize,
    pub per_main_page: Option<usize>,
}

/// Shuffle the instances inside every page and the background pool.
pub fn shuffle_instances<R: Rng>(classes: &mut ClassSet, rng: &mut R) {
    for instances in classes.pages.values_mut() {
        instances.shuffle(rng);
    }
    classes.background.shuffle(rng);
}

/// Shuffle the order of the subpages inside every website.
///
/// Page ids stay in place, only the instances move to another id.
/// Main pages keep the first id of their website.
pub fn shuffle_subpages<R: Rng>(classes: &mut ClassSet, layout: &Layout, rng: &mut R) -> Result<()> {
    for site in 1..=layout.sites {
        let ids: Vec<usize> = layout
            .site_pages(site)
            .filter(|&page| !layout.is_main_page(page))
            .collect();
        let mut pages = ids
            .iter()
            .map(|page| {
                classes
                    .pages
                    .remove(page)
                    .ok_or_else(|| eyre!("Page {} does not exist", page))
            })
            .collect::<Result<Vec<_>>>()?;
        pages.shuffle(rng);
        classes.pages.extend(ids.into_iter().zip(pages));
    }
    Ok(())
}

/// Cut the background pool to a size divisible by `folds`.
///
/// Without a `limit` the pool is trimmed down to the nearest multiple of `folds`.
/// A `limit` must be divisible by `folds` and cannot exceed the pool.
pub fn trim_background(
    classes: &mut ClassSet,
    limit: Option<usize>,
    folds: usize,
) -> Result<BackgroundFolds> {
    let available = classes.background.len();
    let size = match limit {
        Some(limit) => {
            if limit > available {
                bail!(
                    "Cannot use {} background instances, only {} are available",
                    limit,
                    available
                );
            }
            if limit % folds != 0 {
                bail!(
                    "Background of {} instances cannot be partitioned into {} equally sized folds!",
                    limit,
                    folds
                );
            }
            limit
        }
        None => available - available % folds,
    };
    if size != available {
        log::info!("Trimmed background from {} to {} instances", available, size);
    }
    if size == 0 {
        log::warn!("The background pool is empty");
    }
    classes.background.truncate(size);
    BackgroundFolds::new(size, folds)
}

/// Apply the instance limits and ensure all pages of a kind have the same number of instances.
///
/// Without a limit, the first page of a kind defines the expected count.
pub fn limit_instances(
    classes: &mut ClassSet,
    layout: &Layout,
    limits: &InstanceLimits,
) -> Result<InstanceCounts> {
    let mut per_page = limits.subpages;
    let mut per_main_page = if layout.main_page {
        limits.main_pages
    } else {
        None
    };

    for page in layout.page_ids() {
        let is_main = layout.is_main_page(page);
        let instances = classes
            .pages
            .get_mut(&page)
            .ok_or_else(|| eyre!("Page {} does not exist", page))?;
        let (kind, target) = if is_main {
            ("main page", &mut per_main_page)
        } else {
            ("subpage", &mut per_page)
        };
        let expected = *target.get_or_insert(instances.len());
        if instances.len() < expected {
            bail!(
                "The {} with page id {} (website {}) has {} instances, but {} are required",
                kind,
                page,
                layout.site_of(page),
                instances.len(),
                expected
            );
        }
        if limits_kind(limits, is_main).is_none() && instances.len() != expected {
            bail!(
                "The {} with page id {} (website {}) has {} instances, but the other {}s have {}",
                kind,
                page,
                layout.site_of(page),
                instances.len(),
                kind,
                expected
            );
        }
        instances.truncate(expected);
    }

    let per_page = per_page.ok_or_else(|| eyre!("The dataset does not contain any subpage"))?;
    if per_page == 0 {
        bail!("Subpages without instances cannot be evaluated");
    }
    Ok(InstanceCounts {
        per_page,
        per_main_page,
    })
}

fn limits_kind(limits: &InstanceLimits, main_page: bool) -> Option<usize> {
    if main_page {
        limits.main_pages
    } else {
        limits.subpages
    }
}
