//! Assignment of pages and background instances to the test and train splits of each fold.
//!
//! Website `s` owns the page ids `(s-1)*slots+1 ..= s*slots`.
//! With main pages, the first id of every website is its main page, which is trained in every fold and never tested.
//! The subpages of a website are cut into `folds` contiguous windows of `pages_per_fold` pages.
//! Fold `f` tests window `f` of every website and trains on all other subpages.
//!
//! ```text
//! slots = 4 (main page + 3 subpages), folds = 3
//!
//! page id   1    2    3    4  |  5    6    7    8
//! fold 1    tr   TE   tr   tr |  tr   TE   tr   tr
//! fold 2    tr   tr   TE   tr |  tr   tr   TE   tr
//! fold 3    tr   tr   tr   TE |  tr   tr   tr   TE
//! ```
//!
//! The background is cut independently into `folds` windows over its instance indices.

use crate::classes::ClassSet;
use color_eyre::eyre::{bail, Result};
use std::io::Write;
use std::ops::{Range, RangeInclusive};

/// Where the instances of a page end up in a fold
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
    /// Subpages beyond the per-website limit are not used at all
    Excluded,
}

/// Arrangement of the pages of all websites
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Layout {
    pub sites: usize,
    /// Subpages per website, main page not included
    pub subpages: usize,
    pub main_page: bool,
    pub folds: usize,
    /// Subpages per website which take part in the evaluation
    pub per_site: usize,
}

impl Layout {
    /// Derive the layout from the number of pages found in the dataset.
    ///
    /// Fails if the subpages cannot be cut into equally sized folds.
    pub fn new(
        page_count: usize,
        sites: usize,
        main_page: bool,
        folds: usize,
        limit_subpages: Option<usize>,
    ) -> Result<Self> {
        if sites == 0 {
            bail!("The dataset does not contain any website");
        }
        if folds == 0 {
            bail!("The number of folds must be positive");
        }
        let main_pages = if main_page { sites } else { 0 };
        if page_count <= main_pages {
            bail!(
                "Found {} pages for {} websites, there are no subpages",
                page_count,
                sites
            );
        }
        let subpage_count = page_count - main_pages;
        if subpage_count % sites != 0 || (subpage_count / sites) % folds != 0 {
            bail!(
                "Pages cannot be partitioned into equally sized folds! ({} subpages, {} websites, \
                 {} folds)",
                subpage_count,
                sites,
                folds
            );
        }
        let subpages = subpage_count / sites;

        let per_site = match limit_subpages {
            Some(limit) => {
                if limit == 0 || limit % folds != 0 {
                    bail!(
                        "Limited pages cannot be partitioned into equally sized folds! ({} subpages, \
                         {} folds)",
                        limit,
                        folds
                    );
                }
                if limit > subpages {
                    bail!(
                        "Cannot limit the websites to {} subpages, only {} are available",
                        limit,
                        subpages
                    );
                }
                limit
            }
            None => subpages,
        };

        Ok(Self {
            sites,
            subpages,
            main_page,
            folds,
            per_site,
        })
    }

    /// Number of page ids per website
    pub fn slots(&self) -> usize {
        self.subpages + usize::from(self.main_page)
    }

    pub fn pages_per_fold(&self) -> usize {
        self.per_site / self.folds
    }

    pub fn page_ids(&self) -> RangeInclusive<usize> {
        1..=self.sites * self.slots()
    }

    /// Page ids of one website
    pub fn site_pages(&self, site: usize) -> RangeInclusive<usize> {
        let first = (site - 1) * self.slots() + 1;
        first..=site * self.slots()
    }

    pub fn site_of(&self, page: usize) -> usize {
        site_of_label(page, self.slots())
    }

    /// 1-based position of the page inside its website
    pub fn position(&self, page: usize) -> usize {
        page - (self.site_of(page) - 1) * self.slots()
    }

    pub fn is_main_page(&self, page: usize) -> bool {
        self.main_page && self.position(page) == 1
    }

    /// 1-based index of the subpage inside its website, `None` for main pages
    pub fn subpage_index(&self, page: usize) -> Option<usize> {
        if self.is_main_page(page) {
            None
        } else {
            Some(self.position(page) - usize::from(self.main_page))
        }
    }

    /// Page ids of `site` tested in `fold`
    pub fn test_window(&self, site: usize, fold: usize) -> RangeInclusive<usize> {
        let base = (site - 1) * self.slots() + usize::from(self.main_page);
        let start = base + (fold - 1) * self.pages_per_fold() + 1;
        let end = base + fold * self.pages_per_fold();
        start..=end
    }

    pub fn split(&self, page: usize, fold: usize) -> Split {
        match self.subpage_index(page) {
            None => Split::Train,
            Some(index) if index > self.per_site => Split::Excluded,
            Some(_) if self.test_window(self.site_of(page), fold).contains(&page) => Split::Test,
            Some(_) => Split::Train,
        }
    }

    /// Class label written for the instances of `page`
    ///
    /// Simple numbering uses the website index, otherwise every page keeps its id.
    pub fn label(&self, page: usize, simple: bool) -> usize {
        if simple {
            self.site_of(page)
        } else {
            page
        }
    }
}

/// Website of a page id or fine-grained label, `ceil(label / slots)`
pub fn site_of_label(label: usize, slots: usize) -> usize {
    if label % slots == 0 {
        label / slots
    } else {
        label / slots + 1
    }
}

/// Fold windows over the background instances
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct BackgroundFolds {
    pub size: usize,
    pub folds: usize,
}

impl BackgroundFolds {
    pub fn new(size: usize, folds: usize) -> Result<Self> {
        if folds == 0 || size % folds != 0 {
            bail!(
                "Background cannot be partitioned into equally sized folds! ({} instances, {} \
                 folds)",
                size,
                folds
            );
        }
        Ok(Self { size, folds })
    }

    pub fn per_fold(&self) -> usize {
        self.size / self.folds
    }

    /// Background indices tested in `fold`
    pub fn test_window(&self, fold: usize) -> Range<usize> {
        (fold - 1) * self.per_fold()..fold * self.per_fold()
    }

    pub fn split(&self, index: usize, fold: usize) -> Split {
        if index >= self.size {
            Split::Excluded
        } else if self.test_window(fold).contains(&index) {
            Split::Test
        } else {
            Split::Train
        }
    }
}

/// Number of lines written into each split
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SplitCounts {
    pub train: usize,
    pub test: usize,
}

/// Write the training and test data of `fold`.
///
/// Background instances keep their label `0`.
pub fn write_fold<W: Write>(
    classes: &ClassSet,
    layout: &Layout,
    background: Option<&BackgroundFolds>,
    fold: usize,
    simple: bool,
    train: &mut W,
    test: &mut W,
) -> Result<SplitCounts> {
    let mut counts = SplitCounts::default();

    for page in layout.page_ids() {
        let (out, count) = match layout.split(page, fold) {
            Split::Train => (&mut *train, &mut counts.train),
            Split::Test => (&mut *test, &mut counts.test),
            Split::Excluded => continue,
        };
        let label = layout.label(page, simple) as i64;
        for instance in classes.page(page)? {
            writeln!(out, "{}", instance.relabeled(label))?;
            *count += 1;
        }
    }

    if let Some(bg_folds) = background {
        for (idx, instance) in classes.background.iter().enumerate() {
            match bg_folds.split(idx, fold) {
                Split::Train => {
                    writeln!(train, "{}", instance)?;
                    counts.train += 1;
                }
                Split::Test => {
                    writeln!(test, "{}", instance)?;
                    counts.test += 1;
                }
                Split::Excluded => {}
            }
        }
    }

    Ok(counts)
}

/// Write all used pages and the background into a single file for one shared grid search.
///
/// Labels are the same as in [`write_fold`], such that the predictions of all folds use one numbering.
pub fn write_pooled<W: Write>(
    classes: &ClassSet,
    layout: &Layout,
    background: Option<&BackgroundFolds>,
    simple: bool,
    out: &mut W,
) -> Result<usize> {
    let mut lines = 0;
    for page in layout.page_ids() {
        if layout.split(page, 1) == Split::Excluded {
            continue;
        }
        let label = layout.label(page, simple) as i64;
        for instance in classes.page(page)? {
            writeln!(out, "{}", instance.relabeled(label))?;
            lines += 1;
        }
    }
    if let Some(bg_folds) = background {
        for instance in classes.background.iter().take(bg_folds.size) {
            writeln!(out, "{}", instance)?;
            lines += 1;
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use features::Instance;
    use std::collections::BTreeSet;

    fn classes(layout: &Layout, instances: usize, background: usize) -> ClassSet {
        let mut classes = ClassSet::default();
        for page in layout.page_ids() {
            classes.pages.insert(
                page,
                (0..instances)
                    .map(|i| Instance::new(page as i64, format!("1:{}", i)))
                    .collect(),
            );
        }
        classes.background = (0..background)
            .map(|i| Instance::new(0, format!("2:{}", i)))
            .collect();
        classes
    }

    fn split_labels(
        classes: &ClassSet,
        layout: &Layout,
        background: Option<&BackgroundFolds>,
        fold: usize,
        simple: bool,
    ) -> (SplitCounts, Vec<String>, Vec<String>) {
        let mut train = Vec::new();
        let mut test = Vec::new();
        let counts =
            write_fold(classes, layout, background, fold, simple, &mut train, &mut test).unwrap();
        let lines = |data: Vec<u8>| {
            String::from_utf8(data)
                .unwrap()
                .lines()
                .map(String::from)
                .collect::<Vec<_>>()
        };
        (counts, lines(train), lines(test))
    }

    #[test]
    fn indivisible_subpages_are_fatal() {
        // 2 websites with a main page and 4 subpages each, 3 folds
        let err = Layout::new(10, 2, true, 3, None).unwrap_err();
        assert!(err
            .to_string()
            .contains("cannot be partitioned into equally sized folds"));
        // Uneven number of pages per website
        assert!(Layout::new(9, 2, false, 1, None).is_err());
        assert!(Layout::new(2, 2, true, 1, None).is_err());
        assert!(Layout::new(8, 0, true, 1, None).is_err());
    }

    #[test]
    fn limited_subpages() {
        let layout = Layout::new(14, 2, true, 3, Some(3)).unwrap();
        assert_eq!(layout.subpages, 6);
        assert_eq!(layout.slots(), 7);
        assert_eq!(layout.pages_per_fold(), 1);
        assert!(Layout::new(14, 2, true, 3, Some(4)).is_err());
        assert!(Layout::new(14, 2, true, 3, Some(9)).is_err());
        assert!(Layout::new(14, 2, true, 3, Some(0)).is_err());

        // Subpages 4 to 6 of each website are never used
        for fold in 1..=3 {
            for page in [5, 6, 7, 12, 13, 14] {
                assert_eq!(layout.split(page, fold), Split::Excluded);
            }
            assert_eq!(layout.split(1, fold), Split::Train);
            assert_eq!(layout.split(8, fold), Split::Train);
        }
        assert_eq!(layout.split(2, 1), Split::Test);
        assert_eq!(layout.split(3, 1), Split::Train);
        assert_eq!(layout.split(11, 3), Split::Test);
    }

    #[test]
    fn test_windows_partition_subpages() {
        for (sites, subpages, main_page, folds) in
            [(3, 3, true, 3), (2, 6, false, 3), (4, 10, true, 5), (1, 4, true, 1), (2, 8, true, 2)]
        {
            let page_count = sites * (subpages + usize::from(main_page));
            let layout = Layout::new(page_count, sites, main_page, folds, None).unwrap();
            for site in 1..=sites {
                let mut covered = BTreeSet::new();
                for fold in 1..=folds {
                    let window = layout.test_window(site, fold);
                    assert_eq!(window.clone().count(), layout.pages_per_fold());
                    for page in window {
                        assert_eq!(layout.site_of(page), site);
                        assert!(!layout.is_main_page(page));
                        assert!(covered.insert(page), "page {} tested twice", page);
                    }
                }
                let expected: BTreeSet<usize> = layout
                    .site_pages(site)
                    .filter(|&page| !layout.is_main_page(page))
                    .collect();
                assert_eq!(covered, expected);
            }

            // Every page is tested in exactly one fold, main pages never
            for page in layout.page_ids() {
                let tested = (1..=folds)
                    .filter(|&fold| layout.split(page, fold) == Split::Test)
                    .count();
                let expected = if layout.is_main_page(page) { 0 } else { 1 };
                assert_eq!(tested, expected, "page {}", page);
            }
        }
    }

    #[test]
    fn background_windows_partition() {
        let bg = BackgroundFolds::new(90, 10).unwrap();
        assert_eq!(bg.per_fold(), 9);
        let mut next = 0;
        for fold in 1..=10 {
            let window = bg.test_window(fold);
            assert_eq!(window.start, next);
            assert_eq!(window.len(), 9);
            next = window.end;
        }
        assert_eq!(next, 90);
        assert_eq!(bg.split(0, 1), Split::Test);
        assert_eq!(bg.split(9, 1), Split::Train);
        assert_eq!(bg.split(9, 2), Split::Test);
        assert_eq!(bg.split(90, 1), Split::Excluded);
        assert!(BackgroundFolds::new(97, 10).is_err());
    }

    #[test]
    fn remap_round_trip() {
        for site in 1..=5 {
            assert_eq!(site_of_label((site - 1) * 4 + 1, 4), site);
            assert_eq!(site_of_label(site * 4, 4), site);
        }
        for label in 5..=8 {
            assert_eq!(site_of_label(label, 4), 2);
        }
        assert_eq!(site_of_label(0, 4), 0);
    }

    #[test]
    fn closed_world_fold_sizes() {
        // 3 websites, main page + 3 subpages, 3 folds, 10 instances per page
        let layout = Layout::new(12, 3, true, 3, None).unwrap();
        let classes = classes(&layout, 10, 0);
        for fold in 1..=3 {
            let (counts, train, test) = split_labels(&classes, &layout, None, fold, true);
            assert_eq!(counts.test, 3 * layout.pages_per_fold() * 10);
            assert_eq!(counts.train, (3 * 3 - 3) * 10 + 3 * 10);
            assert_eq!(train.len(), counts.train);
            assert_eq!(test.len(), counts.test);
        }

        let (_, train, test) = split_labels(&classes, &layout, None, 1, true);
        // Main page of website 1 and its subpages 2 and 3, labeled with the website index
        assert_eq!(train[0], "1 1:0");
        assert!(train[..30].iter().all(|line| line.starts_with("1 ")));
        assert!(test[..10].iter().all(|line| line.starts_with("1 ")));
        assert!(test[20..].iter().all(|line| line.starts_with("3 ")));
    }

    #[test]
    fn fine_labels_are_page_ids() {
        let layout = Layout::new(8, 2, false, 2, None).unwrap();
        let classes = classes(&layout, 2, 0);
        let (_, train, test) = split_labels(&classes, &layout, None, 2, false);
        let test_labels: BTreeSet<&str> = test
            .iter()
            .map(|line| line.split(' ').next().unwrap())
            .collect();
        let train_labels: BTreeSet<&str> = train
            .iter()
            .map(|line| line.split(' ').next().unwrap())
            .collect();
        assert_eq!(test_labels, ["3", "4", "7", "8"].into_iter().collect());
        assert_eq!(train_labels, ["1", "2", "5", "6"].into_iter().collect());
    }

    #[test]
    fn open_world_background_split() {
        let layout = Layout::new(8, 2, false, 2, None).unwrap();
        let bg = BackgroundFolds::new(6, 2).unwrap();
        // Instances beyond the background size are ignored
        let classes = classes(&layout, 1, 8);

        let (counts, train, test) = split_labels(&classes, &layout, Some(&bg), 2, true);
        assert_eq!(counts, SplitCounts { train: 4 + 3, test: 4 + 3 });
        assert_eq!(&test[4..], &["0 2:3", "0 2:4", "0 2:5"]);
        assert_eq!(&train[4..], &["0 2:0", "0 2:1", "0 2:2"]);
    }

    #[test]
    fn pooled_labels_match_fold_labels() {
        for simple in [true, false] {
            let layout = Layout::new(14, 2, true, 3, Some(3)).unwrap();
            let classes = classes(&layout, 2, 3);
            let bg = BackgroundFolds::new(3, 3).unwrap();

            let mut pooled = Vec::new();
            let lines = write_pooled(&classes, &layout, Some(&bg), simple, &mut pooled).unwrap();
            let mut pooled_lines: Vec<String> = String::from_utf8(pooled)
                .unwrap()
                .lines()
                .map(String::from)
                .collect();
            assert_eq!(lines, pooled_lines.len());
            assert_eq!(lines, 2 * (1 + 3) * 2 + 3);

            // The union of train and test of any fold is exactly the pooled data
            for fold in 1..=3 {
                let (_, train, test) = split_labels(&classes, &layout, Some(&bg), fold, simple);
                let mut fold_lines: Vec<String> = train.into_iter().chain(test).collect();
                fold_lines.sort();
                pooled_lines.sort();
                assert_eq!(fold_lines, pooled_lines);
            }
        }
    }
}
