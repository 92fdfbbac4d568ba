//! Locate the feature files of a dataset directory.
//!
//! The directory contains one `wsc<site>_<format>` file per website, the shared
//! `mainPages_<format>` file and optionally background files `<name>_<format>` with their
//! domain lists `list_<name>_<format>.txt`.

use crate::Format;
use color_eyre::eyre::{bail, Result};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Feature file of a single website
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteFile {
    /// 1-based position in natural sort order, matches the labels in the main page file
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
}

/// Return all site files of `format` in `dir`, sorted in natural order.
pub fn site_files(dir: &Path, format: Format) -> Result<Vec<SiteFile>> {
    if !dir.is_dir() {
        bail!("Input directory {} does not exist", dir.display());
    }
    let suffix = format!("_{}", format);

    let mut files: Vec<(String, PathBuf)> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let file_name = e.file_name().to_string_lossy().into_owned();
            if file_name.starts_with("wsc") && file_name.ends_with(&suffix) {
                Some((file_name, e.path().to_owned()))
            } else {
                None
            }
        })
        .collect();
    files.sort_by(|(a, _), (b, _)| natural_cmp(a, b));

    Ok(files
        .into_iter()
        .enumerate()
        .map(|(idx, (file_name, path))| SiteFile {
            index: idx + 1,
            name: site_name(&file_name),
            path,
        })
        .collect())
}

/// Website name encoded in a site file name: `wscexample_TCP` is `example`
pub fn site_name(file_name: &str) -> String {
    let name = file_name.strip_prefix("wsc").unwrap_or(file_name);
    name.split('_').next().unwrap_or_default().to_string()
}

pub fn main_pages_file(dir: &Path, format: Format) -> PathBuf {
    dir.join(format!("mainPages_{}", format))
}

pub fn background_file(dir: &Path, name: &str, format: Format) -> PathBuf {
    dir.join(format!("{}_{}", name, format))
}

/// The domain list uses the background name with a lowercase first character.
pub fn background_domain_file(dir: &Path, name: &str, format: Format) -> PathBuf {
    let mut chars = name.chars();
    let name: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    };
    dir.join(format!("list_{}_{}.txt", name, format))
}

/// Compare strings such that embedded numbers sort by value: `wsc2` < `wsc10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let mut digits_a = String::new();
                while let Some(c) = a.next_if(char::is_ascii_digit) {
                    digits_a.push(c);
                }
                let mut digits_b = String::new();
                while let Some(c) = b.next_if(char::is_ascii_digit) {
                    digits_b.push(c);
                }
                let trimmed_a = digits_a.trim_start_matches('0');
                let trimmed_b = digits_b.trim_start_matches('0');
                let ord = trimmed_a
                    .len()
                    .cmp(&trimmed_b.len())
                    .then_with(|| trimmed_a.cmp(trimmed_b))
                    .then_with(|| digits_a.len().cmp(&digits_b.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca.cmp(&cb);
                if ord != Ordering::Equal {
                    return ord;
                }
                a.next();
                b.next();
            }
        }
    }
}
