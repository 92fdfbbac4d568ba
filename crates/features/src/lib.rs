//! Parse the sparse feature files produced by the traffic capture step
//!
//! Every line of a feature file describes one captured page load (an [`Instance`]).
//! The first column is a numeric label, all other columns are sparse `index:value` pairs.
//!
//! ```text
//! 3 1:0.25 2:-1 7:12.5
//! ```

#![deny(unused_import_braces, unused_qualifications)]

pub mod discover;
pub mod domain;
pub mod merge;

use std::fmt;

/// Label of the background (open-world) instances
pub const BACKGROUND_LABEL: i64 = 0;
/// Label written for main page instances before scaling
pub const MAIN_PAGE_LABEL: i64 = -1;

/// Capture formats for which feature files are produced
#[allow(clippy::upper_case_acronyms)]
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum Format {
    TCP,
    TLS,
    TLSLegacy,
    TLSNoSendme,
    Cell,
    CellNoSendme,
}

/// One captured trace: a label and its sparse feature list.
///
/// The feature list is kept as text, such that relabeled lines only differ in the first column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instance {
    pub label: i64,
    features: String,
}

impl Instance {
    pub fn new(label: i64, features: impl Into<String>) -> Self {
        Self {
            label,
            features: features.into(),
        }
    }

    /// The verbatim `index:value` list without the label
    pub fn features(&self) -> &str {
        &self.features
    }

    /// Same instance with a different label
    pub fn relabeled(&self, label: i64) -> Self {
        Self {
            label,
            features: self.features.clone(),
        }
    }

    pub fn is_background(&self) -> bool {
        self.label == BACKGROUND_LABEL
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.features.is_empty() {
            write!(f, "{}", self.label)
        } else {
            write!(f, "{} {}", self.label, self.features)
        }
    }
}

impl std::str::FromStr for Instance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (label, features) = match line.split_once(|c: char| c.is_ascii_whitespace()) {
            Some((label, features)) => (label, features.trim_start()),
            None => (line, ""),
        };
        if label.is_empty() {
            return Err("empty line".to_string());
        }
        let label = parse_label(label)?;
        for pair in features.split_ascii_whitespace() {
            parse_pair(pair)?;
        }
        Ok(Self::new(label, features))
    }
}

/// Labels are integers, but scaling tools may print them as floats like `3.0`
fn parse_label(label: &str) -> Result<i64, String> {
    if let Ok(label) = label.parse::<i64>() {
        return Ok(label);
    }
    match label.parse::<f64>() {
        Ok(value) if value.fract() == 0. && value.is_finite() => Ok(value as i64),
        _ => Err(format!("invalid label: {}", label)),
    }
}

fn parse_pair(pair: &str) -> Result<(u32, f64), String> {
    let (index, value) = pair
        .split_once(':')
        .ok_or_else(|| format!("invalid feature (missing ':'): {}", pair))?;
    let index = index
        .parse()
        .map_err(|_| format!("invalid feature index: {}", pair))?;
    let value = value
        .parse()
        .map_err(|_| format!("invalid feature value: {}", pair))?;
    Ok((index, value))
}
