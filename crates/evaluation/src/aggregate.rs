//! Merge the predictions of all folds into one result.

use crate::partition::{site_of_label, Layout};
use crate::ConfusionCounts;
use color_eyre::eyre::{eyre, Context as _, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One line of a prediction file: `predicted,true`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Prediction {
    pub predicted: i64,
    pub actual: i64,
}

impl Prediction {
    pub fn is_correct(&self) -> bool {
        self.predicted == self.actual
    }
}

impl std::str::FromStr for Prediction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (predicted, actual) = s
            .trim()
            .split_once(',')
            .ok_or_else(|| format!("invalid prediction `{}`, expected `predicted,true`", s))?;
        Ok(Self {
            predicted: parse_label(predicted)?,
            actual: parse_label(actual)?,
        })
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.predicted, self.actual)
    }
}

fn parse_label(label: &str) -> Result<i64, String> {
    let label = label.trim();
    if let Ok(label) = label.parse::<i64>() {
        return Ok(label);
    }
    match label.parse::<f64>() {
        Ok(value) if value.fract() == 0. && value.is_finite() => Ok(value as i64),
        _ => Err(format!("invalid predicted label: {}", label)),
    }
}

pub fn read_predictions(path: &Path) -> Result<Vec<Prediction>> {
    let file =
        File::open(path).wrap_err_with(|| format!("Missing prediction file {}", path.display()))?;
    let mut predictions = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let prediction = line
            .parse()
            .map_err(|err| eyre!("{}:{}: {}", path.display(), idx + 1, err))?;
        predictions.push(prediction);
    }
    Ok(predictions)
}

/// Counts over all folds
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Tally {
    pub correct: u64,
    pub wrong: u64,
    /// Only in the separate evaluation, the background (label `0`) is the negative class
    pub confusion: Option<ConfusionCounts>,
}

impl Tally {
    pub fn total(&self) -> u64 {
        self.correct + self.wrong
    }
}

/// Scores predictions, collapsing page labels to websites when needed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Aggregator {
    /// Page ids per website, set when labels are page ids
    slots: Option<usize>,
    separate: bool,
}

impl Aggregator {
    pub fn new(layout: &Layout, simple: bool, separate: bool) -> Self {
        Self {
            slots: if simple { None } else { Some(layout.slots()) },
            separate,
        }
    }

    /// Website of a label. The background and negative labels are kept as they are.
    pub fn remap(&self, label: i64) -> i64 {
        match self.slots {
            Some(slots) if label > 0 => site_of_label(label as usize, slots) as i64,
            _ => label,
        }
    }

    /// Score one prediction and return it with remapped labels.
    pub fn add(&self, tally: &mut Tally, prediction: Prediction) -> Prediction {
        let prediction = Prediction {
            predicted: self.remap(prediction.predicted),
            actual: self.remap(prediction.actual),
        };
        let correct = prediction.is_correct();
        if correct {
            tally.correct += 1;
        } else {
            tally.wrong += 1;
        }
        if self.separate {
            let confusion = tally.confusion.get_or_insert_with(Default::default);
            match (correct, prediction.actual == features::BACKGROUND_LABEL) {
                (true, true) => confusion.true_negatives += 1,
                (true, false) => confusion.true_positives += 1,
                (false, true) => confusion.false_positives += 1,
                (false, false) => confusion.false_negatives += 1,
            }
        }
        prediction
    }

    /// Score all prediction files and write the remapped `predicted,true` lines to `out`.
    pub fn aggregate<'a, I, W>(&self, predictions: I, out: &mut W) -> Result<Tally>
    where
        I: IntoIterator<Item = &'a Path>,
        W: Write,
    {
        let mut tally = Tally::default();
        if self.separate {
            tally.confusion = Some(ConfusionCounts::default());
        }
        for path in predictions {
            for prediction in read_predictions(path)? {
                writeln!(out, "{}", self.add(&mut tally, prediction))?;
            }
        }
        Ok(tally)
    }
}

/// Aggregate the prediction files into the result file.
pub fn write_results<'a, I>(aggregator: &Aggregator, predictions: I, result: &Path) -> Result<Tally>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut out = BufWriter::new(
        File::create(result)
            .wrap_err_with(|| format!("Failed to create result file {}", result.display()))?,
    );
    let tally = aggregator.aggregate(predictions, &mut out)?;
    out.flush()?;
    Ok(tally)
}

/// One line of the shared separate-evaluation summary: `name tp fp fn tn`
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SeparateRecord {
    pub name: String,
    pub counts: ConfusionCounts,
}

impl std::fmt::Display for SeparateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.name,
            self.counts.true_positives,
            self.counts.false_positives,
            self.counts.false_negatives,
            self.counts.true_negatives
        )
    }
}

impl std::str::FromStr for SeparateRecord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_ascii_whitespace().collect();
        let count = |value: &str| {
            value
                .parse::<u64>()
                .map_err(|_| format!("invalid count `{}` in `{}`", value, s))
        };
        match fields[..] {
            [name, tp, fp, fn_, tn] => Ok(Self {
                name: name.to_string(),
                counts: ConfusionCounts {
                    true_positives: count(tp)?,
                    false_positives: count(fp)?,
                    false_negatives: count(fn_)?,
                    true_negatives: count(tn)?,
                },
            }),
            _ => Err(format!("invalid summary line `{}`, expected `name tp fp fn tn`", s)),
        }
    }
}

/// Append the counts of one website to the summary shared by all websites.
pub fn append_separate_summary(path: &Path, record: &SeparateRecord) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    writeln!(file, "{}", record)?;
    Ok(())
}

pub fn read_separate_summary(path: &Path) -> Result<Vec<SeparateRecord>> {
    let file = File::open(path).wrap_err_with(|| format!("Missing summary {}", path.display()))?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = line
            .parse()
            .map_err(|err| eyre!("{}:{}: {}", path.display(), idx + 1, err))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn predictions(lines: &[&str]) -> Vec<Prediction> {
        lines.iter().map(|line| line.parse().unwrap()).collect()
    }

    #[test]
    fn parse_predictions() {
        assert_eq!(
            "3,5".parse::<Prediction>().unwrap(),
            Prediction {
                predicted: 3,
                actual: 5
            }
        );
        assert_eq!("2.0,0\n".parse::<Prediction>().unwrap().predicted, 2);
        assert!("3 5".parse::<Prediction>().is_err());
        assert!("3,x".parse::<Prediction>().is_err());
    }

    #[test]
    fn fine_labels_collapse_to_websites() {
        let layout = Layout::new(8, 2, false, 2, None).unwrap();
        let aggregator = Aggregator::new(&layout, false, false);
        assert_eq!(aggregator.remap(1), 1);
        assert_eq!(aggregator.remap(4), 1);
        assert_eq!(aggregator.remap(5), 2);
        assert_eq!(aggregator.remap(8), 2);
        assert_eq!(aggregator.remap(0), 0);
        assert_eq!(aggregator.remap(-1), -1);

        let mut tally = Tally::default();
        for prediction in predictions(&["2,3", "5,3", "8,6"]) {
            aggregator.add(&mut tally, prediction);
        }
        assert_eq!(tally.correct, 2);
        assert_eq!(tally.wrong, 1);
        assert_eq!(tally.confusion, None);

        let simple = Aggregator::new(&layout, true, false);
        assert_eq!(simple.remap(8), 8);
    }

    #[test]
    fn separate_confusion_counts() {
        let layout = Layout::new(4, 1, false, 2, None).unwrap();
        let aggregator = Aggregator::new(&layout, true, true);
        let mut out = Vec::new();

        let dir = tempfile::tempdir().unwrap();
        let fold1 = dir.path().join("x_1.predict");
        let fold2 = dir.path().join("x_2.predict");
        fs::write(&fold1, "1,1\n0,1\n0,0\n").unwrap();
        fs::write(&fold2, "1,0\n1,1\n0,0\n").unwrap();

        let tally = aggregator
            .aggregate([fold1.as_path(), fold2.as_path()], &mut out)
            .unwrap();
        assert_eq!(tally.correct, 4);
        assert_eq!(tally.wrong, 2);
        assert_eq!(
            tally.confusion,
            Some(ConfusionCounts {
                true_positives: 2,
                true_negatives: 2,
                false_positives: 1,
                false_negatives: 1,
            })
        );
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1,1\n0,1\n0,0\n1,0\n1,1\n0,0\n"
        );
    }

    #[test]
    fn missing_prediction_file() {
        let layout = Layout::new(4, 1, false, 2, None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = write_results(
            &Aggregator::new(&layout, true, false),
            [dir.path().join("missing").as_path()],
            &dir.path().join("out.result"),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Missing prediction file"));
    }

    #[test]
    fn separate_summary_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("WSC_Eval_Separate_simple_TCP.result");
        let a = SeparateRecord {
            name: "WSC_Eval_a".to_string(),
            counts: ConfusionCounts {
                true_positives: 9,
                false_positives: 1,
                false_negatives: 2,
                true_negatives: 88,
            },
        };
        let b = SeparateRecord {
            name: "WSC_Eval_b".to_string(),
            counts: ConfusionCounts::default(),
        };
        append_separate_summary(&path, &a).unwrap();
        append_separate_summary(&path, &b).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "WSC_Eval_a 9 1 2 88\nWSC_Eval_b 0 0 0 0\n"
        );
        assert_eq!(read_separate_summary(&path).unwrap(), vec![a, b]);
        assert!("x 1 2 3".parse::<SeparateRecord>().is_err());
    }
}
