//! Run the whole pipeline with shell scripts in place of the libSVM tools.
//!
//! The fake `svm-predict` predicts the true label of every test instance, so all predictions are correct.

#![cfg(unix)]

use clap::Parser as _;
use evaluation::config::CliArgs;
use evaluation::driver::run;
use std::fs;
use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};

const SITES: [&str; 3] = ["alpha", "beta", "gamma"];
const SUBPAGES: usize = 3;
const INSTANCES: usize = 4;

struct Setup {
    dir: tempfile::TempDir,
}

impl Setup {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let setup = Self { dir };
        setup.write_tools();
        setup.write_dataset();
        setup
    }

    fn input(&self) -> PathBuf {
        self.dir.path().join("wsc_features")
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn svm(&self) -> PathBuf {
        self.dir.path().join("libsvm")
    }

    fn write_tools(&self) {
        let svm = self.svm();
        fs::create_dir_all(svm.join("tools")).unwrap();
        let script = |path: PathBuf, body: &str| {
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        };
        // svm-scale -s <range> <merged>
        script(svm.join("svm-scale"), "echo range > \"$2\"\ncat \"$3\"");
        // svm-train-q -c <cost> -g <gamma> <train> <model>
        script(svm.join("svm-train-q"), "cp \"$5\" \"$6\"");
        // svm-predict <test> <model> <predict>
        script(
            svm.join("svm-predict"),
            "awk '{ print $1 \",\" $1 }' \"$1\" > \"$3\"",
        );
        script(
            svm.join("tools").join("grid_patched.py"),
            "echo \"$@\" >> \"$(dirname \"$0\")/grid.log\"\necho '[local] 3 -7 81.5'\necho '8.0 0.5 90.0'",
        );
    }

    fn write_dataset(&self) {
        let input = self.input();
        fs::create_dir_all(&input).unwrap();
        let mut main_pages = String::new();
        for (idx, site) in SITES.iter().enumerate() {
            let mut lines = String::new();
            for page in 1..=SUBPAGES {
                for instance in 0..INSTANCES {
                    lines.push_str(&format!("{} 1:{} 2:{}\n", page, idx, instance));
                }
            }
            fs::write(input.join(format!("wsc{}_TCP", site)), lines).unwrap();
            for instance in 0..INSTANCES {
                main_pages.push_str(&format!("{} 1:{} 3:{}\n", idx + 1, idx, instance));
            }
        }
        fs::write(input.join("mainPages_TCP"), main_pages).unwrap();

        let mut background = String::new();
        let mut domains = String::new();
        for (idx, domain) in [
            "http://www.wikipedia.org/",
            "https://www.alpha.com/index.html",
            "http://news.example.co.uk/",
            "http://example.net/",
            "https://shop.example.org/",
            "http://192.0.2.1/",
            "http://www.example.com/",
        ]
        .iter()
        .enumerate()
        {
            background.push_str(&format!("0 4:{}\n", idx));
            domains.push_str(domain);
            domains.push('\n');
        }
        fs::write(input.join("Background_TCP"), background).unwrap();
        fs::write(input.join("list_background_TCP.txt"), domains).unwrap();
    }

    fn args(&self, extra: &[&str]) -> CliArgs {
        let mut argv = vec![
            "easy-wsc".to_string(),
            "--in".to_string(),
            self.input().display().to_string(),
            "--out".to_string(),
            self.output().display().to_string(),
            "--svm".to_string(),
            self.svm().display().to_string(),
        ];
        argv.extend(
            ["--gnuplot", "null", "--python", "/bin/sh", "-v", "3", "-q"]
                .iter()
                .chain(extra)
                .map(|arg| arg.to_string()),
        );
        CliArgs::try_parse_from(argv).unwrap()
    }

    fn grid_calls(&self) -> Vec<String> {
        fs::read_to_string(self.svm().join("tools").join("grid.log"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

#[test]
fn closed_world_quick() {
    let setup = Setup::new();
    let stem = "WSC_Eval_simple_TCP_3S_3SP_4ISP_4IMP";
    // A status file of an earlier run is resumed
    fs::create_dir_all(setup.output()).unwrap();
    fs::write(setup.output().join(format!("{}.out", stem)), "").unwrap();

    let config = setup.args(&[]).into_config().unwrap();
    let summaries = run(&config).unwrap();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];

    assert_eq!(summary.scenario.as_str(), "_simple_TCP_3S_3SP_4ISP_4IMP");
    assert_eq!(summary.tally.correct, 36);
    assert_eq!(summary.tally.wrong, 0);
    assert_eq!(summary.report(), "Correct: 36 Wrong: 0 of 36");
    assert_eq!(summary.folds.len(), 3);
    for fold in &summary.folds {
        assert_eq!(fold.lines.test, 12);
        assert_eq!(fold.lines.train, 36);
        assert_eq!(fold.params.cost, 8.);
    }

    let calls = setup.grid_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("-resume"));
    assert!(calls[0].contains("-gnuplot null"));
    assert!(calls[0].contains("-v 3"));
    assert!(calls[0].ends_with(&format!("{}.scale", stem)));

    let out = setup.output();
    let result = lines(&out.join(format!("{}.result", stem)));
    assert_eq!(result.len(), 36);
    assert!(result
        .iter()
        .all(|line| ["1,1", "2,2", "3,3"].contains(&line.as_str())));
    assert!(out.join(format!("{}.summary.json", stem)).is_file());
    assert!(out.join(format!("{}_2.model", stem)).is_file());

    // Intermediate files are removed with the default storage policy
    assert!(!out.join("WSC_Eval_simple_TCP.merged").exists());
    assert!(!out.join("WSC_Eval_simple_TCP.merged.scale").exists());
    assert!(!out.join(format!("{}.scale", stem)).exists());
    for fold in 1..=3 {
        for ext in ["train", "test", "predict"] {
            assert!(!out.join(format!("{}_{}.{}", stem, fold, ext)).exists());
        }
    }
}

#[test]
fn closed_world_per_fold_search_with_page_labels() {
    let setup = Setup::new();
    let config = setup
        .args(&[
            "--quick-cv",
            "NO",
            "--simple",
            "NO",
            "--storage",
            "High",
            "--random-subpages",
            "YES",
            "--random-instances",
            "YES",
            "--limit-instances",
            "3,-1,-1",
        ])
        .into_config()
        .unwrap();
    let summaries = run(&config).unwrap();
    let summary = &summaries[0];
    assert_eq!(summary.scenario.as_str(), "_TCP_3S_3SP_3ISP_4IMP");
    assert_eq!(summary.tally.correct, 27);
    assert_eq!(summary.tally.wrong, 0);

    let calls = setup.grid_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|call| !call.contains("-resume")));

    let out = setup.output();
    let stem = "WSC_Eval_TCP_3S_3SP_3ISP_4IMP";
    // Fold 1 tests the first subpage of every website, page ids 2, 6 and 10
    let test = lines(&out.join(format!("{}_1.test", stem)));
    assert_eq!(test.len(), 9);
    let labels: Vec<&str> = test
        .iter()
        .map(|line| line.split(' ').next().unwrap())
        .collect();
    assert_eq!(labels, ["2", "2", "2", "6", "6", "6", "10", "10", "10"]);
    // Page labels are collapsed to the websites
    let result = lines(&out.join(format!("{}.result", stem)));
    assert_eq!(&result[..3], &["1,1", "1,1", "1,1"]);
    // Everything is kept with the storage policy `High`
    assert!(out.join("WSC_Eval_TCP.merged").is_file());
    assert!(out.join(format!("{}_3.predict", stem)).is_file());
    assert!(calls[0].contains(&format!("{}_1.out", stem)));
    assert!(calls[2].ends_with(&format!("{}_3.train", stem)));
}

#[test]
fn open_world_separate_evaluation() {
    let setup = Setup::new();
    let config = setup
        .args(&[
            "--setting",
            "OW",
            "--background",
            "Background",
            "--separate-evaluation",
            "YES",
            "--limit-websites",
            "0,1",
        ])
        .into_config()
        .unwrap();
    let summaries = run(&config).unwrap();
    assert_eq!(summaries.len(), 2);

    let alpha = &summaries[0];
    assert_eq!(alpha.name, "WSC_Eval_alpha");
    assert_eq!(alpha.skipped_background, 1);
    assert_eq!(alpha.scenario.as_str(), "_simple_TCP_3SP_4ISP_4IMP_6IBG");
    assert_eq!(alpha.report(), "Correct: 18 Wrong: 0 of 18");

    let beta = &summaries[1];
    assert_eq!(beta.name, "WSC_Eval_beta");
    assert_eq!(beta.skipped_background, 0);
    // Seven background instances are trimmed to six for three folds
    assert_eq!(beta.background.map(|bg| bg.size), Some(6));

    let separate = lines(
        &setup
            .output()
            .join("WSC_Eval_Separate_simple_TCP_3SP_4ISP_4IMP_6IBG.result"),
    );
    assert_eq!(
        separate,
        vec!["WSC_Eval_alpha 12 0 0 6", "WSC_Eval_beta 12 0 0 6"]
    );
}

#[test]
fn indivisible_folds_are_fatal() {
    let setup = Setup::new();
    let mut config = setup.args(&[]).into_config().unwrap();
    config.folds = 2;
    let err = run(&config).unwrap_err();
    assert!(format!("{:#}", err).contains("equally sized folds"));
    assert!(setup.grid_calls().is_empty());
}
