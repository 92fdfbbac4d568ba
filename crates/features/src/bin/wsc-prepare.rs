//! Merge the subpages of all websites into one file labeled per website.
//!
//! Every line of `wsc<site>_<format>` is relabeled with the index of the website, such that the
//! result can be evaluated as a plain closed-world dataset.
//! The main pages are appended unchanged.
//! The names of the merged website files are stored in `list_<scenario>_<format>.txt`.

#![deny(unused_import_braces, unused_qualifications)]

use color_eyre::eyre::{bail, Result};
use features::discover::{background_domain_file, main_pages_file, site_files};
use features::merge::merge_site_labeled;
use features::Format;
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
struct CliArgs {
    /// Directory with the `wsc*_<format>` files
    ///
    /// Defaults to `$dir_TEMP/wsc_features`.
    #[clap(long = "in")]
    input: Option<PathBuf>,
    #[clap(long, default_value = "TCP")]
    format: Format,
    /// Name of the produced dataset
    #[clap(long, default_value = "allSubPages")]
    scenario: String,
    /// Do not append the main pages
    #[clap(long = "no-main")]
    no_main: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();
    let args: CliArgs = clap::Parser::parse();

    let input = match args.input {
        Some(input) => input,
        None => match std::env::var_os("dir_TEMP") {
            Some(tmp) => PathBuf::from(tmp).join("wsc_features"),
            None => bail!("Neither `--in` nor the environment variable $dir_TEMP is set"),
        },
    };

    let mut scenario = args.scenario;
    let main_pages = if args.no_main {
        None
    } else {
        scenario.push_str("_main");
        Some(main_pages_file(&input, args.format))
    };

    let sites = site_files(&input, args.format)?;
    log::info!("Found {} websites in {}", sites.len(), input.display());
    for site in &sites {
        log::info!("{}", site.path.display());
    }

    let merged = input.join(format!("{}_{}", scenario, args.format));
    let info = background_domain_file(&input, &scenario, args.format);
    let lines = merge_site_labeled(&sites, main_pages.as_deref(), &merged, &info)?;
    log::info!("Wrote {} instances to {}", lines, merged.display());

    Ok(())
}
