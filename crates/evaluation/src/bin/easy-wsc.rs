//! k-fold evaluation of website fingerprinting datasets with independent training and testing.
//!
//! The subpages of every website are split into k partitions.
//! Each fold trains on k-1 partitions, together with the main pages, and tests on the remaining one.
//! For every fold a grid search selects the SVM parameters, unless `--quick-cv` runs a single search on all data.
//! The predictions of all folds are merged into a single result.
//!
//! In the open world, background instances are split into k partitions independently of the websites.
//! The separate evaluation repeats the whole run for every website on its own and collects the
//! confusion counts in `<name>_Separate<scenario>.result`.
//!
//! The produced files are named after the output name and a scenario string, which encodes the configuration:
//!
//! ```text
//! WSC_Eval_simple_TCP_10S_20SP_40ISP_40IMP.result
//! WSC_Eval_simple_TCP_10S_20SP_40ISP_40IMP.summary.json
//! ```

#![deny(unused_import_braces, unused_qualifications)]

use color_eyre::eyre::Result;
use evaluation::config::CliArgs;
use evaluation::driver::run;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args: CliArgs = clap::Parser::parse();
    let default_filter = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = args.into_config()?;
    for summary in run(&config)? {
        if config.separate {
            println!("{}: {}", summary.name, summary.report());
        } else {
            println!("{}", summary.report());
        }
    }

    Ok(())
}
