use std::{num::NonZeroUsize, path::PathBuf};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_parser, Arg, ArgAction,
    Command,
};

use anyhow::Context;

use utils::{init_log, LogLevel};

use crate::{
    category::{category_list, QcStatus},
    config::Config,
    experiment::ReadFailurePolicy,
    study::ArchiveLayout,
};

/// Set up definition of command options for clap
fn cli_model() -> Command {
    Command::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .author(crate_authors!())
        .arg(
            Arg::new("timestamp")
                .short('X')
                .long("timestamp")
                .value_parser(value_parser!(stderrlog::Timestamp))
                .value_name("GRANULARITY")
                .default_value("none")
                .help("Prepend log entries with a timestamp"),
        )
        .arg(
            Arg::new("loglevel")
                .short('l')
                .long("loglevel")
                .value_name("LOGLEVEL")
                .value_parser(value_parser!(LogLevel))
                .ignore_case(true)
                .default_value("warn")
                .help("Set log level"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .action(ArgAction::SetTrue)
                .long("quiet")
                .conflicts_with("loglevel")
                .help("Silence all output"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .help("Set number of worker threads [default: available cores]"),
        )
        .arg(
            Arg::new("data_dir")
                .short('D')
                .long("data-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .default_value("ribobase")
                .help("Set root directory for study archives"),
        )
        .arg(
            Arg::new("archive_suffix")
                .long("archive-suffix")
                .value_parser(value_parser!(String))
                .value_name("STRING")
                .default_value(".ribo.tsv")
                .help("Set file name suffix for experiment archives"),
        )
        .arg(
            Arg::new("dynamic_range_dir")
                .long("dynamic-range-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .default_value("dynamic_range")
                .help("Set directory with dynamic range tables"),
        )
        .arg(
            Arg::new("start_stop_dir")
                .long("start-stop-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .default_value("start_stop_sites")
                .help("Set directory with coding region tables"),
        )
        .arg(
            Arg::new("studies_file")
                .long("studies-file")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .default_value("studies_lists/studies.json")
                .help("Set file with study lists for each category"),
        )
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("output-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .default_value("result")
                .help("Set output directory"),
        )
        .arg(
            Arg::new("species")
                .short('s')
                .long("species")
                .value_parser(value_parser!(String))
                .value_name("NAME")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .default_values(["human", "mouse"])
                .help("Species to process"),
        )
        .arg(
            Arg::new("qc")
                .short('Q')
                .long("qc")
                .value_parser(value_parser!(QcStatus))
                .value_name("STATUS")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .ignore_case(true)
                .default_values(["passed", "failed"])
                .help("QC status (passed, failed) of studies to process"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Drop a study if any archive read fails [default: record zero counts]"),
        )
}

/// Handle command line options.  Set up Config structure
pub fn handle_cli() -> anyhow::Result<Config> {
    // Get matches from command line
    let m = cli_model().get_matches();

    // Setup logging
    init_log(&m)?;

    debug!("Processing command line options");

    let nt = m
        .get_one::<NonZeroUsize>("threads")
        .map(|x| usize::from(*x))
        .unwrap_or_else(num_cpus::get);

    let data_dir = m
        .get_one::<PathBuf>("data_dir")
        .expect("Missing default data dir");
    let suffix = m
        .get_one::<String>("archive_suffix")
        .expect("Missing default archive suffix");
    let layout = ArchiveLayout::new(data_dir, suffix)
        .with_context(|| format!("Invalid archive suffix {}", suffix))?;

    let species: Vec<String> = m
        .get_many::<String>("species")
        .expect("Missing default species")
        .cloned()
        .collect();
    let qc: Vec<QcStatus> = m
        .get_many::<QcStatus>("qc")
        .expect("Missing default QC status")
        .copied()
        .collect();
    let categories = category_list(&species, &qc);
    debug!("Number of categories to process: {}", categories.len());

    let mut cfg = Config::new(layout);
    cfg.set_categories(categories);
    cfg.set_threads(nt);

    if let Some(p) = m.get_one::<PathBuf>("dynamic_range_dir") {
        cfg.set_dynamic_range_dir(p)
    }
    if let Some(p) = m.get_one::<PathBuf>("start_stop_dir") {
        cfg.set_start_stop_dir(p)
    }
    if let Some(p) = m.get_one::<PathBuf>("studies_file") {
        cfg.set_studies_file(p)
    }
    if let Some(p) = m.get_one::<PathBuf>("output_dir") {
        cfg.set_output_dir(p)
    }
    if m.get_flag("strict") {
        cfg.set_read_failure_policy(ReadFailurePolicy::Strict)
    }

    Ok(cfg)
}
