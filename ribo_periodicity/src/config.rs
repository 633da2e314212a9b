use std::path::{Path, PathBuf};

use crate::{category::Category, experiment::ReadFailurePolicy, study::ArchiveLayout};

/// Config
///
/// Configuration info for the program
/// This is generated from the command line arguments
/// Once set it is read only
///
/// layout - location and naming of study archives
/// dynamic_range_dir - directory with per category dynamic range tables
/// start_stop_dir - directory with per species coding region tables
/// studies_file - JSON file with study lists per category
/// output_dir - directory for per category result files
/// categories - categories to process, in order
/// read_failure_policy - how to handle archive read failures
/// threads - maximum number of worker threads per category
///
pub struct Config {
    layout: ArchiveLayout,
    dynamic_range_dir: PathBuf,
    start_stop_dir: PathBuf,
    studies_file: PathBuf,
    output_dir: PathBuf,
    categories: Vec<Category>,
    read_failure_policy: ReadFailurePolicy,
    threads: usize,
}

impl Config {
    pub fn new(layout: ArchiveLayout) -> Self {
        Self {
            layout,
            dynamic_range_dir: PathBuf::from("dynamic_range"),
            start_stop_dir: PathBuf::from("start_stop_sites"),
            studies_file: PathBuf::from("studies_lists/studies.json"),
            output_dir: PathBuf::from("result"),
            categories: Vec::new(),
            read_failure_policy: ReadFailurePolicy::default(),
            threads: 1,
        }
    }

    pub fn set_dynamic_range_dir<P: AsRef<Path>>(&mut self, dir: P) {
        self.dynamic_range_dir = dir.as_ref().to_owned()
    }

    pub fn set_start_stop_dir<P: AsRef<Path>>(&mut self, dir: P) {
        self.start_stop_dir = dir.as_ref().to_owned()
    }

    pub fn set_studies_file<P: AsRef<Path>>(&mut self, file: P) {
        self.studies_file = file.as_ref().to_owned()
    }

    pub fn set_output_dir<P: AsRef<Path>>(&mut self, dir: P) {
        self.output_dir = dir.as_ref().to_owned()
    }

    pub fn set_categories(&mut self, categories: Vec<Category>) {
        self.categories = categories
    }

    pub fn set_read_failure_policy(&mut self, policy: ReadFailurePolicy) {
        self.read_failure_policy = policy
    }

    pub fn set_threads(&mut self, x: usize) {
        self.threads = x
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    pub fn dynamic_range_dir(&self) -> &Path {
        &self.dynamic_range_dir
    }

    pub fn start_stop_dir(&self) -> &Path {
        &self.start_stop_dir
    }

    pub fn studies_file(&self) -> &Path {
        &self.studies_file
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn read_failure_policy(&self) -> ReadFailurePolicy {
        self.read_failure_policy
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}
