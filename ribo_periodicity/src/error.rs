//! Error types for the periodicity calculation.
//!
//! Only [`LaunchError`] is fatal for a category run.  Study and archive errors
//! are absorbed by the study worker and turned into an absent or degraded
//! result.
use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Could not open archive {0}: {1}")]
    Open(PathBuf, #[source] io::Error),
    #[error("{0}:{1} Error parsing archive: {2}")]
    Parse(PathBuf, usize, String),
    #[error("Experiment {1} not found in archive {0}")]
    ExperimentNotFound(PathBuf, String),
}

/// Reasons a study produces no result
#[derive(Debug, Error)]
pub enum StudyError {
    #[error("Study {0} does not have the expected directory {1}")]
    MissingStudyDirectory(String, PathBuf),
    #[error("Study {0} encountered an error accessing archive directory {1}: {2}")]
    StudyDirectoryUnreadable(String, PathBuf, #[source] io::Error),
    #[error("No archive files found for study {0} in {1}")]
    NoArchiveFiles(String, PathBuf),
    #[error("No experiment of study {0} has a dynamic range entry")]
    NotInLookupTable(String),
    #[error("Archive read failure for study {0}, experiment {1}: {2}")]
    ArchiveRead(String, String, #[source] ArchiveError),
    #[error("Processing of study {0} was cancelled")]
    Cancelled(String),
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Invalid read length range [{0}, {1}]: minimum is greater than maximum")]
    InvalidReadLengthRange(u32, u32),
}

#[derive(Debug, Error)]
#[error("Failed to launch worker {index} for category {category}: {source}")]
pub struct LaunchError {
    pub category: String,
    pub index: usize,
    #[source]
    pub source: io::Error,
}
