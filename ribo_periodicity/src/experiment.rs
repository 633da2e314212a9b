use std::{fmt, path::Path, str::FromStr};

use crate::{
    archive::ArchiveReader,
    error::ArchiveError,
    frame::{count_frames, FrameVector},
    process::CancelFlag,
    store::ExperimentResult,
    tables::{CodingRegionTable, ReadLengthRange},
};

/// What to do when the archive reader fails for a read length
///
/// Lenient - log the failure and record zero counts for that read length
/// Strict - abandon the experiment (and therefore the study)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFailurePolicy {
    #[default]
    Lenient,
    Strict,
}

impl FromStr for ReadFailurePolicy {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            _ => Err("no match"),
        }
    }
}

impl fmt::Display for ReadFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lenient => f.write_str("lenient"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

#[derive(Debug)]
pub enum ExperimentError {
    Archive(ArchiveError),
    Cancelled,
}

/// Calculate frame counts for every read length in range for one experiment
///
/// For each read length the coverage of each transcript is restricted to its
/// coding region.  Transcripts with no coverage in the coding region, or where
/// the length of the coding region is not a multiple of 3, are skipped.
/// Frame counts from the remaining transcripts are summed.
///
/// Every read length in range gets an entry, even if no transcripts pass
/// (or if the archive could not be read and the policy is lenient).
pub fn process_experiment<R: ArchiveReader + ?Sized>(
    reader: &R,
    archive: &Path,
    experiment: &str,
    range: ReadLengthRange,
    coding_regions: &CodingRegionTable,
    policy: ReadFailurePolicy,
    cancel: &CancelFlag,
) -> Result<ExperimentResult, ExperimentError> {
    debug!(
        "Processing experiment {} for read lengths {}-{}",
        experiment,
        range.min(),
        range.max()
    );
    let mut res = ExperimentResult::new();
    for rl in range.lengths() {
        if cancel.is_cancelled() {
            return Err(ExperimentError::Cancelled);
        }
        let mut fv = FrameVector::default();
        match reader.coverage(archive, experiment, rl, rl) {
            Ok(cov) => {
                let mut n_used = 0;
                for (transcript, c) in cov.iter() {
                    if let Some(cds) = coding_regions.get(transcript) {
                        let s = cds.slice(c.as_slice());
                        if s.len() % 3 == 0 && s.iter().any(|x| *x > 0) {
                            fv += count_frames(s);
                            n_used += 1;
                        }
                    }
                }
                trace!(
                    "{} read length {}: {} of {} transcripts used, counts {}",
                    experiment,
                    rl,
                    n_used,
                    cov.len(),
                    fv
                );
            }
            Err(e) => match policy {
                ReadFailurePolicy::Lenient => warn!(
                    "Archive read failure for {} read length {} (recording zero counts): {}",
                    experiment, rl, e
                ),
                ReadFailurePolicy::Strict => return Err(ExperimentError::Archive(e)),
            },
        }
        res.insert(rl, fv);
    }
    Ok(res)
}
