//! Access to per transcript coverage stored in experiment archives
//!
//! The archive format used by [`TsvArchive`] is a tab separated text file
//! (optionally compressed) with one row per experiment, transcript and read length:
//!
//!   experiment  transcript  read_length  c0,c1,...,cn
//!
//! Blank lines and lines starting with '#' are skipped.
use std::{collections::HashMap, path::Path};

use compress_io::compress::CompressIo;
use utils::get_next_line;

use crate::error::ArchiveError;

/// Transcript id -> per base coverage
pub type CoverageMap = HashMap<String, Vec<u32>>;

pub trait ArchiveReader: Sync {
    /// Coverage for all transcripts of an experiment, counting only reads with
    /// length in [lower, upper]
    fn coverage(
        &self,
        path: &Path,
        experiment: &str,
        lower: u32,
        upper: u32,
    ) -> Result<CoverageMap, ArchiveError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TsvArchive;

impl ArchiveReader for TsvArchive {
    fn coverage(
        &self,
        path: &Path,
        experiment: &str,
        lower: u32,
        upper: u32,
    ) -> Result<CoverageMap, ArchiveError> {
        trace!(
            "Reading coverage for {} [{}, {}] from {}",
            experiment,
            lower,
            upper,
            path.display()
        );
        let mut rdr = CompressIo::new()
            .path(path)
            .bufreader()
            .map_err(|e| ArchiveError::Open(path.to_owned(), e))?;

        let mut buf = String::new();
        let mut line = 0;
        let mut found = false;
        let mut cov = HashMap::new();

        let parse_err = |line: usize, msg: String| ArchiveError::Parse(path.to_owned(), line, msg);

        while let Some(fields) =
            get_next_line(&mut rdr, &mut buf).map_err(|e| parse_err(line + 1, e.to_string()))?
        {
            line += 1;
            // Skip blank and comment lines
            if fields[0].is_empty() || fields[0].starts_with('#') {
                continue;
            }
            // Line trimming removes the tab before an empty coverage column
            let counts = match fields.len() {
                3 => "",
                n if n >= 4 => fields[3],
                n => return Err(parse_err(line, format!("expected 4 columns, found {}", n))),
            };
            if fields[0] != experiment {
                continue;
            }
            found = true;
            let rl = fields[2]
                .parse::<u32>()
                .map_err(|e| parse_err(line, format!("bad read length {}: {}", fields[2], e)))?;
            if rl < lower || rl > upper {
                continue;
            }
            let v: &mut Vec<u32> = cov.entry(fields[1].to_owned()).or_default();
            add_counts(v, counts).map_err(|e| parse_err(line, e))?;
        }

        if found {
            Ok(cov)
        } else {
            Err(ArchiveError::ExperimentNotFound(
                path.to_owned(),
                experiment.to_owned(),
            ))
        }
    }
}

/// Add comma separated counts elementwise to v, extending v as required
fn add_counts(v: &mut Vec<u32>, s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Ok(());
    }
    for (i, c) in s.split(',').enumerate() {
        let x = c
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("bad count {}: {}", c, e))?;
        if i < v.len() {
            v[i] += x
        } else {
            v.push(x)
        }
    }
    Ok(())
}
