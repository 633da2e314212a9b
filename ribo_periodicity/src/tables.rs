use std::{collections::HashMap, ops::RangeInclusive, path::Path};

use anyhow::Context;
use serde::Deserialize;

use crate::error::TableError;

/// Inclusive read length window for one experiment.  min <= max is checked
/// on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "(u32, u32)")]
pub struct ReadLengthRange {
    min: u32,
    max: u32,
}

impl ReadLengthRange {
    pub fn new(min: u32, max: u32) -> Result<Self, TableError> {
        if min > max {
            Err(TableError::InvalidReadLengthRange(min, max))
        } else {
            Ok(Self { min, max })
        }
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn lengths(&self) -> RangeInclusive<u32> {
        self.min..=self.max
    }
}

impl TryFrom<(u32, u32)> for ReadLengthRange {
    type Error = TableError;

    fn try_from((min, max): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

/// Coding region of a transcript as offsets into its coverage vector.
/// Applied half open: [start, stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "(usize, usize)")]
pub struct CodingRegion {
    start: usize,
    stop: usize,
}

impl CodingRegion {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    /// Restrict coverage to the coding region.  Both ends are clamped to the
    /// coverage length, and an inverted region gives an empty slice.
    pub fn slice<'a, T>(&self, coverage: &'a [T]) -> &'a [T] {
        let l = coverage.len();
        let stop = self.stop.min(l);
        let start = self.start.min(stop);
        &coverage[start..stop]
    }
}

impl From<(usize, usize)> for CodingRegion {
    fn from((start, stop): (usize, usize)) -> Self {
        Self::new(start, stop)
    }
}

/// Experiment id -> valid read length window
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct DynamicRange(HashMap<String, ReadLengthRange>);

impl DynamicRange {
    pub fn from_file<P: AsRef<Path>>(fname: P) -> anyhow::Result<Self> {
        let fname = fname.as_ref();
        debug!("Reading dynamic range table from {}", fname.display());
        let dr: Self = utils::read_json(fname)
            .with_context(|| format!("Could not read dynamic range table {}", fname.display()))?;
        debug!("Found dynamic ranges for {} experiments", dr.len());
        Ok(dr)
    }

    pub fn get(&self, experiment: &str) -> Option<ReadLengthRange> {
        self.0.get(experiment).copied()
    }

    pub fn contains(&self, experiment: &str) -> bool {
        self.0.contains_key(experiment)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, ReadLengthRange)> for DynamicRange {
    fn from_iter<I: IntoIterator<Item = (String, ReadLengthRange)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Transcript id -> coding region
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct CodingRegionTable(HashMap<String, CodingRegion>);

impl CodingRegionTable {
    pub fn from_file<P: AsRef<Path>>(fname: P) -> anyhow::Result<Self> {
        let fname = fname.as_ref();
        debug!("Reading coding regions from {}", fname.display());
        let cr: Self = utils::read_json(fname)
            .with_context(|| format!("Could not read coding region table {}", fname.display()))?;
        debug!("Found coding regions for {} transcripts", cr.0.len());
        Ok(cr)
    }

    pub fn get(&self, transcript: &str) -> Option<&CodingRegion> {
        self.0.get(transcript)
    }
}

impl FromIterator<(String, CodingRegion)> for CodingRegionTable {
    fn from_iter<I: IntoIterator<Item = (String, CodingRegion)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Category key -> ordered list of studies
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct StudyMembership(HashMap<String, Vec<String>>);

impl StudyMembership {
    pub fn from_file<P: AsRef<Path>>(fname: P) -> anyhow::Result<Self> {
        let fname = fname.as_ref();
        debug!("Reading study lists from {}", fname.display());
        utils::read_json(fname)
            .with_context(|| format!("Could not read study lists {}", fname.display()))
    }

    pub fn studies(&self, category_key: &str) -> Option<&[String]> {
        self.0.get(category_key).map(|v| v.as_slice())
    }
}

/// Lookup tables shared read only by all workers of a category run
#[derive(Debug, Default)]
pub struct ReferenceTables {
    dynamic_range: DynamicRange,
    coding_regions: CodingRegionTable,
}

impl ReferenceTables {
    pub fn new(dynamic_range: DynamicRange, coding_regions: CodingRegionTable) -> Self {
        Self {
            dynamic_range,
            coding_regions,
        }
    }

    pub fn dynamic_range(&self) -> &DynamicRange {
        &self.dynamic_range
    }

    pub fn coding_regions(&self) -> &CodingRegionTable {
        &self.coding_regions
    }

    pub fn into_parts(self) -> (DynamicRange, CodingRegionTable) {
        (self.dynamic_range, self.coding_regions)
    }
}
