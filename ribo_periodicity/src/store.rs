//! Periodicity results and their durable storage
//!
//! The result file for a category is a JSON document of the form
//!
//!   study -> experiment -> read length -> [f0, f1, f2]
//!
//! with read lengths stored as strings.  Key order is preserved on loading and
//! saving so the entries of studies carried over from a previous run are
//! written back unchanged.
use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use anyhow::Context;
use indexmap::IndexMap;

use crate::frame::FrameVector;

pub type ExperimentResult = IndexMap<u32, FrameVector>;
pub type StudyResult = IndexMap<String, ExperimentResult>;
pub type PeriodicityResult = IndexMap<String, StudyResult>;

/// Load a previously saved result.  Returns an empty result if the file does
/// not exist.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<PeriodicityResult> {
    let path = path.as_ref();
    if path.exists() {
        let res: PeriodicityResult = utils::read_json(path)
            .with_context(|| format!("Could not load previous results from {}", path.display()))?;
        info!(
            "Loaded previous results for {} studies from {}",
            res.len(),
            path.display()
        );
        Ok(res)
    } else {
        debug!("No previous results found at {}", path.display());
        Ok(PeriodicityResult::new())
    }
}

/// Overwrite path with the complete result
pub fn save<P: AsRef<Path>>(path: P, res: &PeriodicityResult) -> anyhow::Result<()> {
    let path = path.as_ref();
    debug!("Saving results for {} studies to {}", res.len(), path.display());
    utils::write_json(path, res)
        .with_context(|| format!("Could not save results to {}", path.display()))
}

/// Shared result container for a category run
///
/// Each study is inserted once by the worker that processed it.  The lock is
/// only held for the insertion itself.
pub struct ResultStore {
    inner: Mutex<PeriodicityResult>,
    n_prior: usize,
}

impl ResultStore {
    pub fn new(prior: PeriodicityResult) -> Self {
        let n_prior = prior.len();
        Self {
            inner: Mutex::new(prior),
            n_prior,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PeriodicityResult> {
        // A worker that panicked while holding the lock can only have failed
        // during a single map insertion, so the map is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains(&self, study: &str) -> bool {
        self.lock().contains_key(study)
    }

    /// Add the result for a study.  Returns false (leaving the store unchanged)
    /// if the study was already present.
    pub fn insert(&self, study: &str, res: StudyResult) -> bool {
        let mut g = self.lock();
        if g.contains_key(study) {
            false
        } else {
            g.insert(study.to_owned(), res);
            true
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Convert into a plain result.  Studies from the prior result keep their
    /// original order; new studies follow in the order given by study_order.
    pub fn into_result(self, study_order: &[String]) -> PeriodicityResult {
        let n_prior = self.n_prior;
        let mut res = self.inner.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut new: Vec<_> = res.drain(n_prior..).collect();
        let rank = |s: &str| {
            study_order
                .iter()
                .position(|x| x == s)
                .unwrap_or(study_order.len())
        };
        new.sort_by_cached_key(|(s, _)| (rank(s), s.clone()));
        res.extend(new);
        res
    }
}
