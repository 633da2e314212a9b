use std::path::{Path, PathBuf};

use regex::Regex;

use crate::{
    archive::ArchiveReader,
    error::StudyError,
    experiment::{process_experiment, ExperimentError, ReadFailurePolicy},
    process::CancelFlag,
    store::StudyResult,
    tables::ReferenceTables,
};

/// Where to find the archives for a study
///
/// Archives are expected in <data_dir>/<study>/ribo/experiments/ with names
/// <experiment><suffix>
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    data_dir: PathBuf,
    reg: Regex,
}

impl ArchiveLayout {
    pub fn new<P: AsRef<Path>>(data_dir: P, suffix: &str) -> anyhow::Result<Self> {
        if suffix.is_empty() {
            return Err(anyhow!("Archive suffix can not be empty"));
        }
        let reg = Regex::new(format!("^(.+){}$", regex::escape(suffix)).as_str())?;
        Ok(Self {
            data_dir: data_dir.as_ref().to_owned(),
            reg,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn study_dir(&self, study: &str) -> PathBuf {
        let mut p = self.data_dir.clone();
        p.push(study);
        p.push("ribo");
        p.push("experiments");
        p
    }

    /// Experiment id for an archive file name (None if not an archive)
    pub fn experiment_id<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        self.reg
            .captures(file_name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Collect (experiment, path) for all archives of a study, in directory order
    pub fn find_archives(&self, study: &str) -> Result<Vec<(String, PathBuf)>, StudyError> {
        let dir = self.study_dir(study);
        let rd = dir.read_dir().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StudyError::MissingStudyDirectory(study.to_owned(), dir.clone())
            } else {
                StudyError::StudyDirectoryUnreadable(study.to_owned(), dir.clone(), e)
            }
        })?;

        let mut v = Vec::new();
        for f in rd {
            let entry =
                f.map_err(|e| StudyError::StudyDirectoryUnreadable(study.to_owned(), dir.clone(), e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            // Non UTF-8 names can not match an experiment id
            if let Some(name) = entry.file_name().to_str() {
                if let Some(exp) = self.experiment_id(name) {
                    trace!("Adding archive {} ({}) for study {}", path.display(), exp, study);
                    v.push((exp.to_owned(), path));
                }
            }
        }

        if v.is_empty() {
            Err(StudyError::NoArchiveFiles(study.to_owned(), dir))
        } else {
            debug!("{} archive files found for study {} in {}", v.len(), study, dir.display());
            Ok(v)
        }
    }
}

/// Calculate frame counts for all experiments of a study that have a dynamic range entry
pub fn process_study<R: ArchiveReader + ?Sized>(
    study: &str,
    layout: &ArchiveLayout,
    tables: &ReferenceTables,
    reader: &R,
    policy: ReadFailurePolicy,
    cancel: &CancelFlag,
) -> Result<StudyResult, StudyError> {
    let archives = layout.find_archives(study)?;
    let dr = tables.dynamic_range();

    if !archives.iter().any(|(exp, _)| dr.contains(exp)) {
        return Err(StudyError::NotInLookupTable(study.to_owned()));
    }

    let mut res = StudyResult::new();
    for (exp, path) in archives.iter() {
        let Some(range) = dr.get(exp) else {
            trace!("Experiment {} of study {} not in dynamic range table", exp, study);
            continue;
        };
        match process_experiment(
            reader,
            path,
            exp,
            range,
            tables.coding_regions(),
            policy,
            cancel,
        ) {
            Ok(r) => {
                res.insert(exp.clone(), r);
            }
            Err(ExperimentError::Archive(e)) => {
                return Err(StudyError::ArchiveRead(study.to_owned(), exp.clone(), e))
            }
            Err(ExperimentError::Cancelled) => return Err(StudyError::Cancelled(study.to_owned())),
        }
    }
    Ok(res)
}

/// Study worker entry point.  Errors are logged and converted to None
pub fn study_worker<R: ArchiveReader + ?Sized>(
    study: &str,
    layout: &ArchiveLayout,
    tables: &ReferenceTables,
    reader: &R,
    policy: ReadFailurePolicy,
    cancel: &CancelFlag,
) -> Option<StudyResult> {
    match process_study(study, layout, tables, reader, policy, cancel) {
        Ok(r) => {
            debug!("Study {} finished with {} experiments", study, r.len());
            Some(r)
        }
        Err(e @ (StudyError::NotInLookupTable(_) | StudyError::Cancelled(_))) => {
            debug!("{}", e);
            None
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}
