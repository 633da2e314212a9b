use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QcStatus {
    Passed,
    Failed,
}

impl FromStr for QcStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passed" | "pass" => Ok(Self::Passed),
            "failed" | "fail" => Ok(Self::Failed),
            _ => Err("no match"),
        }
    }
}

impl fmt::Display for QcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("passed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Category
///
/// A species and QC status pairing.  Each category is processed separately and
/// has its own dynamic range table and result file.  The coding region table
/// is shared by all categories of a species.
///
/// For species human and status passed the key is human_passed_ and the files are
///
///   <dynamic range dir>/human_passed_dynamic_range.json
///   <start stop dir>/human_start_stop.json
///   <output dir>/human_passed_periodicity.json
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    species: String,
    qc: QcStatus,
}

impl Category {
    pub fn new<S: AsRef<str>>(species: S, qc: QcStatus) -> Self {
        Self {
            species: species.as_ref().to_owned(),
            qc,
        }
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn key(&self) -> String {
        format!("{}_{}_", self.species, self.qc)
    }

    pub fn dynamic_range_file(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}dynamic_range.json", self.key()))
    }

    pub fn start_stop_file(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_start_stop.json", self.species))
    }

    pub fn result_file(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}periodicity.json", self.key()))
    }
}

/// All combinations of species and QC status, species major
pub fn category_list(species: &[String], qc: &[QcStatus]) -> Vec<Category> {
    species
        .iter()
        .flat_map(|s| qc.iter().map(move |q| Category::new(s, *q)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_files() {
        let c = Category::new("mouse", QcStatus::Failed);
        assert_eq!(c.key(), "mouse_failed_");
        assert_eq!(
            c.dynamic_range_file(Path::new("dr")),
            PathBuf::from("dr/mouse_failed_dynamic_range.json")
        );
        assert_eq!(
            c.start_stop_file(Path::new("ss")),
            PathBuf::from("ss/mouse_start_stop.json")
        );
        assert_eq!(
            c.result_file(Path::new("result")),
            PathBuf::from("result/mouse_failed_periodicity.json")
        );
    }

    #[test]
    fn species_major_order() {
        let sp = vec!["human".to_string(), "mouse".to_string()];
        let keys: Vec<_> = category_list(&sp, &[QcStatus::Passed, QcStatus::Failed])
            .iter()
            .map(|c| c.key())
            .collect();
        assert_eq!(
            keys,
            vec!["human_passed_", "human_failed_", "mouse_passed_", "mouse_failed_"]
        );
    }

    #[test]
    fn parse_qc() {
        assert_eq!("Pass".parse::<QcStatus>(), Ok(QcStatus::Passed));
        assert_eq!("FAILED".parse::<QcStatus>(), Ok(QcStatus::Failed));
        assert!("maybe".parse::<QcStatus>().is_err());
    }
}
