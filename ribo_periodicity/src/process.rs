use std::{
    collections::HashSet,
    fmt, fs, io,
    sync::atomic::{AtomicBool, Ordering},
    thread::{self, Scope, ScopedJoinHandle},
};

use anyhow::Context;
use crossbeam_channel::{unbounded, Receiver};

use crate::{
    archive::ArchiveReader,
    config::Config,
    error::LaunchError,
    store::{self, PeriodicityResult, ResultStore},
    study::study_worker,
    tables::{CodingRegionTable, DynamicRange, ReferenceTables, StudyMembership},
};

/// Set once to ask all running workers of a category to stop.  Checked between
/// studies, experiments and read lengths.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Starts worker threads
pub trait Launcher {
    fn launch<'scope, 'env>(
        &self,
        sc: &'scope Scope<'scope, 'env>,
        name: String,
        f: Box<dyn FnOnce() + Send + 'scope>,
    ) -> io::Result<ScopedJoinHandle<'scope, ()>>;
}

/// Launch each worker on a named OS thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadLauncher;

impl Launcher for ThreadLauncher {
    fn launch<'scope, 'env>(
        &self,
        sc: &'scope Scope<'scope, 'env>,
        name: String,
        f: Box<dyn FnOnce() + Send + 'scope>,
    ) -> io::Result<ScopedJoinHandle<'scope, ()>> {
        thread::Builder::new().name(name).spawn_scoped(sc, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryState {
    Init,
    PublishingTables,
    Launching,
    Running,
    Merging,
    Done,
    Cancelling,
    Failed,
}

impl fmt::Display for CategoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::PublishingTables => "PUBLISHING_TABLES",
            Self::Launching => "LAUNCHING",
            Self::Running => "RUNNING",
            Self::Merging => "MERGING",
            Self::Done => "DONE",
            Self::Cancelling => "CANCELLING",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

struct StateTracker<'a> {
    key: &'a str,
    trail: Vec<CategoryState>,
}

impl<'a> StateTracker<'a> {
    fn new(key: &'a str) -> Self {
        debug!("Category {}: {}", key, CategoryState::Init);
        Self {
            key,
            trail: vec![CategoryState::Init],
        }
    }

    fn state(&self) -> CategoryState {
        self.trail[self.trail.len() - 1]
    }

    fn set(&mut self, state: CategoryState) {
        debug!("Category {}: {} -> {}", self.key, self.state(), state);
        self.trail.push(state)
    }
}

/// Worker thread main loop.  Take studies from the queue until it is empty
/// or the run is cancelled, inserting each non-empty result into the store.
fn worker_task<R: ArchiveReader + ?Sized>(
    ix: usize,
    cfg: &Config,
    tables: &ReferenceTables,
    reader: &R,
    recv: Receiver<&str>,
    store: &ResultStore,
    cancel: &CancelFlag,
) {
    debug!("Worker {} starting up", ix);
    while let Ok(study) = recv.recv() {
        if cancel.is_cancelled() {
            debug!("Worker {} cancelled", ix);
            break;
        }
        trace!("Worker {} received study {}", ix, study);
        if let Some(res) = study_worker(
            study,
            cfg.layout(),
            tables,
            reader,
            cfg.read_failure_policy(),
            cancel,
        ) {
            if !store.insert(study, res) {
                warn!("Result for study {} already present; new result discarded", study)
            }
        }
    }
    debug!("Worker {} closing down", ix);
}

/// Calculate periodicity for all studies of a category
///
/// Studies already present in prior are not recomputed.  The remaining
/// studies are handed out to a pool of worker threads.  If a worker can not
/// be started then the workers already running are cancelled and an error
/// returned; nothing from this run is kept.  A category with no pending
/// studies still passes through LAUNCHING and RUNNING, with no workers.
pub fn run_category<R: ArchiveReader + ?Sized, L: Launcher + ?Sized>(
    key: &str,
    cfg: &Config,
    tables: &ReferenceTables,
    studies: &[String],
    prior: PeriodicityResult,
    reader: &R,
    launcher: &L,
) -> Result<PeriodicityResult, LaunchError> {
    let mut state = StateTracker::new(key);
    run_tracked(&mut state, cfg, tables, studies, prior, reader, launcher)
}

fn run_tracked<R: ArchiveReader + ?Sized, L: Launcher + ?Sized>(
    state: &mut StateTracker,
    cfg: &Config,
    tables: &ReferenceTables,
    studies: &[String],
    prior: PeriodicityResult,
    reader: &R,
    launcher: &L,
) -> Result<PeriodicityResult, LaunchError> {
    let key = state.key;
    let store = ResultStore::new(prior);
    let n_prior = store.len();

    let mut seen = HashSet::new();
    let pending: Vec<&str> = studies
        .iter()
        .map(|s| s.as_str())
        .filter(|s| seen.insert(*s) && !store.contains(s))
        .collect();
    info!(
        "Category {}: {} studies, {} already done, {} to process",
        key,
        seen.len(),
        seen.len() - pending.len(),
        pending.len()
    );

    // The tables are fully built before this point and only shared by
    // reference from here on
    state.set(CategoryState::PublishingTables);

    state.set(CategoryState::Launching);
    if pending.is_empty() {
        debug!("Category {}: no studies to process, no workers launched", key);
        state.set(CategoryState::Running);
    } else {
        let (snd, recv) = unbounded();
        for s in pending.iter() {
            snd.send(*s).expect("Error adding study to queue");
        }
        drop(snd);

        let cancel = CancelFlag::default();
        let nt = cfg.threads().clamp(1, pending.len());

        thread::scope(|sc| {
            let mut handles = Vec::with_capacity(nt);
            for ix in 0..nt {
                let recv = recv.clone();
                let (store, cancel) = (&store, &cancel);
                let f = Box::new(move || worker_task(ix, cfg, tables, reader, recv, store, cancel));
                match launcher.launch(sc, format!("{}worker-{}", key, ix), f) {
                    Ok(h) => handles.push(h),
                    Err(e) => {
                        error!("Creating worker {} for category {} failed: {}", ix, key, e);
                        state.set(CategoryState::Cancelling);
                        cancel.cancel();
                        join_workers(handles);
                        state.set(CategoryState::Failed);
                        return Err(LaunchError {
                            category: key.to_owned(),
                            index: ix,
                            source: e,
                        });
                    }
                }
            }
            debug!("Category {}: {} workers launched", key, nt);
            state.set(CategoryState::Running);
            join_workers(handles);
            Ok(())
        })?;
    }

    state.set(CategoryState::Merging);
    let n_new = store.len() - n_prior;
    info!(
        "Category {}: {} studies produced results, {} absent",
        key,
        n_new,
        pending.len() - n_new
    );
    let res = store.into_result(studies);
    state.set(CategoryState::Done);
    Ok(res)
}

fn join_workers(handles: Vec<ScopedJoinHandle<'_, ()>>) {
    for h in handles {
        let name = h.thread().name().unwrap_or("worker").to_owned();
        if h.join().is_err() {
            error!("Thread {} panicked; its current study will be missing", name)
        }
    }
}

/// Process all categories in turn, saving the result for each category
/// when it completes
pub fn process_categories<R: ArchiveReader + ?Sized, L: Launcher + ?Sized>(
    cfg: &Config,
    reader: &R,
    launcher: &L,
) -> anyhow::Result<()> {
    debug!(
        "Starting processing with archives from {}",
        cfg.layout().data_dir().display()
    );
    let membership = StudyMembership::from_file(cfg.studies_file())?;

    let out_dir = cfg.output_dir();
    if !out_dir.exists() {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Error creating output directory {}", out_dir.display()))?;
    }

    // Coding regions depend only on species so are kept between categories
    let mut coding_regions: Option<(&str, CodingRegionTable)> = None;

    for cat in cfg.categories() {
        let key = cat.key();
        info!("Processing category {}", key);

        let cr = match coding_regions.take() {
            Some((sp, cr)) if sp == cat.species() => cr,
            _ => CodingRegionTable::from_file(cat.start_stop_file(cfg.start_stop_dir()))?,
        };
        let dr = DynamicRange::from_file(cat.dynamic_range_file(cfg.dynamic_range_dir()))?;
        let tables = ReferenceTables::new(dr, cr);

        let studies: &[String] = match membership.studies(&key) {
            Some(s) => s,
            None => {
                warn!("No study list found for category {}", key);
                &[]
            }
        };

        let path = cat.result_file(out_dir);
        let prior = store::load(&path)?;
        let res = run_category(&key, cfg, &tables, studies, prior, reader, launcher)
            .with_context(|| format!("Processing of category {} aborted", key))?;
        store::save(&path, &res)?;
        info!("Category {} finished; results for {} studies", key, res.len());

        let (_, cr) = tables.into_parts();
        coding_regions = Some((cat.species(), cr));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive::memory::MemoryArchive,
        category::{Category, QcStatus},
        frame::FrameVector,
        store::{ExperimentResult, StudyResult},
        study::{
            tests::{make_study, tables},
            ArchiveLayout,
        },
    };
    use std::{cell::Cell, path::Path};

    /// Fails to launch the nth worker (counting from 0)
    struct FailingLauncher {
        fail_at: usize,
        count: Cell<usize>,
    }

    impl FailingLauncher {
        fn new(fail_at: usize) -> Self {
            Self {
                fail_at,
                count: Cell::new(0),
            }
        }
    }

    impl Launcher for FailingLauncher {
        fn launch<'scope, 'env>(
            &self,
            sc: &'scope Scope<'scope, 'env>,
            name: String,
            f: Box<dyn FnOnce() + Send + 'scope>,
        ) -> io::Result<ScopedJoinHandle<'scope, ()>> {
            let n = self.count.get();
            self.count.set(n + 1);
            if n == self.fail_at {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "resource exhausted"))
            } else {
                ThreadLauncher.launch(sc, name, f)
            }
        }
    }

    fn config(dir: &Path, threads: usize) -> Config {
        let mut cfg = Config::new(ArchiveLayout::new(dir.join("ribobase"), ".ribo.tsv").unwrap());
        cfg.set_threads(threads);
        cfg.set_dynamic_range_dir(dir.join("dynamic_range"));
        cfg.set_start_stop_dir(dir.join("start_stop_sites"));
        cfg.set_studies_file(dir.join("studies.json"));
        cfg.set_output_dir(dir.join("result"));
        cfg.set_categories(vec![Category::new("human", QcStatus::Passed)]);
        cfg
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn reader() -> MemoryArchive {
        MemoryArchive::new()
            .with("A1", 30, "T1", &[4, 0, 0, 4, 0, 0, 4, 0, 0])
            .with("A1", 31, "T1", &[0, 1, 0, 0, 1, 0, 0, 1, 0])
            .with("B1", 30, "T1", &[0, 0, 2, 0, 0, 2, 0, 0, 2])
            .with("B2", 30, "T1", &[1, 1, 1, 1, 1, 1, 1, 1, 1])
            .with("S1", 30, "T1", &[5, 5, 5, 5, 5, 5, 5, 5, 5])
    }

    fn setup(dir: &Path) -> ReferenceTables {
        let data = dir.join("ribobase");
        make_study(&data, "A", &["A1"]);
        make_study(&data, "B", &["B1", "B2", "X1"]);
        make_study(&data, "S", &["S1"]);
        tables(&[("A1", 30, 32), ("B1", 30, 30), ("B2", 30, 30), ("S1", 30, 30)])
    }

    #[test]
    fn computes_all_studies() {
        let dir = tempfile::tempdir().unwrap();
        let t = setup(dir.path());
        let cfg = config(dir.path(), 4);
        let reader = reader();
        let res = run_category(
            "human_passed_",
            &cfg,
            &t,
            &ids(&["A", "B"]),
            PeriodicityResult::new(),
            &reader,
            &ThreadLauncher,
        )
        .unwrap();

        assert_eq!(res.keys().cloned().collect::<Vec<_>>(), vec!["A", "B"]);
        let a1 = &res["A"]["A1"];
        assert_eq!(a1.keys().copied().collect::<Vec<_>>(), vec![30, 31, 32]);
        assert_eq!(a1[&30], FrameVector::new([12, 0, 0]));
        assert_eq!(a1[&31], FrameVector::new([0, 3, 0]));
        assert_eq!(a1[&32], FrameVector::default());
        assert_eq!(res["B"].len(), 2);
        assert_eq!(res["B"]["B1"][&30], FrameVector::new([0, 0, 6]));
        assert_eq!(res["B"]["B2"][&30], FrameVector::new([3, 3, 3]));
    }

    #[test]
    fn merge_is_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        let t = setup(dir.path());
        let reader = reader();
        let run = |order: &[&str], threads: usize| {
            run_category(
                "human_passed_",
                &config(dir.path(), threads),
                &t,
                &ids(order),
                PeriodicityResult::new(),
                &reader,
                &ThreadLauncher,
            )
            .unwrap()
        };
        let r1 = run(&["A", "B", "S"], 3);
        let r2 = run(&["S", "B", "A"], 3);
        let r3 = run(&["B", "A", "S"], 1);
        assert_eq!(r1, r2);
        assert_eq!(r1, r3);
    }

    #[test]
    fn prior_studies_not_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let t = setup(dir.path());
        let cfg = config(dir.path(), 2);
        let reader = reader();

        let mut e = ExperimentResult::new();
        e.insert(30, FrameVector::new([7, 8, 9]));
        let mut s = StudyResult::new();
        s.insert("S1".to_owned(), e);
        let mut prior = PeriodicityResult::new();
        prior.insert("S".to_owned(), s);
        let before = serde_json::to_string(&prior["S"]).unwrap();

        let res = run_category(
            "human_passed_",
            &cfg,
            &t,
            &ids(&["S", "A"]),
            prior,
            &reader,
            &ThreadLauncher,
        )
        .unwrap();
        assert_eq!(serde_json::to_string(&res["S"]).unwrap(), before);
        assert!(res.contains_key("A"));
        // Only the 3 read lengths of A1 were read
        assert_eq!(reader.calls(), 3);
    }

    #[test]
    fn missing_study_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let t = setup(dir.path());
        let cfg = config(dir.path(), 2);
        let res = run_category(
            "human_passed_",
            &cfg,
            &t,
            &ids(&["NOPE", "A", "A"]),
            PeriodicityResult::new(),
            &reader(),
            &ThreadLauncher,
        )
        .unwrap();
        assert_eq!(res.len(), 1);
        assert!(!res.contains_key("NOPE"));
    }

    #[test]
    fn launch_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let t = setup(dir.path());
        let cfg = config(dir.path(), 2);
        let r = run_category(
            "human_passed_",
            &cfg,
            &t,
            &ids(&["A", "B"]),
            PeriodicityResult::new(),
            &reader(),
            &FailingLauncher::new(1),
        );
        let e = r.unwrap_err();
        assert_eq!(e.index, 1);
        assert_eq!(e.category, "human_passed_");
    }

    fn write_tables(dir: &Path) {
        fs::create_dir_all(dir.join("dynamic_range")).unwrap();
        fs::create_dir_all(dir.join("start_stop_sites")).unwrap();
        fs::write(
            dir.join("dynamic_range/human_passed_dynamic_range.json"),
            r#"{"A1": [30, 32], "B1": [30, 30], "B2": [30, 30]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("start_stop_sites/human_start_stop.json"),
            r#"{"T1": [0, 9]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("studies.json"),
            r#"{"human_passed_": ["A", "B", "MISSING"]}"#,
        )
        .unwrap();
    }

    #[test]
    fn driver_saves_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        write_tables(dir.path());
        let cfg = config(dir.path(), 2);
        let out = dir.path().join("result/human_passed_periodicity.json");

        process_categories(&cfg, &reader(), &ThreadLauncher).unwrap();
        let first = fs::read_to_string(&out).unwrap();
        let saved = store::load(&out).unwrap();
        assert_eq!(saved.keys().cloned().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(saved["A"]["A1"][&30], FrameVector::new([12, 0, 0]));

        // Second run has nothing left to compute
        let reader = reader();
        process_categories(&cfg, &reader, &ThreadLauncher).unwrap();
        assert_eq!(reader.calls(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), first);
    }

    #[test]
    fn launch_failure_leaves_result_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        write_tables(dir.path());
        let cfg = config(dir.path(), 2);
        let out = dir.path().join("result/human_passed_periodicity.json");
        fs::create_dir_all(out.parent().unwrap()).unwrap();
        let before = "{\n    \"S\": {}\n}\n";
        fs::write(&out, before).unwrap();

        let r = process_categories(&cfg, &reader(), &FailingLauncher::new(0));
        assert!(r.is_err());
        assert_eq!(fs::read_to_string(&out).unwrap(), before);
    }

    fn trail<L: Launcher>(dir: &Path, studies: &[&str], prior: PeriodicityResult, launcher: &L) -> Vec<CategoryState> {
        let t = setup(dir);
        let cfg = config(dir, 2);
        let mut state = StateTracker::new("human_passed_");
        let _ = run_tracked(&mut state, &cfg, &t, &ids(studies), prior, &reader(), launcher);
        state.trail
    }

    #[test]
    fn state_transitions() {
        use super::CategoryState::*;

        let dir = tempfile::tempdir().unwrap();
        let full = vec![Init, PublishingTables, Launching, Running, Merging, Done];
        assert_eq!(trail(dir.path(), &["A"], PeriodicityResult::new(), &ThreadLauncher), full);

        // Nothing pending: no workers but the same path through the states
        let mut prior = PeriodicityResult::new();
        prior.insert("A".to_owned(), StudyResult::new());
        assert_eq!(trail(dir.path(), &["A"], prior, &ThreadLauncher), full);
        assert_eq!(trail(dir.path(), &[], PeriodicityResult::new(), &ThreadLauncher), full);

        assert_eq!(
            trail(dir.path(), &["A", "B"], PeriodicityResult::new(), &FailingLauncher::new(1)),
            vec![Init, PublishingTables, Launching, Cancelling, Failed]
        );
    }

    #[test]
    fn state_names() {
        assert_eq!(CategoryState::PublishingTables.to_string(), "PUBLISHING_TABLES");
        assert_eq!(CategoryState::Cancelling.to_string(), "CANCELLING");
    }
}
