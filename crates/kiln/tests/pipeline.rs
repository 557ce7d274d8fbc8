use std::{
    fs::File,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant, SystemTime},
};

use kiln::{
    DocumentRegistry, Documents, ImportError, Imported, Importer, Importers, Passthrough,
    Pipeline, Properties,
};

struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        Project { dir }
    }

    fn with_docs(count: usize) -> Self {
        let project = Project::new();
        for i in 0..count {
            project.write(&format!("doc{i:02}.txt"), &format!("document {i}"));
        }
        project
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("assets")
    }

    fn artifacts(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    fn source(&self, file: &str) -> PathBuf {
        dunce::canonicalize(self.root()).unwrap().join(file)
    }

    fn write(&self, file: &str, content: &str) {
        std::fs::write(self.root().join(file), content).unwrap();
    }

    fn pipeline(&self, version: u32, watch: bool) -> Pipeline {
        let importers = importers(version);
        let docs = Documents::scan([self.root()], self.artifacts(), &importers);
        Pipeline::new(docs, importers).with_watch(watch)
    }

    /// Moves every source and artifact into the past,
    /// so that any write made by a test is newer than existing artifacts.
    fn age(&self) {
        let now = SystemTime::now();
        age_dir(&self.root(), now - Duration::from_secs(200));
        age_dir(&self.artifacts(), now - Duration::from_secs(100));
    }
}

fn age_dir(dir: &Path, time: SystemTime) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            age_dir(&path, time);
        } else {
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(time)
                .unwrap();
        }
    }
}

fn importers(version: u32) -> Importers {
    Importers::new().with("text", Passthrough::new("text", &["txt"], version))
}

fn names(events: &[Imported]) -> Vec<&str> {
    events.iter().map(|e| e.name.as_str()).collect()
}

/// Ticks until `done` holds for received events or time runs out.
fn tick_until(
    pipeline: &mut Pipeline,
    rx: &flume::Receiver<Imported>,
    done: impl Fn(&[Imported]) -> bool,
) -> Vec<Imported> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        pipeline.update();
        seen.extend(rx.try_iter());
        if done(&seen) {
            return seen;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("Timed out waiting for imports, got {:?}", names(&seen));
}

/// Keeps ticking for a while to collect late imports.
fn settle(pipeline: &mut Pipeline, rx: &flume::Receiver<Imported>, seen: &mut Vec<Imported>) {
    for _ in 0..10 {
        pipeline.update();
        seen.extend(rx.try_iter());
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn fresh_project_imports_everything_in_registration_order() {
    let project = Project::with_docs(10);
    let mut pipeline = project.pipeline(1, false);
    let rx = pipeline.subscribe();
    let flag = pipeline.manifest_flag();

    let stats = pipeline.init(false).unwrap();
    assert_eq!(stats.imported, 10);
    assert!(flag.take());

    let events: Vec<_> = rx.try_iter().collect();
    let expected: Vec<_> = (0..10).map(|i| format!("doc{i:02}")).collect();
    assert_eq!(names(&events), expected);

    for event in &events {
        let bytes = std::fs::read(&event.target).unwrap();
        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
    }
}

#[test]
fn second_pass_without_changes_imports_nothing() {
    let project = Project::with_docs(3);
    project.pipeline(1, false).init(false).unwrap();

    let mut pipeline = project.pipeline(1, false);
    let rx = pipeline.subscribe();
    let stats = pipeline.init(false).unwrap();

    assert_eq!(stats.imported, 0);
    assert!(rx.try_recv().is_err());
    assert!(!pipeline.manifest_flag().is_set());
}

#[test]
fn clean_pass_reimports_everything() {
    let project = Project::with_docs(3);
    project.pipeline(1, false).init(false).unwrap();

    let mut pipeline = project.pipeline(1, false);
    assert_eq!(pipeline.init(true).unwrap().imported, 3);
}

#[test]
fn format_upgrade_invalidates_newer_artifacts() {
    let project = Project::with_docs(4);
    project.pipeline(1, false).init(false).unwrap();
    project.age();

    let mut pipeline = project.pipeline(2, false);
    let rx = pipeline.subscribe();
    assert_eq!(pipeline.init(false).unwrap().imported, 4);

    for event in rx.try_iter() {
        let bytes = std::fs::read(&event.target).unwrap();
        assert_eq!(&bytes[..4], &2u32.to_le_bytes());
    }
}

#[test]
fn touched_source_is_reimported_alone() {
    let project = Project::with_docs(5);
    let mut pipeline = project.pipeline(1, false);
    let rx = pipeline.subscribe();
    pipeline.init(false).unwrap();
    rx.drain().for_each(drop);
    project.age();

    project.write("doc03.txt", "changed");
    pipeline.inbox().push(&project.source("doc03.txt"));

    let stats = pipeline.update();
    assert_eq!(stats.imported, 1);
    assert_eq!(names(&rx.try_iter().collect::<Vec<_>>()), ["doc03"]);

    let artifact = project.artifacts().join("text/doc03.bin");
    assert_eq!(std::fs::read(artifact).unwrap(), b"\x01\0\0\0changed");

    assert!(pipeline.update().is_idle());
}

#[test]
fn sidecar_change_reimports_its_source() {
    let project = Project::with_docs(3);
    let mut pipeline = project.pipeline(1, false);
    let rx = pipeline.subscribe();
    pipeline.init(false).unwrap();
    rx.drain().for_each(drop);
    project.age();

    project.write("doc01.txt.meta", "skip = true");
    pipeline.inbox().push(&project.source("doc01.txt.meta"));

    assert_eq!(pipeline.update().imported, 1);
    assert_eq!(names(&rx.try_iter().collect::<Vec<_>>()), ["doc01"]);

    let artifact = project.artifacts().join("text/doc01.bin");
    assert_eq!(std::fs::read(artifact).unwrap(), b"\x01\0\0\0");
}

#[test]
fn watcher_picks_up_source_change() {
    let project = Project::with_docs(5);
    let mut pipeline = project.pipeline(1, true);
    let rx = pipeline.subscribe();
    pipeline.init(false).unwrap();
    assert!(pipeline.is_watching());
    rx.drain().for_each(drop);
    project.age();

    project.write("doc02.txt", "edited");

    let mut seen = tick_until(&mut pipeline, &rx, |seen| !seen.is_empty());
    settle(&mut pipeline, &rx, &mut seen);
    assert_eq!(names(&seen), ["doc02"]);
}

#[test]
fn watcher_maps_sidecar_to_source() {
    let project = Project::with_docs(3);
    let mut pipeline = project.pipeline(1, true);
    let rx = pipeline.subscribe();
    pipeline.init(false).unwrap();
    rx.drain().for_each(drop);
    project.age();

    project.write("doc00.txt.meta", "skip = true");

    let mut seen = tick_until(&mut pipeline, &rx, |seen| !seen.is_empty());
    settle(&mut pipeline, &rx, &mut seen);
    assert_eq!(names(&seen), ["doc00"]);
}

#[test]
fn new_file_is_imported_only_after_write_completes() {
    let project = Project::new();
    let mut pipeline = project.pipeline(1, true);
    let rx = pipeline.subscribe();
    assert_eq!(pipeline.init(false).unwrap().imported, 0);

    File::create(project.root().join("late.txt")).unwrap();
    pipeline.inbox().push(&project.source("late.txt"));

    let stats = pipeline.update();
    assert_eq!(stats.imported, 0);
    assert_eq!(stats.deferred, 1);
    assert!(rx.try_recv().is_err());

    project.write("late.txt", "complete");

    let stats = pipeline.update();
    assert_eq!(stats.imported, 1);
    assert_eq!(names(&rx.try_iter().collect::<Vec<_>>()), ["late"]);

    let artifact = project.artifacts().join("text/late.bin");
    assert_eq!(std::fs::read(artifact).unwrap(), b"\x01\0\0\0complete");
}

#[test]
fn locked_source_waits_for_writer() {
    let project = Project::with_docs(2);
    let mut pipeline = project.pipeline(1, true);
    let rx = pipeline.subscribe();
    pipeline.init(false).unwrap();
    rx.drain().for_each(drop);
    project.age();

    let writer = File::options()
        .write(true)
        .open(project.source("doc01.txt"))
        .unwrap();
    writer.lock().unwrap();
    project.write("doc00.txt", "free");
    // Locked file must look stale to be queued at all.
    File::options()
        .write(true)
        .open(project.source("doc01.txt"))
        .unwrap()
        .set_modified(SystemTime::now())
        .unwrap();

    pipeline.inbox().push(&project.source("doc00.txt"));
    pipeline.inbox().push(&project.source("doc01.txt"));

    let stats = pipeline.update();
    assert_eq!(stats.imported, 1);
    assert_eq!(stats.deferred, 1);
    assert_eq!(names(&rx.try_iter().collect::<Vec<_>>()), ["doc00"]);

    let stats = pipeline.update();
    assert_eq!(stats.deferred, 1);
    assert!(rx.try_recv().is_err());

    drop(writer);
    let seen = tick_until(&mut pipeline, &rx, |seen| !seen.is_empty());
    assert_eq!(names(&seen), ["doc01"]);
}

// Windows locks are mandatory, importer itself could not read the file.
#[cfg(unix)]
#[test]
fn readiness_is_not_checked_during_initial_pass() {
    let project = Project::with_docs(1);
    let writer = File::options()
        .write(true)
        .open(project.source("doc00.txt"))
        .unwrap();
    writer.lock().unwrap();

    let mut pipeline = project.pipeline(1, true);
    assert_eq!(pipeline.init(false).unwrap().imported, 1);
}

struct Failing;

impl Importer for Failing {
    fn kind(&self) -> &str {
        "broken"
    }

    fn extensions(&self) -> Vec<&str> {
        vec!["broken"]
    }

    fn import(&self, _: &Path, _: &Path, _: &Properties) -> Result<(), ImportError> {
        Err(ImportError::other("cannot parse"))
    }
}

#[test]
fn failed_import_is_isolated_and_not_retried() {
    let project = Project::with_docs(2);
    project.write("bad.broken", "garbage");

    let importers = importers(1).with("broken", Failing);
    let docs = Documents::scan([project.root()], project.artifacts(), &importers);
    let mut pipeline = Pipeline::new(docs, importers).with_watch(false);
    let rx = pipeline.subscribe();

    let stats = pipeline.init(false).unwrap();
    assert_eq!(stats.imported, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(names(&rx.try_iter().collect::<Vec<_>>()), ["doc00", "doc01"]);
    assert!(!project.artifacts().join("broken/bad.bin").exists());

    // Not retried until something reports a change.
    assert!(pipeline.update().is_idle());

    pipeline.inbox().push(&project.source("bad.broken"));
    assert_eq!(pipeline.update().failed, 1);
}

#[test]
fn removed_document_is_skipped() {
    let project = Project::with_docs(2);
    let mut pipeline = project.pipeline(1, false);
    let rx = pipeline.subscribe();

    let id = pipeline.registry().find("doc00").unwrap().id;
    assert!(pipeline.enqueue_path(&project.source("doc00.txt")));
    assert!(pipeline.enqueue_path(&project.source("doc01.txt")));
    assert!(pipeline.registry_mut().remove(id));

    let stats = pipeline.update();
    assert_eq!(stats.imported, 1);
    assert_eq!(names(&rx.try_iter().collect::<Vec<_>>()), ["doc01"]);
}

#[test]
fn deleted_source_is_skipped() {
    let project = Project::with_docs(2);
    let mut pipeline = project.pipeline(1, false);
    let rx = pipeline.subscribe();

    assert!(pipeline.enqueue_path(&project.source("doc00.txt")));
    std::fs::remove_file(project.source("doc00.txt")).unwrap();

    let stats = pipeline.update();
    assert_eq!(stats.imported, 0);
    assert_eq!(stats.skipped, 1);
    assert!(rx.try_recv().is_err());
}

#[test]
fn shutdown_stops_watching() {
    let project = Project::with_docs(1);
    let mut pipeline = project.pipeline(1, true);
    let rx = pipeline.subscribe();
    pipeline.init(false).unwrap();
    assert!(pipeline.is_watching());

    pipeline.shutdown();
    assert!(!pipeline.is_watching());

    // Paths pushed after shutdown are still resolved safely.
    pipeline.inbox().push(&project.root().join("unknown.png"));
    pipeline.inbox().push(&project.source("doc00.txt"));
    assert!(pipeline.update().is_idle());
    rx.drain().for_each(drop);
}

#[test]
fn rescan_registers_and_queues_new_sources() {
    let project = Project::with_docs(1);
    let mut pipeline = project.pipeline(1, false);
    pipeline.init(false).unwrap();

    project.write("extra.txt", "extra");
    assert_eq!(pipeline.rescan(), 1);
    assert_eq!(pipeline.update().imported, 1);
    assert_eq!(pipeline.registry().documents().len(), 2);
}

#[test]
fn rescan_queues_only_documents_it_added() {
    let project = Project::with_docs(40);
    let mut pipeline = project.pipeline(1, false);
    assert_eq!(pipeline.init(false).unwrap().imported, 40);

    let gone = pipeline.registry().find("doc07").unwrap().id;
    pipeline.registry_mut().remove(gone);
    std::fs::remove_file(project.source("doc07.txt")).unwrap();

    project.write("new_a.txt", "a");
    project.write("new_b.txt", "b");
    assert_eq!(pipeline.rescan(), 2);

    let names: Vec<_> = pipeline
        .scheduler()
        .pending()
        .map(|id| pipeline.registry().document(id).unwrap().name.clone())
        .collect();
    assert_eq!(names, ["new_a", "new_b"]);
    assert_eq!(pipeline.update().imported, 2);
}

#[test]
fn artifacts_under_source_root_do_not_cascade() {
    let project = Project::new();
    project.write("a.txt", "a");

    let importers = Importers::new()
        .with("text", Passthrough::new("text", &["txt"], 1))
        .with("blob", Passthrough::new("blob", &["bin"], 1));
    let docs = Documents::scan([project.root()], project.root().join("artifacts"), &importers);
    let mut pipeline = Pipeline::new(docs, importers).with_watch(false);

    assert_eq!(pipeline.init(false).unwrap().imported, 1);
    let artifact = project.source("artifacts/text/a.bin");
    assert!(artifact.is_file());

    assert_eq!(pipeline.rescan(), 0);
    assert!(!pipeline.enqueue_path(&artifact));
    pipeline.inbox().push(&artifact);
    assert!(pipeline.update().is_idle());
    assert_eq!(pipeline.registry().len(), 1);
    assert!(!project.root().join("artifacts/blob").exists());
}
