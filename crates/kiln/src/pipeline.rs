use std::path::Path;

use hashbrown::HashSet;

use crate::{
    config::Config,
    document::{DocumentId, DocumentRegistry, Documents},
    error::WatchError,
    events::{Imported, ManifestFlag},
    executor::Executor,
    importer::Importers,
    scheduler::{Inbox, Scheduler, TickStats},
    watcher::Watchers,
};

/// Import pipeline.
///
/// Owns the scheduler, the executor and the watchers.
/// All methods must be called from the same thread, the owner thread.
/// Other threads may only push paths into [`Pipeline::inbox`].
pub struct Pipeline<R = Documents> {
    registry: R,
    importers: Importers,
    scheduler: Scheduler,
    executor: Executor,
    watchers: Option<Watchers>,
    watch: bool,
}

impl Pipeline<Documents> {
    /// Creates pipeline for the configured project.
    ///
    /// Registers importers from the configuration and scans source roots.
    pub fn open(config: &Config, mut importers: Importers) -> Self {
        config.add_importers(&mut importers);

        let registry = Documents::scan(config.sources.clone(), config.artifacts.clone(), &importers);
        tracing::info!(
            "Found {} documents in {} source roots",
            registry.len(),
            config.sources.len()
        );

        Pipeline::new(registry, importers).with_watch(config.watch)
    }

    /// Registers new sources that appeared on disk since the last scan
    /// and queues them for import.
    pub fn rescan(&mut self) -> usize {
        let before: HashSet<DocumentId> = self.registry.documents().into_iter().collect();
        let added = self.registry.rescan(&self.importers);
        if added > 0 {
            for id in self.registry.documents() {
                if !before.contains(&id) {
                    self.scheduler
                        .enqueue(&self.registry, &self.importers, id, false);
                }
            }
        }
        added
    }
}

impl<R> Pipeline<R>
where
    R: DocumentRegistry,
{
    pub fn new(registry: R, importers: Importers) -> Self {
        Pipeline {
            registry,
            importers,
            scheduler: Scheduler::new(),
            executor: Executor::new(),
            watchers: None,
            watch: true,
        }
    }

    /// Whether `init` starts watchers.
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Imports every stale document, or every document if `clean` is set,
    /// then starts watchers.
    ///
    /// Sources are assumed stable during this pass and are not probed for readiness.
    #[tracing::instrument(skip(self))]
    pub fn init(&mut self, clean: bool) -> Result<TickStats, WatchError> {
        self.shutdown();

        let mut queued = 0;
        for id in self.registry.documents() {
            if self
                .scheduler
                .enqueue(&self.registry, &self.importers, id, clean)
            {
                queued += 1;
            }
        }
        tracing::info!("Initial pass: {} documents to import", queued);

        self.executor.set_check_readiness(false);
        let stats = self
            .scheduler
            .run(&self.registry, &self.importers, &mut self.executor);

        if stats.failed > 0 {
            tracing::warn!("Initial pass: {} imports failed", stats.failed);
        }

        if self.watch {
            let roots = self.registry.source_roots();
            self.watchers = Some(Watchers::start(&roots, &self.scheduler.inbox())?);
            self.executor.set_check_readiness(true);
        }

        Ok(stats)
    }

    /// Disposes all watchers.
    ///
    /// Paths already in the inbox are still resolved on the following ticks.
    pub fn shutdown(&mut self) {
        if let Some(mut watchers) = self.watchers.take() {
            watchers.stop();
        }
        self.executor.set_check_readiness(false);
    }

    /// Performs one tick. Call once per editor frame.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn update(&mut self) -> TickStats {
        let stats = self
            .scheduler
            .tick(&mut self.registry, &self.importers, &mut self.executor);

        if !stats.is_idle() {
            tracing::debug!(
                "Tick: {} imported, {} deferred, {} failed, {} skipped",
                stats.imported,
                stats.deferred,
                stats.failed,
                stats.skipped
            );
        }
        stats
    }

    /// Queues document at `path` on the owner thread, bypassing the inbox.
    pub fn enqueue_path(&mut self, path: &Path) -> bool {
        self.scheduler
            .enqueue_by_path(&mut self.registry, &self.importers, path)
    }

    /// Receiver of [`Imported`] events.
    pub fn subscribe(&mut self) -> flume::Receiver<Imported> {
        self.executor.subscribe()
    }

    /// Flag raised when any artifact is written.
    pub fn manifest_flag(&self) -> ManifestFlag {
        self.executor.manifest_flag().clone()
    }

    /// Handle to report changed files from any thread.
    pub fn inbox(&self) -> Inbox {
        self.scheduler.inbox()
    }

    pub fn is_watching(&self) -> bool {
        self.watchers.is_some()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn importers(&self) -> &Importers {
        &self.importers
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl<R> Drop for Pipeline<R> {
    fn drop(&mut self) {
        if let Some(mut watchers) = self.watchers.take() {
            watchers.stop();
        }
    }
}
