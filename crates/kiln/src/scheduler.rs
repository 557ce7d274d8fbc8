//! Import queues.
//!
//! Scheduler is owned by a single thread. That thread is the only one that pushes to
//! and pops from the queues, or changes which documents are queued.
//! Other threads talk to the scheduler through the [`Inbox`].

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use hashbrown::HashSet;

use crate::{
    document::{DocumentId, DocumentRegistry},
    executor::{Executor, Outcome},
    importer::Importers,
    staleness,
    watcher::canonical_source_path,
};

/// Sending half of the scheduler inbox.
///
/// Cheap to clone and safe to use from any thread.
/// Paths pushed here are resolved on the next tick.
#[derive(Clone, Debug)]
pub struct Inbox {
    tx: flume::Sender<PathBuf>,
}

impl Inbox {
    /// Reports that file at `path` has changed.
    ///
    /// Sidecar paths are mapped to their source.
    pub fn push(&self, path: &Path) {
        // Receiver lives in the scheduler. When it is gone nobody cares about changes.
        let _ = self.tx.send(canonical_source_path(path));
    }
}

#[cfg(test)]
impl Inbox {
    pub(crate) fn from_sender(tx: flume::Sender<PathBuf>) -> Self {
        Inbox { tx }
    }
}

/// Counters of a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub imported: usize,
    pub deferred: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TickStats {
    pub fn is_idle(&self) -> bool {
        *self == TickStats::default()
    }
}

impl std::ops::AddAssign for TickStats {
    fn add_assign(&mut self, rhs: TickStats) {
        self.imported += rhs.imported;
        self.deferred += rhs.deferred;
        self.failed += rhs.failed;
        self.skipped += rhs.skipped;
    }
}

/// Primary queue, deferred queue and the set of queued documents.
///
/// A document is in at most one of the primary queue, the deferred queue
/// or in flight at any moment.
pub struct Scheduler {
    primary: VecDeque<DocumentId>,
    deferred: VecDeque<DocumentId>,
    queued: HashSet<DocumentId>,
    inbox_tx: flume::Sender<PathBuf>,
    inbox_rx: flume::Receiver<PathBuf>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = flume::unbounded();

        Scheduler {
            primary: VecDeque::new(),
            deferred: VecDeque::new(),
            queued: HashSet::new(),
            inbox_tx,
            inbox_rx,
        }
    }

    pub fn inbox(&self) -> Inbox {
        Inbox {
            tx: self.inbox_tx.clone(),
        }
    }

    pub fn is_queued(&self, id: DocumentId) -> bool {
        self.queued.contains(&id)
    }

    /// Documents in the primary queue, in execution order.
    pub fn pending(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.primary.iter().copied()
    }

    /// Documents waiting for their sources to become ready.
    pub fn deferred(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.deferred.iter().copied()
    }

    /// Queues document if its artifact is stale, or unconditionally if `force` is set.
    ///
    /// Returns `true` if document was queued by this call.
    pub fn enqueue<R>(
        &mut self,
        registry: &R,
        importers: &Importers,
        id: DocumentId,
        force: bool,
    ) -> bool
    where
        R: DocumentRegistry + ?Sized,
    {
        if self.queued.contains(&id) {
            return false;
        }

        let Some(doc) = registry.document(id) else {
            return false;
        };

        if doc.disposed {
            return false;
        }

        let target = registry.target_path(doc);
        let staleness = staleness::check(doc, &target, importers, force);

        if !staleness.needs_import() {
            tracing::trace!("'{}' is {}", doc.name, staleness);
            return false;
        }

        tracing::debug!("Queued '{}': {}", doc.name, staleness);
        self.queued.insert(id);
        self.primary.push_back(id);
        true
    }

    /// Resolves `path` to a document and queues it if stale.
    pub fn enqueue_by_path<R>(&mut self, registry: &mut R, importers: &Importers, path: &Path) -> bool
    where
        R: DocumentRegistry + ?Sized,
    {
        match registry.resolve_path(path, importers) {
            Some(id) => self.enqueue(registry, importers, id, false),
            None => {
                tracing::trace!("'{}' is not a document", path.display());
                false
            }
        }
    }

    /// Resolves every path received in the inbox so far.
    pub fn drain_inbox<R>(&mut self, registry: &mut R, importers: &Importers) -> usize
    where
        R: DocumentRegistry + ?Sized,
    {
        let mut queued = 0;
        for path in self.inbox_rx.try_iter().collect::<Vec<_>>() {
            if self.enqueue_by_path(registry, importers, &path) {
                queued += 1;
            }
        }
        queued
    }

    /// Moves deferred documents back to the primary queue for one more attempt.
    pub fn requeue_deferred(&mut self) {
        self.primary.extend(self.deferred.drain(..));
    }

    /// Executes every document in the primary queue.
    ///
    /// Documents that are not ready go to the deferred queue.
    pub fn run<R>(&mut self, registry: &R, importers: &Importers, executor: &mut Executor) -> TickStats
    where
        R: DocumentRegistry + ?Sized,
    {
        let mut stats = TickStats::default();

        while let Some(id) = self.primary.pop_front() {
            self.queued.remove(&id);

            let doc = match registry.document(id) {
                Some(doc) if !doc.disposed => doc,
                _ => {
                    tracing::debug!("Document {} is gone, dropping", id);
                    stats.skipped += 1;
                    continue;
                }
            };

            let target = registry.target_path(doc);
            match executor.execute(doc, &target, importers) {
                Outcome::Imported(_) => stats.imported += 1,
                Outcome::Missing => stats.skipped += 1,
                Outcome::Failed(_) => stats.failed += 1,
                Outcome::NotReady => {
                    self.queued.insert(id);
                    self.deferred.push_back(id);
                    stats.deferred += 1;
                }
            }
        }

        stats
    }

    /// Performs one tick.
    ///
    /// Inbox is drained first, then deferred documents are requeued,
    /// then the primary queue is executed in order.
    pub fn tick<R>(&mut self, registry: &mut R, importers: &Importers, executor: &mut Executor) -> TickStats
    where
        R: DocumentRegistry + ?Sized,
    {
        self.drain_inbox(registry, importers);
        self.requeue_deferred();
        self.run(registry, importers, executor)
    }
}
