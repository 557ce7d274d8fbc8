//! Filesystem watchers over source roots.
//!
//! Notifications arrive on a thread owned by the OS backend.
//! The callback only maps the path and pushes it into the scheduler [`Inbox`].
//! Registry lookups and file access happen later, on the owner thread.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::{error::WatchError, meta::source_for_meta, scheduler::Inbox};

/// Maps a changed path to the source that must be reimported.
///
/// Sidecar `foo.png.meta` maps to `foo.png`, other paths are unchanged.
pub fn canonical_source_path(path: &Path) -> PathBuf {
    source_for_meta(path).unwrap_or_else(|| path.to_owned())
}

/// Whether event of this kind may require reimport.
///
/// Creation, modification and rename. Removal leaves nothing to import.
pub fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any)
}

/// Active subscriptions, one per source root.
///
/// Dropping `Watchers` disposes all subscriptions.
pub struct Watchers {
    watchers: Vec<(PathBuf, RecommendedWatcher)>,
}

impl Watchers {
    /// Subscribes to every existing root, recursively.
    ///
    /// Roots that do not exist are skipped.
    pub fn start(roots: &[PathBuf], inbox: &Inbox) -> Result<Self, WatchError> {
        let mut watchers = Vec::new();

        for root in roots {
            if !root.is_dir() {
                tracing::info!("Source root '{}' does not exist, not watching", root.display());
                continue;
            }

            let inbox = inbox.clone();
            let mut watcher = notify::recommended_watcher(
                move |res: Result<Event, notify::Error>| match res {
                    Ok(event) => forward(&event, &inbox),
                    Err(err) => tracing::warn!("Filesystem watcher error. {}", err),
                },
            )
            .map_err(|source| WatchError {
                root: root.clone(),
                source,
            })?;

            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|source| WatchError {
                    root: root.clone(),
                    source,
                })?;

            tracing::info!("Watching '{}'", root.display());
            watchers.push((root.clone(), watcher));
        }

        Ok(Watchers { watchers })
    }

    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.watchers.iter().map(|(root, _)| root.as_path())
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Disposes all subscriptions.
    pub fn stop(&mut self) {
        for (root, mut watcher) in self.watchers.drain(..) {
            if let Err(err) = watcher.unwatch(&root) {
                tracing::debug!("Failed to unwatch '{}'. {}", root.display(), err);
            }
            tracing::info!("Stopped watching '{}'", root.display());
        }
    }
}

impl Drop for Watchers {
    fn drop(&mut self) {
        self.stop();
    }
}

fn forward(event: &Event, inbox: &Inbox) {
    if !is_relevant(&event.kind) {
        return;
    }

    for path in &event.paths {
        inbox.push(path);
    }
}

#[cfg(test)]
mod tests {
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind, RenameMode};

    use super::*;
    use crate::scheduler::Scheduler;

    #[test]
    fn sidecar_maps_to_source() {
        assert_eq!(
            canonical_source_path(Path::new("/p/assets/a.png.meta")),
            Path::new("/p/assets/a.png")
        );
        assert_eq!(
            canonical_source_path(Path::new("/p/assets/a.png")),
            Path::new("/p/assets/a.png")
        );
    }

    #[test]
    fn relevant_kinds() {
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Name(
            RenameMode::To
        ))));
        assert!(!is_relevant(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_relevant(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn forward_pushes_normalized_paths() {
        let (tx, rx) = flume::unbounded();
        let probe = Inbox::from_sender(tx);

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/p/a.txt"))
            .add_path(PathBuf::from("/p/b.txt.meta"));
        forward(&event, &probe);
        forward(
            &Event::new(EventKind::Remove(RemoveKind::File)).add_path("/p/c.txt".into()),
            &probe,
        );

        let paths: Vec<_> = rx.try_iter().collect();
        assert_eq!(paths, [PathBuf::from("/p/a.txt"), PathBuf::from("/p/b.txt")]);
    }

    #[test]
    fn missing_roots_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new();

        let mut watchers =
            Watchers::start(&[dir.path().join("missing")], &scheduler.inbox()).unwrap();
        assert!(watchers.is_empty());
        watchers.stop();
    }
}
