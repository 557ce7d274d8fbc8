use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::document::DocumentId;

/// Emitted once per successfully imported document,
/// after the artifact is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Imported {
    pub document: DocumentId,
    pub name: String,
    pub target: PathBuf,
}

/// Subscribers to [`Imported`] events.
///
/// Subscribers that dropped their receiver are forgotten on next publish.
#[derive(Default)]
pub struct Observers {
    senders: Vec<flume::Sender<Imported>>,
}

impl Observers {
    pub fn new() -> Self {
        Observers::default()
    }

    pub fn subscribe(&mut self) -> flume::Receiver<Imported> {
        let (tx, rx) = flume::unbounded();
        self.senders.push(tx);
        rx
    }

    pub fn publish(&mut self, event: &Imported) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

/// Raised whenever an artifact is written.
/// Polled by manifest generation to know that a rebuild is warranted.
#[derive(Clone, Debug, Default)]
pub struct ManifestFlag {
    modified: Arc<AtomicBool>,
}

impl ManifestFlag {
    pub fn new() -> Self {
        ManifestFlag::default()
    }

    pub fn set(&self) {
        self.modified.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Returns whether flag was set and clears it.
    pub fn take(&self) -> bool {
        self.modified.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u32) -> Imported {
        Imported {
            document: DocumentId::new(n),
            name: format!("doc{n}"),
            target: PathBuf::from(format!("doc{n}.bin")),
        }
    }

    #[test]
    fn dropped_subscribers_are_forgotten() {
        let mut observers = Observers::new();
        let kept = observers.subscribe();
        let dropped = observers.subscribe();
        drop(dropped);

        observers.publish(&event(1));
        observers.publish(&event(2));

        assert_eq!(observers.len(), 1);
        assert_eq!(kept.try_iter().collect::<Vec<_>>(), [event(1), event(2)]);
    }

    #[test]
    fn manifest_flag_is_shared() {
        let flag = ManifestFlag::new();
        let poller = flag.clone();
        assert!(!poller.take());

        flag.set();
        assert!(poller.is_set());
        assert!(poller.take());
        assert!(!flag.is_set());
    }
}
