//! Now-playing info and the observers interested in its metadata.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Metadata shown by the platform's now-playing surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlayingMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub source_application_identifier: String,
    #[serde(default)]
    pub artwork_url: Option<String>,
}

/// Full now-playing snapshot for the session that owns the display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlayingInfo {
    pub metadata: NowPlayingMetadata,
    /// Seconds, when known
    pub duration: Option<f64>,
    pub current_time: Option<f64>,
    pub rate: f64,
    pub supports_seeking: bool,
    pub is_playing: bool,
}

/// Callback invoked with the current metadata.
pub type NowPlayingMetadataObserver = Arc<dyn Fn(&NowPlayingMetadata) + Send + Sync>;

/// Identifies an observer registration for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Registered observers in registration order.
#[derive(Default)]
pub(crate) struct ObserverSet {
    next_id: u64,
    observers: Vec<(ObserverId, NowPlayingMetadataObserver)>,
}

impl ObserverSet {
    pub(crate) fn add(&mut self, observer: NowPlayingMetadataObserver) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() < before
    }

    /// Copy of the callbacks, so they can run without the arbiter lock held.
    pub(crate) fn snapshot(&self) -> Vec<NowPlayingMetadataObserver> {
        self.observers.iter().map(|(_, o)| Arc::clone(o)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_ids_are_unique_and_removable() {
        let mut set = ObserverSet::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let first = set.add(Arc::new(move |_: &NowPlayingMetadata| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let second = set.add(Arc::new(|_: &NowPlayingMetadata| {}));
        assert_ne!(first, second);
        assert_eq!(set.len(), 2);

        for observer in set.snapshot() {
            observer(&NowPlayingMetadata::default());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(set.remove(first));
        assert!(!set.remove(first));
        assert_eq!(set.len(), 1);
    }
}
