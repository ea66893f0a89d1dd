//! Copy-on-write snapshot cell shared between a writer (capture or control
//! callback) and readers (the renderer).

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
    version: AtomicU64,
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
            version: AtomicU64::new(0),
        }
    }

    /// Current snapshot. The returned value never changes under the caller.
    pub fn load(&self) -> Arc<T> {
        let guard = self.current.read();
        Arc::clone(&guard)
    }

    pub fn store(&self, value: T) {
        let mut guard = self.current.write();
        *guard = Arc::new(value);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Build the next snapshot from the current one. Writers are serialised by
    /// the write lock, so two updates never race on the same base.
    pub fn update<R>(&self, f: impl FnOnce(&T) -> (T, R)) -> R {
        let mut guard = self.current.write();
        let (next, result) = f(&guard);
        *guard = Arc::new(next);
        self.version.fetch_add(1, Ordering::Release);
        result
    }

    /// Like [`Snapshot::update`], but leaves the snapshot (and version)
    /// untouched when `f` fails.
    pub fn try_update<R, E>(&self, f: impl FnOnce(&T) -> Result<(T, R), E>) -> Result<R, E> {
        let mut guard = self.current.write();
        let (next, result) = f(&guard)?;
        *guard = Arc::new(next);
        self.version.fetch_add(1, Ordering::Release);
        Ok(result)
    }

    /// Bumped on every store; lets a presentation layer poll for changes.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn load_keeps_old_value_after_store() {
        let cell = Snapshot::new(vec![1, 2, 3]);
        let before = cell.load();
        cell.store(vec![4]);
        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*cell.load(), vec![4]);
        assert_eq!(cell.version(), 1);
    }

    #[test]
    fn failed_try_update_keeps_snapshot() {
        let cell = Snapshot::new(5);
        let result: Result<(), &str> = cell.try_update(|_| Err("nope"));
        assert!(result.is_err());
        assert_eq!(*cell.load(), 5);
        assert_eq!(cell.version(), 0);
    }

    #[test]
    fn concurrent_updates_are_serialised() {
        let cell = Arc::new(Snapshot::new(0u32));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    for _ in 0..100 {
                        cell.update(|v| (v + 1, ()));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*cell.load(), 800);
        assert_eq!(cell.version(), 800);
    }
}
