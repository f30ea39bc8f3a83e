use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

/// Single-committer lock.
///
/// Held from id assignment until storage has committed, so commits on one
/// database form a total order.
#[derive(Default)]
pub struct CommitLock {
    lock: Mutex<()>,
    acquisitions: AtomicU64,
    contended: AtomicU64,
}

/// Proof that the commit critical section is held. Released on drop.
pub struct CommitGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    pub ticket: u64,
}

impl CommitLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other commit is running.
    pub fn acquire(&self) -> CommitGuard<'_> {
        let guard = match self.lock.try_lock() {
            Some(guard) => guard,
            None => {
                self.contended.fetch_add(1, Ordering::Relaxed);
                debug!("waiting for running commit");
                self.lock.lock()
            }
        };
        let ticket = self.acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
        CommitGuard { _guard: guard, ticket }
    }

    pub fn try_acquire(&self) -> Option<CommitGuard<'_>> {
        let guard = self.lock.try_lock()?;
        let ticket = self.acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
        Some(CommitGuard { _guard: guard, ticket })
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// (acquisitions, acquisitions that had to wait)
    pub fn counters(&self) -> (u64, u64) {
        (self.acquisitions.load(Ordering::Relaxed), self.contended.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn excludes_concurrent_holders() {
        let lock = CommitLock::new();
        let guard = lock.acquire();
        assert!(lock.is_locked());
        assert!(lock.try_acquire().is_none());
        drop(guard);
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn critical_sections_never_overlap() {
        let lock = CommitLock::new();
        let inside = AtomicBool::new(false);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let _guard = lock.acquire();
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        inside.store(false, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(lock.counters().0, 400);
    }
}
