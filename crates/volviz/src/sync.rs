//! Cross-thread property and cache primitives.
//!
//! Producer threads mutate scene properties while the render thread reads
//! them every frame. Two building blocks cover this:
//!
//! - [`ObservableCell`]: a mutex-guarded value with post-write hooks, used
//!   for camera properties, the world scale and the background color. Hooks
//!   are registered once at construction and run synchronously under the
//!   lock, so a write and its cache invalidation are atomic.
//! - [`Cached`]: a lazily recomputed value guarded by a [`DirtyFlag`]. The
//!   flag may be marked from any thread; the value itself may only be read
//!   by the single thread that owns the cache. The value slot is a
//!   `RefCell`, which makes the type `!Sync` — the single-reader contract is
//!   enforced by the compiler rather than by documentation.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Hook<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A mutex-guarded value with explicit post-write notification hooks.
///
/// Reads copy the value out under the lock; writes replace it and then run
/// every registered hook while still holding the lock.
pub struct ObservableCell<T> {
    value: Mutex<T>,
    hooks: Vec<Hook<T>>,
}

impl<T: Clone> ObservableCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            hooks: Vec::new(),
        }
    }

    /// Registers a post-write hook. Only available before the cell is shared,
    /// which is why this takes `&mut self`.
    pub fn on_write(&mut self, hook: impl Fn(&T) + Send + Sync + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    pub fn set(&self, value: T) {
        let mut guard = self.value.lock();
        *guard = value;
        for hook in &self.hooks {
            hook(&guard);
        }
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableCell")
            .field("value", &self.value.lock())
            .finish()
    }
}

/// Shareable dirty marker. `mark()` is safe from any thread.
#[derive(Debug, Default)]
pub struct DirtyFlag(AtomicBool);

impl DirtyFlag {
    /// A fresh flag starts dirty so the first read always recomputes.
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(true)))
    }

    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clears the flag, returning whether it was set.
    fn consume(&self) -> bool {
        self.0.swap(false, Ordering::Acquire)
    }
}

/// Lazily recomputed value with asymmetric thread safety: invalidation from
/// any thread through the shared [`DirtyFlag`], reads from exactly one.
pub struct Cached<T> {
    value: RefCell<Option<T>>,
    dirty: Arc<DirtyFlag>,
}

impl<T: Clone> Cached<T> {
    pub fn new(dirty: Arc<DirtyFlag>) -> Self {
        Self {
            value: RefCell::new(None),
            dirty,
        }
    }

    /// Marks the cache dirty from the owning side.
    pub fn invalidate(&self) {
        self.dirty.mark();
    }

    /// Returns the cached value, recomputing it first if the flag was marked
    /// since the last read.
    pub fn get(&self, recompute: impl FnOnce() -> T) -> T {
        let mut slot = self.value.borrow_mut();
        if self.dirty.consume() {
            *slot = None;
        }
        slot.get_or_insert_with(recompute).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observable_cell_runs_hooks_on_write() {
        let count = Arc::new(AtomicBool::new(false));
        let mut cell = ObservableCell::new(1.0f32);
        let seen = Arc::clone(&count);
        cell.on_write(move |v| {
            assert_eq!(*v, 2.0);
            seen.store(true, Ordering::SeqCst);
        });

        assert_eq!(cell.get(), 1.0);
        cell.set(2.0);
        assert_eq!(cell.get(), 2.0);
        assert!(count.load(Ordering::SeqCst));
    }

    #[test]
    fn cached_recomputes_only_when_dirty() {
        let dirty = DirtyFlag::new();
        let cache = Cached::new(Arc::clone(&dirty));

        let mut calls = 0;
        assert_eq!(cache.get(|| { calls += 1; 7 }), 7);
        // Clean: the closure must not run again.
        assert_eq!(cache.get(|| { calls += 1; 8 }), 7);
        assert_eq!(calls, 1);

        dirty.mark();
        assert_eq!(cache.get(|| { calls += 1; 9 }), 9);
        assert_eq!(calls, 2);
    }

    #[test]
    fn dirty_flag_marks_from_other_thread() {
        let dirty = DirtyFlag::new();
        let cache = Cached::new(Arc::clone(&dirty));
        let _ = cache.get(|| 1);

        let remote = Arc::clone(&dirty);
        std::thread::spawn(move || remote.mark()).join().unwrap();

        assert_eq!(cache.get(|| 2), 2);
    }
}
