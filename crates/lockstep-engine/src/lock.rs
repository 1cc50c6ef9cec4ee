//! Engine execution lock.
//!
//! Every call into the engine (function call, command send, message pump)
//! goes through [`EngineHandle::with_engine`] or [`EngineRef::with_engine`].
//! The lock is a reentrant mutex: the thread that holds it may enter
//! again. The engine delivers debug messages synchronously while the
//! pumping thread holds the lock, so a message handler that needs the
//! engine re-enters instead of deadlocking. Other threads block.
//!
//! The coordinator owns the engine through [`EngineHandle`]; every other
//! component gets an [`EngineRef`], which cannot dispose it.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::ReentrantMutex;

use crate::engine::ScriptEngine;
use crate::error::EngineError;

type Slot<E> = ReentrantMutex<RefCell<Option<E>>>;

/// Owning handle to the single engine instance.
pub struct EngineHandle<E> {
    slot: Arc<Slot<E>>,
}

/// Non-owning, cloneable reference to the engine.
pub struct EngineRef<E> {
    slot: Arc<Slot<E>>,
}

fn enter<E, R>(slot: &Slot<E>, f: impl FnOnce(&E) -> R) -> Result<R, EngineError> {
    let guard = slot.lock();
    run_locked(&guard, f)
}

fn run_locked<E, R>(cell: &RefCell<Option<E>>, f: impl FnOnce(&E) -> R) -> Result<R, EngineError> {
    let borrowed = cell.try_borrow().map_err(|_| EngineError::Busy)?;
    let engine = borrowed.as_ref().ok_or(EngineError::Disposed)?;
    let result = f(engine);
    Ok(result)
}

fn enter_for<E, R>(
    slot: &Slot<E>,
    timeout: Duration,
    f: impl FnOnce(&E) -> R,
) -> Result<R, EngineError> {
    let guard = slot
        .try_lock_for(timeout)
        .ok_or(EngineError::LockTimeout(timeout))?;
    run_locked(&guard, f)
}

impl<E: ScriptEngine> EngineHandle<E> {
    /// Take ownership of a freshly created engine.
    pub fn new(engine: E) -> Self {
        Self {
            slot: Arc::new(ReentrantMutex::new(RefCell::new(Some(engine)))),
        }
    }

    /// Hand out a non-owning reference.
    pub fn share(&self) -> EngineRef<E> {
        EngineRef {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&E) -> R) -> Result<R, EngineError> {
        enter(&self.slot, f)
    }

    /// Like [`with_engine`](Self::with_engine) but gives up after `timeout`.
    pub fn try_with_engine_for<R>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&E) -> R,
    ) -> Result<R, EngineError> {
        enter_for(&self.slot, timeout, f)
    }

    /// Whether the engine has been disposed.
    pub fn is_disposed(&self) -> bool {
        let guard = self.slot.lock();
        let disposed = guard.try_borrow().map(|slot| slot.is_none()).unwrap_or(false);
        disposed
    }

    /// Remove the engine and return it. Every outstanding [`EngineRef`]
    /// observes [`EngineError::Disposed`] afterwards.
    pub fn dispose(self) -> Result<E, EngineError> {
        let guard = self.slot.lock();
        let mut slot = guard.try_borrow_mut().map_err(|_| EngineError::Busy)?;
        let engine = slot.take().ok_or(EngineError::Disposed)?;
        tracing::debug!("engine disposed");
        Ok(engine)
    }
}

impl<E: ScriptEngine> EngineRef<E> {
    /// Run `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&E) -> R) -> Result<R, EngineError> {
        enter(&self.slot, f)
    }

    /// Like [`with_engine`](Self::with_engine) but gives up after `timeout`.
    pub fn try_with_engine_for<R>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&E) -> R,
    ) -> Result<R, EngineError> {
        enter_for(&self.slot, timeout, f)
    }
}

impl<E> Clone for EngineRef<E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<E> std::fmt::Debug for EngineHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

impl<E> std::fmt::Debug for EngineRef<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRef").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn lock_runs_closure_and_returns_value() {
        let handle = EngineHandle::new(MockEngine::new());
        let value = handle.with_engine(|_| 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn lock_is_reentrant_on_same_thread() {
        let handle = EngineHandle::new(MockEngine::new());
        let shared = handle.share();
        let depth = handle
            .with_engine(|_| shared.with_engine(|_| shared.with_engine(|_| 3).unwrap()).unwrap())
            .unwrap();
        assert_eq!(depth, 3);
    }

    #[test]
    fn lock_excludes_other_threads() {
        let handle = EngineHandle::new(MockEngine::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let engine = handle.share();
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        engine
                            .with_engine(|_| {
                                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                                max_seen.fetch_max(now, Ordering::SeqCst);
                                std::thread::yield_now();
                                inside.fetch_sub(1, Ordering::SeqCst);
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lock_released_after_panic() {
        let handle = EngineHandle::new(MockEngine::new());
        let engine = handle.share();
        let result = std::thread::spawn(move || {
            let _: Result<(), _> = engine.with_engine(|_| panic!("boom"));
        })
        .join();
        assert!(result.is_err());
        assert!(handle
            .try_with_engine_for(Duration::from_millis(200), |_| ())
            .is_ok());
    }

    #[test]
    fn lock_times_out_when_held_elsewhere() {
        let handle = EngineHandle::new(MockEngine::new());
        let engine = handle.share();
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = std::thread::spawn(move || {
            engine
                .with_engine(|_| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
                .unwrap();
        });

        locked_rx.recv().unwrap();
        let err = handle
            .try_with_engine_for(Duration::from_millis(20), |_| ())
            .unwrap_err();
        assert!(matches!(err, EngineError::LockTimeout(_)));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
    }

    #[test]
    fn dispose_makes_refs_fail() {
        let handle = EngineHandle::new(MockEngine::new());
        let shared = handle.share();
        assert!(!handle.is_disposed());
        let _engine = handle.dispose().unwrap();
        assert!(matches!(
            shared.with_engine(|_| ()),
            Err(EngineError::Disposed)
        ));
    }
}
