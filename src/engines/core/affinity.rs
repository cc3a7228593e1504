//! Authoritative-thread affinity guard
//!
//! Mutating operations that belong to the tick thread call
//! [`AffinityGuard::assert_on_authoritative_thread`] first. The check is a
//! lock-free read of a write-once registration compared against the
//! current thread id. A mismatch is a programming error: it is logged with
//! a stack snapshot and then raised as a panic.

use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, Thread, ThreadId};

use crate::engines::{EngineError, EngineResult};

const UNNAMED_THREAD: &str = "<unnamed>";

/// A guarded operation ran off the authoritative thread
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Asynchronous {operation}! This operation must be performed on the main thread.")]
pub struct AffinityViolation {
    /// Name of the offending thread
    pub thread_name: String,
    /// Label of the guarded operation
    pub operation: String,
}

#[derive(Debug)]
struct Authoritative {
    id: ThreadId,
    name: String,
}

impl Authoritative {
    fn of(thread: &Thread) -> Self {
        Self {
            id: thread.id(),
            name: thread.name().unwrap_or(UNNAMED_THREAD).to_string(),
        }
    }
}

/// Registration of the authoritative thread plus the assertion that reads it
#[derive(Debug, Default)]
pub struct AffinityGuard {
    authoritative: OnceLock<Authoritative>,
    // Claimed before the registration is written so that spawning can
    // reserve the slot ahead of the thread existing.
    claimed: AtomicBool,
}

impl AffinityGuard {
    pub const fn new() -> Self {
        Self {
            authoritative: OnceLock::new(),
            claimed: AtomicBool::new(false),
        }
    }

    fn claim(&self) -> EngineResult<()> {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let existing = self
                .authoritative
                .get()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| "<pending>".to_string());
            return Err(EngineError::AlreadyRegistered { existing });
        }
        Ok(())
    }

    fn publish(&self, thread: &Thread) {
        let authoritative = Authoritative::of(thread);
        log::info!(
            "Registered authoritative thread {} ({:?})",
            authoritative.name,
            authoritative.id
        );
        // Only the claim holder reaches here, so the cell is still empty
        if let Err(rejected) = self.authoritative.set(authoritative) {
            log::error!(
                "Authoritative thread {} ({:?}) published twice; keeping the first registration",
                rejected.name,
                rejected.id
            );
        }
    }

    /// Register the calling thread as the authoritative thread
    pub fn register_current(&self) -> EngineResult<()> {
        self.register(&thread::current())
    }

    /// Register `thread` as the authoritative thread
    ///
    /// The registration is write-once; a second call fails with
    /// [`EngineError::AlreadyRegistered`].
    pub fn register(&self, thread: &Thread) -> EngineResult<()> {
        self.claim()?;
        self.publish(thread);
        Ok(())
    }

    /// Spawn the authoritative thread
    ///
    /// The new thread registers itself before `f` runs, so every guarded
    /// call made from `f` passes.
    pub fn spawn_authoritative<F, T>(
        self: &Arc<Self>,
        name: impl Into<String>,
        f: F,
    ) -> EngineResult<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.claim()?;

        let guard = Arc::clone(self);
        let spawned = thread::Builder::new().name(name.into()).spawn(move || {
            guard.publish(&thread::current());
            f()
        });

        match spawned {
            Ok(handle) => Ok(handle),
            Err(err) => {
                self.claimed.store(false, Ordering::Release);
                Err(EngineError::Spawn(err))
            }
        }
    }

    /// Id of the registered authoritative thread, if any
    pub fn authoritative_thread(&self) -> Option<ThreadId> {
        self.authoritative.get().map(|a| a.id)
    }

    /// Whether the calling thread is the authoritative thread
    ///
    /// Always false until a thread has been registered.
    #[inline]
    pub fn is_authoritative_thread(&self) -> bool {
        match self.authoritative.get() {
            Some(authoritative) => authoritative.id == thread::current().id(),
            None => false,
        }
    }

    /// Non-panicking form of the affinity check; does not log
    pub fn check_on_authoritative_thread(&self, operation: &str) -> Result<(), AffinityViolation> {
        if self.is_authoritative_thread() {
            return Ok(());
        }

        Err(AffinityViolation {
            thread_name: current_thread_name(),
            operation: operation.to_string(),
        })
    }

    /// Panic unless called from the authoritative thread
    ///
    /// On mismatch, one error entry carrying the thread name, `operation`
    /// and a captured backtrace is logged before the panic.
    #[inline]
    #[track_caller]
    pub fn assert_on_authoritative_thread(&self, operation: &str) {
        if self.is_authoritative_thread() {
            return;
        }
        self.fail(operation)
    }

    #[cold]
    #[inline(never)]
    #[track_caller]
    fn fail(&self, operation: &str) -> ! {
        let violation = AffinityViolation {
            thread_name: current_thread_name(),
            operation: operation.to_string(),
        };

        log::error!(
            "Thread {} failed main thread check: {}\n{}",
            violation.thread_name,
            violation.operation,
            Backtrace::force_capture()
        );

        panic!("{}", violation);
    }
}

fn current_thread_name() -> String {
    thread::current()
        .name()
        .unwrap_or(UNNAMED_THREAD)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
        match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .unwrap_or_default(),
        }
    }

    #[test]
    fn test_register_is_write_once() {
        let guard = AffinityGuard::new();
        assert!(guard.authoritative_thread().is_none());

        guard.register_current().unwrap();
        assert_eq!(guard.authoritative_thread(), Some(thread::current().id()));

        match guard.register_current() {
            Err(EngineError::AlreadyRegistered { .. }) => {}
            other => panic!("Expected AlreadyRegistered, got {:?}", other),
        }
    }

    #[test]
    fn test_second_publish_keeps_first_registration() {
        let guard = AffinityGuard::new();
        guard.register_current().unwrap();

        let late = thread::Builder::new()
            .name("late-tick".to_string())
            .spawn(thread::current)
            .unwrap()
            .join()
            .unwrap();
        guard.publish(&late);

        assert_eq!(guard.authoritative_thread(), Some(thread::current().id()));
        assert!(guard.is_authoritative_thread());
    }

    #[test]
    fn test_pass_on_registered_thread() {
        let guard = AffinityGuard::new();
        guard.register_current().unwrap();

        assert!(guard.is_authoritative_thread());
        assert!(guard.check_on_authoritative_thread("entity add").is_ok());
        guard.assert_on_authoritative_thread("entity add");
    }

    #[test]
    fn test_unregistered_guard_rejects_everyone() {
        let guard = AffinityGuard::new();

        assert!(!guard.is_authoritative_thread());
        let violation = guard.check_on_authoritative_thread("chunk unload").unwrap_err();
        assert_eq!(violation.operation, "chunk unload");
    }

    #[test]
    fn test_violation_panics_with_label() {
        let guard = Arc::new(AffinityGuard::new());
        guard.register_current().unwrap();

        let worker = Arc::clone(&guard);
        let message = thread::Builder::new()
            .name("async-worker-3".to_string())
            .spawn(move || {
                let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                    worker.assert_on_authoritative_thread("player teleport");
                }));
                panic_text(caught.unwrap_err())
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(
            message,
            "Asynchronous player teleport! This operation must be performed on the main thread."
        );
    }

    #[test]
    fn test_check_reports_thread_name() {
        let guard = Arc::new(AffinityGuard::new());
        guard.register_current().unwrap();

        let worker = Arc::clone(&guard);
        let violation = thread::Builder::new()
            .name("io-7".to_string())
            .spawn(move || worker.check_on_authoritative_thread("block update"))
            .unwrap()
            .join()
            .unwrap()
            .unwrap_err();

        assert_eq!(violation.thread_name, "io-7");
        assert_eq!(violation.operation, "block update");
    }

    #[test]
    fn test_spawn_authoritative() {
        let guard = Arc::new(AffinityGuard::new());

        let inner = Arc::clone(&guard);
        let handle = guard
            .spawn_authoritative("tick", move || {
                inner.assert_on_authoritative_thread("world tick");
                thread::current().id()
            })
            .unwrap();
        let tick_id = handle.join().unwrap();

        assert_eq!(guard.authoritative_thread(), Some(tick_id));
        assert!(!guard.is_authoritative_thread());

        match guard.spawn_authoritative("tick-2", || ()) {
            Err(EngineError::AlreadyRegistered { existing }) => assert_eq!(existing, "tick"),
            other => panic!("Expected AlreadyRegistered, got {:?}", other.map(|_| ())),
        }
    }
}
