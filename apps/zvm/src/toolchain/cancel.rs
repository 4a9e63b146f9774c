//! Per-download cancellation context.
//!
//! The caller creates one [`CancellationContext`] per install, the orchestrator
//! installs a cleanup hook on it before the first byte is downloaded, and clears
//! it once the install commits. If the process is interrupted in between, the
//! signal handler calls [`CancellationContext::cancel`], which runs the hook
//! synchronously at most once.

use std::sync::Mutex;

type CleanupHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct CancellationContext {
    hook: Mutex<Option<CleanupHook>>,
}

impl std::fmt::Debug for CancellationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationContext")
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl CancellationContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `hook`, replacing any previous one.
    pub fn install_cleanup(&self, hook: impl FnOnce() + Send + 'static) {
        *self.slot() = Some(Box::new(hook));
    }

    /// Drops the hook without running it.
    pub fn clear(&self) {
        self.slot().take();
    }

    /// Whether a hook is installed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot().is_some()
    }

    /// Runs the installed hook, if any. Returns whether a hook ran.
    pub fn cancel(&self) -> bool {
        let hook = self.slot().take();
        match hook {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CleanupHook>> {
        self.hook
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
