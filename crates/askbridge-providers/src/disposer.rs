//! One-shot release handle returned by a provider invocation.

use std::fmt;

/// Releases whatever a provider invocation left behind upstream.
///
/// `dispose` consumes the handle, so a single disposer can never run twice.
pub struct Disposer {
    label: &'static str,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposer {
    pub fn new(label: &'static str, cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label,
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// A disposer with nothing to release.
    pub fn noop(label: &'static str) -> Self {
        Self {
            label,
            cleanup: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_noop(&self) -> bool {
        self.cleanup.is_none()
    }

    pub fn dispose(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("label", &self.label)
            .field("noop", &self.is_noop())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_dispose_runs_cleanup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let disposer = Disposer::new("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!disposer.is_noop());
        disposer.dispose();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop() {
        let disposer = Disposer::noop("gpt3");
        assert!(disposer.is_noop());
        assert_eq!(disposer.label(), "gpt3");
        disposer.dispose();
    }
}
