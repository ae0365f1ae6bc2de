use std::sync::atomic::{AtomicBool, Ordering};

/// Runs a closure when dropped, on every exit path of the enclosing scope.
pub struct ScopeGuard<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Raise `flag` for the lifetime of the returned guard.
pub fn raise_flag(flag: &AtomicBool) -> ScopeGuard<impl FnOnce() + '_> {
    flag.store(true, Ordering::SeqCst);
    ScopeGuard::new(move || flag.store(false, Ordering::SeqCst))
}
