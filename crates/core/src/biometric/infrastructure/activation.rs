use std::sync::atomic::{AtomicBool, Ordering};

/// Idempotent one-time initialization flag for a biometric library.
///
/// The underlying native libraries tolerate only a single global
/// activation per process; every engine wraps its init call behind one
/// of these.
#[derive(Debug, Default)]
pub struct EngineActivation {
    active: AtomicBool,
}

impl EngineActivation {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    /// Marks the library active. Returns `true` iff this call performed
    /// the activation; losers of the race see `false`.
    pub fn activate(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
