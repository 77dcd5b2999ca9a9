use std::sync::atomic::{AtomicBool, Ordering};

/// Answers whether the host granted microphone access.
pub trait PermissionProvider: Send + Sync {
    fn has_permission(&self) -> bool;
}

/// Permission flag owned by the host glue; can be flipped at runtime.
#[derive(Debug)]
pub struct StaticPermission(AtomicBool);

impl StaticPermission {
    pub fn new(granted: bool) -> Self {
        Self(AtomicBool::new(granted))
    }

    pub fn granted() -> Self {
        Self::new(true)
    }

    pub fn set(&self, granted: bool) {
        self.0.store(granted, Ordering::SeqCst);
    }
}

impl PermissionProvider for StaticPermission {
    fn has_permission(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
