use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::RelayError;

/// Process-wide interrupt flag, checked at every suspension point of the protocol loops.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [RelayError::Interrupted] once the flag is raised.
    pub fn check<R: Debug>(&self) -> Result<(), RelayError<R>> {
        if self.is_triggered() {
            Err(RelayError::Interrupted)
        } else {
            Ok(())
        }
    }
}
