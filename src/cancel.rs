use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::DashboardError;

/// Shared cancellation flag threaded from a query down to every backend call.
///
/// Clones observe the same flag. A token from [`CancellationToken::child`]
/// reports cancelled once it or any of its ancestors is cancelled, while
/// cancelling the child leaves the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.parent
            .as_ref()
            .map(|parent| parent.is_cancelled())
            .unwrap_or(false)
    }

    pub fn check(&self) -> Result<(), DashboardError> {
        if self.is_cancelled() {
            return Err(DashboardError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_follows_parent_but_not_reverse() {
        let parent = CancellationToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }
}
