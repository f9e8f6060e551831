use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Execution-time budget checked from the engine's interrupt hook.
///
/// `start` arms the deadline right before a script is invoked and `clear`
/// disarms it afterwards; clones share the same deadline.
#[derive(Debug, Clone, Default)]
pub struct Watchdog {
    timeout: Option<Duration>,
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl Watchdog {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            deadline: Arc::default(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn start(&self) {
        if let Some(timeout) = self.timeout {
            *self.deadline.lock() = Some(Instant::now() + timeout);
        }
    }

    pub fn clear(&self) {
        *self.deadline.lock() = None;
    }

    pub fn expired(&self) -> bool {
        self.deadline
            .lock()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_expires() {
        let dog = Watchdog::new(None);
        dog.start();
        assert!(!dog.expired());
    }

    #[test]
    fn zero_budget_expires_immediately_until_cleared() {
        let dog = Watchdog::new(Some(Duration::ZERO));
        assert!(!dog.expired());
        dog.start();
        assert!(dog.clone().expired());
        dog.clear();
        assert!(!dog.expired());
    }
}
