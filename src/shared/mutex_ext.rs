//! Usage: Mutex extension trait that recovers from poisoned locks.

use std::sync::{Mutex, MutexGuard};

pub(crate) trait MutexExt<T> {
    /// Acquire the lock, recovering the inner data if a panic poisoned it.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    mutex_type = std::any::type_name::<T>(),
                    file = loc.file(),
                    line = loc.line(),
                    "mutex poisoned by a panicked thread; recovered, state may be inconsistent"
                );
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn lock_or_recover_normal() {
        let mutex = Mutex::new(42);
        let guard = mutex.lock_or_recover();
        assert_eq!(*guard, 42);
    }

    #[test]
    fn lock_or_recover_after_panic() {
        let mutex = Arc::new(Mutex::new(0));
        let mutex_clone = Arc::clone(&mutex);

        let _ = std::thread::spawn(move || {
            let mut guard = mutex_clone.lock().unwrap();
            *guard = 100;
            panic!("poison the lock");
        })
        .join();

        let guard = mutex.lock_or_recover();
        assert_eq!(*guard, 100);
    }
}
