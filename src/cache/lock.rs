//! Lock acquisition that survives poisoning.
//!
//! A panic while a cache lock is held leaves the lock poisoned. The cache keeps
//! serving: the guard is recovered, the event is logged and counted.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use metrics::counter;
use tracing::warn;

const METRIC_LOCK_POISONED: &str = "shelfmark_cache_lock_poisoned_total";

fn recover<G>(
    result: LockResult<G>,
    lock_kind: &'static str,
    target: &'static str,
    op: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind,
            result = "poisoned_recovered",
            hint = "a panic interrupted a cache step; entries keep their last written value",
            "Recovered from poisoned cache lock"
        );
        counter!(METRIC_LOCK_POISONED, "lock_kind" => lock_kind).increment(1);
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), "rwlock.read", target, op)
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), "rwlock.write", target, op)
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), "mutex.lock", target, op)
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn mutex_recovers_after_panic() {
        let lock = Mutex::new(1_u32);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let mut guard = lock.lock().expect("mutex should be acquired");
            *guard = 2;
            panic!("poison mutex");
        }));

        assert!(lock.is_poisoned());
        assert_eq!(*mutex_lock(&lock, "test", "read_back"), 2);
    }

    #[test]
    fn rwlock_recovers_for_readers_and_writers() {
        let lock = RwLock::new(vec![1_u32]);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("rwlock should be acquired");
            panic!("poison rwlock");
        }));

        rw_write(&lock, "test", "push").push(2);
        assert_eq!(rw_read(&lock, "test", "len").len(), 2);
    }
}
