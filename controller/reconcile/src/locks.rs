use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes writes that target the same object.
///
/// Each key maps to a lock that lives only as long as some caller holds or waits on it, so the
/// map does not grow with the number of distinct targets ever written.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<AHashMap<(String, String), Weak<AsyncMutex<()>>>>,
}

pub(crate) type KeyGuard = OwnedMutexGuard<()>;

// === impl KeyedLocks ===

impl KeyedLocks {
    pub(crate) async fn lock(&self, space: &str, name: &str) -> KeyGuard {
        let lock = {
            let mut locks = self.locks.lock();
            let key = (space.to_string(), name.to_string());
            match locks.get(&key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, l| l.strong_count() > 0);
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(key, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_waits() {
        let locks = Arc::new(KeyedLocks::default());
        let guard = locks.lock("prod", "web").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("prod", "web").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        // A different target is not blocked.
        let _other = locks.lock("prod", "worker").await;

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let locks = KeyedLocks::default();
        drop(locks.lock("prod", "a").await);
        drop(locks.lock("prod", "b").await);
        let _c = locks.lock("prod", "c").await;
        assert_eq!(locks.len(), 1);
    }
}
