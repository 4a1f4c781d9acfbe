use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per goal, created on demand and dropped with its last user
#[derive(Clone, Default)]
pub struct GoalLocks {
    inner: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

impl GoalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, goal_id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, weak| weak.strong_count() > 0);
            match map.get(goal_id).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(AsyncMutex::new(()));
                    map.insert(goal_id.to_string(), Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.values().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_same_goal_waits() {
        let locks = GoalLocks::new();
        let guard = locks.lock("g1").await;

        let second = timeout(Duration::from_millis(50), locks.lock("g1")).await;
        assert!(second.is_err(), "second lock on g1 should block");

        drop(guard);
        assert!(timeout(Duration::from_millis(50), locks.lock("g1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_other_goals_run_in_parallel() {
        let locks = GoalLocks::new();
        let _g1 = locks.lock("g1").await;
        assert!(timeout(Duration::from_millis(50), locks.lock("g2"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_are_forgotten() {
        let locks = GoalLocks::new();
        {
            let _a = locks.lock("g1").await;
            let _b = locks.lock("g2").await;
            assert_eq!(locks.tracked(), 2);
        }
        assert_eq!(locks.tracked(), 0);
    }
}
