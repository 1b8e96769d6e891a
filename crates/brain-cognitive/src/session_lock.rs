//! Per-session serialization (§5): at most one Turn Pipeline executes
//! for a given session at a time; queue processing for that session
//! shares the same lock. Different sessions proceed fully in parallel.

use brain_types::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct SessionLockRegistry {
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the session's lock for the duration of the returned
    /// guard. Callers hold this across the whole turn, including the
    /// queue-processing pass that follows it.
    pub async fn acquire(&self, session_id: &SessionId) -> SessionGuard {
        let lock = self.lock_for(session_id).await;
        let guard = lock.lock_owned().await;
        SessionGuard { _guard: guard }
    }
}

pub struct SessionGuard {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_session_serializes() {
        let registry = Arc::new(SessionLockRegistry::new());
        let counter = Arc::new(AtomicU32::new(0));
        let session = SessionId::from("s1");

        let mut handles = Vec::new();
        for _ in 0..5 {
            let registry = registry.clone();
            let counter = counter.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire(&session).await;
                let before = counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                assert_eq!(counter.load(Ordering::SeqCst), before + 1);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
