use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use prx_bridge_origin::BackendProxy;
use tracing::info;

use crate::session::{SessionActor, SessionKey, SessionSettings};

/// Explicit map from session key to its actor. Actors are created lazily on
/// first `open_stream` and share nothing mutable with each other.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, Arc<SessionActor>>>,
    proxy: BackendProxy,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(proxy: BackendProxy, settings: SessionSettings) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            proxy,
            settings,
        }
    }

    /// The returned actor counts as active, so an idle sweep racing the
    /// caller's `open_stream` cannot evict it.
    pub fn get_or_create(&self, key: &SessionKey) -> Arc<SessionActor> {
        let mut sessions = self.sessions.lock();
        let actor = sessions
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(SessionActor::new(
                    key.clone(),
                    self.settings.clone(),
                    self.proxy.clone(),
                ))
            })
            .clone();
        actor.touch();
        actor
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<SessionActor>> {
        self.sessions.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn evict(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.lock().remove(key);
        match removed {
            Some(actor) => {
                actor.cleanup();
                true
            }
            None => false,
        }
    }

    /// Drops actors with no live stream that have been quiet for `max_idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let evicted = {
            let mut sessions = self.sessions.lock();
            let stale = sessions
                .iter()
                .filter(|(_, actor)| !actor.is_ready() && actor.idle_for() >= max_idle)
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            stale
                .into_iter()
                .filter_map(|key| sessions.remove(&key))
                .collect::<Vec<_>>()
        };
        for actor in &evicted {
            actor.cleanup();
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted idle sessions");
        }
        evicted.len()
    }

    /// Closes every stream, then gives detached deliveries `timeout` to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        let actors = self.sessions.lock().drain().map(|(_, a)| a).collect::<Vec<_>>();
        for actor in &actors {
            actor.cleanup();
        }
        let drains = actors.iter().map(|actor| actor.drain(timeout));
        let _ = futures::future::join_all(drains).await;
    }

    pub fn close_all(&self) {
        let actors = self.sessions.lock().values().cloned().collect::<Vec<_>>();
        for actor in actors {
            actor.cleanup();
        }
    }
}
