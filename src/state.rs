use crate::backend::Backend;
use crate::memory_backend::MemoryBackend;
use crate::models::{Dashboard, DeviceId};
use crate::period::Period;
use crate::session::{Session, SessionDeps};
use crate::storage::LocalStore;
use crate::sync::WatchRenderer;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

/// A device's session plus the frames rendered for it.
pub struct DeviceSession {
    pub session: Mutex<Session>,
    pub dashboards: watch::Receiver<Dashboard>,
}

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<MemoryBackend>,
    pub local_store: Arc<LocalStore>,
    pub period: Period,
    sessions: Arc<Mutex<HashMap<DeviceId, Arc<DeviceSession>>>>,
    closing: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(backend: Arc<MemoryBackend>, local_store: Arc<LocalStore>, period: Period) -> Self {
        Self {
            backend,
            local_store,
            period,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            closing: Arc::new(watch::channel(false).0),
        }
    }

    /// Flips to `true` once shutdown starts; long-lived streams end on it.
    pub fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    /// Opens a session for a newly issued device id and stores its identity.
    pub async fn register(&self, device_id: DeviceId) -> Arc<DeviceSession> {
        let device = self.open(device_id).await;
        if let Err(err) = device.session.lock().await.remember().await {
            warn!(%device_id, error = %err, "failed to store device identity");
        }
        info!(%device_id, "device registered");
        device
    }

    /// The live session for a known device, reopened from local storage on
    /// first use after a restart. Unknown devices get `None`.
    pub async fn session(&self, device_id: DeviceId) -> Option<Arc<DeviceSession>> {
        if let Some(existing) = self.sessions.lock().await.get(&device_id) {
            return Some(Arc::clone(existing));
        }
        if !self.local_store.contains(device_id).await {
            return None;
        }
        Some(self.open(device_id).await)
    }

    async fn open(&self, device_id: DeviceId) -> Arc<DeviceSession> {
        if let Some(existing) = self.sessions.lock().await.get(&device_id) {
            return Arc::clone(existing);
        }

        let (renderer, dashboards) = WatchRenderer::channel();
        let backend: Arc<dyn Backend> = self.backend.clone();
        let deps = SessionDeps::new(
            backend,
            Arc::clone(&self.local_store),
            Arc::new(renderer),
            self.period,
        );
        let session = Session::open(device_id, deps).await;
        session.render().await;
        let device = Arc::new(DeviceSession {
            session: Mutex::new(session),
            dashboards,
        });

        // A concurrent request may have opened the same device meanwhile.
        let mut sessions = self.sessions.lock().await;
        Arc::clone(sessions.entry(device_id).or_insert(device))
    }

    /// Reopens every remembered device and rejoins its last room.
    pub async fn restore_sessions(&self) {
        for device_id in self.local_store.devices().await {
            let device = self.open(device_id).await;
            let mut session = device.session.lock().await;
            match session.resume().await {
                Ok(Some(room)) => info!(%device_id, code = %room.code, "rejoined room"),
                Ok(None) => {}
                Err(err) => warn!(%device_id, error = %err, "could not rejoin room"),
            }
        }
    }

    pub async fn shutdown(&self) {
        self.closing.send_replace(true);
        let sessions: Vec<Arc<DeviceSession>> =
            self.sessions.lock().await.values().cloned().collect();
        for device in sessions {
            device.session.lock().await.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state() -> AppState {
        AppState::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(LocalStore::in_memory()),
            Period::new(2026, 1).unwrap(),
        )
    }

    #[tokio::test]
    async fn unknown_devices_are_not_opened() {
        let state = state();
        for _ in 0..10 {
            assert!(state.session(Uuid::new_v4()).await.is_none());
        }
        assert!(state.local_store.devices().await.is_empty());
        assert!(state.sessions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn registered_device_is_remembered() {
        let state = state();
        let device_id = Uuid::new_v4();
        let registered = state.register(device_id).await;

        let found = state.session(device_id).await.unwrap();
        assert!(Arc::ptr_eq(&registered, &found));
        assert_eq!(state.local_store.devices().await, vec![device_id]);
    }

    #[tokio::test]
    async fn stored_device_is_reopened_after_restart() {
        let local_store = Arc::new(LocalStore::in_memory());
        let device_id = Uuid::new_v4();
        {
            let before = AppState::new(
                Arc::new(MemoryBackend::new()),
                Arc::clone(&local_store),
                Period::new(2026, 1).unwrap(),
            );
            before.register(device_id).await;
        }

        let after = AppState::new(
            Arc::new(MemoryBackend::new()),
            local_store,
            Period::new(2026, 1).unwrap(),
        );
        assert!(after.session(device_id).await.is_some());
    }
}
