use crate::errors::SyncError;
use crate::models::{Avatar, DeviceId, ParticipantId, RoomCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::error;

pub async fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!(path = %path.display(), "failed to parse data file: {err}");
                T::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(err) => {
            error!(path = %path.display(), "failed to read data file: {err}");
            T::default()
        }
    }
}

pub async fn persist_json<T: Serialize>(path: &Path, data: &T) -> Result<(), SyncError> {
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}

/// What a device remembers between launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSession {
    pub device_id: DeviceId,
    pub nickname: Option<String>,
    pub avatar: Option<Avatar>,
    pub room_code: Option<RoomCode>,
    pub participant_id: Option<ParticipantId>,
}

impl LocalSession {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            nickname: None,
            avatar: None,
            room_code: None,
            participant_id: None,
        }
    }

    pub fn clear_room(&mut self) {
        self.room_code = None;
        self.participant_id = None;
    }
}

/// Per-device session state, optionally backed by a JSON file.
pub struct LocalStore {
    path: Option<PathBuf>,
    sessions: Mutex<BTreeMap<DeviceId, LocalSession>>,
}

impl LocalStore {
    pub async fn open(path: PathBuf) -> Self {
        let sessions = load_json(&path).await;
        Self {
            path: Some(path),
            sessions: Mutex::new(sessions),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Saved state for `device_id`, or a fresh one for an unseen device.
    pub async fn load(&self, device_id: DeviceId) -> LocalSession {
        self.sessions
            .lock()
            .await
            .get(&device_id)
            .cloned()
            .unwrap_or_else(|| LocalSession::new(device_id))
    }

    pub async fn save(&self, session: &LocalSession) -> Result<(), SyncError> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.device_id, session.clone());
        if let Some(path) = &self.path {
            persist_json(path, &*sessions).await?;
        }
        Ok(())
    }

    pub async fn contains(&self, device_id: DeviceId) -> bool {
        self.sessions.lock().await.contains_key(&device_id)
    }

    pub async fn devices(&self) -> Vec<DeviceId> {
        self.sessions.lock().await.keys().copied().collect()
    }
}
