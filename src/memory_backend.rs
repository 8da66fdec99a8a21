use crate::backend::{Backend, ChangeEvent, ChangeFeed, ChangeKind, ChangeTable};
use crate::errors::SyncError;
use crate::models::{Avatar, Checkin, DeviceId, Participant, ParticipantId, Room, RoomCode, RoomId};
use crate::storage::{load_json, persist_json};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use uuid::Uuid;

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendData {
    pub rooms: Vec<Room>,
    pub participants: Vec<Participant>,
    pub checkins: Vec<Checkin>,
}

/// In-process stand-in for the hosted store: rows in memory, optionally
/// mirrored to a JSON file, with one broadcast channel per room as the
/// change feed.
pub struct MemoryBackend {
    path: Option<PathBuf>,
    data: Mutex<BackendData>,
    feeds: Mutex<HashMap<RoomId, broadcast::Sender<ChangeEvent>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_data(None, BackendData::default())
    }

    pub async fn open(path: PathBuf) -> Self {
        let data = load_json(&path).await;
        Self::with_data(Some(path), data)
    }

    fn with_data(path: Option<PathBuf>, data: BackendData) -> Self {
        Self {
            path,
            data: Mutex::new(data),
            feeds: Mutex::new(HashMap::new()),
        }
    }

    /// Closes the room's change feed. Current subscribers see it drop.
    pub async fn disconnect_room(&self, room_id: RoomId) {
        self.feeds.lock().await.remove(&room_id);
    }

    /// Persists `next` and only then makes it the live data, so a failed
    /// write leaves the rows exactly as they were.
    async fn commit(&self, data: &mut BackendData, next: BackendData) -> Result<(), SyncError> {
        if let Some(path) = &self.path {
            persist_json(path, &next)
                .await
                .map_err(|err| SyncError::Write(err.to_string()))?;
        }
        *data = next;
        Ok(())
    }

    async fn notify(&self, room_id: RoomId, table: ChangeTable, kind: ChangeKind) {
        if let Some(tx) = self.feeds.lock().await.get(&room_id) {
            let receivers = tx
                .send(ChangeEvent {
                    room_id,
                    table,
                    kind,
                })
                .unwrap_or(0);
            debug!(%room_id, ?table, ?kind, receivers, "change published");
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn find_room_by_code(&self, code: &RoomCode) -> Result<Option<Room>, SyncError> {
        let data = self.data.lock().await;
        Ok(data.rooms.iter().find(|room| &room.code == code).cloned())
    }

    async fn insert_room(&self, code: &RoomCode) -> Result<Room, SyncError> {
        let mut data = self.data.lock().await;
        if data.rooms.iter().any(|room| &room.code == code) {
            return Err(SyncError::Conflict(code.to_string()));
        }

        let room = Room {
            id: Uuid::new_v4(),
            code: code.clone(),
            created_at: Utc::now(),
        };
        let mut next = data.clone();
        next.rooms.push(room.clone());
        self.commit(&mut data, next).await?;
        Ok(room)
    }

    async fn upsert_participant(
        &self,
        room_id: RoomId,
        device_id: DeviceId,
        nickname: &str,
        avatar: Option<Avatar>,
    ) -> Result<Participant, SyncError> {
        let (participant, kind) = {
            let mut data = self.data.lock().await;
            if !data.rooms.iter().any(|room| room.id == room_id) {
                return Err(SyncError::Write(format!("unknown room {room_id}")));
            }

            let mut next = data.clone();
            let existing = next
                .participants
                .iter_mut()
                .find(|p| p.room_id == room_id && p.device_id == device_id);
            let (participant, kind) = match existing {
                Some(participant) => {
                    participant.nickname = nickname.to_string();
                    participant.avatar = avatar;
                    (participant.clone(), ChangeKind::Update)
                }
                None => {
                    let participant = Participant {
                        id: Uuid::new_v4(),
                        room_id,
                        device_id,
                        nickname: nickname.to_string(),
                        avatar,
                        created_at: Utc::now(),
                    };
                    next.participants.push(participant.clone());
                    (participant, ChangeKind::Insert)
                }
            };
            self.commit(&mut data, next).await?;
            (participant, kind)
        };

        self.notify(room_id, ChangeTable::Participants, kind).await;
        Ok(participant)
    }

    async fn list_participants(&self, room_id: RoomId) -> Result<Vec<Participant>, SyncError> {
        let data = self.data.lock().await;
        let mut participants: Vec<Participant> = data
            .participants
            .iter()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.created_at);
        Ok(participants)
    }

    async fn query_checkins(
        &self,
        room_id: RoomId,
        start: NaiveDate,
        end_exclusive: NaiveDate,
    ) -> Result<Vec<Checkin>, SyncError> {
        let data = self.data.lock().await;
        Ok(data
            .checkins
            .iter()
            .filter(|c| c.room_id == room_id && c.day >= start && c.day < end_exclusive)
            .cloned()
            .collect())
    }

    async fn upsert_checkin(
        &self,
        room_id: RoomId,
        participant_id: ParticipantId,
        day: NaiveDate,
        done: bool,
    ) -> Result<(), SyncError> {
        let kind = {
            let mut data = self.data.lock().await;
            if !data
                .participants
                .iter()
                .any(|p| p.id == participant_id && p.room_id == room_id)
            {
                return Err(SyncError::Write(format!(
                    "participant {participant_id} is not in room {room_id}"
                )));
            }

            let now = Utc::now();
            let mut next = data.clone();
            let existing = next.checkins.iter_mut().find(|c| {
                c.room_id == room_id && c.participant_id == participant_id && c.day == day
            });
            let kind = match existing {
                Some(checkin) => {
                    checkin.done = done;
                    checkin.updated_at = now;
                    ChangeKind::Update
                }
                None => {
                    next.checkins.push(Checkin {
                        room_id,
                        participant_id,
                        day,
                        done,
                        updated_at: now,
                    });
                    ChangeKind::Insert
                }
            };
            self.commit(&mut data, next).await?;
            kind
        };

        self.notify(room_id, ChangeTable::Checkins, kind).await;
        Ok(())
    }

    async fn subscribe_to_changes(&self, room_id: RoomId) -> Result<ChangeFeed, SyncError> {
        let mut feeds = self.feeds.lock().await;
        let tx = feeds
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0);
        Ok(ChangeFeed::new(tx.subscribe()))
    }
}
