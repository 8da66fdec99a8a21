//! The hosted data store the client talks to, reduced to the calls it needs.

use crate::errors::SyncError;
use crate::models::{Avatar, Checkin, DeviceId, Participant, ParticipantId, Room, RoomCode, RoomId};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeTable {
    Checkins,
    Participants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub room_id: RoomId,
    pub table: ChangeTable,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSignal {
    /// Something in the room changed. `None` when notifications were lost
    /// to lag, which still means "go refetch".
    Changed(Option<ChangeEvent>),
    /// The channel is gone; the subscriber has to open a new one.
    Dropped,
}

/// Stream of change notifications for one room.
pub struct ChangeFeed {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    pub async fn next_signal(&mut self) -> FeedSignal {
        match self.rx.recv().await {
            Ok(event) => FeedSignal::Changed(Some(event)),
            Err(RecvError::Lagged(_)) => FeedSignal::Changed(None),
            Err(RecvError::Closed) => FeedSignal::Dropped,
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn find_room_by_code(&self, code: &RoomCode) -> Result<Option<Room>, SyncError>;

    /// Fails with [`SyncError::Conflict`] when the code is taken.
    async fn insert_room(&self, code: &RoomCode) -> Result<Room, SyncError>;

    /// Create-or-update keyed by `(room_id, device_id)`.
    async fn upsert_participant(
        &self,
        room_id: RoomId,
        device_id: DeviceId,
        nickname: &str,
        avatar: Option<Avatar>,
    ) -> Result<Participant, SyncError>;

    /// Participants in creation order.
    async fn list_participants(&self, room_id: RoomId) -> Result<Vec<Participant>, SyncError>;

    async fn query_checkins(
        &self,
        room_id: RoomId,
        start: NaiveDate,
        end_exclusive: NaiveDate,
    ) -> Result<Vec<Checkin>, SyncError>;

    async fn upsert_checkin(
        &self,
        room_id: RoomId,
        participant_id: ParticipantId,
        day: NaiveDate,
        done: bool,
    ) -> Result<(), SyncError>;

    async fn subscribe_to_changes(&self, room_id: RoomId) -> Result<ChangeFeed, SyncError>;
}
