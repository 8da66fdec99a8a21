use crate::errors::SyncError;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type RoomId = Uuid;
pub type ParticipantId = Uuid;
pub type DeviceId = Uuid;

pub const ROOM_CODE_MAX_LEN: usize = 16;
pub const NICKNAME_MAX_LEN: usize = 24;

/// Generated codes avoid characters that read alike: no `0`/`O`, no `1`/`I`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const GENERATED_CODE_LEN: usize = 6;

/// Normalized room code: trimmed, uppercase ASCII alphanumerics, at most
/// [`ROOM_CODE_MAX_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn normalize(input: &str) -> Result<Self, SyncError> {
        let code: String = input
            .trim()
            .chars()
            .take(ROOM_CODE_MAX_LEN)
            .collect::<String>()
            .to_uppercase();

        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SyncError::InvalidCode(input.trim().to_string()));
        }

        Ok(Self(code))
    }

    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..GENERATED_CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Board token a participant plays with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Avatar {
    Fox,
    Bear,
    Owl,
    Cat,
    Frog,
    Panda,
}

impl Avatar {
    pub const ALL: [Avatar; 6] = [
        Avatar::Fox,
        Avatar::Bear,
        Avatar::Owl,
        Avatar::Cat,
        Avatar::Frog,
        Avatar::Panda,
    ];
}

pub fn normalize_nickname(input: &str) -> Result<String, SyncError> {
    let nickname = input.trim();
    if nickname.is_empty() || nickname.chars().count() > NICKNAME_MAX_LEN {
        return Err(SyncError::InvalidNickname(nickname.to_string()));
    }
    Ok(nickname.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub code: RoomCode,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub room_id: RoomId,
    pub device_id: DeviceId,
    pub nickname: String,
    pub avatar: Option<Avatar>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkin {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub day: NaiveDate,
    pub done: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub progress: usize,
    pub streak: usize,
    pub week_count: usize,
    pub period_length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerBoard {
    pub participant_id: ParticipantId,
    pub nickname: String,
    pub avatar: Option<Avatar>,
    pub is_me: bool,
    pub days: Vec<bool>,
    pub stats: PlayerStats,
}

/// Everything the presentation layer needs to draw one frame.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Dashboard {
    pub room_code: Option<RoomCode>,
    pub me: Option<ParticipantId>,
    pub today: String,
    pub period_label: String,
    pub days: Vec<String>,
    pub players: Vec<PlayerBoard>,
    /// Whether partner changes currently arrive live.
    pub live: bool,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub code: String,
    pub nickname: String,
    pub avatar: Option<Avatar>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub code: Option<String>,
    pub nickname: String,
    pub avatar: Option<Avatar>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub day: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub day: String,
    pub done: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub device_id: DeviceId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room_id: RoomId,
    pub code: RoomCode,
}

#[derive(Debug, Serialize)]
pub struct PeriodResponse {
    pub label: String,
    pub start: String,
    pub end_exclusive: String,
    pub days: Vec<String>,
    pub avatars: Vec<Avatar>,
}
