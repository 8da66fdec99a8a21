use crate::backend::Backend;
use crate::errors::SyncError;
use crate::models::{
    normalize_nickname, Avatar, Dashboard, DeviceId, Participant, ParticipantId, Room, RoomCode,
    RoomId,
};
use crate::period::{format_date_key, Period};
use crate::stats::build_boards_at;
use crate::storage::{LocalSession, LocalStore};
use crate::store::{CheckinKey, CheckinStore};
use crate::sync::{
    InvalidateAndRefetch, Reconciler, Renderer, RoomSnapshot, SubscriptionState, SyncController,
};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Attempts at finding a free generated room code before giving up.
pub const CODE_ATTEMPTS: usize = 8;

pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> RoomCode;
}

pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> RoomCode {
        RoomCode::generate(&mut rand::rng())
    }
}

/// Client state for one device: who it is, which room it sits in, and the
/// cached room contents. `generation` changes on every room transition so
/// late results from a previous room can be recognised and dropped.
#[derive(Debug)]
pub struct SessionContext {
    pub local: LocalSession,
    pub room: Option<Room>,
    pub participants: Vec<Participant>,
    pub checkins: CheckinStore,
    pub generation: u64,
}

impl SessionContext {
    pub fn new(local: LocalSession) -> Self {
        Self {
            local,
            room: None,
            participants: Vec::new(),
            checkins: CheckinStore::default(),
            generation: 0,
        }
    }

    pub fn is_current(&self, room_id: RoomId, generation: u64) -> bool {
        self.generation == generation && self.room.as_ref().map(|room| room.id) == Some(room_id)
    }

    /// Replaces the cached room with a server snapshot, overwriting any
    /// optimistic toggles still pending. A snapshot fetched for another room
    /// or an older generation is dropped and `false` is returned.
    pub fn apply_snapshot(&mut self, room_id: RoomId, generation: u64, snapshot: RoomSnapshot) -> bool {
        if !self.is_current(room_id, generation) {
            return false;
        }
        self.participants = snapshot.participants;
        self.checkins.replace_all(snapshot.checkins);
        true
    }

    fn begin_room(&mut self, room: Room, participant: Participant) -> u64 {
        self.generation += 1;
        self.local.room_code = Some(room.code.clone());
        self.local.participant_id = Some(participant.id);
        self.local.nickname = Some(participant.nickname.clone());
        self.local.avatar = participant.avatar;
        self.room = Some(room);
        self.participants = vec![participant];
        self.checkins.clear();
        self.generation
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.local.clear_room();
        self.room = None;
        self.participants.clear();
        self.checkins.clear();
    }

    pub fn dashboard_at(&self, period: &Period, today: NaiveDate) -> Dashboard {
        let days = period.days();
        Dashboard {
            room_code: self.room.as_ref().map(|room| room.code.clone()),
            me: self.local.participant_id,
            today: format_date_key(today),
            period_label: period.label(),
            days: days.iter().map(|day| format_date_key(*day)).collect(),
            players: build_boards_at(
                today,
                &self.checkins,
                &self.participants,
                self.local.participant_id,
                &days,
            ),
            live: false,
        }
    }
}

/// Collaborators a [`Session`] is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub backend: Arc<dyn Backend>,
    pub local_store: Arc<LocalStore>,
    pub renderer: Arc<dyn Renderer>,
    pub reconciler: Arc<dyn Reconciler>,
    pub codes: Arc<dyn CodeSource>,
    pub period: Period,
}

impl SessionDeps {
    pub fn new(
        backend: Arc<dyn Backend>,
        local_store: Arc<LocalStore>,
        renderer: Arc<dyn Renderer>,
        period: Period,
    ) -> Self {
        Self {
            backend,
            local_store,
            renderer,
            reconciler: Arc::new(InvalidateAndRefetch),
            codes: Arc::new(RandomCodes),
            period,
        }
    }

    pub fn with_codes(mut self, codes: Arc<dyn CodeSource>) -> Self {
        self.codes = codes;
        self
    }
}

/// Room lifecycle for one device.
pub struct Session {
    device_id: DeviceId,
    backend: Arc<dyn Backend>,
    local_store: Arc<LocalStore>,
    codes: Arc<dyn CodeSource>,
    period: Period,
    context: Arc<Mutex<SessionContext>>,
    controller: SyncController,
}

impl Session {
    pub async fn open(device_id: DeviceId, deps: SessionDeps) -> Self {
        let local = deps.local_store.load(device_id).await;
        let context = Arc::new(Mutex::new(SessionContext::new(local)));
        let controller = SyncController::new(
            Arc::clone(&deps.backend),
            deps.reconciler,
            Arc::clone(&context),
            deps.renderer,
            deps.period,
        );

        Self {
            device_id,
            backend: deps.backend,
            local_store: deps.local_store,
            codes: deps.codes,
            period: deps.period,
            context,
            controller,
        }
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        self.controller.state()
    }

    pub async fn room(&self) -> Option<Room> {
        self.context.lock().await.room.clone()
    }

    pub async fn get(&self, participant: ParticipantId, day: NaiveDate) -> bool {
        self.context.lock().await.checkins.get(participant, day)
    }

    pub async fn dashboard(&self) -> Dashboard {
        self.controller.dashboard().await
    }

    /// Pushes the current dashboard to the renderer.
    pub async fn render(&self) {
        self.controller.render().await;
    }

    /// Persists the device's identity on first contact.
    pub async fn remember(&self) -> Result<(), SyncError> {
        let local = self.context.lock().await.local.clone();
        self.local_store.save(&local).await
    }

    /// Rejoins the room remembered from the last launch, if any.
    pub async fn resume(&mut self) -> Result<Option<Room>, SyncError> {
        let (code, nickname, avatar) = {
            let ctx = self.context.lock().await;
            (
                ctx.local.room_code.clone(),
                ctx.local.nickname.clone(),
                ctx.local.avatar,
            )
        };
        let (Some(code), Some(nickname)) = (code, nickname) else {
            return Ok(None);
        };

        let room = self.join_room(code.as_str(), &nickname, avatar).await?;
        Ok(Some(room))
    }

    pub async fn join_room(
        &mut self,
        code: &str,
        nickname: &str,
        avatar: Option<Avatar>,
    ) -> Result<Room, SyncError> {
        let code = RoomCode::normalize(code)?;
        let nickname = normalize_nickname(nickname)?;
        let room = self
            .backend
            .find_room_by_code(&code)
            .await?
            .ok_or_else(|| SyncError::NotFound(code.to_string()))?;
        self.enter(room, &nickname, avatar).await
    }

    pub async fn create_room(
        &mut self,
        desired_code: Option<&str>,
        nickname: &str,
        avatar: Option<Avatar>,
    ) -> Result<Room, SyncError> {
        let nickname = normalize_nickname(nickname)?;
        let room = match desired_code.map(str::trim).filter(|code| !code.is_empty()) {
            Some(raw) => {
                let code = RoomCode::normalize(raw)?;
                if self.backend.find_room_by_code(&code).await?.is_some() {
                    return Err(SyncError::Conflict(code.to_string()));
                }
                self.backend.insert_room(&code).await?
            }
            None => self.insert_generated_room().await?,
        };

        info!(room_id = %room.id, code = %room.code, "room created");
        self.enter(room, &nickname, avatar).await
    }

    async fn insert_generated_room(&self) -> Result<Room, SyncError> {
        for attempt in 1..=CODE_ATTEMPTS {
            let code = self.codes.next_code();
            match self.backend.insert_room(&code).await {
                Ok(room) => return Ok(room),
                Err(SyncError::Conflict(_)) => {
                    debug!(%code, attempt, "generated room code taken, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(SyncError::Conflict(format!(
            "no free room code after {CODE_ATTEMPTS} attempts"
        )))
    }

    /// Binds this device to `room`, subscribes to its changes and loads it.
    /// A failed subscription leaves the room joined with a one-off snapshot
    /// and is reported to the caller.
    async fn enter(
        &mut self,
        room: Room,
        nickname: &str,
        avatar: Option<Avatar>,
    ) -> Result<Room, SyncError> {
        let participant = self
            .backend
            .upsert_participant(room.id, self.device_id, nickname, avatar)
            .await?;

        let (generation, local) = {
            let mut ctx = self.context.lock().await;
            let generation = ctx.begin_room(room.clone(), participant);
            (generation, ctx.local.clone())
        };
        if let Err(err) = self.local_store.save(&local).await {
            warn!(device_id = %self.device_id, error = %err, "failed to remember session");
        }
        info!(device_id = %self.device_id, room_id = %room.id, code = %room.code, "joined room");
        self.controller.render().await;

        let subscribed = self.controller.start(room.id, generation).await;
        if let Err(err) = self.controller.refresh(room.id, generation).await {
            warn!(room_id = %room.id, error = %err, "initial room load failed");
        }
        subscribed?;
        Ok(room)
    }

    /// Stops live updates and forgets the room locally. Server rows stay.
    pub async fn leave_room(&mut self) {
        self.controller.stop();
        let local = {
            let mut ctx = self.context.lock().await;
            if let Some(room) = &ctx.room {
                info!(device_id = %self.device_id, room_id = %room.id, "left room");
            }
            ctx.reset();
            ctx.local.clone()
        };
        if let Err(err) = self.local_store.save(&local).await {
            warn!(device_id = %self.device_id, error = %err, "failed to remember session");
        }
        self.controller.render().await;
    }

    /// Optimistically flips this device's check-in for `day`, then writes it.
    /// A rejected write reverts the local flip unless a newer state already
    /// replaced it.
    pub async fn toggle(&self, day: NaiveDate) -> Result<bool, SyncError> {
        if !self.period.contains(day) {
            return Err(SyncError::OutOfPeriod(day));
        }

        let (room_id, participant_id, generation, done) = {
            let mut ctx = self.context.lock().await;
            let (Some(room_id), Some(participant_id)) =
                (ctx.room.as_ref().map(|room| room.id), ctx.local.participant_id)
            else {
                return Err(SyncError::NotJoined);
            };
            let done = ctx.checkins.toggle_local(participant_id, day);
            (room_id, participant_id, ctx.generation, done)
        };
        let key = CheckinKey::new(participant_id, day);
        self.controller.render().await;

        match self
            .backend
            .upsert_checkin(room_id, participant_id, day, done)
            .await
        {
            Ok(()) => {
                debug!(%room_id, %key, done, "check-in saved");
                Ok(done)
            }
            Err(err) => {
                warn!(%room_id, %key, error = %err, "check-in write rejected, rolling back");
                let rolled_back = {
                    let mut ctx = self.context.lock().await;
                    let still_ours = ctx.is_current(room_id, generation)
                        && ctx.checkins.get(participant_id, day) == done;
                    if still_ours {
                        ctx.checkins.set_local(participant_id, day, !done);
                    }
                    still_ours
                };
                if rolled_back {
                    self.controller.render().await;
                }
                Err(err)
            }
        }
    }

    pub async fn shutdown(&mut self) {
        self.controller.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Checkin;
    use chrono::Utc;
    use uuid::Uuid;

    fn room(code: &str) -> Room {
        Room {
            id: Uuid::new_v4(),
            code: RoomCode::normalize(code).unwrap(),
            created_at: Utc::now(),
        }
    }

    fn participant(room: &Room, nickname: &str) -> Participant {
        Participant {
            id: Uuid::new_v4(),
            room_id: room.id,
            device_id: Uuid::new_v4(),
            nickname: nickname.to_string(),
            avatar: Some(Avatar::Owl),
            created_at: Utc::now(),
        }
    }

    fn snapshot_with_day(room: &Room, player: &Participant, day: NaiveDate) -> RoomSnapshot {
        RoomSnapshot {
            participants: vec![player.clone()],
            checkins: vec![Checkin {
                room_id: room.id,
                participant_id: player.id,
                day,
                done: true,
                updated_at: Utc::now(),
            }],
        }
    }

    #[test]
    fn snapshots_for_previous_rooms_are_dropped() {
        let day = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
        let first = room("ONE");
        let second = room("TWO");
        let me = participant(&first, "Mia");
        let mut ctx = SessionContext::new(LocalSession::new(me.device_id));

        let old_generation = ctx.begin_room(first.clone(), me.clone());
        let new_generation = ctx.begin_room(second.clone(), participant(&second, "Mia"));

        assert!(!ctx.apply_snapshot(first.id, old_generation, snapshot_with_day(&first, &me, day)));
        assert!(!ctx.checkins.get(me.id, day));
        assert!(!ctx.apply_snapshot(second.id, old_generation, snapshot_with_day(&second, &me, day)));
        assert!(ctx.apply_snapshot(second.id, new_generation, snapshot_with_day(&second, &me, day)));
        assert!(ctx.checkins.get(me.id, day));
    }

    #[test]
    fn reset_keeps_device_and_nickname() {
        let first = room("ONE");
        let me = participant(&first, "Mia");
        let mut ctx = SessionContext::new(LocalSession::new(me.device_id));
        ctx.begin_room(first, me.clone());
        ctx.checkins.set_local(me.id, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), true);

        ctx.reset();

        assert!(ctx.room.is_none());
        assert!(ctx.checkins.is_empty());
        assert_eq!(ctx.local.device_id, me.device_id);
        assert_eq!(ctx.local.nickname.as_deref(), Some("Mia"));
        assert_eq!(ctx.local.avatar, Some(Avatar::Owl));
        assert!(ctx.local.room_code.is_none());
        assert!(ctx.local.participant_id.is_none());
    }

    #[test]
    fn dashboard_reflects_room_and_period() {
        let period = Period::new(2026, 1).unwrap();
        let first = room("sober23");
        let me = participant(&first, "Mia");
        let mut ctx = SessionContext::new(LocalSession::new(me.device_id));
        assert!(ctx.dashboard_at(&period, period.start()).room_code.is_none());

        ctx.begin_room(first, me.clone());
        ctx.checkins.toggle_local(me.id, period.start());
        let dashboard = ctx.dashboard_at(&period, period.start());

        assert_eq!(dashboard.room_code.unwrap().as_str(), "SOBER23");
        assert_eq!(dashboard.me, Some(me.id));
        assert_eq!(dashboard.today, "2026-02-01");
        assert_eq!(dashboard.days.len(), 28);
        assert_eq!(dashboard.players.len(), 1);
        assert!(dashboard.players[0].is_me);
        assert_eq!(dashboard.players[0].stats.progress, 1);
    }
}
