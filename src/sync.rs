//! Realtime reconciliation: one change-feed subscription per session, and
//! the invalidate-and-refetch strategy run on every notification.

use crate::backend::{Backend, ChangeFeed, FeedSignal};
use crate::errors::SyncError;
use crate::models::{Checkin, Dashboard, Participant, RoomId};
use crate::period::{today, Period};
use crate::session::SessionContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const RESUBSCRIBE_ATTEMPTS: u32 = 5;
const RESUBSCRIBE_BACKOFF: Duration = Duration::from_millis(200);

/// Authoritative room state as fetched from the backend.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    pub participants: Vec<Participant>,
    pub checkins: Vec<Checkin>,
}

/// How a change notification turns into fresh local state.
#[async_trait]
pub trait Reconciler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reconcile(
        &self,
        backend: &dyn Backend,
        room_id: RoomId,
        period: Period,
    ) -> Result<RoomSnapshot, SyncError>;
}

/// Ignores the notification payload and reloads everything. Every
/// notification costs a full refetch; rooms are small enough for that.
pub struct InvalidateAndRefetch;

#[async_trait]
impl Reconciler for InvalidateAndRefetch {
    fn name(&self) -> &'static str {
        "invalidate-and-refetch"
    }

    async fn reconcile(
        &self,
        backend: &dyn Backend,
        room_id: RoomId,
        period: Period,
    ) -> Result<RoomSnapshot, SyncError> {
        let participants = backend.list_participants(room_id).await?;
        let checkins = backend
            .query_checkins(room_id, period.start(), period.end_exclusive())
            .await?;
        Ok(RoomSnapshot {
            participants,
            checkins,
        })
    }
}

/// Render trigger handed to the presentation layer.
pub trait Renderer: Send + Sync {
    fn render(&self, dashboard: Dashboard);
}

/// Publishes every frame on a `watch` channel; readers see the latest one.
pub struct WatchRenderer {
    tx: watch::Sender<Dashboard>,
}

impl WatchRenderer {
    pub fn channel() -> (Self, watch::Receiver<Dashboard>) {
        let (tx, rx) = watch::channel(Dashboard::default());
        (Self { tx }, rx)
    }
}

impl Renderer for WatchRenderer {
    fn render(&self, dashboard: Dashboard) {
        self.tx.send_replace(dashboard);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Active,
}

struct Shared {
    backend: Arc<dyn Backend>,
    reconciler: Arc<dyn Reconciler>,
    context: Arc<Mutex<SessionContext>>,
    renderer: Arc<dyn Renderer>,
    period: Period,
    state: watch::Sender<SubscriptionState>,
}

impl Shared {
    /// Refetches and replaces the caches. `Ok(false)` means the session has
    /// moved to another room (or left) and the result was dropped.
    async fn refresh(&self, room_id: RoomId, generation: u64) -> Result<bool, SyncError> {
        let snapshot = self
            .reconciler
            .reconcile(self.backend.as_ref(), room_id, self.period)
            .await?;

        let applied = self
            .context
            .lock()
            .await
            .apply_snapshot(room_id, generation, snapshot);
        if applied {
            self.render().await;
        } else {
            debug!(%room_id, generation, "discarding snapshot for stale session");
        }
        Ok(applied)
    }

    async fn render(&self) {
        let dashboard = self.dashboard().await;
        self.renderer.render(dashboard);
    }

    async fn dashboard(&self) -> Dashboard {
        let mut dashboard = self.context.lock().await.dashboard_at(&self.period, today());
        dashboard.live = *self.state.borrow() == SubscriptionState::Active;
        dashboard
    }

    /// Marks the feed as lost, unless the session already moved on and a
    /// newer subscription owns the state.
    async fn give_up(&self, room_id: RoomId, generation: u64) {
        {
            let ctx = self.context.lock().await;
            if !ctx.is_current(room_id, generation) {
                return;
            }
            self.state.send_replace(SubscriptionState::Unsubscribed);
        }
        self.render().await;
    }
}

struct ActiveSubscription {
    room_id: RoomId,
    generation: u64,
    task: JoinHandle<()>,
}

/// Owns the single live change-feed subscription of a session.
pub struct SyncController {
    shared: Arc<Shared>,
    active: Option<ActiveSubscription>,
}

impl SyncController {
    pub fn new(
        backend: Arc<dyn Backend>,
        reconciler: Arc<dyn Reconciler>,
        context: Arc<Mutex<SessionContext>>,
        renderer: Arc<dyn Renderer>,
        period: Period,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                reconciler,
                context,
                renderer,
                period,
                state: watch::channel(SubscriptionState::Unsubscribed).0,
            }),
            active: None,
        }
    }

    /// Current feed state. The watch task drops it to `Unsubscribed` when it
    /// cannot resubscribe.
    pub fn state(&self) -> SubscriptionState {
        *self.shared.state.borrow()
    }

    fn set_state(&self, state: SubscriptionState) {
        self.shared.state.send_replace(state);
    }

    /// Subscribes to `room_id`, tearing down any subscription for another
    /// room (or an older session generation) first.
    pub async fn start(&mut self, room_id: RoomId, generation: u64) -> Result<(), SyncError> {
        if let Some(active) = &self.active {
            if active.room_id == room_id
                && active.generation == generation
                && !active.task.is_finished()
            {
                return Ok(());
            }
            self.stop();
        }

        self.set_state(SubscriptionState::Subscribing);
        let feed = match self.shared.backend.subscribe_to_changes(room_id).await {
            Ok(feed) => feed,
            Err(err) => {
                self.set_state(SubscriptionState::Unsubscribed);
                return Err(as_subscription_error(err));
            }
        };

        let task = tokio::spawn(watch_room(
            Arc::clone(&self.shared),
            room_id,
            generation,
            feed,
        ));
        self.active = Some(ActiveSubscription {
            room_id,
            generation,
            task,
        });
        self.set_state(SubscriptionState::Active);
        info!(
            %room_id,
            strategy = self.shared.reconciler.name(),
            "subscribed to room changes"
        );
        Ok(())
    }

    /// Releases the subscription. Safe to call when already stopped.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
            info!(room_id = %active.room_id, "unsubscribed from room changes");
        }
        self.set_state(SubscriptionState::Unsubscribed);
    }

    pub async fn refresh(&self, room_id: RoomId, generation: u64) -> Result<bool, SyncError> {
        self.shared.refresh(room_id, generation).await
    }

    pub async fn render(&self) {
        self.shared.render().await;
    }

    pub async fn dashboard(&self) -> Dashboard {
        self.shared.dashboard().await
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn as_subscription_error(err: SyncError) -> SyncError {
    match err {
        SyncError::Subscription(_) => err,
        other => SyncError::Subscription(other.to_string()),
    }
}

async fn watch_room(shared: Arc<Shared>, room_id: RoomId, generation: u64, mut feed: ChangeFeed) {
    loop {
        match feed.next_signal().await {
            FeedSignal::Changed(event) => {
                debug!(%room_id, ?event, "room changed");
            }
            FeedSignal::Dropped => {
                warn!(%room_id, "change feed dropped, resubscribing");
                match resubscribe(&shared, room_id).await {
                    Some(fresh) => feed = fresh,
                    None => {
                        error!(%room_id, "could not resubscribe; live updates stopped");
                        shared.give_up(room_id, generation).await;
                        return;
                    }
                }
            }
        }

        match shared.refresh(room_id, generation).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                warn!(%room_id, error = %err, "refetch after change failed, keeping stale data");
            }
        }
    }
}

async fn resubscribe(shared: &Shared, room_id: RoomId) -> Option<ChangeFeed> {
    for attempt in 1..=RESUBSCRIBE_ATTEMPTS {
        match shared.backend.subscribe_to_changes(room_id).await {
            Ok(feed) => {
                info!(%room_id, attempt, "resubscribed to room changes");
                return Some(feed);
            }
            Err(err) => {
                warn!(%room_id, attempt, error = %err, "resubscribe failed");
                tokio::time::sleep(RESUBSCRIBE_BACKOFF * attempt).await;
            }
        }
    }
    None
}
