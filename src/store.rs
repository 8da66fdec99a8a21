use crate::models::{Checkin, ParticipantId};
use crate::period::format_date_key;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CheckinKey {
    pub participant: ParticipantId,
    pub day: NaiveDate,
}

impl CheckinKey {
    pub fn new(participant: ParticipantId, day: NaiveDate) -> Self {
        Self { participant, day }
    }
}

impl fmt::Display for CheckinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.participant, format_date_key(self.day))
    }
}

/// Client-side cache of check-ins for the current room.
///
/// Two writers touch it: [`CheckinStore::toggle_local`] for optimistic
/// updates and [`CheckinStore::replace_all`] for server snapshots. A replace
/// is a full overwrite and always wins over pending optimistic entries.
#[derive(Debug, Clone, Default)]
pub struct CheckinStore {
    entries: BTreeMap<CheckinKey, bool>,
}

impl CheckinStore {
    pub fn from_checkins(snapshot: impl IntoIterator<Item = Checkin>) -> Self {
        let mut store = Self::default();
        store.replace_all(snapshot);
        store
    }

    pub fn replace_all(&mut self, snapshot: impl IntoIterator<Item = Checkin>) {
        self.entries = snapshot
            .into_iter()
            .map(|checkin| {
                (
                    CheckinKey::new(checkin.participant_id, checkin.day),
                    checkin.done,
                )
            })
            .collect();
    }

    /// Flips the cached value (absent counts as `false`) and returns the new one.
    pub fn toggle_local(&mut self, participant: ParticipantId, day: NaiveDate) -> bool {
        let entry = self
            .entries
            .entry(CheckinKey::new(participant, day))
            .or_insert(false);
        *entry = !*entry;
        *entry
    }

    pub fn set_local(&mut self, participant: ParticipantId, day: NaiveDate, done: bool) {
        self.entries.insert(CheckinKey::new(participant, day), done);
    }

    pub fn get(&self, participant: ParticipantId, day: NaiveDate) -> bool {
        self.entries
            .get(&CheckinKey::new(participant, day))
            .copied()
            .unwrap_or(false)
    }

    /// Every cached day for one participant, regardless of period.
    pub fn days_for(&self, participant: ParticipantId) -> impl Iterator<Item = (NaiveDate, bool)> + '_ {
        self.entries
            .iter()
            .filter(move |(key, _)| key.participant == participant)
            .map(|(key, done)| (key.day, *done))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
