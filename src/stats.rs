use crate::models::{Participant, ParticipantId, PlayerBoard, PlayerStats};
use crate::period::{today, week_range};
use crate::store::CheckinStore;
use chrono::NaiveDate;

/// The dashboard only ever shows the first two participants of a room.
pub const DISPLAYED_PLAYERS: usize = 2;

/// Days in `days` checked off by `participant`.
pub fn progress(store: &CheckinStore, participant: ParticipantId, days: &[NaiveDate]) -> usize {
    days.iter()
        .filter(|day| store.get(participant, **day))
        .count()
}

/// Consecutive checked days ending at `today`. Days after `today` are
/// ignored. An unchecked `today` does not break the run, the day is still
/// open; any earlier gap ends it.
pub fn streak(
    store: &CheckinStore,
    participant: ParticipantId,
    days: &[NaiveDate],
    today: NaiveDate,
) -> usize {
    let mut elapsed = days.iter().copied().filter(|day| *day <= today).rev().peekable();
    if elapsed.peek() == Some(&today) && !store.get(participant, today) {
        elapsed.next();
    }
    elapsed.take_while(|day| store.get(participant, *day)).count()
}

/// Checked days in the Monday–Sunday week around `today`. Scans the whole
/// cache rather than the period, the week may straddle a month boundary.
pub fn week_count(store: &CheckinStore, participant: ParticipantId, today: NaiveDate) -> usize {
    let (start, end) = week_range(today);
    let (start, end) = (start.date(), end.date());
    store
        .days_for(participant)
        .filter(|(day, done)| *done && *day >= start && *day <= end)
        .count()
}

pub fn player_stats(
    store: &CheckinStore,
    participant: ParticipantId,
    days: &[NaiveDate],
    today: NaiveDate,
) -> PlayerStats {
    PlayerStats {
        progress: progress(store, participant, days),
        streak: streak(store, participant, days, today),
        week_count: week_count(store, participant, today),
        period_length: days.len(),
    }
}

pub fn build_boards(
    store: &CheckinStore,
    participants: &[Participant],
    me: Option<ParticipantId>,
    days: &[NaiveDate],
) -> Vec<PlayerBoard> {
    build_boards_at(today(), store, participants, me, days)
}

pub fn build_boards_at(
    today: NaiveDate,
    store: &CheckinStore,
    participants: &[Participant],
    me: Option<ParticipantId>,
    days: &[NaiveDate],
) -> Vec<PlayerBoard> {
    participants
        .iter()
        .take(DISPLAYED_PLAYERS)
        .map(|participant| PlayerBoard {
            participant_id: participant.id,
            nickname: participant.nickname.clone(),
            avatar: participant.avatar,
            is_me: Some(participant.id) == me,
            days: days.iter().map(|day| store.get(participant.id, *day)).collect(),
            stats: player_stats(store, participant.id, days, today),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Checkin;
    use crate::period::month_days;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn feb(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    fn checkin(participant: ParticipantId, day: NaiveDate, done: bool) -> Checkin {
        Checkin {
            room_id: Uuid::nil(),
            participant_id: participant,
            day,
            done,
            updated_at: Utc::now(),
        }
    }

    /// Days 1..=5 done, the rest of February explicitly not done.
    fn first_five_done(player: ParticipantId) -> CheckinStore {
        CheckinStore::from_checkins(
            month_days(2026, 1)
                .into_iter()
                .map(|day| checkin(player, day, day <= feb(5))),
        )
    }

    #[test]
    fn progress_counts_done_days_in_period() {
        let player = Uuid::new_v4();
        let days = month_days(2026, 1);
        let store = first_five_done(player);
        assert_eq!(days.len(), 28);
        assert_eq!(progress(&store, player, &days), 5);
    }

    #[test]
    fn streak_scenarios() {
        let player = Uuid::new_v4();
        let days = month_days(2026, 1);
        let store = first_five_done(player);

        assert_eq!(streak(&store, player, &days, feb(6)), 5);
        assert_eq!(streak(&store, player, &days, feb(5)), 5);
        assert_eq!(streak(&store, player, &days, feb(10)), 0);
    }

    #[test]
    fn streak_ignores_days_after_today() {
        let player = Uuid::new_v4();
        let days = month_days(2026, 1);
        let store = CheckinStore::from_checkins(
            [feb(2), feb(3), feb(4), feb(20)].map(|day| checkin(player, day, true)),
        );

        assert_eq!(streak(&store, player, &days, feb(4)), 3);
        assert_eq!(streak(&store, player, &days, feb(3)), 2);
        assert_eq!(streak(&store, player, &days, feb(1)), 0);
    }

    #[test]
    fn streak_never_exceeds_progress() {
        let player = Uuid::new_v4();
        let days = month_days(2026, 1);
        let mut store = CheckinStore::default();
        for (index, day) in days.iter().enumerate() {
            if index % 3 != 0 {
                store.toggle_local(player, *day);
            }
            for today in &days {
                assert!(
                    streak(&store, player, &days, *today) <= progress(&store, player, &days)
                );
            }
        }
    }

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let player = Uuid::new_v4();
        let days = month_days(2026, 1);
        let mut store = CheckinStore::default();
        let mut last = 0;
        for day in &days {
            store.set_local(player, *day, true);
            let current = progress(&store, player, &days);
            assert!(current >= last);
            assert!(current <= days.len());
            last = current;
        }
        assert_eq!(last, days.len());
    }

    #[test]
    fn week_count_scans_outside_period() {
        let player = Uuid::new_v4();
        let other = Uuid::new_v4();
        // Sunday 2026-03-01 closes the week that starts Monday 2026-02-23.
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let store = CheckinStore::from_checkins([
            checkin(player, feb(22), true),
            checkin(player, feb(23), true),
            checkin(player, feb(27), false),
            checkin(player, feb(28), true),
            checkin(player, sunday, true),
            checkin(other, feb(24), true),
        ]);

        assert_eq!(week_count(&store, player, sunday), 3);
        assert_eq!(week_count(&store, player, sunday - Duration::days(7)), 1);
        assert_eq!(week_count(&store, other, feb(25)), 1);
    }

    #[test]
    fn boards_show_first_two_participants() {
        let now = Utc::now();
        let room_id = Uuid::new_v4();
        let participants: Vec<Participant> = ["Ana", "Ben", "Cleo"]
            .into_iter()
            .map(|name| Participant {
                id: Uuid::new_v4(),
                room_id,
                device_id: Uuid::new_v4(),
                nickname: name.to_string(),
                avatar: None,
                created_at: now,
            })
            .collect();
        let days = month_days(2026, 1);
        let mut store = CheckinStore::default();
        store.set_local(participants[1].id, feb(1), true);

        let boards = build_boards_at(
            feb(1),
            &store,
            &participants,
            Some(participants[1].id),
            &days,
        );

        assert_eq!(boards.len(), DISPLAYED_PLAYERS);
        assert!(!boards[0].is_me);
        assert!(boards[1].is_me);
        assert_eq!(boards[1].days.len(), 28);
        assert!(boards[1].days[0]);
        assert_eq!(boards[1].stats.progress, 1);
        assert_eq!(boards[1].stats.streak, 1);
        assert_eq!(boards[1].stats.period_length, 28);
    }
}
