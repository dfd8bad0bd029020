// SPDX-License-Identifier: MIT OR Apache-2.0

//! Team elimination and winner/draw determination
//!
//! A room tracks which of its players are still in play. When none are left
//! the room reports its team eliminated. The session keeps one flag per team
//! and, after every elimination, drops the eliminated teams: one team left is
//! a win, none is a draw.

use std::collections::BTreeMap;

use crate::envelope::PeerRef;
use crate::messages::GameResult;

/// Alive flags for the players of one room
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStatusMap {
    players: BTreeMap<PeerRef, bool>,
}

/// Notification that a room has no player left in play
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elimination {
    pub room: String,
}

impl PlayerStatusMap {
    /// Seed from a roster snapshot
    ///
    /// The local connection does not play and starts out of play; every other
    /// member starts alive.
    pub fn seed(roster: impl IntoIterator<Item = PeerRef>, local: &PeerRef) -> Self {
        let players = roster
            .into_iter()
            .map(|member| {
                let alive = &member != local;
                (member, alive)
            })
            .collect();
        Self { players }
    }

    /// Set `player` out of play; returns whether it was alive before
    pub fn mark_dead(&mut self, player: &PeerRef) -> bool {
        self.players.insert(player.clone(), false).unwrap_or(false)
    }

    pub fn is_alive(&self, player: &PeerRef) -> Option<bool> {
        self.players.get(player).copied()
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|alive| **alive).count()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// An elimination for `room` when every entry is out of play
    ///
    /// Not suppressed on repeat calls: an all-dead map reports again.
    pub fn check_team_survival(&self, room: &str) -> Option<Elimination> {
        if self.players.values().all(|alive| !alive) {
            Some(Elimination {
                room: room.to_string(),
            })
        } else {
            None
        }
    }
}

/// Where a session stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Session not started yet
    Idle,
    /// Teams still in play
    Active(usize),
    Won(String),
    Draw,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Won(_) | SessionState::Draw)
    }

    pub fn result(&self) -> Option<GameResult> {
        match self {
            SessionState::Won(room) => Some(GameResult::Winner { room: room.clone() }),
            SessionState::Draw => Some(GameResult::Draw),
            _ => None,
        }
    }
}

/// Active flags for every team of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamResultMap {
    teams: BTreeMap<String, bool>,
    rooms: Vec<String>,
    finished: Option<GameResult>,
}

impl TeamResultMap {
    /// One active entry per room known when the session starts
    pub fn new(rooms: impl IntoIterator<Item = String>) -> Self {
        let teams: BTreeMap<String, bool> = rooms.into_iter().map(|room| (room, true)).collect();
        let rooms = teams.keys().cloned().collect();
        Self {
            teams,
            rooms,
            finished: None,
        }
    }

    /// Mark a team eliminated; unknown rooms are ignored
    pub fn eliminate(&mut self, room: &str) -> bool {
        match self.teams.get_mut(room) {
            Some(active) => {
                *active = false;
                true
            }
            None => false,
        }
    }

    /// Drop eliminated teams and decide the session if possible
    ///
    /// Returns a result the first time the session is decided and `None`
    /// afterwards.
    pub fn resolve(&mut self) -> Option<GameResult> {
        if self.finished.is_some() {
            return None;
        }

        self.teams.retain(|_, active| *active);
        let result = match self.teams.len() {
            0 => GameResult::Draw,
            1 => {
                let room = self.teams.keys().next().cloned()?;
                GameResult::Winner { room }
            }
            _ => return None,
        };
        self.finished = Some(result.clone());
        Some(result)
    }

    pub fn state(&self) -> SessionState {
        match &self.finished {
            Some(GameResult::Winner { room }) => SessionState::Won(room.clone()),
            Some(GameResult::Draw) => SessionState::Draw,
            None => SessionState::Active(self.teams.values().filter(|a| **a).count()),
        }
    }

    /// Every room known at session start, including eliminated ones
    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    pub fn is_active(&self, room: &str) -> bool {
        self.teams.get(room).copied().unwrap_or(false)
    }

    pub fn remaining(&self) -> usize {
        self.teams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn peer(name: &str) -> PeerRef {
        PeerRef::new(name, "red")
    }

    #[test]
    fn test_seed_marks_local_out_of_play() {
        let host = peer("host");
        let map = PlayerStatusMap::seed(vec![host.clone(), peer("a"), peer("b")], &host);

        assert_eq!(map.is_alive(&host), Some(false));
        assert_eq!(map.is_alive(&peer("a")), Some(true));
        assert_eq!(map.alive_count(), 2);
    }

    #[test]
    fn test_team_survives_while_someone_is_alive() {
        let host = peer("host");
        let mut map = PlayerStatusMap::seed(vec![host.clone(), peer("a"), peer("b")], &host);

        assert!(map.mark_dead(&peer("a")));
        assert!(map.check_team_survival("red").is_none());

        assert!(map.mark_dead(&peer("b")));
        assert_eq!(
            map.check_team_survival("red"),
            Some(Elimination { room: "red".into() })
        );
    }

    #[test]
    fn test_check_is_idempotent_not_suppressed() {
        let mut map = PlayerStatusMap::default();
        map.mark_dead(&peer("a"));
        map.mark_dead(&peer("b"));

        assert!(map.check_team_survival("red").is_some());
        assert!(map.check_team_survival("red").is_some());
    }

    #[test]
    fn test_marking_dead_twice_reports_prior_state() {
        let mut map = PlayerStatusMap::seed(vec![peer("a")], &peer("host"));
        assert!(map.mark_dead(&peer("a")));
        assert!(!map.mark_dead(&peer("a")));
        assert!(!map.mark_dead(&peer("stranger")));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_single_team_left_wins() {
        let mut teams = TeamResultMap::new(vec!["room1".to_string()]);
        assert_eq!(
            teams.resolve(),
            Some(GameResult::Winner {
                room: "room1".into()
            })
        );
        assert_eq!(teams.state(), SessionState::Won("room1".into()));
    }

    #[test]
    fn test_all_eliminated_is_draw() {
        let mut teams = TeamResultMap::new(vec!["room1".to_string(), "room2".to_string()]);
        teams.eliminate("room1");
        teams.eliminate("room2");

        assert_eq!(teams.resolve(), Some(GameResult::Draw));
        assert_eq!(teams.remaining(), 0);
        assert_eq!(teams.rooms().len(), 2);
    }

    #[test]
    fn test_session_continues_with_two_teams() {
        let mut teams = TeamResultMap::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        teams.eliminate("a");

        assert_eq!(teams.resolve(), None);
        assert_eq!(teams.state(), SessionState::Active(2));
        assert!(!teams.is_active("a"));

        teams.eliminate("b");
        assert_eq!(
            teams.resolve(),
            Some(GameResult::Winner { room: "c".into() })
        );
    }

    #[test]
    fn test_decided_session_reports_once() {
        let mut teams = TeamResultMap::new(vec!["a".to_string(), "b".to_string()]);
        teams.eliminate("a");
        assert!(teams.resolve().is_some());

        teams.eliminate("b");
        assert_eq!(teams.resolve(), None);
        assert_eq!(teams.state(), SessionState::Won("b".into()));
    }

    #[test]
    fn test_unknown_room_is_ignored() {
        let mut teams = TeamResultMap::new(vec!["a".to_string(), "b".to_string()]);
        assert!(!teams.eliminate("zzz"));
        assert_eq!(teams.resolve(), None);
    }

    proptest! {
        #[test]
        fn prop_team_count_never_grows(
            teams in 2usize..8,
            order in proptest::collection::vec(0usize..8, 0..16),
        ) {
            let rooms: Vec<String> = (0..teams).map(|i| format!("room{}", i)).collect();
            let mut map = TeamResultMap::new(rooms.clone());
            let mut previous = map.remaining();
            let mut decided = 0;

            for index in order {
                map.eliminate(&rooms[index % teams]);
                if map.resolve().is_some() {
                    decided += 1;
                }
                prop_assert!(map.remaining() <= previous);
                previous = map.remaining();
            }

            prop_assert!(decided <= 1);
            if decided == 1 {
                prop_assert!(map.state().is_terminal());
            }
        }
    }
}
