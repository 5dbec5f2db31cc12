use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::rng::SpinRng;
use crate::roster::{Character, Roster};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerId {
    N,
    S,
}

impl PlayerId {
    pub const ALL: [PlayerId; 2] = [PlayerId::N, PlayerId::S];

    pub fn other(self) -> Self {
        match self {
            PlayerId::N => PlayerId::S,
            PlayerId::S => PlayerId::N,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerId::N => "N",
            PlayerId::S => "S",
        }
    }

    pub fn history_key(self) -> &'static str {
        match self {
            PlayerId::N => "mr_history_N",
            PlayerId::S => "mr_history_S",
        }
    }

    pub fn theme(self) -> PlayerTheme {
        match self {
            PlayerId::N => PlayerTheme {
                display_name: "Niko",
                color: "cyan",
            },
            PlayerId::S => PlayerTheme {
                display_name: "Safwan",
                color: "orange",
            },
        }
    }

    fn index(self) -> usize {
        match self {
            PlayerId::N => 0,
            PlayerId::S => 1,
        }
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "N" | "n" => Ok(PlayerId::N),
            "S" | "s" => Ok(PlayerId::S),
            other => Err(SessionError::UnknownPlayer(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayerTheme {
    pub display_name: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub character_name: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinPhase {
    Idle,
    Spinning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerState {
    pub selection: Option<Character>,
    pub target: Option<Character>,
    pub spinning: bool,
    /// Most recent first.
    pub history: Vec<HistoryEntry>,
}

impl PlayerState {
    pub fn with_history(history: Vec<HistoryEntry>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> SpinPhase {
        if self.spinning {
            SpinPhase::Spinning
        } else {
            SpinPhase::Idle
        }
    }

    /// The character the slot window centers on: the pending target while
    /// spinning, the committed selection otherwise.
    pub fn displayed(&self) -> Option<&Character> {
        if self.spinning {
            self.target.as_ref()
        } else {
            self.selection.as_ref()
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no eligible characters left for player {0}")]
    EmptyPool(PlayerId),
    #[error("spinning both players needs two distinct characters, {available} available")]
    DuplicateTargetConflict { available: usize },
    #[error("player {0} is already spinning")]
    AlreadySpinning(PlayerId),
    #[error("player {0} has no spin to commit")]
    NoPendingTarget(PlayerId),
    #[error("{name} is already in a player's history")]
    TargetTaken { player: PlayerId, name: String },
    #[error("unknown player `{0}`")]
    UnknownPlayer(String),
}

impl SessionError {
    pub fn is_empty_pool(&self) -> bool {
        matches!(
            self,
            SessionError::EmptyPool(_) | SessionError::DuplicateTargetConflict { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Spin(PlayerId),
    SpinBoth,
    Commit { player: PlayerId, timestamp: i64 },
    Skip(PlayerId),
    PurgeAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    SpinStarted {
        player: PlayerId,
        target: Character,
    },
    BothStarted {
        n: Character,
        s: Character,
    },
    Committed {
        player: PlayerId,
        entry: HistoryEntry,
    },
    Skipped {
        player: PlayerId,
        was_spinning: bool,
    },
    Purged,
}

/// Uniform pick from `pool`, skipping any character in `excluded`.
pub fn pick_from(
    pool: &[Character],
    excluded: &[&Character],
    rng: &mut SpinRng,
) -> Option<Character> {
    let eligible: Vec<&Character> = pool
        .iter()
        .filter(|c| !excluded.iter().any(|e| e.name == c.name))
        .collect();
    rng.pick(&eligible).map(|c| (*c).clone())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    roster: Roster,
    players: [PlayerState; 2],
}

impl SessionState {
    pub fn new(roster: Roster) -> Self {
        Self {
            roster,
            players: [PlayerState::default(), PlayerState::default()],
        }
    }

    pub fn with_histories(
        roster: Roster,
        history_n: Vec<HistoryEntry>,
        history_s: Vec<HistoryEntry>,
    ) -> Self {
        Self {
            roster,
            players: [
                PlayerState::with_history(history_n),
                PlayerState::with_history(history_s),
            ],
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn player(&self, id: PlayerId) -> &PlayerState {
        &self.players[id.index()]
    }

    fn player_mut(&mut self, id: PlayerId) -> &mut PlayerState {
        &mut self.players[id.index()]
    }

    pub fn history(&self, id: PlayerId) -> &[HistoryEntry] {
        &self.player(id).history
    }

    fn committed_names(&self) -> HashSet<&str> {
        self.players
            .iter()
            .flat_map(|p| p.history.iter())
            .map(|h| h.character_name.as_str())
            .collect()
    }

    /// Roster minus every character named in either history.
    pub fn available_pool(&self) -> Vec<Character> {
        let taken = self.committed_names();
        self.roster
            .characters()
            .iter()
            .filter(|c| !taken.contains(c.name.as_str()))
            .cloned()
            .collect()
    }

    /// Characters `id` may be handed by a single spin: the pool minus whatever
    /// the other player currently holds or is about to hold.
    pub fn candidates_for(&self, id: PlayerId) -> Vec<Character> {
        let other = self.player(id.other());
        let held: Vec<&Character> = other.selection.iter().chain(other.target.iter()).collect();
        self.available_pool()
            .into_iter()
            .filter(|c| !held.iter().any(|h| h.name == c.name))
            .collect()
    }

    pub fn is_exhausted(&self, id: PlayerId) -> bool {
        self.candidates_for(id).is_empty()
    }

    pub fn pick_random_target(
        &self,
        id: PlayerId,
        rng: &mut SpinRng,
    ) -> Result<Character, SessionError> {
        let other = self.player(id.other());
        let excluded: Vec<&Character> =
            other.selection.iter().chain(other.target.iter()).collect();
        pick_from(&self.available_pool(), &excluded, rng).ok_or(SessionError::EmptyPool(id))
    }

    pub fn start_spin(
        &mut self,
        id: PlayerId,
        rng: &mut SpinRng,
    ) -> Result<Character, SessionError> {
        if self.player(id).spinning {
            return Err(SessionError::AlreadySpinning(id));
        }
        let target = self.pick_random_target(id, rng)?;
        let player = self.player_mut(id);
        player.target = Some(target.clone());
        player.spinning = true;
        debug!(player = %id, target = %target.name, "spin started");
        Ok(target)
    }

    pub fn spin_both(&mut self, rng: &mut SpinRng) -> Result<(Character, Character), SessionError> {
        for id in PlayerId::ALL {
            if self.player(id).spinning {
                return Err(SessionError::AlreadySpinning(id));
            }
        }
        let pool = self.available_pool();
        if pool.len() < 2 {
            return Err(SessionError::DuplicateTargetConflict {
                available: pool.len(),
            });
        }
        let mut shuffled = rng.shuffled(&pool).into_iter();
        let (Some(n), Some(s)) = (shuffled.next(), shuffled.next()) else {
            return Err(SessionError::DuplicateTargetConflict {
                available: pool.len(),
            });
        };
        for (id, target) in [(PlayerId::N, &n), (PlayerId::S, &s)] {
            let player = self.player_mut(id);
            player.target = Some(target.clone());
            player.spinning = true;
        }
        debug!(n = %n.name, s = %s.name, "spin both started");
        Ok((n, s))
    }

    /// Finalizes the pending target of `id`. A target that somehow reached a
    /// history in the meantime is dropped and the player returns to idle.
    pub fn commit_selection(
        &mut self,
        id: PlayerId,
        timestamp: i64,
    ) -> Result<HistoryEntry, SessionError> {
        let player = self.player(id);
        let target = match (&player.target, player.spinning) {
            (Some(t), true) => t.clone(),
            _ => return Err(SessionError::NoPendingTarget(id)),
        };
        if self.committed_names().contains(target.name.as_str()) {
            let player = self.player_mut(id);
            player.target = None;
            player.spinning = false;
            return Err(SessionError::TargetTaken {
                player: id,
                name: target.name,
            });
        }
        let entry = HistoryEntry {
            character_name: target.name.clone(),
            timestamp,
        };
        let player = self.player_mut(id);
        player.history.insert(0, entry.clone());
        player.selection = Some(target);
        player.target = None;
        player.spinning = false;
        debug!(player = %id, character = %entry.character_name, "selection committed");
        Ok(entry)
    }

    /// Clears what `id` displays. History and pool are untouched, so a skipped
    /// character that was already committed stays consumed.
    pub fn skip(&mut self, id: PlayerId) -> bool {
        let player = self.player_mut(id);
        let was_spinning = player.spinning;
        player.selection = None;
        player.target = None;
        player.spinning = false;
        was_spinning
    }

    pub fn purge_all(&mut self) {
        for player in self.players.iter_mut() {
            *player = PlayerState::default();
        }
    }

    pub fn apply(&mut self, action: &Action, rng: &mut SpinRng) -> Result<Transition, SessionError> {
        match *action {
            Action::Spin(player) => {
                let target = self.start_spin(player, rng)?;
                Ok(Transition::SpinStarted { player, target })
            }
            Action::SpinBoth => {
                let (n, s) = self.spin_both(rng)?;
                Ok(Transition::BothStarted { n, s })
            }
            Action::Commit { player, timestamp } => {
                let entry = self.commit_selection(player, timestamp)?;
                Ok(Transition::Committed { player, entry })
            }
            Action::Skip(player) => {
                let was_spinning = self.skip(player);
                Ok(Transition::Skipped {
                    player,
                    was_spinning,
                })
            }
            Action::PurgeAll => {
                self.purge_all();
                Ok(Transition::Purged)
            }
        }
    }
}

/// Pure transition: consumes a state and returns the next one with the outcome.
pub fn reduce(
    mut state: SessionState,
    action: &Action,
    rng: &mut SpinRng,
) -> (SessionState, Result<Transition, SessionError>) {
    let outcome = state.apply(action, rng);
    (state, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> SessionState {
        SessionState::new(Roster::new(["A", "B", "C"]))
    }

    fn names(chars: &[Character]) -> Vec<&str> {
        chars.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn pool_is_roster_minus_both_histories() {
        let state = SessionState::with_histories(
            Roster::new(["A", "B", "C", "D"]),
            vec![HistoryEntry {
                character_name: "B".into(),
                timestamp: 1,
            }],
            vec![HistoryEntry {
                character_name: "D".into(),
                timestamp: 2,
            }],
        );
        assert_eq!(names(&state.available_pool()), vec!["A", "C"]);
    }

    #[test]
    fn three_character_scenario() {
        let mut rng = SpinRng::seeded(3);
        let mut state = abc();
        let n_target = state.start_spin(PlayerId::N, &mut rng).unwrap();
        assert!(["A", "B", "C"].contains(&n_target.name.as_str()));
        let entry = state.commit_selection(PlayerId::N, 100).unwrap();
        assert_eq!(entry.character_name, n_target.name);
        assert_eq!(state.history(PlayerId::N).len(), 1);
        assert_eq!(state.available_pool().len(), 2);

        for _ in 0..20 {
            let pick = state.pick_random_target(PlayerId::S, &mut rng).unwrap();
            assert_ne!(pick.name, n_target.name);
        }
    }

    #[test]
    fn single_character_pool() {
        let mut rng = SpinRng::seeded(5);
        let mut state = SessionState::with_histories(
            Roster::new(["A", "B", "C"]),
            vec![HistoryEntry {
                character_name: "A".into(),
                timestamp: 1,
            }],
            vec![HistoryEntry {
                character_name: "B".into(),
                timestamp: 2,
            }],
        );
        state.player_mut(PlayerId::S).selection = Some(Character::new("B"));
        let pick = state.pick_random_target(PlayerId::N, &mut rng).unwrap();
        assert_eq!(pick.name, "C");

        state.player_mut(PlayerId::S).selection = Some(Character::new("C"));
        assert_eq!(
            state.pick_random_target(PlayerId::N, &mut rng),
            Err(SessionError::EmptyPool(PlayerId::N))
        );
        assert!(state.is_exhausted(PlayerId::N));
    }

    #[test]
    fn spin_ignored_while_spinning() {
        let mut rng = SpinRng::seeded(1);
        let mut state = abc();
        state.start_spin(PlayerId::N, &mut rng).unwrap();
        let before = state.clone();
        assert_eq!(
            state.start_spin(PlayerId::N, &mut rng),
            Err(SessionError::AlreadySpinning(PlayerId::N))
        );
        assert_eq!(state, before);
    }

    #[test]
    fn concurrent_single_spins_never_share_a_target() {
        for seed in 0..50 {
            let mut rng = SpinRng::seeded(seed);
            let mut state = SessionState::new(Roster::new(["A", "B"]));
            let n = state.start_spin(PlayerId::N, &mut rng).unwrap();
            let s = state.start_spin(PlayerId::S, &mut rng).unwrap();
            assert_ne!(n, s);
            state.commit_selection(PlayerId::S, 1).unwrap();
            state.commit_selection(PlayerId::N, 2).unwrap();
            assert!(state.available_pool().is_empty());
        }
    }

    #[test]
    fn spin_both_distinct_targets() {
        for seed in 0..50 {
            let mut rng = SpinRng::seeded(seed);
            let mut state = SessionState::new(Roster::new(["A", "B"]));
            let (n, s) = state.spin_both(&mut rng).unwrap();
            assert_ne!(n, s);
            assert_eq!(state.player(PlayerId::N).phase(), SpinPhase::Spinning);
            assert_eq!(state.player(PlayerId::S).phase(), SpinPhase::Spinning);
        }
    }

    #[test]
    fn spin_both_needs_two() {
        let mut rng = SpinRng::seeded(2);
        let mut state = SessionState::new(Roster::new(["A"]));
        let before = state.clone();
        let err = state.spin_both(&mut rng).unwrap_err();
        assert_eq!(err, SessionError::DuplicateTargetConflict { available: 1 });
        assert!(err.is_empty_pool());
        assert_eq!(state, before);
    }

    #[test]
    fn committed_character_never_returns_until_purge() {
        let mut rng = SpinRng::seeded(11);
        let mut state = SessionState::new(Roster::new(["A", "B", "C", "D", "E"]));
        let mut committed = Vec::new();
        for round in 0..5 {
            let id = if round % 2 == 0 { PlayerId::N } else { PlayerId::S };
            state.start_spin(id, &mut rng).unwrap();
            let entry = state.commit_selection(id, round).unwrap();
            assert!(!committed.contains(&entry.character_name));
            committed.push(entry.character_name.clone());
            assert!(!names(&state.available_pool()).contains(&entry.character_name.as_str()));
        }
        assert!(state.available_pool().is_empty());
        assert!(state.start_spin(PlayerId::N, &mut rng).unwrap_err().is_empty_pool());

        state.purge_all();
        assert_eq!(state.available_pool().len(), 5);
    }

    #[test]
    fn skip_before_commit_is_noop_on_history() {
        let mut rng = SpinRng::seeded(4);
        let mut state = abc();
        state.start_spin(PlayerId::N, &mut rng).unwrap();
        assert!(state.skip(PlayerId::N));
        assert_eq!(state.player(PlayerId::N), &PlayerState::default());
        assert_eq!(state.available_pool().len(), 3);
        assert_eq!(
            state.commit_selection(PlayerId::N, 1),
            Err(SessionError::NoPendingTarget(PlayerId::N))
        );
    }

    #[test]
    fn skip_after_commit_keeps_character_consumed() {
        let mut rng = SpinRng::seeded(4);
        let mut state = abc();
        state.start_spin(PlayerId::S, &mut rng).unwrap();
        let entry = state.commit_selection(PlayerId::S, 1).unwrap();
        assert!(!state.skip(PlayerId::S));
        assert!(state.player(PlayerId::S).selection.is_none());
        assert_eq!(state.history(PlayerId::S), &[entry]);
        assert_eq!(state.available_pool().len(), 2);
    }

    #[test]
    fn purge_is_idempotent() {
        let mut rng = SpinRng::seeded(8);
        let mut state = abc();
        state.start_spin(PlayerId::N, &mut rng).unwrap();
        state.commit_selection(PlayerId::N, 1).unwrap();
        state.start_spin(PlayerId::S, &mut rng).unwrap();

        let (once, _) = reduce(state, &Action::PurgeAll, &mut rng);
        let (twice, outcome) = reduce(once.clone(), &Action::PurgeAll, &mut rng);
        assert_eq!(outcome, Ok(Transition::Purged));
        assert_eq!(once, twice);
        for id in PlayerId::ALL {
            assert_eq!(twice.player(id), &PlayerState::default());
        }
    }

    #[test]
    fn history_is_most_recent_first() {
        let mut rng = SpinRng::seeded(6);
        let mut state = abc();
        state.start_spin(PlayerId::N, &mut rng).unwrap();
        let first = state.commit_selection(PlayerId::N, 10).unwrap();
        state.start_spin(PlayerId::N, &mut rng).unwrap();
        let second = state.commit_selection(PlayerId::N, 20).unwrap();
        assert_eq!(state.history(PlayerId::N), &[second, first]);
    }

    #[test]
    fn history_entry_uses_camel_case() {
        let entry = HistoryEntry {
            character_name: "Hela".into(),
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"characterName":"Hela","timestamp":1700000000000}"#);
    }

    #[test]
    fn player_id_parsing() {
        assert_eq!("N".parse::<PlayerId>(), Ok(PlayerId::N));
        assert_eq!("s".parse::<PlayerId>(), Ok(PlayerId::S));
        assert!("X".parse::<PlayerId>().is_err());
        assert_eq!(PlayerId::N.other(), PlayerId::S);
        assert_eq!(PlayerId::S.history_key(), "mr_history_S");
    }
}
