use std::collections::HashSet;
use std::time::Instant;

use rivalroll_core::{
    reduce, Action, Frame, PlayerId, Roster, SessionState, SpinAnimation, SpinRng, SpinTiming,
    Transition,
};

/// Drives one animation to completion with a simulated clock and returns the
/// resting center name.
fn run_animation(anim: &mut SpinAnimation, start: Instant) -> String {
    let mut now = start;
    loop {
        if let Frame::Finished(window) = anim.tick(now) {
            assert!(now - start <= anim.timing().total);
            return window.center.name;
        }
        now += anim.next_delay(now);
    }
}

fn play_session(seed: u64) -> Vec<(PlayerId, String)> {
    let mut rng = SpinRng::seeded(seed);
    let mut state = SessionState::new(Roster::default_roster());
    let mut picks = Vec::new();
    let mut ts = 0i64;
    let mut turn = PlayerId::N;

    while !state.is_exhausted(turn) {
        let pool = state.candidates_for(turn);
        let (next, outcome) = reduce(state, &Action::Spin(turn), &mut rng);
        state = next;
        let Ok(Transition::SpinStarted { target, .. }) = outcome else {
            panic!("spin should start while the pool is not exhausted");
        };
        let start = Instant::now();
        let mut anim = SpinAnimation::start(
            turn,
            target.clone(),
            &pool,
            state.roster(),
            SpinTiming::default(),
            &mut rng,
            start,
        );
        assert_eq!(run_animation(&mut anim, start), target.name);

        ts += 1;
        let (next, outcome) = reduce(state, &Action::Commit { player: turn, timestamp: ts }, &mut rng);
        state = next;
        assert!(matches!(outcome, Ok(Transition::Committed { .. })));
        picks.push((turn, target.name));

        let taken: HashSet<&str> = PlayerId::ALL
            .iter()
            .flat_map(|id| state.history(*id).iter())
            .map(|h| h.character_name.as_str())
            .collect();
        let expected: Vec<&str> = state
            .roster()
            .characters()
            .iter()
            .map(|c| c.name.as_str())
            .filter(|n| !taken.contains(n))
            .collect();
        let pool: Vec<String> = state.available_pool().into_iter().map(|c| c.name).collect();
        assert_eq!(pool, expected);

        turn = turn.other();
    }
    picks
}

#[test]
fn seeded_session_repeatable() {
    assert_eq!(play_session(42), play_session(42));
}

#[test]
fn session_consumes_whole_roster_once() {
    let picks = play_session(7);
    assert_eq!(picks.len(), Roster::default_roster().len());
    let unique: HashSet<&String> = picks.iter().map(|(_, name)| name).collect();
    assert_eq!(unique.len(), picks.len());
}

#[test]
fn spin_both_smoke() {
    for seed in 0..200u64 {
        let mut rng = SpinRng::seeded(seed);
        let state = SessionState::new(Roster::new(["A", "B", "C"]));
        let (state, outcome) = reduce(state, &Action::SpinBoth, &mut rng);
        let Ok(Transition::BothStarted { n, s }) = outcome else {
            panic!("spin both should start with three characters");
        };
        assert_ne!(n, s);
        let (state, _) = reduce(state, &Action::Commit { player: PlayerId::S, timestamp: 1 }, &mut rng);
        let (state, _) = reduce(state, &Action::Commit { player: PlayerId::N, timestamp: 2 }, &mut rng);
        assert_eq!(state.available_pool().len(), 1);

        let (state, outcome) = reduce(state, &Action::SpinBoth, &mut rng);
        assert!(outcome.unwrap_err().is_empty_pool());
        assert!(!state.player(PlayerId::N).spinning);
    }
}
