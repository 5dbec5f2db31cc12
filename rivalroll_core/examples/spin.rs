use std::time::Instant;

use rivalroll_core::{Frame, PlayerId, Roster, SessionState, SpinAnimation, SpinRng, SpinTiming};

fn main() {
    // Example end-to-end spin with a simulated clock
    let seed_phrase = "example-seed";
    let mut rng = SpinRng::from_seed_phrase(seed_phrase);
    let mut state = SessionState::new(Roster::default_roster());

    let pool = state.candidates_for(PlayerId::N);
    let target = state.start_spin(PlayerId::N, &mut rng).expect("fresh roster");
    let start = Instant::now();
    let mut anim = SpinAnimation::start(
        PlayerId::N,
        target,
        &pool,
        state.roster(),
        SpinTiming::default(),
        &mut rng,
        start,
    );

    let mut now = start;
    loop {
        match anim.tick(now) {
            Frame::Advance(window) => println!("{:?} {:?}", now - start, window.names()),
            Frame::Hold => {}
            Frame::Finished(window) => {
                println!("final {:?}", window.names());
                break;
            }
        }
        now += anim.next_delay(now);
    }

    let entry = state.commit_selection(PlayerId::N, 0).expect("pending target");
    println!(
        "seed_hash={} committed={} remaining={}",
        rivalroll_core::derive_hash_hex(seed_phrase.as_bytes()),
        entry.character_name,
        state.available_pool().len()
    );
}
