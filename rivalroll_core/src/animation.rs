use std::time::{Duration, Instant};

use crate::{
    reel::{build_reel, final_window, reel_base, window_at, SlotWindow, SpinTiming},
    rng::SpinRng,
    roster::{Character, Roster},
    session::PlayerId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Nothing to redraw yet.
    Hold,
    /// The window moved one position along the reel.
    Advance(SlotWindow),
    /// Spin is over; the window rests on the final triple.
    Finished(SlotWindow),
}

/// One reel's spin, driven by instants the caller supplies.
#[derive(Debug, Clone)]
pub struct SpinAnimation {
    player: PlayerId,
    reel: Vec<Character>,
    final_window: SlotWindow,
    timing: SpinTiming,
    started_at: Instant,
    next_due: Instant,
    index: usize,
    finished: bool,
}

impl SpinAnimation {
    pub fn start(
        player: PlayerId,
        target: Character,
        pool: &[Character],
        roster: &Roster,
        timing: SpinTiming,
        rng: &mut SpinRng,
        started_at: Instant,
    ) -> Self {
        let base = rng.shuffled(&reel_base(pool, roster));
        let reel = build_reel(&base, &target);
        let final_window = final_window(&base, &target, rng);
        Self {
            player,
            reel,
            final_window,
            timing,
            started_at,
            next_due: started_at,
            index: 0,
            finished: false,
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn final_window(&self) -> &SlotWindow {
        &self.final_window
    }

    pub fn timing(&self) -> SpinTiming {
        self.timing
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn tick(&mut self, now: Instant) -> Frame {
        if self.finished {
            return Frame::Finished(self.final_window.clone());
        }
        let elapsed = self.elapsed(now);
        if elapsed >= self.timing.total {
            self.finished = true;
            return Frame::Finished(self.final_window.clone());
        }
        if now < self.next_due {
            return Frame::Hold;
        }
        let window = window_at(&self.reel, self.index);
        self.index += 1;
        self.next_due = now + self.timing.update_interval(elapsed);
        Frame::Advance(window)
    }

    /// Time until the next update or the end of the spin, whichever is first.
    pub fn next_delay(&self, now: Instant) -> Duration {
        if self.finished {
            return Duration::ZERO;
        }
        let remaining = self.timing.total.saturating_sub(self.elapsed(now));
        self.next_due.saturating_duration_since(now).min(remaining)
    }
}
