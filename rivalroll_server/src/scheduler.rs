use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::debug;

use rivalroll_core::{Frame, PlayerId, SlotWindow, SpinAnimation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpinEvent {
    Frame {
        player: PlayerId,
        spin_id: u64,
        window: SlotWindow,
    },
    Completed {
        player: PlayerId,
        spin_id: u64,
        window: SlotWindow,
    },
}

impl SpinEvent {
    pub fn player(&self) -> PlayerId {
        match self {
            SpinEvent::Frame { player, .. } | SpinEvent::Completed { player, .. } => *player,
        }
    }
}

/// Monotonic "now" for animations; follows tokio's clock so paused-time tests
/// drive animations deterministically.
pub fn animation_now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Cancelling or dropping the handle stops the spin; it then never completes.
pub struct SpinTask {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl SpinTask {
    pub fn spawn(
        spin_id: u64,
        mut animation: SpinAnimation,
        events: UnboundedSender<SpinEvent>,
    ) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let player = animation.player();

        let handle = tokio::spawn(async move {
            loop {
                if flag.load(Ordering::Acquire) {
                    debug!(%player, spin_id, "spin cancelled");
                    return;
                }
                let now = animation_now();
                match animation.tick(now) {
                    Frame::Hold => {}
                    Frame::Advance(window) => {
                        let event = SpinEvent::Frame {
                            player,
                            spin_id,
                            window,
                        };
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                    Frame::Finished(window) => {
                        if !flag.load(Ordering::Acquire) {
                            let _ = events.send(SpinEvent::Completed {
                                player,
                                spin_id,
                                window,
                            });
                        }
                        return;
                    }
                }
                sleep(animation.next_delay(now)).await;
            }
        });

        Self {
            cancelled,
            handle,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SpinTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rivalroll_core::{Character, Roster, SpinRng, SpinTiming};
    use tokio::sync::mpsc;

    use super::*;

    fn animation(timing: SpinTiming) -> SpinAnimation {
        let roster = Roster::default_roster();
        let mut rng = SpinRng::seeded(21);
        SpinAnimation::start(
            PlayerId::S,
            Character::new("Namor"),
            roster.characters(),
            &roster,
            timing,
            &mut rng,
            animation_now(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_spin_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let _task = SpinTask::spawn(1, animation(SpinTiming::default()), tx);

        let mut frames = 0;
        let completed = loop {
            match rx.recv().await.expect("task reports completion") {
                SpinEvent::Frame { spin_id, .. } => {
                    assert_eq!(spin_id, 1);
                    frames += 1;
                }
                SpinEvent::Completed { window, spin_id, .. } => {
                    assert_eq!(spin_id, 1);
                    break window;
                }
            }
        };
        assert_eq!(completed.center.name, "Namor");
        // tokio timers have millisecond resolution
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3010), "{elapsed:?}");
        assert!(frames > 15);
        // Nothing after completion
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_prevents_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = SpinTask::spawn(7, animation(SpinTiming::default()), tx);

        sleep(Duration::from_millis(500)).await;
        drop(task);
        sleep(Duration::from_secs(5)).await;

        while let Some(event) = rx.recv().await {
            assert!(matches!(event, SpinEvent::Frame { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_immediate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = SpinTask::spawn(3, animation(SpinTiming::default()), tx);
        task.cancel();
        sleep(Duration::from_secs(5)).await;
        assert!(task.is_finished());
        while let Some(event) = rx.recv().await {
            assert!(!matches!(event, SpinEvent::Completed { .. }));
        }
    }
}
