use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    rng::SpinRng,
    roster::{Character, Roster},
};

pub const REEL_REPEATS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinTiming {
    #[serde(with = "millis")]
    pub total: Duration,
    #[serde(with = "millis")]
    pub base_interval: Duration,
    #[serde(with = "millis")]
    pub max_extra_interval: Duration,
}

impl SpinTiming {
    pub fn with_total(total: Duration) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Display update interval after `elapsed`: base + extra × fraction².
    /// Starts at `base_interval` and eases out towards base + extra.
    pub fn update_interval(&self, elapsed: Duration) -> Duration {
        let fraction = if self.total.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / self.total.as_secs_f64()).min(1.0)
        };
        self.base_interval + self.max_extra_interval.mul_f64(fraction * fraction)
    }
}

impl Default for SpinTiming {
    fn default() -> Self {
        Self {
            total: Duration::from_millis(3000),
            base_interval: Duration::from_millis(50),
            max_extra_interval: Duration::from_millis(150),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWindow {
    pub left: Character,
    pub center: Character,
    pub right: Character,
}

impl SlotWindow {
    pub fn names(&self) -> [&str; 3] {
        [&self.left.name, &self.center.name, &self.right.name]
    }
}

/// Characters the reel is built from: the pool when it has more than two
/// members, the whole roster otherwise.
pub fn reel_base(pool: &[Character], roster: &Roster) -> Vec<Character> {
    if pool.len() > 2 {
        pool.to_vec()
    } else {
        roster.characters().to_vec()
    }
}

pub fn build_reel(base: &[Character], target: &Character) -> Vec<Character> {
    if base.is_empty() {
        return vec![target.clone()];
    }
    let mut reel = Vec::with_capacity(base.len() * REEL_REPEATS);
    for _ in 0..REEL_REPEATS {
        reel.extend_from_slice(base);
    }
    reel
}

pub fn window_at(reel: &[Character], index: usize) -> SlotWindow {
    let len = reel.len();
    SlotWindow {
        left: reel[index % len].clone(),
        center: reel[(index + 1) % len].clone(),
        right: reel[(index + 2) % len].clone(),
    }
}

/// Resting window of a spin: the target in the center and two distinct
/// non-target characters from `base` on the sides, or placeholders.
pub fn final_window(base: &[Character], target: &Character, rng: &mut SpinRng) -> SlotWindow {
    let others: Vec<&Character> = base.iter().filter(|c| c.name != target.name).collect();
    let right = rng
        .pick(&others)
        .map(|c| (*c).clone())
        .unwrap_or_else(Character::placeholder);
    let rest: Vec<&Character> = others
        .into_iter()
        .filter(|c| c.name != right.name)
        .collect();
    let left = rng
        .pick(&rest)
        .map(|c| (*c).clone())
        .unwrap_or_else(Character::placeholder);
    SlotWindow {
        left,
        center: target.clone(),
        right,
    }
}

/// Static decoration shown around a committed selection while idle.
pub fn idle_window(roster: &Roster, center: &Character, rng: &mut SpinRng) -> SlotWindow {
    let sides = rng.shuffled(
        &roster
            .characters()
            .iter()
            .filter(|c| c.name != center.name)
            .cloned()
            .collect::<Vec<_>>(),
    );
    let mut sides = sides.into_iter();
    SlotWindow {
        left: sides.next().unwrap_or_else(Character::placeholder),
        center: center.clone(),
        right: sides.next().unwrap_or_else(Character::placeholder),
    }
}
