//! Peer-count draw and its decoupled spin animation.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::types::DrawCount;

/// Offset applied to the animation generator's seed so the two streams differ.
const SPIN_STREAM_SALT: u64 = 0x5EED_F4F0;

/// Shape of the visible spin sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinSettings {
    /// Intermediate frames shown before the committed value.
    pub frames: u32,
    /// Delay before the first frame.
    pub initial_delay: Duration,
    /// Added to the delay after every frame, so the spin slows down.
    pub delay_step: Duration,
}

impl Default for SpinSettings {
    fn default() -> Self {
        Self {
            frames: 25,
            initial_delay: Duration::from_millis(50),
            delay_step: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinFrame {
    pub value: DrawCount,
    /// How long to wait before showing this frame.
    pub delay: Duration,
}

/// Frames to animate, ending with the committed result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinPlan {
    frames: Vec<SpinFrame>,
    result: DrawCount,
}

impl SpinPlan {
    /// All frames, the last of which shows the result.
    pub fn frames(&self) -> &[SpinFrame] {
        &self.frames
    }

    pub fn result(&self) -> DrawCount {
        self.result
    }
}

/// Uniform draw over `{2, 3, 4, 5, 6}`.
///
/// The committed value and the animation frames come from two independent
/// generators; nothing about the frames feeds back into the result.
#[derive(Debug, Clone)]
pub struct RandomSelector {
    draws: StdRng,
    frames: StdRng,
}

impl RandomSelector {
    pub fn from_entropy() -> Self {
        Self {
            draws: StdRng::from_entropy(),
            frames: StdRng::from_entropy(),
        }
    }

    /// Reproducible selector for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            draws: StdRng::seed_from_u64(seed),
            frames: StdRng::seed_from_u64(seed ^ SPIN_STREAM_SALT),
        }
    }

    pub fn draw(&mut self) -> DrawCount {
        let index = self.draws.gen_range(0..DrawCount::ALL.len());
        DrawCount::ALL[index]
    }

    /// Commit a draw and build the animation that leads up to it.
    pub fn spin(&mut self, settings: &SpinSettings) -> SpinPlan {
        let result = self.draw();
        let mut frames = Vec::with_capacity(settings.frames as usize + 1);
        let mut delay = settings.initial_delay;
        for _ in 0..settings.frames {
            let index = self.frames.gen_range(0..DrawCount::ALL.len());
            frames.push(SpinFrame {
                value: DrawCount::ALL[index],
                delay,
            });
            delay += settings.delay_step;
        }
        frames.push(SpinFrame {
            value: result,
            delay,
        });
        SpinPlan { frames, result }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::from_entropy()
    }
}
