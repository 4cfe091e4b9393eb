//! Closed-loop control of how many particles are dispatched each step.
//!
//! Buffers are always sized for the ceiling. Only the dispatched count moves, so scaling never
//! reallocates anything.

use std::collections::VecDeque;
use std::time::Instant;

/// Frame time samples in the rolling average
pub const WINDOW_SIZE: usize = 60;
/// Updates to wait after an adjustment before considering another
pub const COOLDOWN_FRAMES: u32 = 120;
/// Multiplier applied to the target when over budget
pub const SCALE_DOWN: f32 = 0.9;
/// Multiplier applied to the target when comfortably under budget
pub const SCALE_UP: f32 = 1.05;
/// The target never drops below this
pub const MIN_PARTICLES: u32 = 1000;
/// Scale down when the average frame time exceeds `budget * OVER_BUDGET`
pub const OVER_BUDGET: f32 = 1.1;
/// Scale up when the average frame time is below `budget * UNDER_BUDGET`
pub const UNDER_BUDGET: f32 = 0.7;
/// Fraction of the gap between displayed and target count closed per update
pub const SMOOTHING_RATE: f32 = 0.05;
/// Frame rate the budget is derived from
pub const TARGET_FPS: f32 = 60.0;

/// Watches frame times and scales the active particle count to stay within budget
#[derive(Clone, Debug)]
pub struct AdaptiveController {
    /// Most recent frame intervals in milliseconds, oldest first
    samples: VecDeque<f32>,
    /// When the previous frame began
    last_frame: Option<Instant>,
    /// Updates left before another adjustment is allowed
    cooldown: u32,
    /// Milliseconds one frame may take
    budget_ms: f32,
    /// Allocated particle capacity, the most that can ever be active
    ceiling: u32,
    /// Count the controller is steering toward
    target: u32,
    /// Count actually dispatched, eased toward `target`
    smoothed: f32,
    /// Whether the controller adjusts anything at all
    enabled: bool,
}

impl AdaptiveController {
    /// Start with everything up to `ceiling` active
    #[must_use]
    #[inline]
    pub fn new(ceiling: u32, enabled: bool) -> Self {
        Self {
            samples: VecDeque::with_capacity(WINDOW_SIZE),
            last_frame: None,
            cooldown: 0,
            budget_ms: 1000.0 / TARGET_FPS,
            ceiling,
            target: ceiling,
            smoothed: to_f32(ceiling),
            enabled,
        }
    }

    /// The number of particles to dispatch this step
    #[must_use]
    #[inline]
    #[expect(
        clippy::as_conversions,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "The smoothed count is always between the minimum and the ceiling"
    )]
    pub fn active_particle_count(&self) -> u32 {
        (self.smoothed.round() as u32).min(self.ceiling)
    }

    /// The count the controller is steering toward
    #[must_use]
    #[inline]
    pub const fn target_particle_count(&self) -> u32 {
        self.target
    }

    /// Mean of the sampled frame intervals in milliseconds, 0 before any sample
    #[must_use]
    #[inline]
    pub fn average_frame_time(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: f32 = self.samples.iter().sum();
        total / to_f32_usize(self.samples.len())
    }

    /// Frames per second implied by the average frame time, 0 before any sample
    #[must_use]
    #[inline]
    pub fn fps(&self) -> f32 {
        let average = self.average_frame_time();
        if average > 0.0 {
            1000.0 / average
        } else {
            0.0
        }
    }

    /// Whether the controller is adjusting the count
    #[must_use]
    #[inline]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sample the wall-clock time since the previous call
    #[inline]
    pub fn begin_frame(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            let elapsed = now.duration_since(last);
            self.record_frame_time(elapsed.as_secs_f32() * 1000.0);
        }
        self.last_frame = Some(now);
    }

    /// Add one frame interval, in milliseconds, to the rolling window
    #[inline]
    pub fn record_frame_time(&mut self, milliseconds: f32) {
        if !milliseconds.is_finite() || milliseconds < 0.0 {
            return;
        }
        if self.samples.len() == WINDOW_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(milliseconds);
    }

    /// Decide whether to rescale, then ease the dispatched count toward the target. Returns
    /// whether the target changed.
    #[inline]
    pub fn update(&mut self) -> bool {
        let changed = self.adjust_target();
        self.smooth();
        changed
    }

    /// Apply the over and under budget rules
    #[expect(
        clippy::as_conversions,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Scaled counts stay within the ceiling, which is a u32"
    )]
    fn adjust_target(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.cooldown = self.cooldown.saturating_sub(1);
        if self.cooldown > 0 || self.samples.len() < WINDOW_SIZE {
            return false;
        }

        let average = self.average_frame_time();
        let current = self.target;
        let floor = MIN_PARTICLES.min(self.ceiling);

        let proposed = if average > self.budget_ms * OVER_BUDGET {
            ((to_f32(current) * SCALE_DOWN).floor() as u32).max(floor)
        } else if average < self.budget_ms * UNDER_BUDGET && current < self.ceiling {
            ((to_f32(current) * SCALE_UP).floor() as u32).min(self.ceiling)
        } else {
            current
        };

        if proposed == current {
            return false;
        }

        log::info!("Adaptive: {current} -> {proposed} particles (avg {average:.1}ms)");
        self.target = proposed;
        self.cooldown = COOLDOWN_FRAMES;
        true
    }

    /// Move the dispatched count a fixed fraction of the way to the target
    fn smooth(&mut self) {
        let target = to_f32(self.target);
        let gap = target - self.smoothed;
        if gap.abs() <= 1.0 {
            self.smoothed = target;
        } else {
            self.smoothed += gap * SMOOTHING_RATE;
        }
    }

    /// Change the allocated capacity. Counts above the new ceiling are clamped down to it. While
    /// disabled everything up to the ceiling is active.
    #[inline]
    pub fn set_ceiling(&mut self, ceiling: u32) {
        self.ceiling = ceiling;
        if self.enabled {
            self.target = self.target.min(ceiling);
            self.smoothed = self.smoothed.min(to_f32(ceiling));
        } else {
            self.reset_to_ceiling();
        }
    }

    /// Turn the controller on or off. Turning it off reactivates every allocated particle.
    #[inline]
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reset_to_ceiling();
        }
    }

    /// Target and dispatched counts both at the ceiling, no cooldown pending
    fn reset_to_ceiling(&mut self) {
        self.target = self.ceiling;
        self.smoothed = to_f32(self.ceiling);
        self.cooldown = 0;
    }
}

/// Particle counts are far below f32's exact integer range
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    reason = "Particle counts are far below f32's exact range"
)]
const fn to_f32(count: u32) -> f32 {
    count as f32
}

/// Window lengths are tiny
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    reason = "The window holds at most 60 samples"
)]
const fn to_f32_usize(count: usize) -> f32 {
    count as f32
}
