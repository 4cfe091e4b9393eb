//! The spawn → simulate → mix → fade → respawn cycle.
//!
//! ```text
//! SPAWNING ──fade in done──▶ ACTIVE ──dwell elapsed and mixed──▶ FADING ──fade out done──┐
//!    ▲                                                                                  │
//!    └──────────────────────────────── respawn ◀────────────────────────────────────────┘
//! ```
//!
//! A restart jumps straight to the respawn edge from any state.

use crate::theme::CycleTiming;

/// Frames between homogeneity measurements while ACTIVE
pub const HOMOGENEITY_CHECK_INTERVAL: u32 = 30;

/// Homogeneity a fresh population is assumed to have: completely unmixed.
pub const UNMIXED: f32 = 1.0;

/// Where in the cycle the simulation is
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CycleState {
    /// New particles fading in
    Spawning,
    /// Fully visible, waiting for the colours to mix
    Active,
    /// Fading out ahead of a respawn
    Fading,
}

/// Something the owner of the state machine has to act on
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CycleEvent {
    /// Nothing changed
    None,
    /// The fade in finished
    EnteredActive,
    /// The colours mixed and the fade out started
    StartedFading,
    /// Balls and particles must be recreated now
    Respawn,
}

/// Drives the fade multiplier and decides when to respawn
#[derive(Clone, Debug)]
pub struct CycleStateMachine {
    /// Current state
    state: CycleState,
    /// Seconds spent in the current state
    timer: f32,
    /// Multiplier handed to the renderer
    fade_alpha: f32,
    /// Latest colour variance, `UNMIXED` until the first measurement after a respawn
    homogeneity: f32,
    /// Variance below which the colours count as mixed
    threshold: f32,
    /// When false, ACTIVE never ends on its own
    auto_cycle: bool,
    /// Durations
    timing: CycleTiming,
    /// Respawns so far
    respawns: u64,
}

impl CycleStateMachine {
    /// Start at the beginning of a fade in
    #[must_use]
    #[inline]
    pub const fn new(timing: CycleTiming, threshold: f32, auto_cycle: bool) -> Self {
        Self {
            state: CycleState::Spawning,
            timer: 0.0,
            fade_alpha: 0.0,
            homogeneity: UNMIXED,
            threshold,
            auto_cycle,
            timing,
            respawns: 0,
        }
    }

    /// Current state
    #[must_use]
    #[inline]
    pub const fn state(&self) -> CycleState {
        self.state
    }

    /// Fade multiplier for the renderer, `[0, 1]`
    #[must_use]
    #[inline]
    pub const fn fade_alpha(&self) -> f32 {
        self.fade_alpha
    }

    /// Latest homogeneity value
    #[must_use]
    #[inline]
    pub const fn homogeneity(&self) -> f32 {
        self.homogeneity
    }

    /// How many respawns have been requested
    #[must_use]
    #[inline]
    pub const fn respawn_count(&self) -> u64 {
        self.respawns
    }

    /// Change the mixing threshold
    #[inline]
    pub const fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Turn the automatic fade out on or off
    #[inline]
    pub const fn set_auto_cycle(&mut self, auto_cycle: bool) {
        self.auto_cycle = auto_cycle;
    }

    /// Use new durations from the next update onwards
    #[inline]
    pub const fn set_timing(&mut self, timing: CycleTiming) {
        self.timing = timing;
    }

    /// Advance by `dt` seconds
    #[inline]
    pub fn update(&mut self, dt: f32) -> CycleEvent {
        self.timer += dt;

        match self.state {
            CycleState::Spawning => {
                self.fade_alpha = ramp(self.timer, self.timing.fade_in);
                if self.timer >= self.timing.fade_in {
                    self.state = CycleState::Active;
                    self.timer = 0.0;
                    self.fade_alpha = 1.0;
                    return CycleEvent::EnteredActive;
                }
                CycleEvent::None
            }
            CycleState::Active => {
                self.fade_alpha = 1.0;
                if self.auto_cycle
                    && self.timer >= self.timing.min_active
                    && self.homogeneity < self.threshold
                {
                    log::info!(
                        "Cycle: mixed (variance {:.4}), fading out",
                        self.homogeneity
                    );
                    self.state = CycleState::Fading;
                    self.timer = 0.0;
                    return CycleEvent::StartedFading;
                }
                CycleEvent::None
            }
            CycleState::Fading => {
                self.fade_alpha = 1.0 - ramp(self.timer, self.timing.fade_out);
                if self.timer >= self.timing.fade_out {
                    return self.respawn();
                }
                CycleEvent::None
            }
        }
    }

    /// Should the homogeneity passes run this frame?
    #[must_use]
    #[inline]
    pub const fn should_measure_this_frame(&self, frame_number: u32) -> bool {
        matches!(self.state, CycleState::Active)
            && frame_number % HOMOGENEITY_CHECK_INTERVAL == 0
    }

    /// Take in a finished homogeneity measurement. Non-finite values are dropped.
    #[inline]
    pub fn on_homogeneity_result(&mut self, value: f32) {
        if value.is_finite() {
            self.homogeneity = value;
        }
    }

    /// Force a respawn regardless of state. Every call is its own respawn.
    #[inline]
    pub fn restart(&mut self) -> CycleEvent {
        self.respawn()
    }

    /// Back to the start of a fade in
    fn respawn(&mut self) -> CycleEvent {
        self.homogeneity = UNMIXED;
        self.state = CycleState::Spawning;
        self.timer = 0.0;
        self.fade_alpha = 0.0;
        self.respawns = self.respawns.wrapping_add(1);
        log::info!("Cycle: respawning");
        CycleEvent::Respawn
    }
}

/// Linear 0→1 over `duration`, clamped. A zero duration is already complete.
fn ramp(elapsed: f32, duration: f32) -> f32 {
    if duration <= 0.0 {
        return 1.0;
    }
    (elapsed / duration).clamp(0.0, 1.0)
}

#[cfg(test)]
mod test {
    use super::*;

    const DT: f32 = 0.25;

    fn timing() -> CycleTiming {
        CycleTiming {
            fade_in: 2.0,
            fade_out: 3.0,
            min_active: 10.0,
            ball_count: 3,
        }
    }

    fn active_machine() -> CycleStateMachine {
        let mut cycle = CycleStateMachine::new(timing(), 0.05, true);
        for _ in 0..8 {
            cycle.update(DT);
        }
        assert_eq!(cycle.state(), CycleState::Active);
        cycle
    }

    #[test]
    fn fades_in_linearly() {
        let mut cycle = CycleStateMachine::new(timing(), 0.05, true);
        assert_eq!(cycle.state(), CycleState::Spawning);
        assert!(cycle.fade_alpha().abs() < f32::EPSILON);
        cycle.update(0.5);
        assert!((cycle.fade_alpha() - 0.25).abs() < 1e-6);
        cycle.update(0.5);
        assert!((cycle.fade_alpha() - 0.5).abs() < 1e-6);
        assert_eq!(cycle.update(1.0), CycleEvent::EnteredActive);
        assert_eq!(cycle.state(), CycleState::Active);
        assert!((cycle.fade_alpha() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn stays_active_while_unmixed() {
        let mut cycle = active_machine();
        cycle.on_homogeneity_result(0.5);
        for _ in 0..1000 {
            assert_eq!(cycle.update(DT), CycleEvent::None);
        }
        assert_eq!(cycle.state(), CycleState::Active);
        assert!((cycle.fade_alpha() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn mixing_before_the_dwell_is_ignored() {
        let mut cycle = active_machine();
        cycle.on_homogeneity_result(0.01);
        for _ in 0..39 {
            cycle.update(DT);
        }
        assert_eq!(cycle.state(), CycleState::Active);
        assert_eq!(cycle.update(DT), CycleEvent::StartedFading);
    }

    #[test]
    fn fades_once_mixed_after_the_dwell() {
        let mut cycle = active_machine();
        cycle.on_homogeneity_result(0.5);
        for _ in 0..80 {
            cycle.update(DT);
        }
        assert_eq!(cycle.state(), CycleState::Active);
        cycle.on_homogeneity_result(0.01);
        assert_eq!(cycle.update(DT), CycleEvent::StartedFading);
        assert_eq!(cycle.state(), CycleState::Fading);
    }

    #[test]
    fn fading_respawns_after_exactly_its_duration() {
        let mut cycle = active_machine();
        cycle.on_homogeneity_result(0.0);
        for _ in 0..40 {
            cycle.update(DT);
        }
        assert_eq!(cycle.state(), CycleState::Fading);

        // 3 seconds at 0.25s per update
        for _ in 0..11 {
            assert_eq!(cycle.update(DT), CycleEvent::None);
        }
        assert!((cycle.fade_alpha() - 1.0 / 12.0).abs() < 1e-5);
        assert_eq!(cycle.update(DT), CycleEvent::Respawn);
        assert_eq!(cycle.state(), CycleState::Spawning);
        assert!(cycle.fade_alpha().abs() < f32::EPSILON);
        assert!((cycle.homogeneity() - UNMIXED).abs() < f32::EPSILON);
    }

    #[test]
    fn auto_cycle_off_never_fades() {
        let mut cycle = active_machine();
        cycle.set_auto_cycle(false);
        cycle.on_homogeneity_result(0.0);
        for _ in 0..1000 {
            cycle.update(DT);
        }
        assert_eq!(cycle.state(), CycleState::Active);
    }

    #[test]
    fn measures_only_while_active_on_the_interval() {
        let mut cycle = CycleStateMachine::new(timing(), 0.05, true);
        assert!(!cycle.should_measure_this_frame(0));
        for _ in 0..8 {
            cycle.update(DT);
        }
        assert!(cycle.should_measure_this_frame(0));
        assert!(cycle.should_measure_this_frame(60));
        assert!(!cycle.should_measure_this_frame(61));
    }

    #[test]
    fn restart_forces_a_respawn_from_any_state() {
        let mut cycle = active_machine();
        assert_eq!(cycle.restart(), CycleEvent::Respawn);
        assert_eq!(cycle.state(), CycleState::Spawning);

        let mut spawning = CycleStateMachine::new(timing(), 0.05, true);
        spawning.update(DT);
        assert_eq!(spawning.restart(), CycleEvent::Respawn);
        assert!(spawning.fade_alpha().abs() < f32::EPSILON);
    }

    #[test]
    fn two_restarts_are_two_respawns() {
        let mut cycle = active_machine();
        let before = cycle.respawn_count();
        assert_eq!(cycle.restart(), CycleEvent::Respawn);
        assert_eq!(cycle.restart(), CycleEvent::Respawn);
        assert_eq!(cycle.respawn_count(), before + 2);
    }

    #[test]
    fn non_finite_results_keep_the_previous_value() {
        let mut cycle = active_machine();
        cycle.on_homogeneity_result(0.3);
        cycle.on_homogeneity_result(f32::NAN);
        assert!((cycle.homogeneity() - 0.3).abs() < f32::EPSILON);
    }
}
