//! All the state for the simulation, and the per-frame orchestration of it.
//!
//! [`Simulation::tick`] runs one frame:
//!
//! 1. sample the frame time
//! 2. drain config changes
//! 3. collect any finished homogeneity measurement
//! 4. advance the cycle, respawning if it asks to
//! 5. move the balls
//! 6. let the adaptive controller pick this step's particle count
//! 7. build the uniform snapshot and step the backend
//! 8. flip the double buffer

use std::sync::mpsc;

use nebula_cpu_gpu_shared::{GpuParticle, FIXED_DT};
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};

use crate::adaptive::AdaptiveController;
use crate::backend::{FrameUpload, HomogeneityPoll, SimulationBackend};
use crate::ball::BallDynamics;
use crate::config_app::{ConfigStore, Param, Subscription};
use crate::config_shader::{to_sim_params, FrameInputs};
use crate::cycle::{CycleEvent, CycleStateMachine};
use crate::error::SimulationError;
use crate::particle_store::{seed_particles, BufferRole};
use crate::spatial_bin::usize_from;
use crate::theme::ThemeRegistry;

/// Everything that lives across frames
pub struct Simulation<B: SimulationBackend> {
    /// Whatever runs the passes
    backend: B,
    /// Tweakable parameters
    config: ConfigStore,
    /// Parameters changed since the last tick
    changes: mpsc::Receiver<Param>,
    /// Keeps the listener feeding `changes` registered
    subscription: Subscription,
    /// Themes the `Theme` parameter can name
    themes: ThemeRegistry,
    /// Host-side attractors
    balls: BallDynamics,
    /// Spawn/active/fade cycle
    cycle: CycleStateMachine,
    /// Frame time driven particle budget
    adaptive: AdaptiveController,
    /// Randomness for seeding particles
    rng: StdRng,
    /// Canvas size in pixels
    canvas: (f32, f32),
    /// Pointer position in canvas pixels
    pointer: (f32, f32),
    /// Which half of the double buffer is current
    role: BufferRole,
    /// Steps run so far
    frame_number: u32,
    /// When set, ticks don't step the simulation
    paused: bool,
}

impl<B: SimulationBackend> Simulation<B> {
    /// Instantiate, with balls and particles already spawned
    ///
    /// # Errors
    /// When the configured theme isn't registered or the backend can't be sized
    #[inline]
    pub fn new(
        backend: B,
        config: ConfigStore,
        themes: ThemeRegistry,
        canvas: (f32, f32),
    ) -> Result<Self, SimulationError> {
        Self::with_rng(backend, config, themes, canvas, StdRng::from_entropy())
    }

    /// Instantiate with a specific random source, for reproducible runs
    ///
    /// # Errors
    /// When the configured theme isn't registered or the backend can't be sized
    #[inline]
    pub fn with_rng(
        mut backend: B,
        mut config: ConfigStore,
        themes: ThemeRegistry,
        canvas: (f32, f32),
        mut rng: StdRng,
    ) -> Result<Self, SimulationError> {
        let theme = themes.get(&config.theme_id())?;
        let balls = BallDynamics::with_rng(theme, canvas, StdRng::seed_from_u64(rng.gen()));
        let cycle = CycleStateMachine::new(
            theme.cycle,
            config.number(Param::HomogeneityThreshold),
            config.flag(Param::AutoCycle),
        );

        let particle_count = config.integer(Param::ParticleCount);
        let adaptive =
            AdaptiveController::new(particle_count, config.flag(Param::AdaptiveParticles));
        if usize_from(particle_count) > backend.capacity() {
            backend.reallocate(usize_from(particle_count))?;
        }

        let (sender, changes) = mpsc::channel();
        let subscription = config.on_change(move |param, _new, _old| {
            // Only fails once the simulation, and so the receiver, is gone
            sender.send(param).ok();
        });

        let mut simulation = Self {
            backend,
            config,
            changes,
            subscription,
            themes,
            balls,
            cycle,
            adaptive,
            rng,
            canvas,
            pointer: (0.0, 0.0),
            role: BufferRole::default(),
            frame_number: 0,
            paused: false,
        };
        simulation.respawn()?;
        Ok(simulation)
    }

    /// Run one frame
    ///
    /// # Errors
    /// `DeviceLost` when the GPU went away, in which case everything has to be rebuilt
    #[inline]
    pub fn tick(&mut self) -> Result<(), SimulationError> {
        self.adaptive.begin_frame();
        self.apply_config_changes()?;

        match self.backend.poll_homogeneity() {
            HomogeneityPoll::Ready(value) => self.cycle.on_homogeneity_result(value),
            HomogeneityPoll::Pending | HomogeneityPoll::Idle | HomogeneityPoll::Failed => {}
        }

        if self.paused {
            return Ok(());
        }

        if self.cycle.update(FIXED_DT) == CycleEvent::Respawn {
            self.respawn()?;
        }

        let snapshot = self.config.snapshot();
        self.balls
            .update(FIXED_DT, snapshot.bounce_damping, snapshot.ball_gravity);
        self.adaptive.update();

        let inputs = FrameInputs {
            canvas: self.canvas,
            pointer: self.pointer,
            frame_number: self.frame_number,
            fade_alpha: self.cycle.fade_alpha(),
            active_particle_count: self.adaptive.active_particle_count(),
            ball_count: self.balls.count(),
        };
        let measure = self.cycle.should_measure_this_frame(self.frame_number)
            && !self.backend.homogeneity_in_flight();
        let frame = FrameUpload::new(
            to_sim_params(&snapshot, &inputs),
            self.balls.to_uploadable_buffer(),
            self.role,
            measure,
        );
        self.backend.step(&frame)?;

        self.role = self.role.flipped();
        self.frame_number = self.frame_number.wrapping_add(1);
        Ok(())
    }

    /// Respawn right now, whatever the cycle is doing
    ///
    /// # Errors
    /// If the fresh particles can't be uploaded
    #[inline]
    pub fn restart(&mut self) -> Result<(), SimulationError> {
        self.cycle.restart();
        self.respawn()
    }

    /// Stop or resume stepping. Config changes and readbacks are still handled while paused.
    #[inline]
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Is stepping suspended?
    #[must_use]
    #[inline]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Move the pointer force's centre
    #[inline]
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        self.pointer = (x, y);
    }

    /// The parameters. Changes take effect at the start of the next tick.
    #[must_use]
    #[inline]
    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    /// The parameters
    #[must_use]
    #[inline]
    pub const fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Ball state
    #[must_use]
    #[inline]
    pub const fn balls(&self) -> &BallDynamics {
        &self.balls
    }

    /// Cycle state
    #[must_use]
    #[inline]
    pub const fn cycle(&self) -> &CycleStateMachine {
        &self.cycle
    }

    /// Particle budget state
    #[must_use]
    #[inline]
    pub const fn adaptive(&self) -> &AdaptiveController {
        &self.adaptive
    }

    /// The backend
    #[must_use]
    #[inline]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably, for readbacks
    #[must_use]
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Which half of the double buffer holds the latest particles
    #[must_use]
    #[inline]
    pub const fn role(&self) -> BufferRole {
        self.role
    }

    /// Steps run so far
    #[must_use]
    #[inline]
    pub const fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// The latest particles
    ///
    /// # Errors
    /// If the readback fails
    #[inline]
    pub fn particles(&mut self) -> Result<Vec<GpuParticle>, SimulationError> {
        self.backend.read_particles(self.role)
    }

    /// Tear down, keeping the parameters and themes so a replacement can pick up where this one
    /// left off
    #[must_use]
    #[inline]
    pub fn into_parts(self) -> (ConfigStore, ThemeRegistry) {
        let Self {
            config,
            themes,
            subscription,
            ..
        } = self;
        subscription.unsubscribe();
        (config, themes)
    }

    /// Act on every parameter change since the last tick
    fn apply_config_changes(&mut self) -> Result<(), SimulationError> {
        let mut needs_respawn = false;

        // Applying a theme queues more changes, which this same loop picks up
        while let Ok(param) = self.changes.try_recv() {
            match param {
                Param::BallCount => needs_respawn = true,
                Param::ParticleCount => {
                    let ceiling = self.config.integer(Param::ParticleCount);
                    self.adaptive.set_ceiling(ceiling);
                    if usize_from(ceiling) > self.backend.capacity() {
                        log::info!("Reallocating particle buffers for {ceiling} particles");
                        self.backend.reallocate(usize_from(ceiling))?;
                    }
                    needs_respawn = true;
                }
                Param::AdaptiveParticles => self
                    .adaptive
                    .set_enabled(self.config.flag(Param::AdaptiveParticles)),
                Param::HomogeneityThreshold => self
                    .cycle
                    .set_threshold(self.config.number(Param::HomogeneityThreshold)),
                Param::AutoCycle => self.cycle.set_auto_cycle(self.config.flag(Param::AutoCycle)),
                Param::Theme => needs_respawn |= self.switch_theme(),
                _ => {}
            }
        }

        if needs_respawn {
            self.respawn()?;
        }
        Ok(())
    }

    /// Apply the theme the `Theme` parameter names. Returns whether it was found.
    fn switch_theme(&mut self) -> bool {
        let id = self.config.theme_id();
        let theme = match self.themes.get(&id) {
            Ok(theme) => theme.clone(),
            Err(error) => {
                log::warn!("{error}, keeping the current theme");
                return false;
            }
        };
        log::info!("Switching to theme '{}'", theme.name);
        self.config.apply_theme(&theme);
        self.balls.set_theme(&theme);
        self.cycle.set_timing(theme.cycle);
        true
    }

    /// New balls, freshly seeded particles in both halves, back to the first half
    fn respawn(&mut self) -> Result<(), SimulationError> {
        self.balls.respawn(
            self.config.integer(Param::BallCount),
            self.config.integer(Param::ParticleCount),
        );
        let particles = seed_particles(
            self.balls.balls(),
            self.backend.capacity(),
            self.canvas,
            &mut self.rng,
        );
        self.backend.upload_particles(&particles)?;
        self.role = BufferRole::default();
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod test {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::cycle::{CycleState, UNMIXED};
    use crate::spatial_bin::BinTable;
    use crate::sph::RenderColor;
    use crate::tests::utils::NebulaTestAPI;
    use crate::theme::Theme;
    use rand::SeedableRng as _;

    /// The CPU reference, except every homogeneity readback fails
    struct FailingReadback {
        /// Does the actual work
        inner: CpuBackend,
        /// Readbacks turned into failures so far
        failures: u32,
    }

    impl SimulationBackend for FailingReadback {
        fn capacity(&self) -> usize {
            self.inner.capacity()
        }

        fn reallocate(&mut self, capacity: usize) -> Result<(), SimulationError> {
            self.inner.reallocate(capacity)
        }

        fn upload_particles(&mut self, particles: &[GpuParticle]) -> Result<(), SimulationError> {
            self.inner.upload_particles(particles)
        }

        fn step(&mut self, frame: &FrameUpload) -> Result<(), SimulationError> {
            self.inner.step(frame)
        }

        fn poll_homogeneity(&mut self) -> HomogeneityPoll {
            match self.inner.poll_homogeneity() {
                HomogeneityPoll::Ready(_) => {
                    self.failures = self.failures.saturating_add(1);
                    HomogeneityPoll::Failed
                }
                other => other,
            }
        }

        fn homogeneity_in_flight(&self) -> bool {
            self.inner.homogeneity_in_flight()
        }

        fn read_particles(&mut self, role: BufferRole) -> Result<Vec<GpuParticle>, SimulationError> {
            self.inner.read_particles(role)
        }

        fn read_bins(&mut self) -> Result<BinTable, SimulationError> {
            self.inner.read_bins()
        }

        fn read_render_colors(&mut self) -> Result<Vec<RenderColor>, SimulationError> {
            self.inner.read_render_colors()
        }
    }

    #[test]
    fn failed_readbacks_leave_homogeneity_alone() {
        let mut config = ConfigStore::new();
        config.set(Param::BallCount, 2_u32);
        config.set(Param::ParticleCount, 1_000_u32);
        let backend = FailingReadback {
            inner: CpuBackend::new(0),
            failures: 0,
        };
        let mut simulation = Simulation::with_rng(
            backend,
            config,
            ThemeRegistry::builtin(),
            (400.0, 300.0),
            StdRng::seed_from_u64(42),
        )
        .unwrap();

        for _ in 0..240 {
            simulation.tick().unwrap();
        }

        assert!(simulation.backend().failures >= 2);
        assert_eq!(simulation.cycle().state(), CycleState::Active);
        assert!((simulation.cycle().homogeneity() - UNMIXED).abs() < f32::EPSILON);
    }

    #[test]
    fn spawns_on_construction() {
        let nebula = NebulaTestAPI::new(3, 3_000, (800.0, 600.0));
        let balls = nebula.simulation.balls().balls();
        assert_eq!(balls.len(), 3);
        assert!(balls.iter().all(|ball| ball.particle_count == 1_000));
        assert_eq!(nebula.simulation.cycle().state(), CycleState::Spawning);
    }

    #[test]
    fn construction_grows_a_small_backend() {
        let mut config = ConfigStore::new();
        config.set(Param::ParticleCount, 2_000_u32);
        let simulation = Simulation::with_rng(
            CpuBackend::new(10),
            config,
            ThemeRegistry::builtin(),
            (400.0, 300.0),
            StdRng::seed_from_u64(1),
        )
        .unwrap();
        assert_eq!(simulation.backend().capacity(), 2_000);
    }

    #[test]
    fn unknown_theme_is_refused_at_construction() {
        let mut config = ConfigStore::new();
        config.set(Param::Theme, "nope");
        let result = Simulation::new(CpuBackend::new(0), config, ThemeRegistry::builtin(), (1.0, 1.0));
        assert!(matches!(result, Err(SimulationError::UnknownTheme(id)) if id == "nope"));
    }

    #[test]
    fn ticks_flip_the_double_buffer() {
        let mut nebula = NebulaTestAPI::new(2, 1_000, (400.0, 300.0));
        assert_eq!(nebula.simulation.role(), BufferRole::ACurrent);
        nebula.tick();
        assert_eq!(nebula.simulation.role(), BufferRole::BCurrent);
        nebula.tick();
        assert_eq!(nebula.simulation.role(), BufferRole::ACurrent);
        assert_eq!(nebula.simulation.frame_number(), 2);
    }

    #[test]
    fn paused_ticks_do_nothing() {
        let mut nebula = NebulaTestAPI::new(2, 1_000, (400.0, 300.0));
        let before = nebula.particles();
        nebula.simulation.set_paused(true);
        nebula.tick();
        assert_eq!(nebula.simulation.frame_number(), 0);
        assert_eq!(nebula.particles()[0].position, before[0].position);

        nebula.simulation.set_paused(false);
        nebula.tick();
        assert_eq!(nebula.simulation.frame_number(), 1);
    }

    #[test]
    fn ball_count_changes_respawn_on_the_next_tick() {
        let mut nebula = NebulaTestAPI::new(3, 3_000, (800.0, 600.0));
        nebula.simulation.config_mut().set(Param::BallCount, 5_u32);
        assert_eq!(nebula.simulation.balls().count(), 3);
        nebula.tick();
        assert_eq!(nebula.simulation.balls().count(), 5);
        assert_eq!(nebula.simulation.balls().particles_per_ball(), 600);
    }

    #[test]
    fn particle_count_beyond_capacity_reallocates() {
        let mut nebula = NebulaTestAPI::new(2, 1_000, (400.0, 300.0));
        assert_eq!(nebula.simulation.backend().capacity(), 1_000);
        nebula.simulation.config_mut().set(Param::ParticleCount, 4_000_u32);
        nebula.tick();
        assert_eq!(nebula.simulation.backend().capacity(), 4_000);
        assert_eq!(nebula.simulation.balls().particles_per_ball(), 2_000);
        assert_eq!(nebula.simulation.adaptive().active_particle_count(), 4_000);
    }

    #[test]
    fn theme_switch_applies_the_theme() {
        let mut nebula = NebulaTestAPI::new(3, 3_000, (800.0, 600.0));
        let inky = Theme::inky();
        nebula.simulation.config_mut().set(Param::Theme, "inky");
        nebula.tick();

        let config = nebula.simulation.config();
        assert_eq!(config.theme_id(), "inky");
        assert!((config.number(Param::SphRadius) - inky.physics.sph_radius).abs() < f32::EPSILON);
        assert_eq!(nebula.simulation.balls().count(), inky.cycle.ball_count);
        let color = nebula.simulation.balls().balls()[0].color;
        assert!(inky.palette.contains(&color));
    }

    #[test]
    fn unknown_theme_at_runtime_is_ignored() {
        let mut nebula = NebulaTestAPI::new(3, 3_000, (800.0, 600.0));
        nebula.simulation.config_mut().set(Param::Theme, "nope");
        nebula.tick();
        assert_eq!(nebula.simulation.balls().count(), 3);
        assert_eq!(nebula.simulation.frame_number(), 1);
    }

    #[test]
    fn cycle_flags_reach_the_state_machine() {
        let mut nebula = NebulaTestAPI::new(2, 1_000, (400.0, 300.0));
        nebula.simulation.config_mut().set(Param::AutoCycle, false);
        nebula.simulation.config_mut().set(Param::AdaptiveParticles, true);
        nebula.tick();
        assert!(nebula.simulation.adaptive().is_enabled());
    }

    #[test]
    fn teardown_unsubscribes() {
        let nebula = NebulaTestAPI::new(2, 1_000, (400.0, 300.0));
        assert_eq!(nebula.simulation.config().listener_count(), 1);
        let (config, themes) = nebula.simulation.into_parts();
        assert_eq!(config.listener_count(), 0);
        assert!(themes.get("inky").is_ok());
    }

    #[test]
    fn particles_stay_with_their_balls() {
        let mut nebula = NebulaTestAPI::new(3, 3_000, (800.0, 600.0));
        let balls = nebula.simulation.balls().balls().to_vec();
        let particles = nebula.particles();

        for (index, ball) in balls.iter().enumerate() {
            let start = usize_from(ball.particle_start);
            let owned = &particles[start..start + usize_from(ball.particle_count)];
            assert!(owned.iter().all(|particle| {
                let offset = glam::Vec2::from(particle.position) - ball.position;
                particle.ball_id == u32::try_from(index).unwrap()
                    && offset.length() <= ball.radius + 1e-3
            }));
        }
    }

    #[test]
    fn restarting_twice_respawns_twice() {
        let mut nebula = NebulaTestAPI::new(3, 3_000, (800.0, 600.0));
        nebula.tick_n(5);
        let respawns = nebula.simulation.cycle().respawn_count();

        nebula.restart();
        let first = nebula.simulation.balls().balls()[0].position;
        nebula.restart();
        let second = nebula.simulation.balls().balls()[0].position;

        assert_eq!(nebula.simulation.cycle().respawn_count(), respawns + 2);
        assert_ne!(first, second);
        assert_eq!(nebula.simulation.cycle().state(), CycleState::Spawning);
        assert!(nebula.simulation.cycle().fade_alpha().abs() < f32::EPSILON);
        assert_eq!(nebula.simulation.role(), BufferRole::ACurrent);
    }

    #[test]
    fn homogeneity_is_measured_once_active() {
        let mut nebula = NebulaTestAPI::new(2, 1_000, (400.0, 300.0));
        // Fade in is 2s at 60 steps a second, then the next multiple of 30 measures
        nebula.tick_n(150);
        assert_eq!(nebula.simulation.cycle().state(), CycleState::Active);
        assert!(nebula.simulation.cycle().homogeneity() < 1.0);
    }
}
