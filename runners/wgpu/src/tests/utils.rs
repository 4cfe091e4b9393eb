//! Rust interface to headless nebula simulations, for tests

use nebula_cpu_gpu_shared::GpuParticle;
use rand::rngs::StdRng;
use rand::SeedableRng as _;

use crate::backend::CpuBackend;
use crate::config_app::{ConfigStore, Param};
use crate::state::Simulation;
use crate::theme::ThemeRegistry;

/// A seeded simulation running on the CPU reference backend
pub struct NebulaTestAPI {
    /// The simulation under test
    pub simulation: Simulation<CpuBackend>,
}

impl NebulaTestAPI {
    /// Instantiate with the default theme and the given counts
    #[must_use]
    #[inline]
    pub fn new(ball_count: u32, particle_count: u32, canvas: (f32, f32)) -> Self {
        let mut config = ConfigStore::new();
        config.set(Param::BallCount, ball_count);
        config.set(Param::ParticleCount, particle_count);
        Self::with_config(config, canvas)
    }

    /// Instantiate from a prepared config
    #[must_use]
    #[inline]
    pub fn with_config(config: ConfigStore, canvas: (f32, f32)) -> Self {
        let simulation = Simulation::with_rng(
            CpuBackend::new(0),
            config,
            ThemeRegistry::builtin(),
            canvas,
            StdRng::seed_from_u64(42),
        )
        .unwrap();
        Self { simulation }
    }

    /// Run a single tick/frame of the simulation.
    #[inline]
    pub fn tick(&mut self) {
        self.simulation.tick().unwrap();
    }

    /// Run `frames` ticks
    #[inline]
    pub fn tick_n(&mut self, frames: u32) {
        for _ in 0..frames {
            self.tick();
        }
    }

    /// Force a respawn
    #[inline]
    pub fn restart(&mut self) {
        self.simulation.restart().unwrap();
    }

    /// The latest particles
    #[must_use]
    #[inline]
    pub fn particles(&mut self) -> Vec<GpuParticle> {
        self.simulation.particles().unwrap()
    }
}
