//! Owns the GPU and the simulation running on it

use anyhow::{Context as _, Result};
use nebula_wgpu::spatial_bin::usize_from;
use nebula_wgpu::{ConfigStore, GpuBackend, GpuContext, Param, Simulation, ThemeRegistry};

/// The simulation, plus what's needed to rebuild it on a fresh device
pub struct GPUManager {
    /// The running simulation
    pub simulation: Simulation<GpuBackend>,
    /// Canvas size in pixels
    canvas: (f32, f32),
}

impl GPUManager {
    /// Open a device and start a simulation with default parameters
    pub fn setup(canvas: (f32, f32)) -> Result<Self> {
        Self::build(ConfigStore::new(), ThemeRegistry::builtin(), canvas)
    }

    /// Throw away every GPU resource and start again on a new device. Parameters and themes
    /// survive, balls and particles are respawned.
    pub fn reinit(self) -> Result<Self> {
        log::info!("Reinitialising the GPU...");
        let (config, themes) = self.simulation.into_parts();
        Self::build(config, themes, self.canvas)
    }

    /// Device, buffers, pipelines and simulation
    fn build(config: ConfigStore, themes: ThemeRegistry, canvas: (f32, f32)) -> Result<Self> {
        let context = GpuContext::request_blocking().context("Couldn't get a GPU device")?;
        let capacity = usize_from(config.integer(Param::ParticleCount));
        let backend = GpuBackend::new(context, capacity, canvas)
            .context("Couldn't allocate the simulation's GPU buffers")?;
        let simulation = Simulation::new(backend, config, themes, canvas)
            .context("Couldn't start the simulation")?;
        log::info!(
            "Simulating {} particles on a {}x{} canvas",
            capacity,
            canvas.0,
            canvas.1
        );
        Ok(Self { simulation, canvas })
    }
}
