//! The seam between the frame orchestrator and whatever actually runs the passes.
//!
//! [`CpuBackend`] is the sequential reference for every pass, [`crate::compute::GpuBackend`]
//! dispatches the same passes as wgpu compute pipelines. Both agree on the buffer contract: the
//! step sorts the current half into the other half and simulates there, so once a step has been
//! submitted the orchestrator flips its [`BufferRole`].

use nebula_cpu_gpu_shared::{GpuBall, GpuParticle, SimParams, MAX_BALLS};

use crate::error::SimulationError;
use crate::homogeneity;
use crate::particle_store::{BufferRole, ParticleHalves};
use crate::spatial_bin::{self, usize_from, BinGrid, BinTable};
use crate::sph::{self, RenderColor};

/// Everything the passes need for one step
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub struct FrameUpload {
    /// The uniform snapshot
    pub params: SimParams,
    /// Every ball slot, unused ones zeroed
    pub balls: [GpuBall; MAX_BALLS],
    /// Which half is current going into this step
    pub role: BufferRole,
    /// Run the homogeneity passes and start a readback
    pub measure_homogeneity: bool,
}

impl FrameUpload {
    /// Bundle up a step
    #[must_use]
    #[inline]
    pub const fn new(
        params: SimParams,
        balls: [GpuBall; MAX_BALLS],
        role: BufferRole,
        measure_homogeneity: bool,
    ) -> Self {
        Self {
            params,
            balls,
            role,
            measure_homogeneity,
        }
    }

    /// Particles dispatched this step, never more than `capacity`
    #[must_use]
    #[inline]
    pub fn active(&self, capacity: usize) -> usize {
        usize_from(self.params.particle_count).min(capacity)
    }
}

/// The state of the single outstanding homogeneity readback
#[derive(Copy, Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum HomogeneityPoll {
    /// A measurement arrived
    Ready(f32),
    /// Still waiting on the device
    Pending,
    /// Nothing was requested
    Idle,
    /// The readback failed. There is no new measurement.
    Failed,
}

/// Something that can run a simulation step
pub trait SimulationBackend {
    /// Particles each half of the double buffer holds
    fn capacity(&self) -> usize;

    /// Throw away every particle buffer and allocate room for `capacity` particles. Contents are
    /// undefined until the next upload.
    ///
    /// # Errors
    /// If the new buffers can't be made
    fn reallocate(&mut self, capacity: usize) -> Result<(), SimulationError>;

    /// Overwrite both halves with a freshly seeded population
    ///
    /// # Errors
    /// When there are more particles than capacity
    fn upload_particles(&mut self, particles: &[GpuParticle]) -> Result<(), SimulationError>;

    /// Run one full step: sort, density, forces, integrate and, if asked, homogeneity
    ///
    /// # Errors
    /// `DeviceLost` when the GPU went away. Nothing else is fatal.
    fn step(&mut self, frame: &FrameUpload) -> Result<(), SimulationError>;

    /// Check on the outstanding homogeneity readback without blocking
    fn poll_homogeneity(&mut self) -> HomogeneityPoll;

    /// Is a homogeneity readback still outstanding?
    fn homogeneity_in_flight(&self) -> bool;

    /// Copy of one half of the particle double buffer
    ///
    /// # Errors
    /// If the readback fails
    fn read_particles(&mut self, role: BufferRole) -> Result<Vec<GpuParticle>, SimulationError>;

    /// The bin counts and offsets from the last step
    ///
    /// # Errors
    /// If the readback fails
    fn read_bins(&mut self) -> Result<BinTable, SimulationError>;

    /// The render instance colours from the last step
    ///
    /// # Errors
    /// If the readback fails
    fn read_render_colors(&mut self) -> Result<Vec<RenderColor>, SimulationError>;
}

/// Runs every pass on the CPU, in the same order the GPU does
#[derive(Debug, Default)]
pub struct CpuBackend {
    /// Both particle halves
    halves: ParticleHalves,
    /// Render instance colours
    render_colors: Vec<RenderColor>,
    /// Bins from the last sort
    bins: BinTable,
    /// A measurement that becomes visible on the next poll
    pending_homogeneity: Option<f32>,
}

impl CpuBackend {
    /// Allocate both halves at `capacity`
    #[must_use]
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self {
            halves: ParticleHalves::new(capacity),
            render_colors: vec![[0.0; 4]; capacity],
            bins: BinTable::default(),
            pending_homogeneity: None,
        }
    }
}

impl SimulationBackend for CpuBackend {
    #[inline]
    fn capacity(&self) -> usize {
        self.halves.capacity()
    }

    #[inline]
    fn reallocate(&mut self, capacity: usize) -> Result<(), SimulationError> {
        *self = Self::new(capacity);
        Ok(())
    }

    #[inline]
    fn upload_particles(&mut self, particles: &[GpuParticle]) -> Result<(), SimulationError> {
        if particles.len() > self.capacity() {
            return Err(SimulationError::CapacityExceeded {
                requested: particles.len(),
                capacity: self.capacity(),
            });
        }
        self.halves.fill(particles);
        Ok(())
    }

    #[inline]
    fn step(&mut self, frame: &FrameUpload) -> Result<(), SimulationError> {
        let params = &frame.params;
        let active = frame.active(self.capacity());
        let grid = BinGrid::from_params(params);

        let (current, target) = self.halves.split(frame.role);
        let bins = spatial_bin::sort(current.get(..active).unwrap_or_default(), target, &grid);
        // Particles beyond the active count ride along unchanged, ready for when it grows again
        if let (Some(tail), Some(source)) = (target.get_mut(active..), current.get(active..)) {
            tail.copy_from_slice(source);
        }
        let sorted = target.get_mut(..active).unwrap_or_default();

        sph::compute_density(sorted, active, &grid, &bins, params);
        let accelerations = sph::compute_forces(sorted, active, &grid, &bins, &frame.balls, params);
        sph::integrate(sorted, &accelerations, &mut self.render_colors, &grid, params);

        if frame.measure_homogeneity && self.pending_homogeneity.is_none() {
            let canvas = (params.canvas_width, params.canvas_height);
            self.pending_homogeneity = Some(homogeneity::measure(sorted, canvas));
        }

        self.bins = bins;
        Ok(())
    }

    #[inline]
    fn poll_homogeneity(&mut self) -> HomogeneityPoll {
        self.pending_homogeneity
            .take()
            .map_or(HomogeneityPoll::Idle, HomogeneityPoll::Ready)
    }

    #[inline]
    fn homogeneity_in_flight(&self) -> bool {
        self.pending_homogeneity.is_some()
    }

    #[inline]
    fn read_particles(&mut self, role: BufferRole) -> Result<Vec<GpuParticle>, SimulationError> {
        Ok(self.halves.current(role).to_vec())
    }

    #[inline]
    fn read_bins(&mut self) -> Result<BinTable, SimulationError> {
        Ok(self.bins.clone())
    }

    #[inline]
    fn read_render_colors(&mut self) -> Result<Vec<RenderColor>, SimulationError> {
        Ok(self.render_colors.clone())
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod test {
    use super::*;
    use crate::config_app::ConfigSnapshot;
    use crate::config_shader::{to_sim_params, FrameInputs};

    fn params(particle_count: u32) -> SimParams {
        to_sim_params(
            &ConfigSnapshot::default(),
            &FrameInputs {
                canvas: (100.0, 100.0),
                active_particle_count: particle_count,
                fade_alpha: 1.0,
                ..Default::default()
            },
        )
    }

    fn particle(x: f32, y: f32) -> GpuParticle {
        GpuParticle {
            position: [x, y],
            color: [1.0, 0.0, 0.0],
            density: 1.0,
            attractor: 1.0,
            alive: 1,
            ..Default::default()
        }
    }

    fn frame(particle_count: u32, role: BufferRole, measure: bool) -> FrameUpload {
        FrameUpload::new(
            params(particle_count),
            [GpuBall::default(); MAX_BALLS],
            role,
            measure,
        )
    }

    #[test]
    fn uploads_beyond_capacity_are_refused() {
        let mut backend = CpuBackend::new(2);
        let result = backend.upload_particles(&[particle(1.0, 1.0); 3]);
        assert!(matches!(
            result,
            Err(SimulationError::CapacityExceeded {
                requested: 3,
                capacity: 2
            })
        ));
    }

    #[test]
    fn reallocation_changes_capacity() {
        let mut backend = CpuBackend::new(2);
        backend.reallocate(5).unwrap();
        assert_eq!(backend.capacity(), 5);
        assert_eq!(backend.read_render_colors().unwrap().len(), 5);
        backend.upload_particles(&[particle(1.0, 1.0); 5]).unwrap();
    }

    #[test]
    fn step_writes_the_other_half_sorted() {
        let mut backend = CpuBackend::new(3);
        backend
            .upload_particles(&[particle(90.0, 90.0), particle(5.0, 5.0), particle(50.0, 5.0)])
            .unwrap();
        backend.step(&frame(3, BufferRole::ACurrent, false)).unwrap();

        let sorted = backend.read_particles(BufferRole::BCurrent).unwrap();
        let grid = BinGrid::from_params(&params(3));
        let bins: Vec<u32> = sorted.iter().map(|each| grid.bin_of(each)).collect();
        assert!(bins.windows(2).all(|pair| pair[0] <= pair[1]));

        let table = backend.read_bins().unwrap();
        assert_eq!(table.total(), 3);
        assert_eq!(table.offsets[0], 0);
    }

    #[test]
    fn only_the_active_prefix_is_simulated() {
        let mut backend = CpuBackend::new(3);
        backend.upload_particles(&[particle(50.0, 50.0); 3]).unwrap();
        backend.step(&frame(2, BufferRole::ACurrent, false)).unwrap();
        assert_eq!(backend.read_bins().unwrap().total(), 2);
        let colors = backend.read_render_colors().unwrap();
        assert!(colors[0][3] > 0.0);
        assert!(colors[2][3].abs() < f32::EPSILON);
    }

    #[test]
    fn shrinking_then_growing_keeps_every_particle() {
        let mut backend = CpuBackend::new(3);
        let tagged: Vec<GpuParticle> = [0.0_f32, 1.0, 2.0]
            .iter()
            .map(|&tag| GpuParticle {
                color: [tag, 0.0, 0.0],
                ..particle(10.0 + tag * 40.0, 50.0)
            })
            .collect();
        backend.upload_particles(&tagged).unwrap();

        backend.step(&frame(3, BufferRole::ACurrent, false)).unwrap();
        backend.step(&frame(1, BufferRole::BCurrent, false)).unwrap();
        backend.step(&frame(3, BufferRole::ACurrent, false)).unwrap();

        let mut tags: Vec<f32> = backend
            .read_particles(BufferRole::BCurrent)
            .unwrap()
            .iter()
            .map(|each| each.color[0])
            .collect();
        tags.sort_by(f32::total_cmp);
        assert_eq!(tags, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn homogeneity_arrives_on_the_next_poll() {
        let mut backend = CpuBackend::new(2);
        backend
            .upload_particles(&[particle(10.0, 10.0), particle(90.0, 90.0)])
            .unwrap();
        assert_eq!(backend.poll_homogeneity(), HomogeneityPoll::Idle);

        backend.step(&frame(2, BufferRole::ACurrent, true)).unwrap();
        assert!(backend.homogeneity_in_flight());
        assert!(matches!(
            backend.poll_homogeneity(),
            HomogeneityPoll::Ready(value) if value.abs() < 1e-6
        ));
        assert!(!backend.homogeneity_in_flight());
        assert_eq!(backend.poll_homogeneity(), HomogeneityPoll::Idle);
    }
}
