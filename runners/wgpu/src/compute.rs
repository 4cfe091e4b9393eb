//! The code that manages the GPU compute passes.
//!
//! One step is one command encoder, submitted once:
//!   count → scan → exclusive → reorder → density → forces → integrate → (homogeneity)
//!
//! wgpu orders compute passes that share buffers, so every pass sees the previous pass's
//! writes. The particle halves swap roles between steps, so reorder never reads and writes the
//! same half.

pub mod buffers;
pub mod builder;
pub mod context;
pub mod readback;

#[path = "compute/02_bin_count.rs"]
mod bin_count;
#[path = "compute/05_density.rs"]
mod density;
#[path = "compute/06_forces.rs"]
mod forces;
#[path = "compute/08_homogeneity.rs"]
mod homogeneity;
#[path = "compute/07_integration.rs"]
mod integration;
#[path = "compute/03_prefix_sum.rs"]
mod prefix_sum;
#[path = "compute/04_reorder.rs"]
mod reorder;

use core::mem::size_of;

use nebula_cpu_gpu_shared::GpuParticle;

use crate::backend::{FrameUpload, HomogeneityPoll, SimulationBackend};
use crate::config_shader::max_total_bins;
use crate::error::SimulationError;
use crate::particle_store::BufferRole;
use crate::spatial_bin::{usize_from, BinTable};
use crate::sph::RenderColor;

use self::bin_count::BinCountPass;
use self::buffers::{byte_size, Buffers};
use self::builder::Builder;
use self::context::GpuContext;
use self::density::DensityPass;
use self::forces::ForcesPass;
use self::homogeneity::HomogeneityPass;
use self::integration::IntegrationPass;
use self::prefix_sum::PrefixSumPass;
use self::readback::read_buffer;
use self::reorder::ReorderPass;

/// One of something for each buffer role, usually a bind group
pub struct PerRole<T> {
    /// Used while half A is current
    a_current: T,
    /// Used while half B is current
    b_current: T,
}

impl<T> PerRole<T> {
    /// Build both
    pub fn new<F: FnMut(BufferRole) -> T>(mut build: F) -> Self {
        Self {
            a_current: build(BufferRole::ACurrent),
            b_current: build(BufferRole::BCurrent),
        }
    }

    /// The one for `role`
    pub const fn get(&self, role: BufferRole) -> &T {
        match role {
            BufferRole::ACurrent => &self.a_current,
            BufferRole::BCurrent => &self.b_current,
        }
    }
}

/// Record a single 1-dimensional dispatch in its own compute pass
fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    offsets: &[u32],
    workgroups: u32,
) {
    if workgroups == 0 {
        return;
    }
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, offsets);
    pass.dispatch_workgroups(workgroups, 1, 1);
}

/// Every compiled pass
struct Passes {
    /// Sort step 1
    bin_count: BinCountPass,
    /// Sort steps 2 and 3
    prefix_sum: PrefixSumPass,
    /// Sort steps 4 and 5
    reorder: ReorderPass,
    /// SPH density
    density: DensityPass,
    /// All forces
    forces: ForcesPass,
    /// Movement and render colours
    integration: IntegrationPass,
    /// Colour mixing
    homogeneity: HomogeneityPass,
}

impl Passes {
    /// Compile every pass against `buffers`
    fn new(device: &wgpu::Device, buffers: &Buffers) -> Self {
        let builder = Builder::new(device);
        let passes = Self {
            bin_count: BinCountPass::new(&builder, buffers),
            prefix_sum: PrefixSumPass::new(&builder, buffers),
            reorder: ReorderPass::new(&builder, buffers),
            density: DensityPass::new(&builder, buffers),
            forces: ForcesPass::new(&builder, buffers),
            integration: IntegrationPass::new(&builder, buffers),
            homogeneity: HomogeneityPass::new(&builder, buffers),
        };
        log::info!(
            "Built compute pipelines for {} particles and {} bins",
            buffers.capacity,
            buffers.bin_capacity
        );
        passes
    }
}

/// Runs the simulation as wgpu compute passes
pub struct GpuBackend {
    /// Device and queue
    context: GpuContext,
    /// Everything the passes read and write
    buffers: Buffers,
    /// Pipelines and bind groups
    passes: Passes,
    /// Bins used by the last step
    last_bins: u32,
}

impl GpuBackend {
    /// Allocate for `capacity` particles on a `canvas` sized grid
    ///
    /// # Errors
    /// If the capacity doesn't fit a `u32` or the device is already lost
    #[inline]
    pub fn new(
        context: GpuContext,
        capacity: usize,
        canvas: (f32, f32),
    ) -> Result<Self, SimulationError> {
        context.check()?;
        let buffers = Buffers::new(
            &context.device,
            capacity_u32(capacity)?,
            max_total_bins(canvas),
        );
        let passes = Passes::new(&context.device, &buffers);
        Ok(Self {
            context,
            buffers,
            passes,
            last_bins: 0,
        })
    }

    /// Device, queue and adapter details
    #[must_use]
    #[inline]
    pub const fn context(&self) -> &GpuContext {
        &self.context
    }

    /// The render instance colours, for a renderer to bind as a vertex buffer
    #[must_use]
    #[inline]
    pub const fn render_color_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.render_colors
    }

    /// Read `count` `T`s from the start of `buffer`
    fn read_vec<T: bytemuck::Pod>(
        &self,
        buffer: &wgpu::Buffer,
        count: usize,
    ) -> Result<Vec<T>, SimulationError> {
        let bytes = count.saturating_mul(size_of::<T>());
        let raw = read_buffer(
            &self.context.device,
            &self.context.queue,
            buffer,
            u64::try_from(bytes).unwrap_or(u64::MAX),
        )?;
        self.context.check()?;
        Ok(raw
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}

impl SimulationBackend for GpuBackend {
    #[inline]
    fn capacity(&self) -> usize {
        usize_from(self.buffers.capacity)
    }

    #[inline]
    fn reallocate(&mut self, capacity: usize) -> Result<(), SimulationError> {
        self.context.check()?;
        self.buffers = Buffers::new(
            &self.context.device,
            capacity_u32(capacity)?,
            self.buffers.bin_capacity,
        );
        self.passes = Passes::new(&self.context.device, &self.buffers);
        self.last_bins = 0;
        Ok(())
    }

    #[inline]
    fn upload_particles(&mut self, particles: &[GpuParticle]) -> Result<(), SimulationError> {
        self.context.check()?;
        if particles.len() > self.capacity() {
            return Err(SimulationError::CapacityExceeded {
                requested: particles.len(),
                capacity: self.capacity(),
            });
        }
        for half in &self.buffers.particles {
            self.context
                .queue
                .write_buffer(half, 0, bytemuck::cast_slice(particles));
        }
        Ok(())
    }

    #[inline]
    fn step(&mut self, frame: &FrameUpload) -> Result<(), SimulationError> {
        self.context.check()?;
        let bins = frame.params.total_bins();
        if bins > self.buffers.bin_capacity {
            return Err(SimulationError::CapacityExceeded {
                requested: usize_from(bins),
                capacity: usize_from(self.buffers.bin_capacity),
            });
        }

        let mut params = frame.params;
        params.particle_count = params.particle_count.min(self.buffers.capacity);
        let particle_count = params.particle_count;
        let bin_bytes = u64::from(bins).saturating_mul(byte_size::<u32>());

        let queue = &self.context.queue;
        queue.write_buffer(&self.buffers.params, 0, bytemuck::bytes_of(&params));
        queue.write_buffer(&self.buffers.balls, 0, bytemuck::cast_slice(&frame.balls));
        let scan_passes = PrefixSumPass::write_params(queue, &self.buffers, bins);

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("simulation_step"),
                });
        let role = frame.role;
        let passes = &self.passes;
        passes
            .bin_count
            .encode(&mut encoder, &self.buffers, role, particle_count, bin_bytes);
        passes
            .prefix_sum
            .encode(&mut encoder, &self.buffers, bins, scan_passes, bin_bytes);
        passes
            .reorder
            .encode(&mut encoder, &self.buffers, role, particle_count, bin_bytes);
        passes.density.encode(&mut encoder, role, particle_count);
        passes.forces.encode(&mut encoder, role, particle_count);
        passes.integration.encode(&mut encoder, role, particle_count);

        let measure = frame.measure_homogeneity && !passes.homogeneity.in_flight();
        if measure {
            passes
                .homogeneity
                .encode(&mut encoder, &self.buffers, role, particle_count);
        }

        queue.submit(core::iter::once(encoder.finish()));
        if measure {
            self.passes.homogeneity.start_readback();
        }
        self.last_bins = bins;

        self.context.device.poll(wgpu::Maintain::Poll);
        self.context.check()
    }

    #[inline]
    fn poll_homogeneity(&mut self) -> HomogeneityPoll {
        self.context.device.poll(wgpu::Maintain::Poll);
        self.passes.homogeneity.poll()
    }

    #[inline]
    fn homogeneity_in_flight(&self) -> bool {
        self.passes.homogeneity.in_flight()
    }

    #[inline]
    fn read_particles(&mut self, role: BufferRole) -> Result<Vec<GpuParticle>, SimulationError> {
        self.read_vec(self.buffers.current(role), self.capacity())
    }

    #[inline]
    fn read_bins(&mut self) -> Result<BinTable, SimulationError> {
        let bins = usize_from(self.last_bins);
        Ok(BinTable {
            counts: self.read_vec(&self.buffers.bin_counts, bins)?,
            offsets: self.read_vec(&self.buffers.bin_offsets, bins)?,
        })
    }

    #[inline]
    fn read_render_colors(&mut self) -> Result<Vec<RenderColor>, SimulationError> {
        self.read_vec(&self.buffers.render_colors, self.capacity())
    }
}

/// Particle capacities live in `u32` uniforms on the GPU
fn capacity_u32(capacity: usize) -> Result<u32, SimulationError> {
    u32::try_from(capacity).map_err(|_error| SimulationError::CapacityExceeded {
        requested: capacity,
        capacity: usize_from(u32::MAX),
    })
}

#[cfg(all(test, feature = "gpu-tests"))]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod test {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::ball::BallDynamics;
    use crate::config_app::ConfigSnapshot;
    use crate::config_shader::{to_sim_params, FrameInputs};
    use crate::particle_store::seed_particles;
    use crate::theme::Theme;
    use rand::rngs::StdRng;
    use rand::SeedableRng as _;

    const CANVAS: (f32, f32) = (400.0, 300.0);

    fn gpu(capacity: usize) -> GpuBackend {
        env_logger::builder().is_test(true).try_init().ok();
        let context = GpuContext::request_blocking().unwrap();
        GpuBackend::new(context, capacity, CANVAS).unwrap()
    }

    fn frame(balls: &BallDynamics, particle_count: u32, measure: bool) -> FrameUpload {
        let params = to_sim_params(
            &ConfigSnapshot::default(),
            &FrameInputs {
                canvas: CANVAS,
                active_particle_count: particle_count,
                ball_count: balls.count(),
                fade_alpha: 1.0,
                ..Default::default()
            },
        );
        FrameUpload::new(
            params,
            balls.to_uploadable_buffer(),
            BufferRole::ACurrent,
            measure,
        )
    }

    fn seeded(particle_count: u32) -> (BallDynamics, Vec<GpuParticle>) {
        let mut balls =
            BallDynamics::with_rng(&Theme::nebula(), CANVAS, StdRng::seed_from_u64(3));
        balls.respawn(3, particle_count);
        let particles = seed_particles(
            balls.balls(),
            usize_from(particle_count),
            CANVAS,
            &mut StdRng::seed_from_u64(4),
        );
        (balls, particles)
    }

    #[test]
    fn bins_match_the_cpu_sort() {
        let (balls, particles) = seeded(2000);
        let mut gpu = gpu(2000);
        let mut cpu = CpuBackend::new(2000);
        gpu.upload_particles(&particles).unwrap();
        cpu.upload_particles(&particles).unwrap();

        let step = frame(&balls, 2000, false);
        gpu.step(&step).unwrap();
        cpu.step(&step).unwrap();

        assert_eq!(gpu.read_bins().unwrap(), cpu.read_bins().unwrap());
    }

    #[test]
    fn one_step_matches_the_cpu() {
        let (balls, particles) = seeded(600);
        let mut gpu = gpu(600);
        let mut cpu = CpuBackend::new(600);
        gpu.upload_particles(&particles).unwrap();
        cpu.upload_particles(&particles).unwrap();

        let step = frame(&balls, 600, false);
        gpu.step(&step).unwrap();
        cpu.step(&step).unwrap();

        // Order within a bin differs, so compare per-bin sums of position
        let gpu_bins = gpu.read_bins().unwrap();
        let gpu_particles = gpu.read_particles(BufferRole::BCurrent).unwrap();
        let cpu_particles = cpu.read_particles(BufferRole::BCurrent).unwrap();
        for bin in 0..u32::try_from(gpu_bins.counts.len()).unwrap() {
            let range = gpu_bins.range(bin);
            let sum = |particles: &[GpuParticle]| {
                particles[range.clone()]
                    .iter()
                    .map(|particle| particle.position[0] + particle.position[1])
                    .sum::<f32>()
            };
            let expected = sum(&cpu_particles);
            assert!(
                (sum(&gpu_particles) - expected).abs() <= 1e-2 * expected.abs().max(1.0),
                "bin {bin} diverged"
            );
        }
    }

    #[test]
    fn densities_match_the_cpu() {
        let (balls, particles) = seeded(600);
        let mut gpu = gpu(600);
        let mut cpu = CpuBackend::new(600);
        gpu.upload_particles(&particles).unwrap();
        cpu.upload_particles(&particles).unwrap();

        let step = frame(&balls, 600, false);
        gpu.step(&step).unwrap();
        cpu.step(&step).unwrap();

        let gpu_bins = gpu.read_bins().unwrap();
        let gpu_particles = gpu.read_particles(BufferRole::BCurrent).unwrap();
        let cpu_particles = cpu.read_particles(BufferRole::BCurrent).unwrap();
        for bin in 0..u32::try_from(gpu_bins.counts.len()).unwrap() {
            let range = gpu_bins.range(bin);
            let sum = |particles: &[GpuParticle]| {
                particles[range.clone()]
                    .iter()
                    .map(|particle| particle.density + particle.pressure)
                    .sum::<f32>()
            };
            let expected = sum(&cpu_particles);
            assert!(
                (sum(&gpu_particles) - expected).abs() <= 1e-3 * expected.abs().max(1.0),
                "bin {bin} density diverged"
            );
        }
    }

    #[test]
    fn shrinking_then_growing_keeps_every_particle() {
        let (balls, seeded_particles) = seeded(3);
        let tagged: Vec<GpuParticle> = seeded_particles
            .iter()
            .zip([0.0_f32, 1.0, 2.0])
            .map(|(particle, tag)| GpuParticle {
                color: [tag, 0.0, 0.0],
                alive: 1,
                ..*particle
            })
            .collect();
        let mut gpu = gpu(3);
        gpu.upload_particles(&tagged).unwrap();

        let as_role = |particle_count, role| FrameUpload {
            role,
            ..frame(&balls, particle_count, false)
        };
        gpu.step(&as_role(3, BufferRole::ACurrent)).unwrap();
        gpu.step(&as_role(1, BufferRole::BCurrent)).unwrap();
        gpu.step(&as_role(3, BufferRole::ACurrent)).unwrap();

        let mut tags: Vec<f32> = gpu
            .read_particles(BufferRole::BCurrent)
            .unwrap()
            .iter()
            .map(|each| each.color[0])
            .collect();
        tags.sort_by(f32::total_cmp);
        assert_eq!(tags, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn homogeneity_comes_back_without_blocking() {
        let (balls, particles) = seeded(600);
        let mut gpu = gpu(600);
        let mut cpu = CpuBackend::new(600);
        gpu.upload_particles(&particles).unwrap();
        cpu.upload_particles(&particles).unwrap();

        let step = frame(&balls, 600, true);
        gpu.step(&step).unwrap();
        cpu.step(&step).unwrap();
        assert!(gpu.homogeneity_in_flight());

        let mut result = HomogeneityPoll::Pending;
        for _ in 0..1000 {
            result = gpu.poll_homogeneity();
            if result != HomogeneityPoll::Pending {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let HomogeneityPoll::Ready(gpu_value) = result else {
            panic!("No homogeneity result: {result:?}");
        };
        let HomogeneityPoll::Ready(cpu_value) = cpu.poll_homogeneity() else {
            panic!("No CPU homogeneity result");
        };
        assert!((gpu_value - cpu_value).abs() < 1e-3);
    }
}
