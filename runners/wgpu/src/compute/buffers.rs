//! Every GPU buffer the passes share, and the names they go by.

use core::mem::size_of;

use nebula_cpu_gpu_shared::{
    GpuBall, GpuParticle, HomogeneityCell, HomogeneityResult, SimParams, HOMOGENEITY_CELLS,
    MAX_BALLS, MAX_SCAN_PASSES, SCAN_PARAMS_STRIDE,
};

use crate::particle_store::BufferRole;

/// Just a place to keep the buffers.
pub struct Buffers {
    /// `SimParams`, rewritten every step
    pub params: wgpu::Buffer,
    /// One `ScanParams` per Hillis–Steele pass at `SCAN_PARAMS_STRIDE` intervals
    pub scan_params: wgpu::Buffer,
    /// All `MAX_BALLS` ball slots
    pub balls: wgpu::Buffer,
    /// The two particle halves, indexed by `BufferRole::current_index`
    pub particles: [wgpu::Buffer; 2],
    /// Particles per bin. Zeroed again and used as write cursors by the reorder pass.
    pub bin_counts: wgpu::Buffer,
    /// Scan ping-pong buffers
    pub scan: [wgpu::Buffer; 2],
    /// Exclusive prefix sum of the counts
    pub bin_offsets: wgpu::Buffer,
    /// `(density, pressure)` per particle, from the density pass
    pub densities: wgpu::Buffer,
    /// `(ax, ay, new_attractor, 0)` per particle
    pub accelerations: wgpu::Buffer,
    /// `(r·fade, g·fade, b·fade, fade)` per particle, ready to use as a vertex instance buffer
    pub render_colors: wgpu::Buffer,
    /// The 16×16 colour accumulator
    pub homogeneity_cells: wgpu::Buffer,
    /// Output of the homogeneity reduction
    pub homogeneity_result: wgpu::Buffer,
    /// Particles per half
    pub capacity: u32,
    /// Bins, including overflow, the bin buffers have room for
    pub bin_capacity: u32,
}

impl Buffers {
    /// Uniform snapshot
    pub const PARAMS: &'static str = "sim_params";
    /// Scan stride uniforms
    pub const SCAN_PARAMS: &'static str = "scan_params";
    /// Attractor balls
    pub const BALLS: &'static str = "balls";
    /// Particle half A
    pub const PARTICLES_A: &'static str = "particles_a";
    /// Particle half B
    pub const PARTICLES_B: &'static str = "particles_b";
    /// Bin counts and cursors
    pub const BIN_COUNTS: &'static str = "bin_counts";
    /// First scan buffer
    pub const SCAN_A: &'static str = "scan_a";
    /// Second scan buffer
    pub const SCAN_B: &'static str = "scan_b";
    /// Bin start offsets
    pub const BIN_OFFSETS: &'static str = "bin_offsets";
    /// Density pass scratch
    pub const DENSITIES: &'static str = "densities";
    /// Force pass scratch
    pub const ACCELERATIONS: &'static str = "accelerations";
    /// Render instance colours
    pub const RENDER_COLORS: &'static str = "render_colors";
    /// Homogeneity grid
    pub const HOMOGENEITY_GRID: &'static str = "homogeneity_cells";
    /// Homogeneity variance
    pub const HOMOGENEITY_RESULT: &'static str = "homogeneity_result";

    /// Allocate everything for `capacity` particles and `bin_capacity` bins
    pub fn new(device: &wgpu::Device, capacity: u32, bin_capacity: u32) -> Self {
        let storage = |label: &str, size: u64, extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size.max(16),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC
                    | extra,
                mapped_at_creation: false,
            })
        };
        let uniform = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let particle_bytes = u64::from(capacity).saturating_mul(byte_size::<GpuParticle>());
        let vec2_bytes = u64::from(capacity).saturating_mul(byte_size::<[f32; 2]>());
        let vec4_bytes = u64::from(capacity).saturating_mul(byte_size::<[f32; 4]>());
        let bin_bytes = u64::from(bin_capacity).saturating_mul(byte_size::<u32>());
        let none = wgpu::BufferUsages::empty();

        Self {
            params: uniform(Self::PARAMS, byte_size::<SimParams>()),
            scan_params: uniform(
                Self::SCAN_PARAMS,
                SCAN_PARAMS_STRIDE.saturating_mul(u64::from(MAX_SCAN_PASSES)),
            ),
            balls: storage(Self::BALLS, byte_size::<[GpuBall; MAX_BALLS]>(), none),
            particles: [
                storage(Self::PARTICLES_A, particle_bytes, none),
                storage(Self::PARTICLES_B, particle_bytes, none),
            ],
            bin_counts: storage(Self::BIN_COUNTS, bin_bytes, none),
            scan: [
                storage(Self::SCAN_A, bin_bytes, none),
                storage(Self::SCAN_B, bin_bytes, none),
            ],
            bin_offsets: storage(Self::BIN_OFFSETS, bin_bytes, none),
            densities: storage(Self::DENSITIES, vec2_bytes, none),
            accelerations: storage(Self::ACCELERATIONS, vec4_bytes, none),
            render_colors: storage(Self::RENDER_COLORS, vec4_bytes, wgpu::BufferUsages::VERTEX),
            homogeneity_cells: storage(
                Self::HOMOGENEITY_GRID,
                byte_size::<[HomogeneityCell; HOMOGENEITY_CELLS]>(),
                none,
            ),
            homogeneity_result: storage(
                Self::HOMOGENEITY_RESULT,
                byte_size::<HomogeneityResult>(),
                none,
            ),
            capacity,
            bin_capacity,
        }
    }

    /// The half that is current under `role`
    pub const fn current(&self, role: BufferRole) -> &wgpu::Buffer {
        match role {
            BufferRole::ACurrent => &self.particles[0],
            BufferRole::BCurrent => &self.particles[1],
        }
    }

    /// The half the sort writes into under `role`
    pub const fn target(&self, role: BufferRole) -> &wgpu::Buffer {
        self.current(role.flipped())
    }
}

/// Size of `T` in bytes, as a buffer address
#[expect(
    clippy::as_conversions,
    reason = "Type sizes here are a few dozen bytes"
)]
pub const fn byte_size<T>() -> u64 {
    size_of::<T>() as u64
}
