//! Data contracts shared by the CPU and the GPU.
//!
//! Every struct here is uploaded verbatim into a WGSL buffer, so field order, sizes and padding
//! are part of the contract. The matching WGSL declarations live in `assets/shaders/types.wgsl`.
//! Plain arrays are used instead of vector types so that the layout never depends on a maths
//! library's alignment rules.

#![no_std]

use bytemuck::{Pod, Zeroable};

/// The maximum number of attractor balls. The ball buffer always has this many entries.
pub const MAX_BALLS: usize = 5;

/// The number of cells along one side of the homogeneity grid.
pub const HOMOGENEITY_GRID_SIDE: u32 = 16;

/// Total cells in the homogeneity grid.
pub const HOMOGENEITY_CELLS: usize = 256;

/// Colours are accumulated as fixed point integers so that they can be summed with `u32` atomics.
pub const HOMOGENEITY_COLOR_SCALE: f32 = 1024.0;

/// Local workgroup size of every 1-dimensional compute pass.
pub const WORKGROUP_SIZE: u32 = 64;

/// The fixed simulation timestep in seconds.
pub const FIXED_DT: f32 = 1.0 / 60.0;

/// Added to squared particle-to-ball distances so the attraction never blows up near a centre.
pub const SOFTENING: f32 = 100.0;

/// A particle further than this many ball radii from its ball is tidally stripped.
pub const TIDAL_RADIUS_FACTOR: f32 = 3.0;

/// Radius of influence of the pointer force, in pixels.
pub const POINTER_RADIUS: f32 = 150.0;

/// Byte distance between consecutive `ScanParams` in the scan uniform buffer. Dynamic uniform
/// offsets must be a multiple of `min_uniform_buffer_offset_alignment`, which is 256 on every
/// adapter we care about.
pub const SCAN_PARAMS_STRIDE: u64 = 256;

/// Upper bound on Hillis–Steele passes, enough for `2^32` bins.
pub const MAX_SCAN_PASSES: u32 = 32;

/// Snapshot of every scalar the compute passes need for one step. 40 words, 160 bytes.
///
/// | word | field |
/// |---|---|
/// | 0 | `dt` |
/// | 1 | `particle_count` (u32) |
/// | 2 | `ball_count` (u32) |
/// | 3–4 | `canvas_width`, `canvas_height` |
/// | 5–11 | SPH and force coefficients |
/// | 12–14 | `bin_size`, `bins_x` (u32), `bins_y` (u32) |
/// | 15–17 | pointer position and force |
/// | 18 | `frame_number` (u32) |
/// | 19–23 | scale, fade, decay, bounce, stripping |
/// | 24–31 | visual shaping values, only read by the renderer |
/// | 32–36 | precomputed kernel constants |
/// | 37–39 | padding |
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[expect(clippy::exhaustive_structs, reason = "It's a fixed binary layout")]
pub struct SimParams {
    /// Timestep in seconds
    pub dt: f32,
    /// Number of particles dispatched this step. Always `<=` the allocated capacity.
    pub particle_count: u32,
    /// Number of live balls, at most `MAX_BALLS`
    pub ball_count: u32,
    /// Canvas width in pixels
    pub canvas_width: f32,
    /// Canvas height in pixels
    pub canvas_height: f32,
    /// SPH interaction radius `h`
    pub sph_radius: f32,
    /// Density an isolated particle settles at
    pub rest_density: f32,
    /// Stiffness of the one-sided equation of state
    pub gas_constant: f32,
    /// Viscosity coefficient
    pub viscosity: f32,
    /// Strength of the attraction to a particle's own ball
    pub attractor_base: f32,
    /// Strength of the attraction to every other ball
    pub gravity_constant: f32,
    /// Fraction of velocity removed per step
    pub drag_coefficient: f32,
    /// Side length of a spatial bin. Equal to `sph_radius`.
    pub bin_size: f32,
    /// Bins along x
    pub bins_x: u32,
    /// Bins along y
    pub bins_y: u32,
    /// Pointer x
    pub mouse_x: f32,
    /// Pointer y
    pub mouse_y: f32,
    /// Radial pointer force, zero disables it
    pub mouse_force: f32,
    /// Monotonic step counter
    pub frame_number: u32,
    /// Particle radius, also used for wall collisions
    pub particle_scale: f32,
    /// Global fade multiplier for the renderer
    pub fade_alpha: f32,
    /// Exponential falloff of the own-ball attraction with distance
    pub attractor_decay: f32,
    /// Velocity kept after a wall bounce
    pub bounce_damping: f32,
    /// Attractor strength removed per step from a particle outside the tidal radius
    pub tidal_stripping: f32,
    /// Renderer: fog intensity
    pub fog_intensity: f32,
    /// Renderer: fog falloff
    pub fog_falloff: f32,
    /// Renderer: fog size
    pub fog_size: f32,
    /// Renderer: intensity falloff
    pub intensity_falloff: f32,
    /// Renderer: intensity floor
    pub intensity_floor: f32,
    /// Renderer: brightness falloff
    pub brightness_falloff: f32,
    /// Renderer: brightness floor
    pub brightness_floor: f32,
    /// Renderer: glow falloff
    pub glow_falloff: f32,
    /// `315 / (64 π h⁹)`
    pub poly6_scale: f32,
    /// `-45 / (π h⁶)`
    pub spiky_scale: f32,
    /// `45 / (π h⁶)`
    pub visc_scale: f32,
    /// `1 / bin_size`
    pub inv_bin_size: f32,
    /// `h²`
    pub sph_radius_sq: f32,
    /// Padding up to 160 bytes
    pub _padding: [u32; 3],
}

impl SimParams {
    /// Number of regular grid bins, not counting the overflow bin.
    #[must_use]
    #[inline]
    pub const fn grid_bins(&self) -> u32 {
        self.bins_x.saturating_mul(self.bins_y)
    }

    /// Index of the overflow bin that collects dead and non-finite particles.
    #[must_use]
    #[inline]
    pub const fn overflow_bin(&self) -> u32 {
        self.grid_bins()
    }

    /// Total bins including the overflow bin.
    #[must_use]
    #[inline]
    pub const fn total_bins(&self) -> u32 {
        self.grid_bins().saturating_add(1)
    }
}

/// One particle. 12 words, 48 bytes.
///
/// | offset | field |
/// |---|---|
/// | 0 | `position` |
/// | 8 | `velocity` |
/// | 16 | `color` |
/// | 28 | `density` |
/// | 32 | `pressure` |
/// | 36 | `attractor` |
/// | 40 | `ball_id` (u32) |
/// | 44 | `alive` (u32) |
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[expect(clippy::exhaustive_structs, reason = "It's a fixed binary layout")]
pub struct GpuParticle {
    /// Position in canvas pixels
    pub position: [f32; 2],
    /// Velocity in pixels per second
    pub velocity: [f32; 2],
    /// Linear RGB colour inherited from the owning ball
    pub color: [f32; 3],
    /// SPH density from the last density pass
    pub density: f32,
    /// SPH pressure from the last density pass
    pub pressure: f32,
    /// Remaining attraction to the owning ball, `[0, 1]`. Only ever decreases.
    pub attractor: f32,
    /// Index of the owning ball
    pub ball_id: u32,
    /// Non-zero for a live particle. Reserved: nothing clears it after seeding.
    pub alive: u32,
}

impl GpuParticle {
    /// Is this particle part of the simulation?
    #[must_use]
    #[inline]
    pub const fn is_alive(&self) -> bool {
        self.alive != 0
    }
}

/// One attractor ball. 12 words, 48 bytes.
///
/// | offset | field |
/// |---|---|
/// | 0 | `position` |
/// | 8 | `velocity` |
/// | 16 | `color` |
/// | 28 | `attractor_strength` |
/// | 32 | `mass` |
/// | 36 | `radius` |
/// | 40 | `particle_start` (u32) |
/// | 44 | `particle_count` (u32) |
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[expect(clippy::exhaustive_structs, reason = "It's a fixed binary layout")]
pub struct GpuBall {
    /// Centre in canvas pixels
    pub position: [f32; 2],
    /// Velocity in pixels per second
    pub velocity: [f32; 2],
    /// Colour given to the ball's particles
    pub color: [f32; 3],
    /// Multiplier on the own-ball attraction
    pub attractor_strength: f32,
    /// Mass, proportional to the particle share
    pub mass: f32,
    /// Spawn radius and collision radius
    pub radius: f32,
    /// First particle index seeded for this ball
    pub particle_start: u32,
    /// Number of particles seeded for this ball
    pub particle_count: u32,
}

/// Colour accumulator for one cell of the homogeneity grid. 16 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[expect(clippy::exhaustive_structs, reason = "It's a fixed binary layout")]
pub struct HomogeneityCell {
    /// Fixed-point sums of the red, green and blue channels
    pub color_sums: [u32; 3],
    /// Number of particles that landed in the cell
    pub count: u32,
}

/// Output of the homogeneity reduction. 16 bytes so the copy into the readback buffer stays
/// within map alignment rules.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[expect(clippy::exhaustive_structs, reason = "It's a fixed binary layout")]
pub struct HomogeneityResult {
    /// Variance of the normalised cell colours around their mean
    pub variance: f32,
    /// Cells that had at least one particle
    pub occupied_cells: u32,
    /// Padding
    pub _padding: [u32; 2],
}

/// Per-pass uniform for the Hillis–Steele scan. 16 bytes, uploaded once per pass at
/// `SCAN_PARAMS_STRIDE` intervals.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[expect(clippy::exhaustive_structs, reason = "It's a fixed binary layout")]
pub struct ScanParams {
    /// Number of bins being scanned
    pub element_count: u32,
    /// Distance to the element added in this pass, `2^pass`
    pub stride: u32,
    /// Padding
    pub _padding: [u32; 2],
}

/// Number of Hillis–Steele passes needed to scan `element_count` items: `ceil(log2(n))`.
#[must_use]
#[inline]
pub const fn scan_pass_count(element_count: u32) -> u32 {
    if element_count <= 1 {
        return 0;
    }
    u32::BITS - (element_count - 1).leading_zeros()
}
