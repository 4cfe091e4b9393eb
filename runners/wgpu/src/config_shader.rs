//! Builds the per-step `SimParams` uniform from a config snapshot

use core::f32::consts::PI;

use nebula_cpu_gpu_shared::{SimParams, FIXED_DT};

use crate::config_app::{ConfigSnapshot, Param, ParamKind};

/// Everything in `SimParams` that doesn't come from config
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "Plain data")]
pub struct FrameInputs {
    /// Canvas size in pixels
    pub canvas: (f32, f32),
    /// Pointer position in canvas pixels
    pub pointer: (f32, f32),
    /// Monotonic step counter
    pub frame_number: u32,
    /// From the cycle state machine
    pub fade_alpha: f32,
    /// From the adaptive controller
    pub active_particle_count: u32,
    /// Live balls
    pub ball_count: u32,
}

/// Number of bins needed to cover `length` pixels with bins of `bin_size` pixels
#[must_use]
#[inline]
#[expect(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Canvas sizes and bin sizes are small and positive"
)]
pub fn bins_along(length: f32, bin_size: f32) -> u32 {
    if bin_size <= 0.0 {
        return 1;
    }
    ((length / bin_size).ceil() as u32).max(1)
}

/// The most bins, overflow included, that any allowed SPH radius needs on this canvas. Bin buffers
/// are allocated at this size so that radius changes never reallocate.
#[must_use]
#[inline]
pub fn max_total_bins(canvas: (f32, f32)) -> u32 {
    let smallest_radius = match Param::SphRadius.kind() {
        ParamKind::Number { min, .. } => min,
        ParamKind::Flag { .. } | ParamKind::Text => 1.0,
    };
    bins_along(canvas.0, smallest_radius)
        .saturating_mul(bins_along(canvas.1, smallest_radius))
        .saturating_add(1)
}

/// Pack the snapshot into the byte-exact uniform the passes read. Kernel normalisation constants
/// are computed here once per step rather than per particle.
#[must_use]
#[inline]
pub fn to_sim_params(config: &ConfigSnapshot, frame: &FrameInputs) -> SimParams {
    let h = config.sph_radius;
    let h2 = h * h;
    let h6 = h2 * h2 * h2;
    let h9 = h6 * h2 * h;
    let bin_size = h;

    SimParams {
        dt: FIXED_DT,
        particle_count: frame.active_particle_count,
        ball_count: frame.ball_count,
        canvas_width: frame.canvas.0,
        canvas_height: frame.canvas.1,
        sph_radius: h,
        rest_density: config.rest_density,
        gas_constant: config.gas_constant,
        viscosity: config.viscosity,
        attractor_base: config.attractor_base,
        gravity_constant: config.gravity_constant,
        drag_coefficient: config.drag_coefficient,
        bin_size,
        bins_x: bins_along(frame.canvas.0, bin_size),
        bins_y: bins_along(frame.canvas.1, bin_size),
        mouse_x: frame.pointer.0,
        mouse_y: frame.pointer.1,
        mouse_force: config.mouse_force,
        frame_number: frame.frame_number,
        particle_scale: config.particle_scale,
        fade_alpha: frame.fade_alpha,
        attractor_decay: config.attractor_decay,
        bounce_damping: config.bounce_damping,
        tidal_stripping: config.tidal_stripping,
        fog_intensity: config.fog_intensity,
        fog_falloff: config.fog_falloff,
        fog_size: config.fog_size,
        intensity_falloff: config.intensity_falloff,
        intensity_floor: config.intensity_floor,
        brightness_falloff: config.brightness_falloff,
        brightness_floor: config.brightness_floor,
        glow_falloff: config.glow_falloff,
        poly6_scale: 315.0 / (64.0 * PI * h9),
        spiky_scale: -45.0 / (PI * h6),
        visc_scale: 45.0 / (PI * h6),
        inv_bin_size: 1.0 / bin_size,
        sph_radius_sq: h2,
        _padding: [0; 3],
    }
}
