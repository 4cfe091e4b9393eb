//! CPU reference for the density, force and integration passes. Operates on particles that have
//! already been sorted by [`crate::spatial_bin::sort`].

use glam::Vec2;
use nebula_cpu_gpu_shared::{
    GpuBall, GpuParticle, SimParams, POINTER_RADIUS, SOFTENING, TIDAL_RADIUS_FACTOR,
};

use crate::ball::reflect_off_walls;
use crate::spatial_bin::{usize_from, BinGrid, BinTable};

/// Per-particle output of the force pass: `(ax, ay, new_attractor, 0)`
pub type Acceleration = [f32; 4];

/// Per-particle render instance colour: `(r·fade, g·fade, b·fade, fade)`
pub type RenderColor = [f32; 4];

/// `W(r²) = poly6 · (h² − r²)³` inside the kernel radius, 0 outside
#[must_use]
#[inline]
pub fn poly6(distance_sq: f32, params: &SimParams) -> f32 {
    if distance_sq >= params.sph_radius_sq {
        return 0.0;
    }
    let falloff = params.sph_radius_sq - distance_sq;
    params.poly6_scale * falloff * falloff * falloff
}

/// Visit every particle in the 3×3 bin neighbourhood of `position`
fn for_each_neighbour<F>(
    particles: &[GpuParticle],
    grid: &BinGrid,
    bins: &BinTable,
    position: [f32; 2],
    mut visit: F,
) where
    F: FnMut(usize, &GpuParticle),
{
    let Some(coord) = grid.coord_of(position) else {
        return;
    };
    for bin in grid.neighbourhood(coord) {
        for slot in bins.range(bin) {
            if let Some(neighbour) = particles.get(slot) {
                visit(slot, neighbour);
            }
        }
    }
}

/// Whether a particle takes part in this step
fn is_simulated(particle: &GpuParticle, grid: &BinGrid) -> bool {
    grid.bin_of(particle) != grid.overflow_bin()
}

/// Density and pressure for the first `active` particles.
///
/// `ρᵢ = rest · Σⱼ W(rᵢⱼ) / W(0)`, self included, so an isolated particle sits at rest density.
/// Pressure is one-sided: `gas · max(ρ − rest, 0)`.
#[inline]
pub fn compute_density(
    particles: &mut [GpuParticle],
    active: usize,
    grid: &BinGrid,
    bins: &BinTable,
    params: &SimParams,
) {
    let self_weight = poly6(0.0, params);
    let mut densities = Vec::with_capacity(active);

    for particle in particles.iter().take(active) {
        if !is_simulated(particle, grid) || self_weight <= 0.0 {
            densities.push(None);
            continue;
        }
        let position = Vec2::from(particle.position);
        let mut weight_sum = 0.0;
        for_each_neighbour(particles, grid, bins, particle.position, |_, neighbour| {
            if !neighbour.is_alive() {
                return;
            }
            let distance_sq = position.distance_squared(Vec2::from(neighbour.position));
            weight_sum += poly6(distance_sq, params);
        });
        densities.push(Some(params.rest_density * weight_sum / self_weight));
    }

    for (particle, density) in particles.iter_mut().zip(densities) {
        if let Some(density) = density {
            particle.density = density;
            particle.pressure = params.gas_constant * (density - params.rest_density).max(0.0);
        }
    }
}

/// Accelerations and updated attractor strengths for the first `active` particles
#[must_use]
#[inline]
pub fn compute_forces(
    particles: &[GpuParticle],
    active: usize,
    grid: &BinGrid,
    bins: &BinTable,
    balls: &[GpuBall],
    params: &SimParams,
) -> Vec<Acceleration> {
    let ball_count = usize_from(params.ball_count).min(balls.len());
    let live_balls = balls.get(..ball_count).unwrap_or_default();

    particles
        .iter()
        .take(active)
        .enumerate()
        .map(|(slot, particle)| {
            if !is_simulated(particle, grid) {
                return [0.0; 4];
            }
            let (acceleration, attractor) =
                particle_acceleration(slot, particle, particles, grid, bins, live_balls, params);
            [acceleration.x, acceleration.y, attractor, 0.0]
        })
        .collect()
}

/// Every force on one particle
fn particle_acceleration(
    slot: usize,
    particle: &GpuParticle,
    particles: &[GpuParticle],
    grid: &BinGrid,
    bins: &BinTable,
    balls: &[GpuBall],
    params: &SimParams,
) -> (Vec2, f32) {
    let position = Vec2::from(particle.position);
    let velocity = Vec2::from(particle.velocity);
    let h = params.sph_radius;
    let own_density = particle.density.max(f32::EPSILON);

    let mut pressure_sum = Vec2::ZERO;
    let mut viscosity_sum = Vec2::ZERO;
    for_each_neighbour(particles, grid, bins, particle.position, |other, neighbour| {
        if other == slot || !neighbour.is_alive() {
            return;
        }
        let offset = position - Vec2::from(neighbour.position);
        let distance = offset.length();
        if distance <= 0.0 || distance >= h {
            return;
        }
        let neighbour_density = neighbour.density.max(f32::EPSILON);
        let falloff = h - distance;

        let shared_pressure = (particle.pressure + neighbour.pressure) * 0.5;
        pressure_sum -= offset / distance
            * (shared_pressure / neighbour_density * params.spiky_scale * falloff * falloff);

        viscosity_sum += (Vec2::from(neighbour.velocity) - velocity)
            * (params.visc_scale * falloff / neighbour_density);
    });

    let mut acceleration =
        pressure_sum / own_density + viscosity_sum * (params.viscosity / own_density);

    let mut attractor = particle.attractor;
    for (index, ball) in balls.iter().enumerate() {
        let to_ball = Vec2::from(ball.position) - position;
        let distance = to_ball.length();
        let softened = distance * distance + SOFTENING;
        let direction = if distance > 0.0 {
            to_ball / distance
        } else {
            Vec2::ZERO
        };

        if usize_from(particle.ball_id) == index {
            let falloff = (-params.attractor_decay * distance).exp();
            acceleration += direction
                * (params.attractor_base
                    * particle.attractor
                    * ball.attractor_strength
                    * falloff
                    * ball.mass
                    / softened);
            if distance > TIDAL_RADIUS_FACTOR * ball.radius {
                attractor = (attractor - params.tidal_stripping).max(0.0);
            }
        } else {
            acceleration += direction * (params.gravity_constant * ball.mass / softened);
        }
    }

    if params.dt > 0.0 {
        acceleration -= velocity * (params.drag_coefficient / params.dt);
    }

    if params.mouse_force > 0.0 {
        let away = position - Vec2::new(params.mouse_x, params.mouse_y);
        let distance = away.length();
        if distance > 0.0 && distance < POINTER_RADIUS {
            acceleration +=
                away / distance * (params.mouse_force * (1.0 - distance / POINTER_RADIUS));
        }
    }

    (acceleration, attractor)
}

/// Semi-implicit Euler, wall reflection and the render colour for the first `active` particles
#[inline]
pub fn integrate(
    particles: &mut [GpuParticle],
    accelerations: &[Acceleration],
    render_colors: &mut [RenderColor],
    grid: &BinGrid,
    params: &SimParams,
) {
    let canvas = Vec2::new(params.canvas_width, params.canvas_height);
    for ((particle, acceleration), render) in particles
        .iter_mut()
        .zip(accelerations)
        .zip(render_colors.iter_mut())
    {
        if !is_simulated(particle, grid) {
            *render = [0.0; 4];
            continue;
        }

        let [ax, ay, attractor, _] = *acceleration;
        let mut velocity = Vec2::from(particle.velocity) + Vec2::new(ax, ay) * params.dt;
        let mut position = Vec2::from(particle.position) + velocity * params.dt;
        reflect_off_walls(
            &mut position,
            &mut velocity,
            params.particle_scale,
            canvas,
            params.bounce_damping,
        );

        particle.position = position.into();
        particle.velocity = velocity.into();
        particle.attractor = attractor;

        let fade = params.fade_alpha;
        let [red, green, blue] = particle.color;
        *render = [red * fade, green * fade, blue * fade, fade];
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod test {
    use super::*;
    use crate::config_app::ConfigSnapshot;
    use crate::config_shader::{to_sim_params, FrameInputs};
    use crate::spatial_bin::sort;

    fn params() -> SimParams {
        to_sim_params(
            &ConfigSnapshot::default(),
            &FrameInputs {
                canvas: (800.0, 600.0),
                pointer: (0.0, 0.0),
                frame_number: 0,
                fade_alpha: 0.5,
                active_particle_count: 0,
                ball_count: 0,
            },
        )
    }

    fn particle(x: f32, y: f32) -> GpuParticle {
        GpuParticle {
            position: [x, y],
            color: [0.2, 0.4, 0.8],
            density: 1.0,
            attractor: 1.0,
            alive: 1,
            ..Default::default()
        }
    }

    fn sorted(particles: &[GpuParticle], params: &SimParams) -> (Vec<GpuParticle>, BinTable) {
        let mut out = vec![GpuParticle::default(); particles.len()];
        let table = sort(particles, &mut out, &BinGrid::from_params(params));
        (out, table)
    }

    #[test]
    fn isolated_particle_sits_at_rest_density() {
        let params = params();
        let (mut particles, table) = sorted(&[particle(400.0, 300.0)], &params);
        compute_density(&mut particles, 1, &BinGrid::from_params(&params), &table, &params);
        assert!((particles[0].density - params.rest_density).abs() < 1e-5);
        assert!(particles[0].pressure.abs() < f32::EPSILON);
    }

    #[test]
    fn crowded_particles_build_pressure() {
        let params = params();
        let crowd: Vec<GpuParticle> = (0..10)
            .map(|index| particle(400.0 + index as f32, 300.0))
            .collect();
        let (mut particles, table) = sorted(&crowd, &params);
        let grid = BinGrid::from_params(&params);
        compute_density(&mut particles, crowd.len(), &grid, &table, &params);
        for particle in &particles {
            assert!(particle.density > params.rest_density);
            assert!(particle.pressure > 0.0);
        }
    }

    #[test]
    fn pressure_pushes_pairs_apart_symmetrically() {
        let mut params = params();
        params.viscosity = 0.0;
        params.drag_coefficient = 0.0;
        let pair = [particle(400.0, 300.0), particle(405.0, 300.0)];
        let (mut particles, table) = sorted(&pair, &params);
        let grid = BinGrid::from_params(&params);
        compute_density(&mut particles, 2, &grid, &table, &params);
        let forces = compute_forces(&particles, 2, &grid, &table, &[], &params);

        let (left, right) = if particles[0].position[0] < particles[1].position[0] {
            (forces[0], forces[1])
        } else {
            (forces[1], forces[0])
        };
        assert!(left[0] < 0.0);
        assert!(right[0] > 0.0);
        assert!((left[0] + right[0]).abs() < 1e-3 * left[0].abs());
    }

    #[test]
    fn own_ball_attracts_and_others_pull_weaker() {
        let mut params = params();
        params.ball_count = 2;
        params.drag_coefficient = 0.0;
        let balls = [
            GpuBall {
                position: [500.0, 300.0],
                attractor_strength: 1.0,
                mass: 50.0,
                radius: 100.0,
                ..Default::default()
            },
            GpuBall {
                position: [300.0, 300.0],
                attractor_strength: 1.0,
                mass: 50.0,
                radius: 100.0,
                ..Default::default()
            },
        ];
        let single = [particle(400.0, 300.0)];
        let (mut particles, table) = sorted(&single, &params);
        let grid = BinGrid::from_params(&params);
        compute_density(&mut particles, 1, &grid, &table, &params);
        let forces = compute_forces(&particles, 1, &grid, &table, &balls, &params);
        // Owned by ball 0 on the right, so the net pull is to the right
        assert!(forces[0][0] > 0.0);
        assert!(forces[0][1].abs() < 1e-4);
        assert!((forces[0][2] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn tidal_stripping_only_ever_decreases() {
        let mut params = params();
        params.ball_count = 1;
        params.tidal_stripping = 0.3;
        let balls = [GpuBall {
            position: [100.0, 100.0],
            attractor_strength: 1.0,
            mass: 10.0,
            radius: 10.0,
            ..Default::default()
        }];
        let far = [particle(700.0, 500.0)];
        let (mut particles, table) = sorted(&far, &params);
        let grid = BinGrid::from_params(&params);

        let mut previous = particles[0].attractor;
        for _ in 0..6 {
            compute_density(&mut particles, 1, &grid, &table, &params);
            let forces = compute_forces(&particles, 1, &grid, &table, &balls, &params);
            assert!(forces[0][2] <= previous);
            assert!(forces[0][2] >= 0.0);
            previous = forces[0][2];
            particles[0].attractor = previous;
        }
        assert!(previous.abs() < f32::EPSILON);
    }

    #[test]
    fn pointer_repels_nearby_particles() {
        let mut params = params();
        params.mouse_force = 200.0;
        params.mouse_x = 390.0;
        params.mouse_y = 300.0;
        params.drag_coefficient = 0.0;
        let (mut particles, table) = sorted(&[particle(400.0, 300.0)], &params);
        let grid = BinGrid::from_params(&params);
        compute_density(&mut particles, 1, &grid, &table, &params);
        let forces = compute_forces(&particles, 1, &grid, &table, &[], &params);
        assert!(forces[0][0] > 0.0);
    }

    #[test]
    fn drag_opposes_velocity() {
        let params = params();
        let mut moving = particle(400.0, 300.0);
        moving.velocity = [60.0, 0.0];
        let (mut particles, table) = sorted(&[moving], &params);
        let grid = BinGrid::from_params(&params);
        compute_density(&mut particles, 1, &grid, &table, &params);
        let forces = compute_forces(&particles, 1, &grid, &table, &[], &params);
        let expected = -60.0 * params.drag_coefficient / params.dt;
        assert!((forces[0][0] - expected).abs() < 1e-3);
    }

    #[test]
    fn integration_moves_reflects_and_fades() {
        let params = params();
        let grid = BinGrid::from_params(&params);
        let mut particles = vec![particle(400.0, 300.0), particle(0.5, 300.0)];
        particles[1].velocity = [-120.0, 0.0];
        let accelerations = vec![[60.0, 0.0, 0.75, 0.0], [0.0, 0.0, 1.0, 0.0]];
        let mut render = vec![[0.0; 4]; 2];
        integrate(&mut particles, &accelerations, &mut render, &grid, &params);

        assert!((particles[0].velocity[0] - 1.0).abs() < 1e-5);
        assert!((particles[0].position[0] - (400.0 + 1.0 / 60.0)).abs() < 1e-4);
        assert!((particles[0].attractor - 0.75).abs() < f32::EPSILON);

        assert!((particles[1].position[0] - params.particle_scale).abs() < f32::EPSILON);
        assert!(particles[1].velocity[0] > 0.0);

        assert_eq!(render[0], [0.1, 0.2, 0.4, 0.5]);
    }

    #[test]
    fn dead_particles_are_left_alone() {
        let params = params();
        let grid = BinGrid::from_params(&params);
        let mut dead = particle(400.0, 300.0);
        dead.alive = 0;
        let mut particles = vec![dead];
        let mut render = vec![[1.0; 4]];
        integrate(&mut particles, &[[99.0, 99.0, 0.0, 0.0]], &mut render, &grid, &params);
        assert_eq!(particles[0], dead);
        assert_eq!(render[0], [0.0; 4]);
    }
}
