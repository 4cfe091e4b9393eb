//! The handful of attractor balls that particles orbit. Simulated on the CPU because there are
//! never more than `MAX_BALLS` of them, then uploaded read-only every step.

use glam::Vec2;
use nebula_cpu_gpu_shared::{GpuBall, MAX_BALLS};
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;
use rand::{Rng as _, SeedableRng as _};

use crate::theme::Theme;

/// Added to squared ball separations so close encounters don't fling balls across the canvas
pub const BALL_SOFTENING: f32 = 400.0;

/// How far inside the canvas edge balls spawn
const SPAWN_INSET: f32 = 50.0;

/// Ball radius as a fraction of the side of the canvas area each ball gets
const RADIUS_SCALE: f32 = 0.15;

/// Ball mass per owned particle
const MASS_PER_PARTICLE: f32 = 0.5;

/// Canvas edge a ball enters from
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Edge {
    /// y = 0
    Top,
    /// y = height
    Bottom,
    /// x = 0
    Left,
    /// x = width
    Right,
}

impl Edge {
    /// Edges in the order consecutive balls cycle through
    const ORDER: [Self; 4] = [Self::Top, Self::Bottom, Self::Left, Self::Right];

    /// The `n`th edge, wrapping
    #[expect(clippy::indexing_slicing, reason = "Index is reduced modulo the length")]
    const fn nth(n: usize) -> Self {
        Self::ORDER[n % Self::ORDER.len()]
    }
}

/// One attractor body
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "Plain data")]
pub struct Ball {
    /// Centre
    pub position: Vec2,
    /// Velocity in pixels per second
    pub velocity: Vec2,
    /// Colour given to this ball's particles
    pub color: [f32; 3],
    /// Multiplier on the own-ball attraction
    pub attractor_strength: f32,
    /// Proportional to the particle share
    pub mass: f32,
    /// Spawn and collision radius
    pub radius: f32,
    /// First particle seeded for this ball
    pub particle_start: u32,
    /// Number of particles seeded for this ball
    pub particle_count: u32,
}

impl Ball {
    /// The GPU representation
    #[must_use]
    #[inline]
    pub const fn to_gpu(&self) -> GpuBall {
        GpuBall {
            position: [self.position.x, self.position.y],
            velocity: [self.velocity.x, self.velocity.y],
            color: self.color,
            attractor_strength: self.attractor_strength,
            mass: self.mass,
            radius: self.radius,
            particle_start: self.particle_start,
            particle_count: self.particle_count,
        }
    }
}

/// Softened inverse-square attraction exerted on body `a` by body `b`.
#[must_use]
#[inline]
pub fn gravity_between(
    a_position: Vec2,
    a_mass: f32,
    b_position: Vec2,
    b_mass: f32,
    gravity_constant: f32,
) -> Vec2 {
    let delta = b_position - a_position;
    let distance_sq = delta.length_squared() + BALL_SOFTENING;
    let inverse_cube = 1.0 / (distance_sq * distance_sq.sqrt());
    delta * (gravity_constant * a_mass * b_mass * inverse_cube)
}

/// The force one ball exerts on another
#[derive(Copy, Clone, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "Plain data")]
pub struct PairForce {
    /// Ball being pulled
    pub on: usize,
    /// Ball doing the pulling
    pub from: usize,
    /// The force
    pub force: Vec2,
}

/// Owns and steps the ball population
pub struct BallDynamics {
    /// Live balls, at most `MAX_BALLS`
    balls: Vec<Ball>,
    /// Canvas size in pixels
    canvas: Vec2,
    /// Colours to deal out on respawn
    palette: Vec<[f32; 3]>,
    /// Randomness for spawn positions, speeds and palette shuffles
    rng: StdRng,
}

impl BallDynamics {
    /// Instantiate without any balls. Call [`Self::respawn`] to create some.
    #[must_use]
    #[inline]
    pub fn new(theme: &Theme, canvas: (f32, f32)) -> Self {
        Self::with_rng(theme, canvas, StdRng::from_entropy())
    }

    /// Instantiate with a specific random source, for reproducible runs
    #[must_use]
    #[inline]
    pub fn with_rng(theme: &Theme, canvas: (f32, f32), rng: StdRng) -> Self {
        Self {
            balls: Vec::with_capacity(MAX_BALLS),
            canvas: Vec2::new(canvas.0, canvas.1),
            palette: theme.palette.clone(),
            rng,
        }
    }

    /// Use a new theme's palette from the next respawn onwards
    #[inline]
    pub fn set_theme(&mut self, theme: &Theme) {
        self.palette.clone_from(&theme.palette);
    }

    /// Live balls
    #[must_use]
    #[inline]
    pub fn balls(&self) -> &[Ball] {
        &self.balls
    }

    /// Number of live balls
    #[must_use]
    #[inline]
    #[expect(
        clippy::as_conversions,
        clippy::cast_possible_truncation,
        reason = "Never more than MAX_BALLS"
    )]
    pub fn count(&self) -> u32 {
        self.balls.len() as u32
    }

    /// Particles owned by each ball after the last respawn
    #[must_use]
    #[inline]
    pub fn particles_per_ball(&self) -> u32 {
        self.balls.first().map_or(0, |ball| ball.particle_count)
    }

    /// Throw away every ball and create `ball_count` new ones entering from alternating canvas
    /// edges. Particles are split evenly between them and any remainder is left unowned.
    #[inline]
    #[expect(
        clippy::as_conversions,
        clippy::cast_precision_loss,
        reason = "Ball and particle counts are far below f32's exact range"
    )]
    pub fn respawn(&mut self, ball_count: u32, particle_count: u32) {
        self.balls.clear();
        let ball_count = ball_count.min(MAX_BALLS as u32);
        if ball_count == 0 {
            return;
        }

        let per_ball = particle_count / ball_count;
        let area = self.canvas.x * self.canvas.y;
        let radius = (area / ball_count as f32).sqrt() * RADIUS_SCALE;

        let mut palette = self.palette.clone();
        palette.shuffle(&mut self.rng);
        if palette.is_empty() {
            palette.push([1.0, 1.0, 1.0]);
        }

        let first_edge = self.rng.gen_range(0..Edge::ORDER.len());
        for index in 0..ball_count {
            let slot = index as usize;
            let (position, velocity) = self.spawn_on(Edge::nth(first_edge + slot));

            #[expect(
                clippy::indexing_slicing,
                reason = "Index is reduced modulo a non-empty length"
            )]
            let color = palette[slot % palette.len()];

            self.balls.push(Ball {
                position,
                velocity,
                color,
                attractor_strength: 1.0,
                mass: per_ball as f32 * MASS_PER_PARTICLE,
                radius,
                particle_start: index * per_ball,
                particle_count: per_ball,
            });
        }

        log::info!(
            "Respawned {ball_count} balls with {per_ball} particles each (radius {radius:.1})"
        );
    }

    /// A random spawn point along `edge`, moving inward with some tangential drift
    fn spawn_on(&mut self, edge: Edge) -> (Vec2, Vec2) {
        let speed = 80.0 + self.rng.gen::<f32>() * 60.0;
        let drift = (self.rng.gen::<f32>() - 0.5) * speed;
        let along_x = self.rng.gen::<f32>() * self.canvas.x;
        let along_y = self.rng.gen::<f32>() * self.canvas.y;

        match edge {
            Edge::Top => (Vec2::new(along_x, SPAWN_INSET), Vec2::new(drift, speed)),
            Edge::Bottom => (
                Vec2::new(along_x, self.canvas.y - SPAWN_INSET),
                Vec2::new(drift, -speed),
            ),
            Edge::Left => (Vec2::new(SPAWN_INSET, along_y), Vec2::new(speed, drift)),
            Edge::Right => (
                Vec2::new(self.canvas.x - SPAWN_INSET, along_y),
                Vec2::new(-speed, drift),
            ),
        }
    }

    /// The force on every ball from every other ball, for each ordered pair
    #[must_use]
    #[inline]
    pub fn pairwise_forces(&self, gravity_constant: f32) -> Vec<PairForce> {
        let mut forces = Vec::new();
        for (on, a) in self.balls.iter().enumerate() {
            for (from, b) in self.balls.iter().enumerate() {
                if on == from {
                    continue;
                }
                forces.push(PairForce {
                    on,
                    from,
                    force: gravity_between(a.position, a.mass, b.position, b.mass, gravity_constant),
                });
            }
        }
        forces
    }

    /// Advance one step: pairwise gravity, semi-implicit Euler, then wall reflection.
    #[inline]
    pub fn update(&mut self, dt: f32, bounce_damping: f32, gravity_constant: f32) {
        let mut accelerations = [Vec2::ZERO; MAX_BALLS];

        for first in 0..self.balls.len() {
            for second in first.saturating_add(1)..self.balls.len() {
                let (Some(a), Some(b)) = (self.balls.get(first), self.balls.get(second)) else {
                    continue;
                };
                // Computed once and applied with opposite signs so the pair conserves momentum
                let force =
                    gravity_between(a.position, a.mass, b.position, b.mass, gravity_constant);
                let (a_mass, b_mass) = (a.mass, b.mass);
                if let Some(acceleration) = accelerations.get_mut(first) {
                    if a_mass > 0.0 {
                        *acceleration += force / a_mass;
                    }
                }
                if let Some(acceleration) = accelerations.get_mut(second) {
                    if b_mass > 0.0 {
                        *acceleration -= force / b_mass;
                    }
                }
            }
        }

        let canvas = self.canvas;
        for (ball, acceleration) in self.balls.iter_mut().zip(accelerations) {
            ball.velocity += acceleration * dt;
            ball.position += ball.velocity * dt;
            reflect_off_walls(
                &mut ball.position,
                &mut ball.velocity,
                ball.radius,
                canvas,
                bounce_damping,
            );
        }
    }

    /// Every ball in the fixed-size layout the GPU expects. Unused slots are zeroed.
    #[must_use]
    #[inline]
    pub fn to_uploadable_buffer(&self) -> [GpuBall; MAX_BALLS] {
        let mut buffer = [GpuBall::default(); MAX_BALLS];
        for (slot, ball) in buffer.iter_mut().zip(&self.balls) {
            *slot = ball.to_gpu();
        }
        buffer
    }
}

/// Clamp to the canvas shrunk by `radius` and reflect the offending velocity component, keeping
/// `damping` of its speed.
#[inline]
pub fn reflect_off_walls(
    position: &mut Vec2,
    velocity: &mut Vec2,
    radius: f32,
    canvas: Vec2,
    damping: f32,
) {
    if position.x < radius {
        position.x = radius;
        velocity.x = velocity.x.abs() * damping;
    } else if position.x > canvas.x - radius {
        position.x = canvas.x - radius;
        velocity.x = -velocity.x.abs() * damping;
    }
    if position.y < radius {
        position.y = radius;
        velocity.y = velocity.y.abs() * damping;
    } else if position.y > canvas.y - radius {
        position.y = canvas.y - radius;
        velocity.y = -velocity.y.abs() * damping;
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod test {
    use super::*;
    use rand::SeedableRng as _;

    fn dynamics(seed: u64) -> BallDynamics {
        BallDynamics::with_rng(
            &Theme::nebula(),
            (800.0, 600.0),
            StdRng::seed_from_u64(seed),
        )
    }

    #[test]
    fn respawn_partitions_particles_evenly() {
        let mut balls = dynamics(1);
        balls.respawn(3, 300);
        assert_eq!(balls.count(), 3);
        for (index, ball) in balls.balls().iter().enumerate() {
            assert_eq!(ball.particle_count, 100);
            assert_eq!(ball.particle_start, 100 * index as u32);
        }
    }

    #[test]
    fn respawn_truncates_the_remainder() {
        let mut balls = dynamics(2);
        balls.respawn(3, 302);
        let owned: u32 = balls.balls().iter().map(|ball| ball.particle_count).sum();
        assert_eq!(owned, 300);
        assert_eq!(balls.particles_per_ball(), 100);
    }

    #[test]
    fn mass_scales_with_particle_share() {
        let mut balls = dynamics(3);
        balls.respawn(2, 1000);
        assert!((balls.balls()[0].mass - 250.0).abs() < f32::EPSILON);
        balls.respawn(4, 1000);
        assert!((balls.balls()[0].mass - 125.0).abs() < f32::EPSILON);
    }

    #[test]
    fn colors_never_repeat() {
        for seed in 0..20 {
            let mut balls = dynamics(seed);
            balls.respawn(5, 5000);
            let colors: Vec<[f32; 3]> = balls.balls().iter().map(|ball| ball.color).collect();
            for (index, color) in colors.iter().enumerate() {
                assert!(!colors[index + 1..].contains(color));
            }
        }
    }

    #[test]
    fn consecutive_balls_use_alternating_edges_and_move_inward() {
        let mut balls = dynamics(4);
        balls.respawn(4, 400);
        let mut edges_seen = Vec::new();
        for ball in balls.balls() {
            let edge = if (ball.position.y - SPAWN_INSET).abs() < f32::EPSILON {
                assert!(ball.velocity.y > 0.0);
                Edge::Top
            } else if (ball.position.y - (600.0 - SPAWN_INSET)).abs() < f32::EPSILON {
                assert!(ball.velocity.y < 0.0);
                Edge::Bottom
            } else if (ball.position.x - SPAWN_INSET).abs() < f32::EPSILON {
                assert!(ball.velocity.x > 0.0);
                Edge::Left
            } else {
                assert!((ball.position.x - (800.0 - SPAWN_INSET)).abs() < f32::EPSILON);
                assert!(ball.velocity.x < 0.0);
                Edge::Right
            };
            edges_seen.push(edge);
        }
        for edge in Edge::ORDER {
            assert!(edges_seen.contains(&edge));
        }
    }

    #[test]
    fn respawn_twice_gives_fresh_state() {
        let mut balls = dynamics(5);
        balls.respawn(3, 300);
        let first: Vec<Ball> = balls.balls().to_vec();
        balls.respawn(3, 300);
        assert_eq!(balls.count(), 3);
        assert_ne!(first, balls.balls().to_vec());
    }

    #[test]
    fn pair_forces_are_antisymmetric() {
        let mut balls = dynamics(6);
        balls.respawn(5, 5000);
        for _ in 0..50 {
            let forces = balls.pairwise_forces(400.0);
            for pair in &forces {
                let mirror = forces
                    .iter()
                    .find(|other| other.on == pair.from && other.from == pair.on)
                    .unwrap();
                let sum = pair.force + mirror.force;
                assert!(sum.length() <= 1e-4 * pair.force.length().max(1.0));
            }
            balls.update(1.0 / 60.0, 0.7, 400.0);
        }
    }

    #[test]
    fn gravity_conserves_momentum_away_from_walls() {
        let mut balls = dynamics(7);
        balls.respawn(2, 1000);
        balls.balls[0].position = Vec2::new(300.0, 300.0);
        balls.balls[1].position = Vec2::new(500.0, 300.0);
        balls.balls[0].velocity = Vec2::ZERO;
        balls.balls[1].velocity = Vec2::ZERO;

        balls.update(1.0 / 60.0, 0.7, 400.0);
        let momentum: Vec2 = balls
            .balls()
            .iter()
            .map(|ball| ball.velocity * ball.mass)
            .sum();
        assert!(momentum.length() < 1e-3);
        assert!(balls.balls()[0].velocity.x > 0.0);
        assert!(balls.balls()[1].velocity.x < 0.0);
    }

    #[test]
    fn walls_reflect_with_damping() {
        let mut position = Vec2::new(-5.0, 300.0);
        let mut velocity = Vec2::new(-100.0, 0.0);
        reflect_off_walls(
            &mut position,
            &mut velocity,
            10.0,
            Vec2::new(800.0, 600.0),
            0.5,
        );
        assert!((position.x - 10.0).abs() < f32::EPSILON);
        assert!((velocity.x - 50.0).abs() < f32::EPSILON);

        let mut position = Vec2::new(400.0, 700.0);
        let mut velocity = Vec2::new(0.0, 40.0);
        reflect_off_walls(
            &mut position,
            &mut velocity,
            10.0,
            Vec2::new(800.0, 600.0),
            0.5,
        );
        assert!((position.y - 590.0).abs() < f32::EPSILON);
        assert!((velocity.y + 20.0).abs() < f32::EPSILON);
    }

    #[test]
    fn upload_buffer_is_padded_with_zeroes() {
        let mut balls = dynamics(8);
        balls.respawn(2, 200);
        let buffer = balls.to_uploadable_buffer();
        assert_eq!(buffer.len(), MAX_BALLS);
        assert_eq!(buffer[0].particle_count, 100);
        assert_eq!(buffer[1].particle_start, 100);
        assert_eq!(buffer[2], GpuBall::default());
        assert_eq!(buffer[4], GpuBall::default());
    }
}
