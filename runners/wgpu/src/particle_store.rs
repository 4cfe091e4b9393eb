//! The particle population: seeding it around the balls, and the two halves of the double buffer
//! it lives in.

use core::f32::consts::TAU;

use nebula_cpu_gpu_shared::GpuParticle;
use rand::Rng;

use crate::ball::Ball;

/// Half-width of the random velocity jitter added to each seeded particle
const SEED_VELOCITY_JITTER: f32 = 5.0;

/// Which half of the particle double buffer holds the current state. The other half is where
/// this step's sort writes to, after which the roles swap.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum BufferRole {
    /// Half A is current, B is the sort target
    #[default]
    ACurrent,
    /// Half B is current, A is the sort target
    BCurrent,
}

impl BufferRole {
    /// The role for the next step
    #[must_use]
    #[inline]
    pub const fn flipped(self) -> Self {
        match self {
            Self::ACurrent => Self::BCurrent,
            Self::BCurrent => Self::ACurrent,
        }
    }

    /// Index of the current half, 0 for A
    #[must_use]
    #[inline]
    pub const fn current_index(self) -> usize {
        match self {
            Self::ACurrent => 0,
            Self::BCurrent => 1,
        }
    }

    /// Index of the half the sort writes into
    #[must_use]
    #[inline]
    pub const fn target_index(self) -> usize {
        self.flipped().current_index()
    }
}

/// Both halves of the particle double buffer in host memory
#[derive(Clone, Debug, Default)]
pub struct ParticleHalves {
    /// Half A
    a: Vec<GpuParticle>,
    /// Half B
    b: Vec<GpuParticle>,
}

impl ParticleHalves {
    /// Two zeroed halves of `capacity` particles each
    #[must_use]
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self {
            a: vec![GpuParticle::default(); capacity],
            b: vec![GpuParticle::default(); capacity],
        }
    }

    /// Particles per half
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.a.len()
    }

    /// Overwrite the start of both halves with the same population. Anything past the end of
    /// `particles` is left alone.
    #[inline]
    pub fn fill(&mut self, particles: &[GpuParticle]) {
        for half in [&mut self.a, &mut self.b] {
            for (slot, particle) in half.iter_mut().zip(particles) {
                *slot = *particle;
            }
        }
    }

    /// The half that is current under `role`
    #[must_use]
    #[inline]
    pub fn current(&self, role: BufferRole) -> &[GpuParticle] {
        match role {
            BufferRole::ACurrent => self.a.as_slice(),
            BufferRole::BCurrent => self.b.as_slice(),
        }
    }

    /// The half that is current under `role`, as the first element, and the sort target
    #[inline]
    pub fn split(&mut self, role: BufferRole) -> (&[GpuParticle], &mut [GpuParticle]) {
        match role {
            BufferRole::ACurrent => (self.a.as_slice(), self.b.as_mut_slice()),
            BufferRole::BCurrent => (self.b.as_slice(), self.a.as_mut_slice()),
        }
    }
}

/// Fill `capacity` particle slots. Every ball's range is scattered uniformly over a disk of the
/// ball's radius, moving with the ball. Slots no ball owns are dead and parked at the canvas
/// centre.
#[must_use]
#[inline]
pub fn seed_particles<R: Rng>(
    balls: &[Ball],
    capacity: usize,
    canvas: (f32, f32),
    rng: &mut R,
) -> Vec<GpuParticle> {
    let parked = GpuParticle {
        position: [canvas.0 * 0.5, canvas.1 * 0.5],
        density: 1.0,
        alive: 0,
        ..Default::default()
    };
    let mut particles = vec![parked; capacity];

    for (ball_id, ball) in (0_u32..).zip(balls) {
        let start = usize::try_from(ball.particle_start).unwrap_or(usize::MAX);
        let count = usize::try_from(ball.particle_count).unwrap_or(0);
        for particle in particles.iter_mut().skip(start).take(count) {
            let angle = rng.gen::<f32>() * TAU;
            let distance = rng.gen::<f32>().sqrt() * ball.radius;
            *particle = GpuParticle {
                position: [
                    ball.position.x + angle.cos() * distance,
                    ball.position.y + angle.sin() * distance,
                ],
                velocity: [
                    ball.velocity.x
                        + rng.gen_range(-SEED_VELOCITY_JITTER..SEED_VELOCITY_JITTER),
                    ball.velocity.y
                        + rng.gen_range(-SEED_VELOCITY_JITTER..SEED_VELOCITY_JITTER),
                ],
                color: ball.color,
                density: 1.0,
                pressure: 0.0,
                attractor: 1.0,
                ball_id,
                alive: 1,
            };
        }
    }

    log::debug!(
        "Seeded {} particles around {} balls",
        balls.iter().map(|ball| ball.particle_count).sum::<u32>(),
        balls.len()
    );
    particles
}
