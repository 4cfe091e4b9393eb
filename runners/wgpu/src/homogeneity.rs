//! How well have the ball colours mixed?
//!
//! The canvas is split into a coarse 16×16 grid. Each particle adds its colour to its cell, then
//! a reduction compares every occupied cell's normalised average colour with the mean over all
//! occupied cells. A large variance means distinct colour regions, zero means perfectly mixed.

use glam::Vec3;
use nebula_cpu_gpu_shared::{
    GpuParticle, HomogeneityCell, HomogeneityResult, HOMOGENEITY_CELLS, HOMOGENEITY_COLOR_SCALE,
    HOMOGENEITY_GRID_SIDE,
};

/// Which homogeneity cell a position falls in, clamped to the grid. `None` for non-finite
/// positions.
#[must_use]
#[inline]
#[expect(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "Cell coordinates are clamped into 0..16"
)]
pub fn cell_of(position: [f32; 2], canvas: (f32, f32)) -> Option<usize> {
    let [x, y] = position;
    if !x.is_finite() || !y.is_finite() || canvas.0 <= 0.0 || canvas.1 <= 0.0 {
        return None;
    }
    let side = HOMOGENEITY_GRID_SIDE as f32;
    let max = side - 1.0;
    let cell_x = (x / canvas.0 * side).floor().clamp(0.0, max) as usize;
    let cell_y = (y / canvas.1 * side).floor().clamp(0.0, max) as usize;
    Some(cell_y * HOMOGENEITY_GRID_SIDE as usize + cell_x)
}

/// Colour channel as a fixed point integer
#[expect(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Colours are clamped into [0, 1] first"
)]
fn fixed_point(channel: f32) -> u32 {
    (channel.clamp(0.0, 1.0) * HOMOGENEITY_COLOR_SCALE).round() as u32
}

/// Add every live particle's colour to its cell
#[must_use]
#[inline]
pub fn accumulate(
    particles: &[GpuParticle],
    canvas: (f32, f32),
) -> [HomogeneityCell; HOMOGENEITY_CELLS] {
    let mut cells = [HomogeneityCell::default(); HOMOGENEITY_CELLS];
    for particle in particles.iter().filter(|particle| particle.is_alive()) {
        let Some(cell) = cell_of(particle.position, canvas).and_then(|index| cells.get_mut(index))
        else {
            continue;
        };
        for (sum, channel) in cell.color_sums.iter_mut().zip(particle.color) {
            *sum = sum.wrapping_add(fixed_point(channel));
        }
        cell.count = cell.count.wrapping_add(1);
    }
    cells
}

/// Average colour of a cell divided by its channel sum, so only hue matters. Zero when the
/// average is black.
#[must_use]
#[inline]
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    reason = "Fixed point sums fit comfortably in f32's range"
)]
pub fn normalised_colour(cell: &HomogeneityCell) -> Option<Vec3> {
    if cell.count == 0 {
        return None;
    }
    let [red, green, blue] = cell.color_sums;
    let average = Vec3::new(red as f32, green as f32, blue as f32)
        / (cell.count as f32 * HOMOGENEITY_COLOR_SCALE);
    let total = average.x + average.y + average.z;
    if total > 0.0 {
        Some(average / total)
    } else {
        Some(Vec3::ZERO)
    }
}

/// Variance of normalised cell colours around their mean, over occupied cells only
#[must_use]
#[inline]
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    reason = "At most 256 occupied cells"
)]
pub fn reduce(cells: &[HomogeneityCell]) -> HomogeneityResult {
    let colours: Vec<Vec3> = cells.iter().filter_map(normalised_colour).collect();
    if colours.is_empty() {
        return HomogeneityResult::default();
    }
    let occupied = colours.len() as f32;
    let mean = colours.iter().copied().sum::<Vec3>() / occupied;
    let variance = colours
        .iter()
        .map(|colour| (*colour - mean).length_squared())
        .sum::<f32>()
        / occupied;

    HomogeneityResult {
        variance,
        occupied_cells: colours.len() as u32,
        _padding: [0; 2],
    }
}

/// Accumulate and reduce in one go
#[must_use]
#[inline]
pub fn measure(particles: &[GpuParticle], canvas: (f32, f32)) -> f32 {
    reduce(&accumulate(particles, canvas)).variance
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod test {
    use super::*;

    const CANVAS: (f32, f32) = (800.0, 600.0);
    const RED: [f32; 3] = [0.9, 0.1, 0.1];
    const BLUE: [f32; 3] = [0.1, 0.1, 0.9];

    fn particle(x: f32, y: f32, color: [f32; 3]) -> GpuParticle {
        GpuParticle {
            position: [x, y],
            color,
            alive: 1,
            ..Default::default()
        }
    }

    fn grid_of(color_at: impl Fn(usize, usize) -> [f32; 3]) -> Vec<GpuParticle> {
        let mut particles = Vec::new();
        for cy in 0..16 {
            for cx in 0..16 {
                let x = (cx as f32 + 0.5) * 50.0;
                let y = (cy as f32 + 0.5) * 37.5;
                particles.push(particle(x, y, color_at(cx, cy)));
            }
        }
        particles
    }

    #[test]
    fn cells_cover_the_canvas() {
        assert_eq!(cell_of([0.0, 0.0], CANVAS), Some(0));
        assert_eq!(cell_of([799.0, 0.0], CANVAS), Some(15));
        assert_eq!(cell_of([0.0, 599.0], CANVAS), Some(240));
        assert_eq!(cell_of([2000.0, 2000.0], CANVAS), Some(255));
        assert_eq!(cell_of([-5.0, -5.0], CANVAS), Some(0));
        assert_eq!(cell_of([f32::NAN, 1.0], CANVAS), None);
    }

    #[test]
    fn colours_accumulate_in_fixed_point() {
        let cells = accumulate(
            &[particle(10.0, 10.0, RED), particle(20.0, 20.0, BLUE)],
            CANVAS,
        );
        assert_eq!(cells[0].count, 2);
        assert_eq!(cells[0].color_sums, [922 + 102, 102 + 102, 102 + 922]);
    }

    #[test]
    fn one_colour_everywhere_is_perfectly_mixed() {
        let particles = grid_of(|_, _| RED);
        let result = reduce(&accumulate(&particles, CANVAS));
        assert_eq!(result.occupied_cells, 256);
        assert!(result.variance < 1e-9);
    }

    #[test]
    fn evenly_blended_cells_are_mixed() {
        let mut particles = grid_of(|_, _| RED);
        particles.extend(grid_of(|_, _| BLUE));
        assert!(measure(&particles, CANVAS) < 1e-9);
    }

    #[test]
    fn separated_colours_are_not_mixed() {
        let particles = grid_of(|cx, _| if cx < 8 { RED } else { BLUE });
        let variance = measure(&particles, CANVAS);
        // Half the cells at each of two hues, so the variance is (distance / 2)²
        let red = Vec3::new(922.0, 102.0, 102.0) / 1126.0;
        let blue = Vec3::new(102.0, 102.0, 922.0) / 1126.0;
        let expected = (red.distance(blue) / 2.0).powi(2);
        assert!((variance - expected).abs() < 1e-4);
        assert!(variance > 0.2);
    }

    #[test]
    fn empty_or_dead_populations_measure_zero() {
        assert!(measure(&[], CANVAS).abs() < f32::EPSILON);
        let mut dead = particle(10.0, 10.0, RED);
        dead.alive = 0;
        let result = reduce(&accumulate(&[dead], CANVAS));
        assert_eq!(result.occupied_cells, 0);
    }

    #[test]
    fn empty_cells_are_ignored() {
        let particles = vec![particle(10.0, 10.0, RED), particle(790.0, 590.0, RED)];
        assert!(measure(&particles, CANVAS) < 1e-9);
    }
}
